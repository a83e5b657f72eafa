//! Query result types.

use std::sync::Arc;

use mergedb_core::Value;

use super::row::{Row, Schema};

/// The rows a row set produced, in traversal order.
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// The schema of the result set.
    schema: Arc<Schema>,
    /// The rows in the result set.
    rows: Vec<Row>,
}

impl ResultSet {
    /// Creates a new result set.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema, rows: Vec::new() }
    }

    /// Creates a result set with the given rows.
    #[must_use]
    pub fn with_rows(schema: Arc<Schema>, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.schema.columns()
    }

    /// Returns the rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Gets a row by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Consumes the result set and returns the rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns an iterator over the rows.
    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Converts to a vector of value arrays.
    #[must_use]
    pub fn to_values(&self) -> Vec<Vec<Value>> {
        self.rows.iter().map(|r| r.values().to_vec()).collect()
    }

    /// Returns the values of one column, in row order.
    #[must_use]
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        self.schema
            .index_of(name)
            .map(|i| self.rows.iter().filter_map(|r| r.get(i).cloned()).collect())
            .unwrap_or_default()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
