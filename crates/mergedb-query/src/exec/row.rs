//! Row types for query execution.
//!
//! This module defines the [`Row`] type carried by every cursor, and the
//! [`Schema`] that names its columns.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use mergedb_core::Value;

/// A schema defines the column names and their order in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Column names in order (using Arc<str> to avoid cloning).
    columns: Vec<Arc<str>>,
    /// Map from column name to index for fast lookup.
    name_to_index: HashMap<Arc<str>, usize>,
}

impl Schema {
    /// Creates a new schema from column names.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        let arc_columns: Vec<Arc<str>> =
            columns.into_iter().map(|s| Arc::from(s.as_str())).collect();
        Self::from_arcs(arc_columns)
    }

    /// Creates a new schema from Arc<str> column names (avoids allocation).
    #[must_use]
    pub fn from_arcs(columns: Vec<Arc<str>>) -> Self {
        let name_to_index =
            columns.iter().enumerate().map(|(i, name)| (Arc::clone(name), i)).collect();
        Self { columns, name_to_index }
    }

    /// Creates an empty schema.
    #[must_use]
    pub fn empty() -> Self {
        Self { columns: Vec::new(), name_to_index: HashMap::new() }
    }

    /// Returns the column names as string slices.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|s| s.as_ref()).collect()
    }

    /// Returns the Arc<str> column names (for efficient cloning).
    #[must_use]
    pub fn columns_arc(&self) -> &[Arc<str>] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets the index for a column name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Gets the column name at an index.
    #[must_use]
    pub fn column_at(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|s| s.as_ref())
    }

    /// Returns the first column name this schema shares with `other`.
    #[must_use]
    pub fn first_shared(&self, other: &Schema) -> Option<&str> {
        self.columns.iter().find(|c| other.index_of(c).is_some()).map(|c| c.as_ref())
    }

    /// Creates a new schema by merging with another (efficiently clones Arc<str>).
    #[must_use]
    pub fn merge(&self, other: &Schema) -> Self {
        let mut columns: Vec<Arc<str>> = self.columns.iter().map(Arc::clone).collect();
        columns.extend(other.columns.iter().map(Arc::clone));
        Self::from_arcs(columns)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<String>> for Schema {
    fn from(columns: Vec<String>) -> Self {
        Self::new(columns)
    }
}

impl From<Vec<&str>> for Schema {
    fn from(columns: Vec<&str>) -> Self {
        Self::new(columns.into_iter().map(String::from).collect())
    }
}

/// A row of values.
///
/// Each row contains values that correspond to the schema columns. Join
/// rows carry both operands' columns, with nulls standing in for the side an
/// outer join could not match.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The schema describing the columns.
    schema: Arc<Schema>,
    /// The values in this row.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given schema and values.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the number of values doesn't match the schema.
    #[must_use]
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(
            schema.len(),
            values.len(),
            "Row values count must match schema column count"
        );
        Self { schema, values }
    }

    /// Creates an all-null row with the given schema.
    #[must_use]
    pub fn empty(schema: Arc<Schema>) -> Self {
        let values = vec![Value::Null; schema.len()];
        Self { schema, values }
    }

    /// Returns the schema of this row.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the shared schema reference.
    #[must_use]
    pub fn schema_arc(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Returns the values in this row.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gets a value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Gets a value by column name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Returns the same values under a different schema of equal arity.
    #[must_use]
    pub fn with_schema(&self, schema: Arc<Schema>) -> Self {
        Self::new(schema, self.values.clone())
    }

    /// Compares the values at `indices` under the total value order.
    ///
    /// Missing values sort first, as nulls do.
    #[must_use]
    pub fn compare_at(&self, other: &Row, indices: &[usize]) -> Ordering {
        for &i in indices {
            let ordering = match (self.values.get(i), other.values.get(i)) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Consumes the row and returns the values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Converts the row to a map of column names to values.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.schema
            .columns_arc()
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }
}
