//! In-memory row source.
//!
//! [`MemoryRowSource`] keeps its rows sorted on the declared ordering, which
//! makes it behave like an index: point lookups and tie-group boundaries are
//! binary searches.

use std::cmp::Ordering;
use std::sync::Arc;

use mergedb_core::Value;

use crate::error::{QueryError, QueryResult};
use crate::exec::cursor::Direction;
use crate::exec::row::{Row, Schema};
use crate::exec::source::{RowSource, SourcePos, TieGroups};

/// A sorted, in-memory row source.
#[derive(Debug, Clone)]
pub struct MemoryRowSource {
    name: String,
    schema: Arc<Schema>,
    ordering: Vec<Arc<str>>,
    key_indices: Vec<usize>,
    rows: Vec<Row>,
}

impl MemoryRowSource {
    /// Creates a source over rows already sorted on `ordering`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownColumn`] if an ordering column is not in
    /// the schema, and [`QueryError::InvalidPlan`] if a row has the wrong
    /// number of values or the rows are out of order.
    pub fn new(
        name: impl Into<String>,
        schema: Arc<Schema>,
        ordering: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Self> {
        let source = Self::build(name.into(), schema, ordering, rows)?;
        if let Some(i) = source
            .rows
            .windows(2)
            .position(|w| w[0].compare_at(&w[1], &source.key_indices) == Ordering::Greater)
        {
            return Err(QueryError::invalid_plan(format!(
                "rows of {} are not ordered on ({}) at row {}",
                source.name,
                ordering.join(", "),
                i + 1
            )));
        }
        Ok(source)
    }

    /// Creates a source, sorting the rows on `ordering` first.
    ///
    /// The sort is stable, so rows with equal keys keep their input order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownColumn`] if an ordering column is not in
    /// the schema, and [`QueryError::InvalidPlan`] if a row has the wrong
    /// number of values.
    pub fn sorted(
        name: impl Into<String>,
        schema: Arc<Schema>,
        ordering: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Self> {
        let mut source = Self::build(name.into(), schema, ordering, rows)?;
        let keys = source.key_indices.clone();
        source.rows.sort_by(|a, b| a.compare_at(b, &keys));
        Ok(source)
    }

    /// Creates a sorted source from column names and row values.
    ///
    /// # Errors
    ///
    /// See [`sorted`](Self::sorted).
    pub fn from_values(
        name: impl Into<String>,
        columns: &[&str],
        ordering: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Self> {
        Self::sorted(name, Arc::new(Schema::from(columns.to_vec())), ordering, rows)
    }

    fn build(
        name: String,
        schema: Arc<Schema>,
        ordering: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Self> {
        let key_indices = ordering
            .iter()
            .map(|c| schema.index_of(c).ok_or_else(|| QueryError::UnknownColumn((*c).to_string())))
            .collect::<QueryResult<Vec<_>>>()?;
        let rows = rows
            .into_iter()
            .map(|values| {
                if values.len() == schema.len() {
                    Ok(Row::new(Arc::clone(&schema), values))
                } else {
                    Err(QueryError::invalid_plan(format!(
                        "row of {name} has {} values, schema has {} columns",
                        values.len(),
                        schema.len()
                    )))
                }
            })
            .collect::<QueryResult<Vec<_>>>()?;
        let ordering = ordering.iter().map(|c| Arc::from(*c)).collect();
        Ok(Self { name, schema, ordering, key_indices, rows })
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the source has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the rows in order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn index(&self, pos: SourcePos) -> QueryResult<usize> {
        usize::try_from(pos.get())
            .ok()
            .filter(|&i| i < self.rows.len())
            .ok_or_else(|| QueryError::internal(format!("position {pos} is outside {}", self.name)))
    }

    fn keys(&self, key_count: usize) -> QueryResult<&[usize]> {
        self.key_indices.get(..key_count).ok_or_else(|| {
            QueryError::internal(format!(
                "{} is ordered on {} columns, not {key_count}",
                self.name,
                self.key_indices.len()
            ))
        })
    }

    fn same_group(&self, a: usize, b: usize, keys: &[usize]) -> bool {
        self.rows[a].compare_at(&self.rows[b], keys) == Ordering::Equal
    }

    fn compare_key(&self, row: &Row, key: &[Value]) -> Ordering {
        for (&i, k) in self.key_indices.iter().zip(key) {
            let ordering = row.get(i).map_or(Ordering::Less, |v| v.total_cmp(k));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn to_pos(index: usize) -> SourcePos {
    SourcePos::new(index as u64)
}

impl RowSource for MemoryRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn ordering(&self) -> &[Arc<str>] {
        &self.ordering
    }

    fn first(&self) -> QueryResult<Option<SourcePos>> {
        Ok((!self.rows.is_empty()).then(|| to_pos(0)))
    }

    fn last(&self) -> QueryResult<Option<SourcePos>> {
        Ok(self.rows.len().checked_sub(1).map(to_pos))
    }

    fn next(&self, pos: SourcePos) -> QueryResult<Option<SourcePos>> {
        let i = self.index(pos)?;
        Ok((i + 1 < self.rows.len()).then(|| to_pos(i + 1)))
    }

    fn previous(&self, pos: SourcePos) -> QueryResult<Option<SourcePos>> {
        let i = self.index(pos)?;
        Ok(i.checked_sub(1).map(to_pos))
    }

    fn row(&self, pos: SourcePos) -> QueryResult<Row> {
        Ok(self.rows[self.index(pos)?].clone())
    }

    fn supports_lookup(&self) -> bool {
        true
    }

    fn position_at(&self, key: &[Value]) -> QueryResult<Option<SourcePos>> {
        if key.len() > self.key_indices.len() {
            return Err(QueryError::internal(format!(
                "lookup key has {} columns, {} is ordered on {}",
                key.len(),
                self.name,
                self.key_indices.len()
            )));
        }
        let lower = self.rows.partition_point(|r| self.compare_key(r, key) == Ordering::Less);
        Ok(self
            .rows
            .get(lower)
            .filter(|r| self.compare_key(r, key) == Ordering::Equal)
            .map(|_| to_pos(lower)))
    }

    fn tie_groups(&self) -> Option<&dyn TieGroups> {
        Some(self)
    }
}

impl TieGroups for MemoryRowSource {
    fn has_more(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<bool> {
        let keys = self.keys(key_count)?;
        let i = self.index(pos)?;
        Ok(match dir {
            Direction::Forward => i + 1 < self.rows.len() && self.same_group(i, i + 1, keys),
            Direction::Backward => i > 0 && self.same_group(i - 1, i, keys),
        })
    }

    fn changed(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<bool> {
        let keys = self.keys(key_count)?;
        let i = self.index(pos)?;
        Ok(match dir {
            Direction::Forward => i == 0 || !self.same_group(i - 1, i, keys),
            Direction::Backward => i + 1 >= self.rows.len() || !self.same_group(i, i + 1, keys),
        })
    }

    fn ties_start(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<SourcePos> {
        let keys = self.keys(key_count)?;
        let i = self.index(pos)?;
        let current = &self.rows[i];
        let start = match dir {
            Direction::Forward => self.rows[..i]
                .partition_point(|r| r.compare_at(current, keys) == Ordering::Less),
            Direction::Backward => {
                i + self.rows[i..].partition_point(|r| r.compare_at(current, keys) != Ordering::Greater)
                    - 1
            }
        };
        Ok(to_pos(start))
    }
}
