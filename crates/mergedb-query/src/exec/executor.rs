//! Drivers that drain row sets.
//!
//! This module provides the [`Executor`], which walks a row set from one
//! end to the other and collects the rows into a [`ResultSet`].

use std::sync::Arc;

use super::arena::RowSetId;
use super::context::ExecutionContext;
use super::cursor::{Cursor, Direction};
use super::result::ResultSet;
use super::row::Row;
use crate::error::{QueryError, QueryResult};

/// Drains row sets through their cursors.
#[derive(Debug, Clone, Copy)]
pub struct Executor<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> Executor<'a> {
    /// Creates an executor over a context.
    #[must_use]
    pub const fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Returns every row of `id`, first to last.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn collect(&self, id: RowSetId) -> QueryResult<ResultSet> {
        self.collect_in(id, Direction::Forward)
    }

    /// Returns every row of `id`, last to first.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn collect_backward(&self, id: RowSetId) -> QueryResult<ResultSet> {
        self.collect_in(id, Direction::Backward)
    }

    /// Returns the number of rows of `id`.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn count(&self, id: RowSetId) -> QueryResult<usize> {
        let mut count = 0;
        self.walk(id, Direction::Forward, |_| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    fn collect_in(&self, id: RowSetId, dir: Direction) -> QueryResult<ResultSet> {
        let schema = Arc::clone(self.ctx.node(id)?.schema());
        let mut rows = Vec::new();
        self.walk(id, dir, |cursor| {
            rows.push(cursor.row().clone());
            Ok(())
        })?;
        Ok(ResultSet::with_rows(schema, rows))
    }

    /// Collects the rows of `id` forward, failing once more than `limit`
    /// rows were produced. A limit of zero is unbounded.
    pub(crate) fn collect_bounded(&self, id: RowSetId, limit: usize) -> QueryResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.walk(id, Direction::Forward, |cursor| {
            if limit > 0 && rows.len() >= limit {
                return Err(QueryError::QueryTooLarge { actual: rows.len() + 1, limit });
            }
            rows.push(cursor.row().clone());
            Ok(())
        })?;
        Ok(rows)
    }

    fn walk(
        &self,
        id: RowSetId,
        dir: Direction,
        mut visit: impl FnMut(&Cursor) -> QueryResult<()>,
    ) -> QueryResult<()> {
        let node = self.ctx.node(id)?;
        let mut cursor = node.begin(self.ctx, dir)?;
        while let Some(current) = cursor {
            self.ctx.record_rows_produced(1);
            visit(&current)?;
            cursor = current.advance(self.ctx, dir)?;
        }
        Ok(())
    }
}
