//! Row sources and the leaf row set that scans them.
//!
//! A [`RowSource`] is the storage-facing seam of the execution layer: an
//! ordered, bidirectional sequence of rows addressed by opaque
//! [`SourcePos`] values. Sources backed by a key index may also support
//! point lookup and answer tie-group questions directly via [`TieGroups`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use mergedb_core::Value;

use super::arena::{RowSetBase, RowSetId};
use super::context::ExecutionContext;
use super::cursor::{Bookmark, Cursor, Direction};
use super::row::{Row, Schema};
use crate::error::{QueryError, QueryResult};

/// An opaque position inside a row source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePos(u64);

impl SourcePos {
    /// Creates a position from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// An ordered, bidirectional sequence of rows.
///
/// Rows must be delivered in ascending order of [`ordering`](Self::ordering)
/// under the total value order.
pub trait RowSource: fmt::Debug + Send + Sync {
    /// Returns the source's name, used in plan explanations.
    fn name(&self) -> &str;

    /// Returns the schema of the rows this source produces.
    fn schema(&self) -> Arc<Schema>;

    /// Returns the columns the rows are sorted on, most significant first.
    fn ordering(&self) -> &[Arc<str>];

    /// Returns the position of the first row.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn first(&self) -> QueryResult<Option<SourcePos>>;

    /// Returns the position of the last row.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn last(&self) -> QueryResult<Option<SourcePos>>;

    /// Returns the position after `pos`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn next(&self, pos: SourcePos) -> QueryResult<Option<SourcePos>>;

    /// Returns the position before `pos`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn previous(&self, pos: SourcePos) -> QueryResult<Option<SourcePos>>;

    /// Reads the row at `pos`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `pos` does not belong to this source.
    fn row(&self, pos: SourcePos) -> QueryResult<Row>;

    /// Returns true if [`position_at`](Self::position_at) is supported.
    fn supports_lookup(&self) -> bool {
        false
    }

    /// Returns the position of the first row whose leading ordering columns
    /// equal `key`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the source has no key index.
    fn position_at(&self, key: &[Value]) -> QueryResult<Option<SourcePos>> {
        let _ = key;
        Err(QueryError::internal(format!("source {} does not support point lookup", self.name())))
    }

    /// Returns the source's native tie-group support, if any.
    fn tie_groups(&self) -> Option<&dyn TieGroups> {
        None
    }
}

/// Tie-group queries answered from a key index.
///
/// A tie group is a run of adjacent rows whose first `key_count` ordering
/// columns are equal.
pub trait TieGroups {
    /// Returns true if the row after `pos` in `dir` is in the same group.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `key_count` exceeds the ordering.
    fn has_more(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<bool>;

    /// Returns true if the row before `pos` in `dir` is in a different group,
    /// or if there is no such row.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `key_count` exceeds the ordering.
    fn changed(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<bool>;

    /// Returns the first position, in `dir`, of the group containing `pos`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `key_count` exceeds the ordering.
    fn ties_start(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<SourcePos>;
}

/// The leaf row set: a scan over a [`RowSource`], optionally filtered.
#[derive(Debug, Clone)]
pub struct SourceRowSet {
    base: RowSetBase,
    source: Arc<dyn RowSource>,
}

impl SourceRowSet {
    pub(crate) fn new(base: RowSetBase, source: Arc<dyn RowSource>) -> Self {
        Self { base, source }
    }

    /// Returns the common row set attributes.
    #[must_use]
    pub fn base(&self) -> &RowSetBase {
        &self.base
    }

    /// Returns the scanned source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn RowSource> {
        &self.source
    }

    fn id(&self) -> RowSetId {
        self.base.id()
    }

    pub(crate) fn supports_lookup(&self) -> bool {
        self.source.supports_lookup()
    }

    /// Native tie groups apply only when every source row is visible.
    pub(crate) fn has_native_ties(&self) -> bool {
        self.base.predicate().is_none() && self.source.tie_groups().is_some()
    }

    pub(crate) fn begin(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        let start = match dir {
            Direction::Forward => self.source.first()?,
            Direction::Backward => self.source.last()?,
        };
        self.settle(ctx, None, dir, start)
    }

    pub(crate) fn advance(
        &self,
        ctx: &ExecutionContext,
        cursor: &Cursor,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        let Bookmark::Source(pos) = cursor.bookmark() else {
            return Err(QueryError::internal(format!(
                "cursor does not belong to source row set {}",
                self.id()
            )));
        };
        let next = self.step(*pos, dir)?;
        self.settle(ctx, Some(cursor), dir, next)
    }

    fn step(&self, pos: SourcePos, dir: Direction) -> QueryResult<Option<SourcePos>> {
        match dir {
            Direction::Forward => self.source.next(pos),
            Direction::Backward => self.source.previous(pos),
        }
    }

    fn settle(
        &self,
        ctx: &ExecutionContext,
        prev: Option<&Cursor>,
        dir: Direction,
        start: Option<SourcePos>,
    ) -> QueryResult<Option<Cursor>> {
        self.base.settle(
            ctx,
            prev,
            start,
            |pos| {
                ctx.record_rows_read(1);
                self.source.row(*pos)
            },
            |pos| self.step(*pos, dir),
            Bookmark::Source,
        )
    }

    pub(crate) fn position_at(
        &self,
        ctx: &ExecutionContext,
        key: &[Value],
    ) -> QueryResult<Option<Cursor>> {
        if !self.source.supports_lookup() {
            return Err(QueryError::internal(format!(
                "row set {} ({}) does not support point lookup",
                self.id(),
                self.source.name()
            )));
        }
        let keys = self.base.key_indices(key.len())?;
        let mut found = self.source.position_at(key)?;
        while let Some(pos) = found {
            ctx.record_rows_read(1);
            let row = self.source.row(pos)?;
            let same_key = keys
                .iter()
                .zip(key)
                .all(|(&i, k)| row.get(i).is_some_and(|v| v.total_cmp(k) == Ordering::Equal));
            if !same_key {
                return Ok(None);
            }
            if self.base.accepts(&row, ctx)? {
                return Ok(Some(Cursor::new(self.id(), row, Bookmark::Source(pos))));
            }
            ctx.record_rows_filtered(1);
            found = self.source.next(pos)?;
        }
        Ok(None)
    }

    fn ties(&self) -> QueryResult<&dyn TieGroups> {
        self.source.tie_groups().ok_or_else(|| {
            QueryError::internal(format!("source {} has no key index", self.source.name()))
        })
    }

    pub(crate) fn has_more(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<bool> {
        self.ties()?.has_more(pos, key_count, dir)
    }

    pub(crate) fn changed(&self, pos: SourcePos, key_count: usize, dir: Direction) -> QueryResult<bool> {
        self.ties()?.changed(pos, key_count, dir)
    }

    pub(crate) fn rewind(
        &self,
        ctx: &ExecutionContext,
        cursor: &Cursor,
        pos: SourcePos,
        key_count: usize,
        dir: Direction,
    ) -> QueryResult<Cursor> {
        let start = self.ties()?.ties_start(pos, key_count, dir)?;
        if start == pos {
            return Ok(cursor.clone());
        }
        ctx.record_rows_read(1);
        Ok(cursor.with_next(self.source.row(start)?, Bookmark::Source(start)))
    }
}
