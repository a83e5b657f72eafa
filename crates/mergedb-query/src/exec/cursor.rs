//! Cursors over row sets.
//!
//! A [`Cursor`] is an immutable position inside a row set: the current row,
//! a serial position, and a bookmark holding whatever the row set needs to
//! resume. Stepping never mutates a cursor; [`Cursor::next`] and
//! [`Cursor::previous`] return a new one, or `None` once the row set is
//! exhausted in that direction.
//!
//! Cursors also answer the tie-group questions merge algorithms ask about
//! their operands. A tie group is a maximal run of adjacent rows whose first
//! `key_count` ordering columns are equal:
//!
//! - [`Cursor::has_more`]: does the next row in a direction share this key?
//! - [`Cursor::changed`]: did this row's key differ from the row it was
//!   reached from?
//! - [`Cursor::reset_to_ties_start`]: rewind to the row where a traversal
//!   in that direction entered the current tie group.
//!
//! Sources with a key index answer these directly. Composite row sets fall
//! back to stepping and comparing.

use std::cmp::Ordering;

use mergedb_core::Value;
use tracing::trace;

use super::arena::RowSetId;
use super::context::ExecutionContext;
use super::operators::join::JoinBookmark;
use super::operators::set_ops::MergeBookmark;
use super::row::Row;
use super::source::SourcePos;
use crate::error::{QueryError, QueryResult};

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// First row to last row.
    Forward,
    /// Last row to first row.
    Backward,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Orients an ascending comparison so that `Less` means "earlier in
    /// this direction".
    #[must_use]
    pub fn orient(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Forward => ordering,
            Self::Backward => ordering.reverse(),
        }
    }
}

/// Identifies the stored record a cursor's row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRef {
    /// The source row set holding the record.
    pub rowset: RowSetId,
    /// The record's position within its source.
    pub position: SourcePos,
}

/// Per-kind resume state stored in a cursor.
#[derive(Debug, Clone)]
pub(crate) enum Bookmark {
    /// A position inside a row source.
    Source(SourcePos),
    /// The operand state of a join.
    Join(Box<JoinBookmark>),
    /// The operand state of a set operation.
    Merge(Box<MergeBookmark>),
    /// An index into a materialized row list.
    Built(usize),
}

/// An immutable position within a row set.
#[derive(Debug, Clone)]
pub struct Cursor {
    rowset: RowSetId,
    position: u64,
    row: Row,
    bookmark: Bookmark,
}

impl Cursor {
    /// Creates a cursor on the first row a traversal produced.
    pub(crate) fn new(rowset: RowSetId, row: Row, bookmark: Bookmark) -> Self {
        Self { rowset, position: 0, row, bookmark }
    }

    /// Creates the successor of this cursor within the same row set.
    pub(crate) fn with_next(&self, row: Row, bookmark: Bookmark) -> Self {
        Self { rowset: self.rowset, position: self.position + 1, row, bookmark }
    }

    /// Returns the row set this cursor belongs to.
    #[must_use]
    pub const fn rowset(&self) -> RowSetId {
        self.rowset
    }

    /// Returns the number of steps taken since the traversal started.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Returns the current row.
    #[must_use]
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Returns the value of a column of the current row.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.row.get_by_name(column)
    }

    pub(crate) fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    /// Returns the stored record behind the current row.
    ///
    /// Source cursors name their own record. Set operations delegate to the
    /// operand the row was taken from. Join rows and rows of a materialized
    /// row set have no single underlying record.
    #[must_use]
    pub fn rec(&self) -> Option<RecordRef> {
        match &self.bookmark {
            Bookmark::Source(position) => {
                Some(RecordRef { rowset: self.rowset, position: *position })
            }
            Bookmark::Merge(bm) => bm.current().and_then(Cursor::rec),
            Bookmark::Join(_) | Bookmark::Built(_) => None,
        }
    }

    /// Steps to the next row.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn next(&self, ctx: &ExecutionContext) -> QueryResult<Option<Cursor>> {
        self.advance(ctx, Direction::Forward)
    }

    /// Steps to the previous row.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn previous(&self, ctx: &ExecutionContext) -> QueryResult<Option<Cursor>> {
        self.advance(ctx, Direction::Backward)
    }

    /// Steps one row in `dir`.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn advance(&self, ctx: &ExecutionContext, dir: Direction) -> QueryResult<Option<Cursor>> {
        ctx.node(self.rowset)?.advance(ctx, self, dir)
    }

    /// Returns true if the next row in `dir` belongs to the same tie group.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `key_count` exceeds the row set's
    /// ordering.
    pub fn has_more(
        &self,
        ctx: &ExecutionContext,
        key_count: usize,
        dir: Direction,
    ) -> QueryResult<bool> {
        let node = ctx.node(self.rowset)?;
        if let (Some(source), Bookmark::Source(pos)) = (node.indexed_source(), &self.bookmark) {
            return source.has_more(*pos, key_count, dir);
        }
        let keys = node.key_indices(key_count)?;
        Ok(match self.advance(ctx, dir)? {
            Some(next) => self.row.compare_at(next.row(), keys) == Ordering::Equal,
            None => false,
        })
    }

    /// Returns true if this row's key differs from the row before it in `dir`,
    /// or if it is the first row in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `key_count` exceeds the row set's
    /// ordering.
    pub fn changed(
        &self,
        ctx: &ExecutionContext,
        key_count: usize,
        dir: Direction,
    ) -> QueryResult<bool> {
        let node = ctx.node(self.rowset)?;
        if let (Some(source), Bookmark::Source(pos)) = (node.indexed_source(), &self.bookmark) {
            return source.changed(*pos, key_count, dir);
        }
        let keys = node.key_indices(key_count)?;
        Ok(match self.advance(ctx, dir.reverse())? {
            Some(prev) => self.row.compare_at(prev.row(), keys) != Ordering::Equal,
            None => true,
        })
    }

    /// Rewinds to the first row, in `dir`, of the current tie group.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `key_count` exceeds the row set's
    /// ordering.
    pub fn reset_to_ties_start(
        &self,
        ctx: &ExecutionContext,
        key_count: usize,
        dir: Direction,
    ) -> QueryResult<Cursor> {
        let node = ctx.node(self.rowset)?;
        trace!(rowset = %self.rowset, key_count, ?dir, "rewinding to tie group start");
        ctx.record_tie_rewind();
        if let (Some(source), Bookmark::Source(pos)) = (node.indexed_source(), &self.bookmark) {
            return source.rewind(ctx, self, *pos, key_count, dir);
        }
        let keys = node.key_indices(key_count)?;
        let mut current = self.clone();
        while let Some(prev) = current.advance(ctx, dir.reverse())? {
            if prev.row().compare_at(&self.row, keys) != Ordering::Equal {
                break;
            }
            current = prev;
        }
        Ok(current)
    }
}

/// An operand position that may lie outside the operand's rows.
///
/// Merge algorithms compare operand positions even after one side has run
/// out. `Start` and `End` act as sentinels before the first and after the
/// last row, so a traversal can change direction at any point and step an
/// exhausted side back onto its rows.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Start,
    At(Cursor),
    End,
}

impl Slot {
    /// Positions on the first row of `rowset` in `dir`.
    pub(crate) fn begin(ctx: &ExecutionContext, rowset: RowSetId, dir: Direction) -> QueryResult<Self> {
        let node = ctx.node(rowset)?;
        let cursor = match dir {
            Direction::Forward => node.first(ctx)?,
            Direction::Backward => node.last(ctx)?,
        };
        Ok(cursor.map_or_else(|| Self::past(dir), Self::At))
    }

    /// The sentinel beyond the last row in `dir`.
    pub(crate) const fn past(dir: Direction) -> Self {
        match dir {
            Direction::Forward => Self::End,
            Direction::Backward => Self::Start,
        }
    }

    /// Steps one row in `dir`. Sentinels behind the traversal step onto the
    /// first row; sentinels ahead of it stay put.
    pub(crate) fn step(
        &self,
        ctx: &ExecutionContext,
        rowset: RowSetId,
        dir: Direction,
    ) -> QueryResult<Self> {
        match (self, dir) {
            (Self::At(cursor), _) => {
                Ok(cursor.advance(ctx, dir)?.map_or_else(|| Self::past(dir), Self::At))
            }
            (Self::Start, Direction::Forward) | (Self::End, Direction::Backward) => {
                Self::begin(ctx, rowset, dir)
            }
            (Self::Start, Direction::Backward) => Ok(Self::Start),
            (Self::End, Direction::Forward) => Ok(Self::End),
        }
    }

    pub(crate) const fn as_cursor(&self) -> Option<&Cursor> {
        match self {
            Self::At(cursor) => Some(cursor),
            Self::Start | Self::End => None,
        }
    }

    /// Returns the cursor, failing if the slot is a sentinel.
    pub(crate) fn cursor(&self) -> QueryResult<&Cursor> {
        self.as_cursor().ok_or_else(|| QueryError::internal("operand cursor is exhausted"))
    }

    /// Returns true if the slot lies beyond the last row in `dir`.
    pub(crate) const fn is_past(&self, dir: Direction) -> bool {
        matches!((self, dir), (Self::End, Direction::Forward) | (Self::Start, Direction::Backward))
    }

    /// Compares two slots in ascending order, using `compare` for two rows.
    /// `Start` sorts before every row and `End` after.
    pub(crate) fn compare_with(&self, other: &Self, compare: impl Fn(&Row, &Row) -> Ordering) -> Ordering {
        match (self, other) {
            (Self::At(a), Self::At(b)) => compare(a.row(), b.row()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Start => 0,
            Self::At(_) => 1,
            Self::End => 2,
        }
    }
}
