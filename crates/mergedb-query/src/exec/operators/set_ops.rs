//! Set-operation row sets.
//!
//! A [`MergeRowSet`] merges two operands that deliver identical row shapes
//! in the same total order: ascending on every column, compared
//! positionally. Union, intersect and except are single passes over both
//! operands, with set semantics (`distinct`) or bag semantics.
//!
//! Intersect and except row sets can also be built once and served from
//! memory; see [`RowSetArena::materialize`](crate::exec::RowSetArena::materialize).

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::exec::arena::{RowSetBase, RowSetId, RowSetNode};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{Bookmark, Cursor, Direction, Slot};
use crate::exec::row::Row;
use crate::plan::{SetOpDescriptor, SetOpKind};

/// Resume state of a set-operation cursor.
#[derive(Debug, Clone)]
pub(crate) struct MergeBookmark {
    kind: SetOpKind,
    left: Slot,
    right: Slot,
    use_left: bool,
    use_right: bool,
    dir: Direction,
}

impl MergeBookmark {
    /// Returns the operand cursor the current row was taken from.
    pub(crate) fn current(&self) -> Option<&Cursor> {
        if self.use_left {
            self.left.as_cursor()
        } else if self.use_right {
            self.right.as_cursor()
        } else {
            None
        }
    }
}

/// A set operation over two row sets.
#[derive(Debug, Clone)]
pub struct MergeRowSet {
    base: RowSetBase,
    descriptor: SetOpDescriptor,
    left: RowSetId,
    right: RowSetId,
    /// Column positions in ordering significance.
    positions: Vec<usize>,
    built: Option<Arc<[Row]>>,
}

impl MergeRowSet {
    /// Validates a descriptor against its operands and builds the row set.
    pub(crate) fn new(
        id: RowSetId,
        descriptor: SetOpDescriptor,
        left: &RowSetNode,
        right: &RowSetNode,
    ) -> QueryResult<Self> {
        debug!(rowset = %id, op = %descriptor, "validating set operation");
        let arity = left.schema().len();
        if right.schema().len() != arity {
            return Err(QueryError::invalid_plan(format!(
                "{} operands of {id} have {arity} and {} columns",
                descriptor.kind,
                right.schema().len()
            )));
        }
        let positions = full_ordering(left)?.to_vec();
        if full_ordering(right)? != positions.as_slice() {
            return Err(QueryError::invalid_plan(format!(
                "{} operands of {id} are ordered on different column positions",
                descriptor.kind
            )));
        }

        let base = RowSetBase::new(
            id,
            Arc::clone(left.schema()),
            left.ordering().to_vec(),
            descriptor.predicate.clone(),
        )?;
        Ok(Self { base, descriptor, left: left.id(), right: right.id(), positions, built: None })
    }

    /// Returns a copy of this row set serving `rows` from memory under `id`.
    pub(crate) fn built(&self, id: RowSetId, rows: Vec<Row>) -> QueryResult<Self> {
        let base = RowSetBase::new(
            id,
            Arc::clone(self.base.schema()),
            self.base.ordering().to_vec(),
            None,
        )?;
        Ok(Self { base, built: Some(rows.into()), ..self.clone() })
    }

    /// Returns the common row set attributes.
    #[must_use]
    pub fn base(&self) -> &RowSetBase {
        &self.base
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SetOpDescriptor {
        &self.descriptor
    }

    /// Returns the set operation.
    #[must_use]
    pub const fn kind(&self) -> SetOpKind {
        self.descriptor.kind
    }

    /// Returns the left operand.
    #[must_use]
    pub const fn left(&self) -> RowSetId {
        self.left
    }

    /// Returns the right operand.
    #[must_use]
    pub const fn right(&self) -> RowSetId {
        self.right
    }

    /// Returns true if the rows are served from memory.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Returns the number of rows held in memory, if built.
    #[must_use]
    pub fn built_len(&self) -> Option<usize> {
        self.built.as_ref().map(|rows| rows.len())
    }

    pub(crate) fn begin(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        if let Some(rows) = &self.built {
            let start = match dir {
                Direction::Forward => (!rows.is_empty()).then_some(0),
                Direction::Backward => rows.len().checked_sub(1),
            };
            return self.settle_built(ctx, rows, None, dir, start);
        }

        debug!(rowset = %self.base.id(), op = %self.descriptor, ?dir, "building merge bookmark");
        let left = Slot::begin(ctx, self.left, dir)?;
        let right = Slot::begin(ctx, self.right, dir)?;
        let state = match self.descriptor.kind {
            SetOpKind::Union => self.union_classify(left, right, dir),
            SetOpKind::Intersect => self.intersect_align(ctx, left, right, dir)?,
            SetOpKind::Except => self.except_align(ctx, left, right, dir)?,
        };
        self.settle(ctx, None, dir, state)
    }

    pub(crate) fn advance(
        &self,
        ctx: &ExecutionContext,
        cursor: &Cursor,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        match (cursor.bookmark(), &self.built) {
            (Bookmark::Built(index), Some(rows)) => {
                let next = step_index(*index, rows.len(), dir);
                self.settle_built(ctx, rows, Some(cursor), dir, next)
            }
            (Bookmark::Merge(bm), None) => {
                let state = self.step(ctx, bm, dir)?;
                self.settle(ctx, Some(cursor), dir, state)
            }
            _ => Err(QueryError::internal(format!(
                "cursor does not belong to set operation {}",
                self.base.id()
            ))),
        }
    }

    fn settle(
        &self,
        ctx: &ExecutionContext,
        prev: Option<&Cursor>,
        dir: Direction,
        state: Option<MergeBookmark>,
    ) -> QueryResult<Option<Cursor>> {
        self.base.settle(
            ctx,
            prev,
            state,
            |bm| self.row_of(bm),
            |bm| self.step(ctx, bm, dir),
            |bm| Bookmark::Merge(Box::new(bm)),
        )
    }

    fn settle_built(
        &self,
        ctx: &ExecutionContext,
        rows: &[Row],
        prev: Option<&Cursor>,
        dir: Direction,
        start: Option<usize>,
    ) -> QueryResult<Option<Cursor>> {
        self.base.settle(
            ctx,
            prev,
            start,
            |i| {
                rows.get(*i)
                    .cloned()
                    .ok_or_else(|| QueryError::internal("built row index out of range"))
            },
            |i| Ok(step_index(*i, rows.len(), dir)),
            Bookmark::Built,
        )
    }

    /// One raw step, ignoring the residual predicate.
    fn step(
        &self,
        ctx: &ExecutionContext,
        bm: &MergeBookmark,
        dir: Direction,
    ) -> QueryResult<Option<MergeBookmark>> {
        match bm.kind {
            SetOpKind::Union => self.union_step(ctx, bm, dir),
            SetOpKind::Intersect => self.intersect_step(ctx, bm, dir),
            SetOpKind::Except => self.except_step(ctx, bm, dir),
        }
    }

    fn row_of(&self, bm: &MergeBookmark) -> QueryResult<Row> {
        let current =
            bm.current().ok_or_else(|| QueryError::internal("set operation row uses neither operand"))?;
        Ok(current.row().with_schema(Arc::clone(self.base.schema())))
    }

    fn state(
        &self,
        left: Slot,
        right: Slot,
        use_left: bool,
        use_right: bool,
        dir: Direction,
    ) -> MergeBookmark {
        MergeBookmark { kind: self.descriptor.kind, left, right, use_left, use_right, dir }
    }

    fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        a.compare_at(b, &self.positions)
    }

    /// Compares two operand positions in `dir`: `Less` means the left side is
    /// behind.
    fn compare_slots(&self, left: &Slot, right: &Slot, dir: Direction) -> Ordering {
        dir.orient(left.compare_with(right, |l, r| self.compare_rows(l, r)))
    }

    /// Returns both operand positions ready to step in `dir`. After a change
    /// of direction the side that did not contribute to the current row is
    /// stepped once, since it was looking ahead the other way.
    fn turn(
        &self,
        ctx: &ExecutionContext,
        bm: &MergeBookmark,
        dir: Direction,
    ) -> QueryResult<(Slot, Slot)> {
        let mut left = bm.left.clone();
        let mut right = bm.right.clone();
        if bm.dir != dir {
            if !bm.use_left {
                left = left.step(ctx, self.left, dir)?;
            }
            if !bm.use_right {
                right = right.step(ctx, self.right, dir)?;
            }
        }
        Ok((left, right))
    }

    /// Steps past every row equal to `row`.
    fn skip_run(
        &self,
        ctx: &ExecutionContext,
        slot: &Slot,
        operand: RowSetId,
        row: &Row,
        dir: Direction,
    ) -> QueryResult<Slot> {
        let mut slot = slot.step(ctx, operand, dir)?;
        loop {
            let same = slot
                .as_cursor()
                .is_some_and(|c| self.compare_rows(c.row(), row) == Ordering::Equal);
            if !same {
                return Ok(slot);
            }
            slot = slot.step(ctx, operand, dir)?;
        }
    }

    fn current_row(bm: &MergeBookmark) -> QueryResult<Row> {
        bm.current()
            .map(|c| c.row().clone())
            .ok_or_else(|| QueryError::internal("set operation row uses neither operand"))
    }

    // ========================================================================
    // Union
    // ========================================================================

    fn union_classify(&self, left: Slot, right: Slot, dir: Direction) -> Option<MergeBookmark> {
        if left.is_past(dir) && right.is_past(dir) {
            return None;
        }
        let (use_left, use_right) = match self.compare_slots(&left, &right, dir) {
            Ordering::Less => (true, false),
            Ordering::Greater => (false, true),
            Ordering::Equal if self.descriptor.distinct => (true, true),
            // Ties go to the left going forward and to the right going
            // backward, so a backward pass is the exact reverse.
            Ordering::Equal => match dir {
                Direction::Forward => (true, false),
                Direction::Backward => (false, true),
            },
        };
        Some(self.state(left, right, use_left, use_right, dir))
    }

    fn union_step(
        &self,
        ctx: &ExecutionContext,
        bm: &MergeBookmark,
        dir: Direction,
    ) -> QueryResult<Option<MergeBookmark>> {
        let (mut left, mut right) = self.turn(ctx, bm, dir)?;
        if self.descriptor.distinct {
            let row = Self::current_row(bm)?;
            if bm.use_left {
                left = self.skip_run(ctx, &left, self.left, &row, dir)?;
            }
            if bm.use_right {
                right = self.skip_run(ctx, &right, self.right, &row, dir)?;
            }
        } else if bm.use_left {
            left = left.step(ctx, self.left, dir)?;
        } else {
            right = right.step(ctx, self.right, dir)?;
        }
        Ok(self.union_classify(left, right, dir))
    }

    // ========================================================================
    // Intersect
    // ========================================================================

    fn intersect_align(
        &self,
        ctx: &ExecutionContext,
        mut left: Slot,
        mut right: Slot,
        dir: Direction,
    ) -> QueryResult<Option<MergeBookmark>> {
        loop {
            if left.is_past(dir) || right.is_past(dir) {
                return Ok(None);
            }
            match self.compare_slots(&left, &right, dir) {
                Ordering::Less => left = left.step(ctx, self.left, dir)?,
                Ordering::Greater => right = right.step(ctx, self.right, dir)?,
                Ordering::Equal => return Ok(Some(self.state(left, right, true, true, dir))),
            }
        }
    }

    fn intersect_step(
        &self,
        ctx: &ExecutionContext,
        bm: &MergeBookmark,
        dir: Direction,
    ) -> QueryResult<Option<MergeBookmark>> {
        let (left, right) = self.turn(ctx, bm, dir)?;
        let (left, right) = if self.descriptor.distinct {
            let row = Self::current_row(bm)?;
            (
                self.skip_run(ctx, &left, self.left, &row, dir)?,
                self.skip_run(ctx, &right, self.right, &row, dir)?,
            )
        } else {
            (left.step(ctx, self.left, dir)?, right.step(ctx, self.right, dir)?)
        };
        self.intersect_align(ctx, left, right, dir)
    }

    // ========================================================================
    // Except
    // ========================================================================

    fn except_align(
        &self,
        ctx: &ExecutionContext,
        mut left: Slot,
        mut right: Slot,
        dir: Direction,
    ) -> QueryResult<Option<MergeBookmark>> {
        loop {
            if left.is_past(dir) {
                return Ok(None);
            }
            match self.compare_slots(&left, &right, dir) {
                Ordering::Less => return Ok(Some(self.state(left, right, true, false, dir))),
                Ordering::Equal if self.descriptor.distinct => {
                    let row = left.cursor()?.row().clone();
                    left = self.skip_run(ctx, &left, self.left, &row, dir)?;
                }
                Ordering::Equal => {
                    left = left.step(ctx, self.left, dir)?;
                    right = right.step(ctx, self.right, dir)?;
                }
                Ordering::Greater => right = right.step(ctx, self.right, dir)?,
            }
        }
    }

    fn except_step(
        &self,
        ctx: &ExecutionContext,
        bm: &MergeBookmark,
        dir: Direction,
    ) -> QueryResult<Option<MergeBookmark>> {
        let (left, right) = self.turn(ctx, bm, dir)?;
        let left = if self.descriptor.distinct {
            let row = Self::current_row(bm)?;
            self.skip_run(ctx, &left, self.left, &row, dir)?
        } else {
            left.step(ctx, self.left, dir)?
        };
        self.except_align(ctx, left, right, dir)
    }
}

/// Returns the column positions of a node's ordering, requiring it to cover
/// every column exactly once.
fn full_ordering(node: &RowSetNode) -> QueryResult<&[usize]> {
    let arity = node.schema().len();
    let positions = node.key_indices(node.ordering().len())?;
    let mut seen = vec![false; arity];
    for &p in positions {
        if std::mem::replace(&mut seen[p], true) {
            return Err(QueryError::invalid_plan(format!(
                "operand {} lists a column twice in its ordering",
                node.id()
            )));
        }
    }
    if positions.len() != arity {
        return Err(QueryError::invalid_plan(format!(
            "set operation operand {} must be ordered on all {arity} columns, not ({})",
            node.id(),
            node.ordering().join(", ")
        )));
    }
    Ok(positions)
}

fn step_index(index: usize, len: usize, dir: Direction) -> Option<usize> {
    match dir {
        Direction::Forward => (index + 1 < len).then_some(index + 1),
        Direction::Backward => index.checked_sub(1),
    }
}
