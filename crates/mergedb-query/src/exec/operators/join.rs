//! Join row sets.
//!
//! A [`JoinRowSet`] combines two operand row sets. Merge kinds (inner, left,
//! right, full) walk both operands in key order and pair tie groups; the
//! cross kind is a nested loop; the functional-dependency kind drives one
//! operand and looks each key up on the other.
//!
//! The resume state of a join cursor is a [`JoinBookmark`]: both operand
//! positions, which of them contribute to the current row, and the
//! direction the row was reached in.

use std::cmp::Ordering;
use std::iter;
use std::sync::Arc;

use mergedb_core::Value;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::exec::arena::{RowSetBase, RowSetId, RowSetNode};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{Bookmark, Cursor, Direction, Slot};
use crate::exec::row::{Row, Schema};
use crate::plan::{JoinCondition, JoinDescriptor, JoinKind, JoinSide};

/// Resume state of a join cursor.
#[derive(Debug, Clone)]
pub(crate) struct JoinBookmark {
    kind: JoinKind,
    left: Slot,
    right: Slot,
    use_left: bool,
    use_right: bool,
    dir: Direction,
}

impl JoinBookmark {
    fn slot(&self, side: JoinSide) -> &Slot {
        match side {
            JoinSide::Left => &self.left,
            JoinSide::Right => &self.right,
        }
    }

    fn uses(&self, side: JoinSide) -> bool {
        match side {
            JoinSide::Left => self.use_left,
            JoinSide::Right => self.use_right,
        }
    }
}

/// A join of two row sets.
#[derive(Debug, Clone)]
pub struct JoinRowSet {
    base: RowSetBase,
    kind: JoinKind,
    condition: JoinCondition,
    determined: Option<JoinSide>,
    left: RowSetId,
    right: RowSetId,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    left_width: usize,
    right_width: usize,
}

impl JoinRowSet {
    /// Validates a descriptor against its operands and builds the row set.
    pub(crate) fn new(
        id: RowSetId,
        descriptor: JoinDescriptor,
        left: &RowSetNode,
        right: &RowSetNode,
    ) -> QueryResult<Self> {
        let JoinDescriptor { kind, condition, predicate, determined } = descriptor;
        debug!(rowset = %id, %kind, %condition, "validating join");

        if let Some(column) = left.schema().first_shared(right.schema()) {
            return Err(QueryError::invalid_plan(format!(
                "column {column} appears on both sides of join {id}"
            )));
        }
        match kind {
            JoinKind::Cross if !condition.is_empty() => {
                return Err(QueryError::invalid_plan("cross join takes no join condition"));
            }
            JoinKind::Cross => {}
            _ if condition.is_empty() => {
                return Err(QueryError::invalid_plan(format!("{kind} join requires a join condition")));
            }
            _ => {}
        }

        let left_keys = resolve(left.schema(), &condition.columns(JoinSide::Left))?;
        let right_keys = resolve(right.schema(), &condition.columns(JoinSide::Right))?;

        if kind.is_merge() {
            require_key_prefix(left, &condition, JoinSide::Left)?;
            require_key_prefix(right, &condition, JoinSide::Right)?;
        }
        if kind == JoinKind::FunctionalDependency {
            let side = determined.ok_or_else(|| {
                QueryError::invalid_plan("functional-dependency join needs a determined side")
            })?;
            let node = match side {
                JoinSide::Left => left,
                JoinSide::Right => right,
            };
            if !node.supports_lookup() {
                return Err(QueryError::invalid_plan(format!(
                    "determined {side} operand {} of join {id} does not support point lookup",
                    node.id()
                )));
            }
            require_key_prefix(node, &condition, side)?;
        }

        let driver_ordering = match (kind, determined) {
            (JoinKind::Full, _) => Vec::new(),
            (JoinKind::Right, _) | (JoinKind::FunctionalDependency, Some(JoinSide::Left)) => {
                right.ordering().to_vec()
            }
            _ => left.ordering().to_vec(),
        };
        let schema = Arc::new(left.schema().merge(right.schema()));
        let base = RowSetBase::new(id, schema, driver_ordering, predicate)?;

        Ok(Self {
            base,
            kind,
            condition,
            determined,
            left: left.id(),
            right: right.id(),
            left_keys,
            right_keys,
            left_width: left.schema().len(),
            right_width: right.schema().len(),
        })
    }

    /// Returns the common row set attributes.
    #[must_use]
    pub fn base(&self) -> &RowSetBase {
        &self.base
    }

    /// Returns the join kind.
    #[must_use]
    pub const fn kind(&self) -> JoinKind {
        self.kind
    }

    /// Returns the join condition.
    #[must_use]
    pub fn condition(&self) -> &JoinCondition {
        &self.condition
    }

    /// Returns the side reached by point lookup, for functional-dependency
    /// joins.
    #[must_use]
    pub const fn determined(&self) -> Option<JoinSide> {
        self.determined
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

    const fn operand(&self, side: JoinSide) -> RowSetId {
        match side {
            JoinSide::Left => self.left,
            JoinSide::Right => self.right,
        }
    }

    fn key_count(&self) -> usize {
        self.condition.len()
    }

    pub(crate) fn begin(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        debug!(rowset = %self.base.id(), kind = %self.kind, ?dir, "building join bookmark");
        let state = match self.kind {
            JoinKind::Cross => self.cross_start(ctx, dir)?,
            JoinKind::Inner => self.driven_start(ctx, JoinSide::Left, false, dir)?,
            JoinKind::Left => self.driven_start(ctx, JoinSide::Left, true, dir)?,
            JoinKind::Right => self.driven_start(ctx, JoinSide::Right, true, dir)?,
            JoinKind::Full => self.full_start(ctx, dir)?,
            JoinKind::FunctionalDependency => self.lookup_start(ctx, dir)?,
        };
        self.settle(ctx, None, dir, state)
    }

    pub(crate) fn advance(
        &self,
        ctx: &ExecutionContext,
        cursor: &Cursor,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        let Bookmark::Join(bm) = cursor.bookmark() else {
            return Err(QueryError::internal(format!(
                "cursor does not belong to join row set {}",
                self.base.id()
            )));
        };
        let state = self.step(ctx, bm, dir)?;
        self.settle(ctx, Some(cursor), dir, state)
    }

    fn settle(
        &self,
        ctx: &ExecutionContext,
        prev: Option<&Cursor>,
        dir: Direction,
        state: Option<JoinBookmark>,
    ) -> QueryResult<Option<Cursor>> {
        self.base.settle(
            ctx,
            prev,
            state,
            |bm| self.row_of(bm),
            |bm| self.step(ctx, bm, dir),
            |bm| Bookmark::Join(Box::new(bm)),
        )
    }

    /// One raw step, ignoring the residual predicate.
    fn step(
        &self,
        ctx: &ExecutionContext,
        bm: &JoinBookmark,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        match bm.kind {
            JoinKind::Cross => self.cross_step(ctx, bm, dir),
            JoinKind::Inner => self.driven_step(ctx, bm, JoinSide::Left, false, dir),
            JoinKind::Left => self.driven_step(ctx, bm, JoinSide::Left, true, dir),
            JoinKind::Right => self.driven_step(ctx, bm, JoinSide::Right, true, dir),
            JoinKind::Full => self.full_step(ctx, bm, dir),
            JoinKind::FunctionalDependency => self.lookup_step(ctx, bm, dir),
        }
    }

    fn row_of(&self, bm: &JoinBookmark) -> QueryResult<Row> {
        let mut values = Vec::with_capacity(self.left_width + self.right_width);
        for (side, width) in [(JoinSide::Left, self.left_width), (JoinSide::Right, self.right_width)] {
            if bm.uses(side) {
                values.extend_from_slice(bm.slot(side).cursor()?.row().values());
            } else {
                values.extend(iter::repeat(Value::Null).take(width));
            }
        }
        Ok(Row::new(Arc::clone(self.base.schema()), values))
    }

    fn state(
        &self,
        left: Slot,
        right: Slot,
        use_left: bool,
        use_right: bool,
        dir: Direction,
    ) -> JoinBookmark {
        JoinBookmark { kind: self.kind, left, right, use_left, use_right, dir }
    }

    /// Compares the join keys of a left and a right row.
    fn compare_keys(&self, left: &Row, right: &Row) -> Ordering {
        for (&l, &r) in self.left_keys.iter().zip(&self.right_keys) {
            let ordering = match (left.get(l), right.get(r)) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn keys_of(&self, side: JoinSide) -> &[usize] {
        match side {
            JoinSide::Left => &self.left_keys,
            JoinSide::Right => &self.right_keys,
        }
    }

    /// Returns true if two rows of one operand share their join key.
    fn same_key(&self, side: JoinSide, a: &Cursor, b: &Cursor) -> bool {
        a.row().compare_at(b.row(), self.keys_of(side)) == Ordering::Equal
    }

    /// Steps an operand one row past `current` and reports whether the new
    /// row is still in `current`'s tie group. The stepped slot is returned
    /// either way.
    fn step_in_group(
        &self,
        ctx: &ExecutionContext,
        side: JoinSide,
        current: &Cursor,
        dir: Direction,
    ) -> QueryResult<(Slot, bool)> {
        let stepped = current.advance(ctx, dir)?.map_or_else(|| Slot::past(dir), Slot::At);
        let tied = stepped.as_cursor().is_some_and(|next| self.same_key(side, current, next));
        Ok((stepped, tied))
    }

    /// Compares two operand positions in `dir`: `Less` means the left side is
    /// behind and must advance, `Greater` means the right side is.
    fn compare_slots(&self, left: &Slot, right: &Slot, dir: Direction) -> Ordering {
        dir.orient(left.compare_with(right, |l, r| self.compare_keys(l, r)))
    }

    // ========================================================================
    // Cross
    // ========================================================================

    fn cross_start(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let Some(left) = ctx.node(self.left)?.begin(ctx, dir)? else {
            return Ok(None);
        };
        let Some(right) = ctx.node(self.right)?.begin(ctx, dir)? else {
            return Ok(None);
        };
        Ok(Some(self.state(Slot::At(left), Slot::At(right), true, true, dir)))
    }

    fn cross_step(
        &self,
        ctx: &ExecutionContext,
        bm: &JoinBookmark,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let left = bm.left.cursor()?;
        if let Some(right) = bm.right.cursor()?.advance(ctx, dir)? {
            return Ok(Some(self.state(bm.left.clone(), Slot::At(right), true, true, dir)));
        }
        let Some(left) = left.advance(ctx, dir)? else {
            return Ok(None);
        };
        let Some(right) = ctx.node(self.right)?.begin(ctx, dir)? else {
            return Ok(None);
        };
        Ok(Some(self.state(Slot::At(left), Slot::At(right), true, true, dir)))
    }

    // ========================================================================
    // Inner, Left, Right
    // ========================================================================
    //
    // One side drives: every row of it is visited in order. The other side
    // follows it through matching tie groups. `outer` keeps driving rows
    // that found no match.

    fn driven_state(
        &self,
        driver: JoinSide,
        driving: Cursor,
        other: Slot,
        matched: bool,
        dir: Direction,
    ) -> JoinBookmark {
        match driver {
            JoinSide::Left => self.state(Slot::At(driving), other, true, matched, dir),
            JoinSide::Right => self.state(other, Slot::At(driving), matched, true, dir),
        }
    }

    /// Compares the driving row with the other side in `dir`: `Less` means
    /// the driving side is behind.
    fn compare_driven(&self, driver: JoinSide, driving: &Cursor, other: &Slot, dir: Direction) -> Ordering {
        let ordering = match other {
            Slot::At(cursor) => match driver {
                JoinSide::Left => self.compare_keys(driving.row(), cursor.row()),
                JoinSide::Right => self.compare_keys(cursor.row(), driving.row()).reverse(),
            },
            Slot::Start => Ordering::Greater,
            Slot::End => Ordering::Less,
        };
        dir.orient(ordering)
    }

    fn driven_start(
        &self,
        ctx: &ExecutionContext,
        driver: JoinSide,
        outer: bool,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let Some(driving) = ctx.node(self.operand(driver))?.begin(ctx, dir)? else {
            return Ok(None);
        };
        let other = Slot::begin(ctx, self.operand(driver.other()), dir)?;
        if !outer && other.is_past(dir) {
            return Ok(None);
        }
        self.driven_align(ctx, driver, outer, driving, other, dir)
    }

    /// Advances whichever side is behind until the keys match, or until an
    /// outer join finds the driving row has no match.
    fn driven_align(
        &self,
        ctx: &ExecutionContext,
        driver: JoinSide,
        outer: bool,
        mut driving: Cursor,
        mut other: Slot,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let other_id = self.operand(driver.other());
        loop {
            match self.compare_driven(driver, &driving, &other, dir) {
                Ordering::Equal => {
                    return Ok(Some(self.driven_state(driver, driving, other, true, dir)));
                }
                Ordering::Less if outer => {
                    return Ok(Some(self.driven_state(driver, driving, other, false, dir)));
                }
                Ordering::Less => {
                    if other.is_past(dir) {
                        return Ok(None);
                    }
                    match driving.advance(ctx, dir)? {
                        Some(next) => driving = next,
                        None => return Ok(None),
                    }
                }
                Ordering::Greater => other = other.step(ctx, other_id, dir)?,
            }
        }
    }

    fn driven_step(
        &self,
        ctx: &ExecutionContext,
        bm: &JoinBookmark,
        driver: JoinSide,
        outer: bool,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let other_side = driver.other();
        let driving = bm.slot(driver).cursor()?;

        if !bm.uses(other_side) {
            let Some(next) = driving.advance(ctx, dir)? else {
                return Ok(None);
            };
            return self.driven_align(ctx, driver, outer, next, bm.slot(other_side).clone(), dir);
        }

        let current = bm.slot(other_side).cursor()?;
        let (stepped, tied) = self.step_in_group(ctx, other_side, current, dir)?;
        if tied {
            return Ok(Some(self.driven_state(driver, driving.clone(), stepped, true, dir)));
        }
        let Some(next) = driving.advance(ctx, dir)? else {
            return Ok(None);
        };
        let other = if self.same_key(driver, driving, &next) {
            Slot::At(current.reset_to_ties_start(ctx, self.key_count(), dir)?)
        } else {
            stepped
        };
        self.driven_align(ctx, driver, outer, next, other, dir)
    }

    // ========================================================================
    // Full
    // ========================================================================

    fn full_classify(&self, left: Slot, right: Slot, dir: Direction) -> QueryResult<Option<JoinBookmark>> {
        if left.is_past(dir) && right.is_past(dir) {
            return Ok(None);
        }
        let (use_left, use_right) = match self.compare_slots(&left, &right, dir) {
            Ordering::Less => (true, false),
            Ordering::Greater => (false, true),
            Ordering::Equal => (true, true),
        };
        if (use_left && left.as_cursor().is_none()) || (use_right && right.as_cursor().is_none()) {
            return Err(QueryError::internal("full join positioned on an exhausted operand"));
        }
        Ok(Some(self.state(left, right, use_left, use_right, dir)))
    }

    fn full_start(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let left = Slot::begin(ctx, self.left, dir)?;
        let right = Slot::begin(ctx, self.right, dir)?;
        self.full_classify(left, right, dir)
    }

    fn full_step(
        &self,
        ctx: &ExecutionContext,
        bm: &JoinBookmark,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let mut left = bm.left.clone();
        let mut right = bm.right.clone();

        // The unused side looks ahead in the old direction; turn it around.
        if bm.dir != dir {
            if !bm.use_left {
                left = left.step(ctx, self.left, dir)?;
            }
            if !bm.use_right {
                right = right.step(ctx, self.right, dir)?;
            }
        }

        match (bm.use_left, bm.use_right) {
            (true, true) => {
                let current = right.cursor()?.clone();
                let (stepped, tied) = self.step_in_group(ctx, JoinSide::Right, &current, dir)?;
                if tied {
                    right = stepped;
                } else {
                    let previous = left.cursor()?.clone();
                    left = left.step(ctx, self.left, dir)?;
                    right = match left.as_cursor() {
                        Some(next) if self.same_key(JoinSide::Left, &previous, next) => {
                            Slot::At(current.reset_to_ties_start(ctx, self.key_count(), dir)?)
                        }
                        _ => stepped,
                    };
                }
            }
            (true, false) => left = left.step(ctx, self.left, dir)?,
            (false, true) => right = right.step(ctx, self.right, dir)?,
            (false, false) => {
                return Err(QueryError::internal("full join row uses neither operand"));
            }
        }
        self.full_classify(left, right, dir)
    }

    // ========================================================================
    // Functional dependency
    // ========================================================================

    fn determined_side(&self) -> QueryResult<JoinSide> {
        self.determined.ok_or_else(|| {
            QueryError::internal(format!("join {} has no determined side", self.base.id()))
        })
    }

    fn lookup_start(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let driver = self.determined_side()?.other();
        let driving = ctx.node(self.operand(driver))?.begin(ctx, dir)?;
        self.lookup(ctx, driver, driving, dir)
    }

    fn lookup_step(
        &self,
        ctx: &ExecutionContext,
        bm: &JoinBookmark,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let driver = self.determined_side()?.other();
        let driving = bm.slot(driver).cursor()?.advance(ctx, dir)?;
        self.lookup(ctx, driver, driving, dir)
    }

    /// Looks up each driving row's key on the determined side, skipping
    /// driving rows without a determined row.
    fn lookup(
        &self,
        ctx: &ExecutionContext,
        driver: JoinSide,
        mut driving: Option<Cursor>,
        dir: Direction,
    ) -> QueryResult<Option<JoinBookmark>> {
        let determined = ctx.node(self.operand(driver.other()))?;
        let key_indices = self.keys_of(driver);
        while let Some(cursor) = driving {
            let key: Vec<Value> = key_indices
                .iter()
                .map(|&i| cursor.row().get(i).cloned().unwrap_or(Value::Null))
                .collect();
            ctx.record_lookup();
            if let Some(found) = determined.position_at(ctx, &key)? {
                return Ok(Some(self.driven_state(driver, cursor, Slot::At(found), true, dir)));
            }
            driving = cursor.advance(ctx, dir)?;
        }
        Ok(None)
    }
}

fn resolve(schema: &Schema, columns: &[Arc<str>]) -> QueryResult<Vec<usize>> {
    columns
        .iter()
        .map(|c| schema.index_of(c).ok_or_else(|| QueryError::UnknownColumn(c.to_string())))
        .collect()
}

fn require_key_prefix(node: &RowSetNode, condition: &JoinCondition, side: JoinSide) -> QueryResult<()> {
    let columns = condition.columns(side);
    if node.ordering().starts_with(&columns) {
        Ok(())
    } else {
        Err(QueryError::invalid_plan(format!(
            "{side} operand {} is ordered on ({}), which does not start with the join columns ({})",
            node.id(),
            node.ordering().join(", "),
            columns.join(", ")
        )))
    }
}
