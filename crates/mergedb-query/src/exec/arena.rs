//! The row set arena.
//!
//! Every row set of a plan lives in a [`RowSetArena`] and is addressed by a
//! [`RowSetId`]. Join and set-operation nodes refer to their operands by id,
//! and cursors carry the id of the row set they belong to. The arena is
//! built once per evaluation and then shared read-only through the
//! [`ExecutionContext`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use mergedb_core::Value;

use super::context::{ExecutionConfig, ExecutionContext};
use super::cursor::{Bookmark, Cursor, Direction};
use super::executor::Executor;
use super::explain::Strategy;
use super::operators::join::JoinRowSet;
use super::operators::set_ops::MergeRowSet;
use super::row::{Row, Schema};
use super::source::{RowSource, SourceRowSet};
use crate::error::{QueryError, QueryResult};
use crate::plan::{JoinDescriptor, Predicate, SetOpDescriptor, SetOpKind};

/// Identifies a row set within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowSetId(u32);

impl RowSetId {
    /// Creates an id from its index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index of this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RowSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attributes shared by every row set.
#[derive(Debug, Clone)]
pub struct RowSetBase {
    id: RowSetId,
    schema: Arc<Schema>,
    ordering: Vec<Arc<str>>,
    ordering_indices: Vec<usize>,
    predicate: Option<Arc<dyn Predicate>>,
}

impl RowSetBase {
    /// Creates the attributes of a row set, resolving its ordering columns.
    pub(crate) fn new(
        id: RowSetId,
        schema: Arc<Schema>,
        ordering: Vec<Arc<str>>,
        predicate: Option<Arc<dyn Predicate>>,
    ) -> QueryResult<Self> {
        let ordering_indices = ordering
            .iter()
            .map(|c| schema.index_of(c).ok_or_else(|| QueryError::UnknownColumn(c.to_string())))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(Self { id, schema, ordering, ordering_indices, predicate })
    }

    /// Returns the id.
    #[must_use]
    pub const fn id(&self) -> RowSetId {
        self.id
    }

    /// Returns the schema of produced rows.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the declared ordering, most significant column first.
    #[must_use]
    pub fn ordering(&self) -> &[Arc<str>] {
        &self.ordering
    }

    /// Returns the residual predicate.
    #[must_use]
    pub fn predicate(&self) -> Option<&Arc<dyn Predicate>> {
        self.predicate.as_ref()
    }

    /// Returns the schema indices of the first `key_count` ordering columns.
    pub(crate) fn key_indices(&self, key_count: usize) -> QueryResult<&[usize]> {
        self.ordering_indices.get(..key_count).ok_or_else(|| {
            QueryError::internal(format!(
                "row set {} is ordered on {} columns, not {key_count}",
                self.id,
                self.ordering.len()
            ))
        })
    }

    /// Returns true if the row passes the residual predicate.
    pub(crate) fn accepts(&self, row: &Row, ctx: &ExecutionContext) -> QueryResult<bool> {
        match &self.predicate {
            Some(predicate) => predicate.evaluate(row, ctx),
            None => Ok(true),
        }
    }

    /// Turns raw operator states into the next cursor.
    ///
    /// Each state is rendered with `emit` and tested against the residual
    /// predicate; rejected states are replaced by `step` until one passes
    /// or the states run out. `prev` is the cursor the traversal resumed
    /// from, if any.
    pub(crate) fn settle<S>(
        &self,
        ctx: &ExecutionContext,
        prev: Option<&Cursor>,
        mut state: Option<S>,
        mut emit: impl FnMut(&S) -> QueryResult<Row>,
        mut step: impl FnMut(&S) -> QueryResult<Option<S>>,
        wrap: impl FnOnce(S) -> Bookmark,
    ) -> QueryResult<Option<Cursor>> {
        while let Some(current) = state {
            let row = emit(&current)?;
            if self.accepts(&row, ctx)? {
                let bookmark = wrap(current);
                return Ok(Some(match prev {
                    Some(cursor) => cursor.with_next(row, bookmark),
                    None => Cursor::new(self.id, row, bookmark),
                }));
            }
            ctx.record_rows_filtered(1);
            state = step(&current)?;
        }
        Ok(None)
    }
}

/// A row set node.
#[derive(Debug, Clone)]
pub enum RowSetNode {
    /// A scan over a row source.
    Source(SourceRowSet),
    /// A join of two row sets.
    Join(JoinRowSet),
    /// A set operation over two row sets.
    Merge(MergeRowSet),
}

impl RowSetNode {
    /// Returns the common attributes.
    #[must_use]
    pub fn base(&self) -> &RowSetBase {
        match self {
            Self::Source(node) => node.base(),
            Self::Join(node) => node.base(),
            Self::Merge(node) => node.base(),
        }
    }

    /// Returns the id.
    #[must_use]
    pub fn id(&self) -> RowSetId {
        self.base().id()
    }

    /// Returns the schema of produced rows.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        self.base().schema()
    }

    /// Returns the declared ordering.
    #[must_use]
    pub fn ordering(&self) -> &[Arc<str>] {
        self.base().ordering()
    }

    /// Returns the operand ids, left first.
    #[must_use]
    pub fn children(&self) -> Vec<RowSetId> {
        match self {
            Self::Source(_) => Vec::new(),
            Self::Join(node) => vec![node.left(), node.right()],
            Self::Merge(node) => vec![node.left(), node.right()],
        }
    }

    /// Positions on the first row.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn first(&self, ctx: &ExecutionContext) -> QueryResult<Option<Cursor>> {
        self.begin(ctx, Direction::Forward)
    }

    /// Positions on the last row.
    ///
    /// # Errors
    ///
    /// Propagates operand, predicate, and internal-consistency errors.
    pub fn last(&self, ctx: &ExecutionContext) -> QueryResult<Option<Cursor>> {
        self.begin(ctx, Direction::Backward)
    }

    pub(crate) fn begin(
        &self,
        ctx: &ExecutionContext,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        match self {
            Self::Source(node) => node.begin(ctx, dir),
            Self::Join(node) => node.begin(ctx, dir),
            Self::Merge(node) => node.begin(ctx, dir),
        }
    }

    pub(crate) fn advance(
        &self,
        ctx: &ExecutionContext,
        cursor: &Cursor,
        dir: Direction,
    ) -> QueryResult<Option<Cursor>> {
        match self {
            Self::Source(node) => node.advance(ctx, cursor, dir),
            Self::Join(node) => node.advance(ctx, cursor, dir),
            Self::Merge(node) => node.advance(ctx, cursor, dir),
        }
    }

    /// Positions on the first row whose leading ordering columns equal `key`.
    ///
    /// # Errors
    ///
    /// Returns an internal error unless this is a source with a key index.
    pub fn position_at(
        &self,
        ctx: &ExecutionContext,
        key: &[Value],
    ) -> QueryResult<Option<Cursor>> {
        match self {
            Self::Source(node) => node.position_at(ctx, key),
            Self::Join(_) | Self::Merge(_) => Err(QueryError::internal(format!(
                "row set {} does not support point lookup",
                self.id()
            ))),
        }
    }

    /// Returns true if [`position_at`](Self::position_at) is supported.
    #[must_use]
    pub fn supports_lookup(&self) -> bool {
        matches!(self, Self::Source(node) if node.supports_lookup())
    }

    /// Returns the source when it answers tie-group queries natively.
    pub(crate) fn indexed_source(&self) -> Option<&SourceRowSet> {
        match self {
            Self::Source(node) if node.has_native_ties() => Some(node),
            _ => None,
        }
    }

    pub(crate) fn key_indices(&self, key_count: usize) -> QueryResult<&[usize]> {
        self.base().key_indices(key_count)
    }
}

/// The row sets of one plan.
#[derive(Debug, Clone, Default)]
pub struct RowSetArena {
    nodes: Vec<RowSetNode>,
}

impl RowSetArena {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Returns the number of row sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no row sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolves an id.
    ///
    /// # Errors
    ///
    /// Returns an internal error for ids from another arena.
    pub fn node(&self, id: RowSetId) -> QueryResult<&RowSetNode> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| QueryError::internal(format!("dangling row set id {id}")))
    }

    fn next_id(&self) -> QueryResult<RowSetId> {
        u32::try_from(self.nodes.len())
            .map(RowSetId::new)
            .map_err(|_| QueryError::internal("row set arena is full"))
    }

    /// Adds a scan over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownColumn`] if the source's ordering names a
    /// column outside its schema.
    pub fn add_source(&mut self, source: Arc<dyn RowSource>) -> QueryResult<RowSetId> {
        self.add_scan(source, None)
    }

    /// Adds a scan over `source` that only produces rows passing `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownColumn`] if the source's ordering names a
    /// column outside its schema.
    pub fn add_filtered_source(
        &mut self,
        source: Arc<dyn RowSource>,
        predicate: Arc<dyn Predicate>,
    ) -> QueryResult<RowSetId> {
        self.add_scan(source, Some(predicate))
    }

    fn add_scan(
        &mut self,
        source: Arc<dyn RowSource>,
        predicate: Option<Arc<dyn Predicate>>,
    ) -> QueryResult<RowSetId> {
        let id = self.next_id()?;
        let base = RowSetBase::new(id, source.schema(), source.ordering().to_vec(), predicate)?;
        self.nodes.push(RowSetNode::Source(SourceRowSet::new(base, source)));
        Ok(id)
    }

    /// Adds a join of `left` and `right`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPlan`] or [`QueryError::UnknownColumn`]
    /// when the descriptor does not fit its operands.
    pub fn add_join(
        &mut self,
        descriptor: JoinDescriptor,
        left: RowSetId,
        right: RowSetId,
    ) -> QueryResult<RowSetId> {
        let id = self.next_id()?;
        let node = JoinRowSet::new(id, descriptor, self.node(left)?, self.node(right)?)?;
        self.nodes.push(RowSetNode::Join(node));
        Ok(id)
    }

    /// Adds a set operation over `left` and `right`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPlan`] when the operands differ in arity
    /// or are not ordered on every column.
    pub fn add_merge(
        &mut self,
        descriptor: SetOpDescriptor,
        left: RowSetId,
        right: RowSetId,
    ) -> QueryResult<RowSetId> {
        let id = self.next_id()?;
        let node = MergeRowSet::new(id, descriptor, self.node(left)?, self.node(right)?)?;
        self.nodes.push(RowSetNode::Merge(node));
        Ok(id)
    }

    /// Returns true if a predicate in the subtree rooted at `id` reads query
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns an internal error for dangling ids.
    pub fn needs_bindings(&self, id: RowSetId) -> QueryResult<bool> {
        let node = self.node(id)?;
        if node.base().predicate().is_some_and(|p| p.needs_bindings()) {
            return Ok(true);
        }
        for child in node.children() {
            if self.needs_bindings(child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Precomputes an intersect or except row set.
    ///
    /// When `id` is an intersect or except without a residual predicate and
    /// no operand predicate reads query parameters, its rows are built once
    /// and a new row set serving them from memory is added. The returned id
    /// names that row set, or `id` itself when the row set is not eligible.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::QueryTooLarge`] if the result holds more than
    /// `config.max_rows_in_memory` rows, and propagates evaluation errors.
    pub fn materialize(&mut self, id: RowSetId, config: &ExecutionConfig) -> QueryResult<RowSetId> {
        let RowSetNode::Merge(merge) = self.node(id)? else {
            return Ok(id);
        };
        let eligible = matches!(merge.kind(), SetOpKind::Intersect | SetOpKind::Except)
            && !merge.is_built()
            && merge.base().predicate().is_none()
            && !self.needs_bindings(merge.left())?
            && !self.needs_bindings(merge.right())?;
        if !eligible {
            debug!(rowset = %id, "row set is not eligible for materialization");
            return Ok(id);
        }

        let ctx = ExecutionContext::new(Arc::new(self.clone())).with_config(config.clone());
        let limit = config.max_rows_in_memory;
        let rows = Executor::new(&ctx).collect_bounded(id, limit).map_err(|err| {
            if let QueryError::QueryTooLarge { actual, limit } = &err {
                warn!(rowset = %id, actual, limit, "materialization refused");
            }
            err
        })?;

        let built_id = self.next_id()?;
        let RowSetNode::Merge(merge) = self.node(id)? else {
            return Err(QueryError::internal(format!("row set {id} changed kind")));
        };
        let built = merge.built(built_id, rows)?;
        debug!(rowset = %id, built = %built_id, rows = built.built_len(), "materialized set operation");
        self.nodes.push(RowSetNode::Merge(built));
        Ok(built_id)
    }

    /// Returns a printable description of the algorithms under `id`.
    #[must_use]
    pub fn strategy(&self, id: RowSetId) -> Strategy<'_> {
        Strategy::new(self, id)
    }
}
