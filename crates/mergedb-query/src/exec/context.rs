//! Execution context for query execution.
//!
//! The execution context owns the row set arena a plan was built in, the
//! parameter bindings residual predicates read, the runtime configuration,
//! and the statistics counters. Every cursor operation receives it
//! explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mergedb_core::Value;

use super::arena::{RowSetArena, RowSetId, RowSetNode};
use super::cursor::Cursor;
use crate::error::QueryResult;

/// Default bound on rows held in memory by materialization.
pub const DEFAULT_MAX_ROWS_IN_MEMORY: usize = 1_000_000;

/// Execution context for a query.
///
/// The context provides access to:
/// - The arena of row set nodes that cursors refer to by id
/// - Query parameters (bound values for placeholders)
/// - Execution statistics
/// - Runtime configuration
pub struct ExecutionContext {
    /// The row sets of the plan being evaluated.
    arena: Arc<RowSetArena>,
    /// Query parameters (1-indexed).
    parameters: HashMap<u32, Value>,
    /// Execution statistics.
    stats: ExecutionStats,
    /// Configuration options.
    config: ExecutionConfig,
}

impl ExecutionContext {
    /// Creates a new execution context over a built arena.
    #[must_use]
    pub fn new(arena: Arc<RowSetArena>) -> Self {
        Self::with_parameters(arena, HashMap::new())
    }

    /// Creates a context with parameters.
    #[must_use]
    pub fn with_parameters(arena: Arc<RowSetArena>, parameters: HashMap<u32, Value>) -> Self {
        Self {
            arena,
            parameters,
            stats: ExecutionStats::new(),
            config: ExecutionConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the arena this context evaluates.
    #[must_use]
    pub fn arena(&self) -> &RowSetArena {
        &self.arena
    }

    /// Resolves a row set id.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the id does not belong to the arena.
    pub fn node(&self, id: RowSetId) -> QueryResult<&RowSetNode> {
        self.arena.node(id)
    }

    /// Positions on the first row of a row set.
    ///
    /// # Errors
    ///
    /// Propagates child and predicate errors.
    pub fn first(&self, id: RowSetId) -> QueryResult<Option<Cursor>> {
        self.node(id)?.first(self)
    }

    /// Positions on the last row of a row set.
    ///
    /// # Errors
    ///
    /// Propagates child and predicate errors.
    pub fn last(&self, id: RowSetId) -> QueryResult<Option<Cursor>> {
        self.node(id)?.last(self)
    }

    /// Positions on the first row of a row set whose leading key columns
    /// equal `key`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the row set has no key index.
    pub fn position_at(&self, id: RowSetId, key: &[Value]) -> QueryResult<Option<Cursor>> {
        self.node(id)?.position_at(self, key)
    }

    /// Adds a parameter value.
    pub fn set_parameter(&mut self, index: u32, value: Value) {
        self.parameters.insert(index, value);
    }

    /// Gets a parameter value.
    #[must_use]
    pub fn get_parameter(&self, index: u32) -> Option<&Value> {
        self.parameters.get(&index)
    }

    /// Returns all parameters.
    #[must_use]
    pub fn parameters(&self) -> &HashMap<u32, Value> {
        &self.parameters
    }

    /// Returns the execution statistics.
    #[must_use]
    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Records that rows were read from a source.
    pub fn record_rows_read(&self, count: u64) {
        self.record(&self.stats.rows_read, count);
    }

    /// Records that rows were produced by a composite row set.
    pub fn record_rows_produced(&self, count: u64) {
        self.record(&self.stats.rows_produced, count);
    }

    /// Records that rows were rejected by a residual predicate.
    pub fn record_rows_filtered(&self, count: u64) {
        self.record(&self.stats.rows_filtered, count);
    }

    /// Records that a cursor was rewound to the start of its tie group.
    pub fn record_tie_rewind(&self) {
        self.record(&self.stats.tie_rewinds, 1);
    }

    /// Records a point lookup against a keyed source.
    pub fn record_lookup(&self) {
        self.record(&self.stats.lookups, 1);
    }

    fn record(&self, counter: &AtomicU64, count: u64) {
        if self.config.collect_stats {
            counter.fetch_add(count, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("rowsets", &self.arena.len())
            .field("parameters", &self.parameters)
            .field("stats", &self.stats)
            .field("config", &self.config)
            .finish()
    }
}

/// Execution statistics collected during query execution.
#[derive(Debug)]
pub struct ExecutionStats {
    /// When execution started.
    start_time: Instant,
    /// Number of rows read from sources.
    rows_read: AtomicU64,
    /// Number of rows produced by joins and merges.
    rows_produced: AtomicU64,
    /// Number of rows filtered out.
    rows_filtered: AtomicU64,
    /// Number of tie-group rewinds.
    tie_rewinds: AtomicU64,
    /// Number of point lookups.
    lookups: AtomicU64,
}

impl ExecutionStats {
    /// Creates new execution statistics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rows_read: AtomicU64::new(0),
            rows_produced: AtomicU64::new(0),
            rows_filtered: AtomicU64::new(0),
            tie_rewinds: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        }
    }

    /// Returns the number of rows read.
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Returns the number of rows produced.
    #[must_use]
    pub fn rows_produced(&self) -> u64 {
        self.rows_produced.load(Ordering::Relaxed)
    }

    /// Returns the number of rows filtered.
    #[must_use]
    pub fn rows_filtered(&self) -> u64 {
        self.rows_filtered.load(Ordering::Relaxed)
    }

    /// Returns the number of tie-group rewinds.
    #[must_use]
    pub fn tie_rewinds(&self) -> u64 {
        self.tie_rewinds.load(Ordering::Relaxed)
    }

    /// Returns the number of point lookups.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Returns the elapsed execution time.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration options for query execution.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Maximum number of rows a materialized row set may hold.
    pub max_rows_in_memory: usize,
    /// Whether to collect statistics.
    pub collect_stats: bool,
}

impl ExecutionConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self { max_rows_in_memory: DEFAULT_MAX_ROWS_IN_MEMORY, collect_stats: false }
    }

    /// Sets the materialization row bound.
    #[must_use]
    pub const fn with_max_rows_in_memory(mut self, limit: usize) -> Self {
        self.max_rows_in_memory = limit;
        self
    }

    /// Enables statistics collection.
    #[must_use]
    pub const fn with_stats(mut self) -> Self {
        self.collect_stats = true;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(RowSetArena::new()))
    }

    #[test]
    fn context_parameters() {
        let mut ctx = context();
        ctx.set_parameter(1, Value::Int(42));
        ctx.set_parameter(2, Value::from("hello"));

        assert_eq!(ctx.get_parameter(1), Some(&Value::Int(42)));
        assert_eq!(ctx.get_parameter(2), Some(&Value::from("hello")));
        assert_eq!(ctx.get_parameter(3), None);
    }

    #[test]
    fn context_stats() {
        let ctx = context().with_config(ExecutionConfig::new().with_stats());
        ctx.record_rows_read(100);
        ctx.record_rows_produced(50);
        ctx.record_rows_filtered(50);
        ctx.record_tie_rewind();
        ctx.record_lookup();

        assert_eq!(ctx.stats().rows_read(), 100);
        assert_eq!(ctx.stats().rows_produced(), 50);
        assert_eq!(ctx.stats().rows_filtered(), 50);
        assert_eq!(ctx.stats().tie_rewinds(), 1);
        assert_eq!(ctx.stats().lookups(), 1);
    }

    #[test]
    fn stats_disabled_by_default() {
        let ctx = context();
        ctx.record_rows_read(10);
        assert_eq!(ctx.stats().rows_read(), 0);
    }

    #[test]
    fn dangling_id_is_internal() {
        let ctx = context();
        let err = ctx.first(RowSetId::new(3)).unwrap_err();
        assert!(err.is_fatal());
    }
}
