//! Query execution engine.
//!
//! This module provides cursors and the row sets they traverse.
//!
//! # Architecture
//!
//! Every row set of a plan lives in a [`RowSetArena`]. Sources scan sorted
//! [`RowSource`]s, joins and set operations merge two operand row sets
//! that arrive in compatible orders. Traversal is **cursor-based**: a
//! [`Cursor`] is an immutable position that steps forward or backward and
//! can change direction at any row.
//!
//! # Modules
//!
//! - [`arena`] - Row set arena and node types
//! - [`context`] - Execution context (parameters, configuration, statistics)
//! - [`cursor`] - Cursors and tie-group navigation
//! - [`row`] - Row and schema types
//! - [`source`] - Row source trait and source row sets
//! - [`operators`] - Join and set-operation row sets
//! - [`result`] - Query result types
//! - [`executor`] - Drivers that drain row sets
//! - [`explain`] - Printable execution strategies
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mergedb_core::Value;
//! use mergedb_query::exec::{ExecutionContext, Executor, MemoryRowSource, RowSetArena};
//! use mergedb_query::plan::JoinDescriptor;
//!
//! let users = MemoryRowSource::from_values(
//!     "users",
//!     &["u.id", "u.name"],
//!     &["u.id"],
//!     vec![
//!         vec![Value::Int(1), Value::from("ann")],
//!         vec![Value::Int(2), Value::from("bob")],
//!     ],
//! )
//! .unwrap();
//! let orders = MemoryRowSource::from_values(
//!     "orders",
//!     &["o.user", "o.total"],
//!     &["o.user"],
//!     vec![vec![Value::Int(2), Value::Int(30)]],
//! )
//! .unwrap();
//!
//! let mut arena = RowSetArena::new();
//! let u = arena.add_source(Arc::new(users)).unwrap();
//! let o = arena.add_source(Arc::new(orders)).unwrap();
//! let join = arena.add_join(JoinDescriptor::inner().on("u.id", "o.user"), u, o).unwrap();
//!
//! let ctx = ExecutionContext::new(Arc::new(arena));
//! let result = Executor::new(&ctx).collect(join).unwrap();
//! assert_eq!(result.column_values("u.name"), vec![Value::from("bob")]);
//! ```

pub mod arena;
pub mod context;
pub mod cursor;
pub mod executor;
pub mod explain;
pub mod operators;
pub mod result;
pub mod row;
pub mod source;

// Re-exports
pub use arena::{RowSetArena, RowSetBase, RowSetId, RowSetNode};
pub use context::{ExecutionConfig, ExecutionContext, ExecutionStats, DEFAULT_MAX_ROWS_IN_MEMORY};
pub use cursor::{Cursor, Direction, RecordRef};
pub use executor::Executor;
pub use explain::Strategy;
pub use operators::{JoinRowSet, MemoryRowSource, MergeRowSet};
pub use result::ResultSet;
pub use row::{Row, Schema};
pub use source::{RowSource, SourcePos, SourceRowSet, TieGroups};
