//! `mergedb` Query
//!
//! This crate provides ordered-merge query execution for `mergedb`.
//!
//! # Overview
//!
//! The query system consists of two layers:
//!
//! - **Plan**: Join and set-operation descriptors, residual predicates
//! - **Exec**: Row sets, cursors, and the merge algorithms behind them
//!
//! Operands are consumed in their declared order. Joins on equality keys
//! and set operations run as single merge passes over both operands,
//! re-reading only the tie groups of duplicate keys, and every row set
//! can be traversed forward and backward.
//!
//! # Modules
//!
//! - [`plan`] - Join and set-operation descriptors and predicates
//! - [`exec`] - Query execution
//! - [`error`] - Error types for planning and execution
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use mergedb_core::Value;
//! use mergedb_query::{ExecutionContext, Executor, MemoryRowSource, RowSetArena};
//! use mergedb_query::plan::SetOpDescriptor;
//!
//! let a = MemoryRowSource::from_values(
//!     "a", &["k"], &["k"], vec![vec![Value::Int(1)], vec![Value::Int(3)]],
//! ).unwrap();
//! let b = MemoryRowSource::from_values(
//!     "b", &["k"], &["k"], vec![vec![Value::Int(2)], vec![Value::Int(3)]],
//! ).unwrap();
//!
//! let mut arena = RowSetArena::new();
//! let a = arena.add_source(Arc::new(a)).unwrap();
//! let b = arena.add_source(Arc::new(b)).unwrap();
//! let union = arena.add_merge(SetOpDescriptor::union(), a, b).unwrap();
//!
//! let ctx = ExecutionContext::new(Arc::new(arena));
//! let rows = Executor::new(&ctx).collect(union).unwrap();
//! assert_eq!(rows.column_values("k"), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod exec;
pub mod plan;

// Re-export commonly used items at the crate root
pub use error::{QueryError, QueryResult};
pub use exec::{
    Cursor, Direction, ExecutionConfig, ExecutionContext, Executor, MemoryRowSource, ResultSet,
    Row, RowSetArena, RowSetId, RowSource, Schema,
};
pub use plan::{
    Condition, JoinDescriptor, JoinKind, JoinSide, Operand, Predicate, SetOpDescriptor, SetOpKind,
};
