//! Concrete row set implementations.
//!
//! # Operator Categories
//!
//! - **Sources**: [`memory`] - In-memory sorted row sources
//! - **Join operators**: [`join`] - Nested-loop, merge, and lookup joins
//! - **Set operators**: [`set_ops`] - UNION, INTERSECT, EXCEPT

pub mod join;
pub mod memory;
pub mod set_ops;

// Re-exports for convenience
pub use join::JoinRowSet;
pub use memory::MemoryRowSource;
pub use set_ops::MergeRowSet;
