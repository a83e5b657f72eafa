//! Plan inputs consumed by the execution layer.
//!
//! The planner describes each join and set operation with a descriptor and
//! attaches residual predicates to them.

pub mod descriptor;
pub mod predicate;

pub use descriptor::{JoinCondition, JoinDescriptor, JoinKind, JoinSide, SetOpDescriptor, SetOpKind};
pub use predicate::{CompareOp, Condition, Operand, Predicate};
