//! Error types for query execution.

use mergedb_core::CoreError;
use thiserror::Error;

/// Errors that can occur while building or executing row sets.
#[derive(Debug, Error)]
pub enum QueryError {
    /// An internal-consistency fault: an unknown operator kind from the
    /// planner, an exhausted cursor where one is required, a dangling row set
    /// id, or a point lookup on a row set without a key index.
    ///
    /// These indicate a planner or engine defect and end the evaluation.
    #[error("internal error: {0}")]
    Internal(String),

    /// A residual predicate could not be evaluated.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// A descriptor is inconsistent with its operands.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A column name did not resolve against a row set's schema.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Materializing a row set exceeded the configured row bound.
    #[error("query too large: {actual} rows exceeds limit of {limit}")]
    QueryTooLarge {
        /// Rows produced before the bound was hit.
        actual: usize,
        /// The configured bound.
        limit: usize,
    },

    /// A value-level error raised while evaluating a predicate.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl QueryError {
    /// Creates an internal-consistency error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates an invalid plan error.
    #[must_use]
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan(message.into())
    }

    /// Returns true for faults that must abort the evaluation rather than be
    /// reported as a query-level error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// Result type for query execution.
pub type QueryResult<T> = Result<T, QueryError>;
