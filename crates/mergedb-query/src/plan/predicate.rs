//! Residual predicates.
//!
//! A residual predicate filters the rows a join or set operation produces.
//! The execution layer only sees the [`Predicate`] trait; [`Condition`] is
//! the built-in implementation for comparisons over columns, literals and
//! query parameters.
//!
//! # NULL semantics
//!
//! Conditions follow SQL three-valued logic. A comparison with a NULL
//! operand is unknown, `NOT unknown` is unknown, and a row passes only when
//! its condition is true.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use mergedb_core::Value;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::row::Row;

/// A predicate evaluated against produced rows.
pub trait Predicate: fmt::Debug + fmt::Display + Send + Sync {
    /// Returns true if the row passes.
    ///
    /// # Errors
    ///
    /// Returns an error if the predicate cannot be evaluated for this row.
    fn evaluate(&self, row: &Row, ctx: &ExecutionContext) -> QueryResult<bool>;

    /// Returns true if evaluation reads query parameters.
    fn needs_bindings(&self) -> bool {
        false
    }
}

/// A value reference inside a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A column of the evaluated row.
    Column(Arc<str>),
    /// A constant.
    Literal(Value),
    /// A query parameter (1-indexed).
    Parameter(u32),
}

impl Operand {
    /// Creates a column reference.
    #[must_use]
    pub fn column(name: &str) -> Self {
        Self::Column(Arc::from(name))
    }

    /// Creates a literal.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a parameter reference.
    #[must_use]
    pub const fn param(index: u32) -> Self {
        Self::Parameter(index)
    }

    fn resolve<'a>(&'a self, row: &'a Row, ctx: &'a ExecutionContext) -> QueryResult<&'a Value> {
        match self {
            Self::Column(name) => {
                row.get_by_name(name).ok_or_else(|| QueryError::UnknownColumn(name.to_string()))
            }
            Self::Literal(value) => Ok(value),
            Self::Parameter(index) => ctx
                .get_parameter(*index)
                .ok_or_else(|| QueryError::Evaluation(format!("parameter ${index} is not bound"))),
        }
    }

    /// `self = other`
    #[must_use]
    pub fn eq(self, other: Self) -> Condition {
        Condition::compare(self, CompareOp::Eq, other)
    }

    /// `self <> other`
    #[must_use]
    pub fn not_eq(self, other: Self) -> Condition {
        Condition::compare(self, CompareOp::NotEq, other)
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: Self) -> Condition {
        Condition::compare(self, CompareOp::Lt, other)
    }

    /// `self <= other`
    #[must_use]
    pub fn lt_eq(self, other: Self) -> Condition {
        Condition::compare(self, CompareOp::LtEq, other)
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: Self) -> Condition {
        Condition::compare(self, CompareOp::Gt, other)
    }

    /// `self >= other`
    #[must_use]
    pub fn gt_eq(self, other: Self) -> Condition {
        Condition::compare(self, CompareOp::GtEq, other)
    }

    /// `self IS NULL`
    #[must_use]
    pub fn is_null(self) -> Condition {
        Condition::IsNull(self)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Parameter(index) => write!(f, "${index}"),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    const fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::NotEq => !matches!(ordering, Ordering::Equal),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::LtEq => !matches!(ordering, Ordering::Greater),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::GtEq => !matches!(ordering, Ordering::Less),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        };
        f.write_str(op)
    }
}

/// A boolean condition over a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A comparison of two operands.
    Compare {
        /// Left operand.
        left: Operand,
        /// The operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// `operand IS NULL`
    IsNull(Operand),
    /// Conjunction (true when empty).
    And(Vec<Condition>),
    /// Disjunction (false when empty).
    Or(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Creates a comparison.
    #[must_use]
    pub const fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Self::Compare { left, op, right }
    }

    /// Combines with another condition using AND.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut conditions) => {
                conditions.push(other);
                Self::And(conditions)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Combines with another condition using OR.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut conditions) => {
                conditions.push(other);
                Self::Or(conditions)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negates this condition.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Wraps the condition for use as a residual predicate.
    #[must_use]
    pub fn into_predicate(self) -> Arc<dyn Predicate> {
        Arc::new(self)
    }

    /// Evaluates with three-valued logic; `None` is unknown.
    fn truth(&self, row: &Row, ctx: &ExecutionContext) -> QueryResult<Option<bool>> {
        match self {
            Self::Compare { left, op, right } => {
                let l = left.resolve(row, ctx)?;
                let r = right.resolve(row, ctx)?;
                Ok(l.sql_cmp(r)?.map(|ordering| op.holds(ordering)))
            }
            Self::IsNull(operand) => Ok(Some(operand.resolve(row, ctx)?.is_null())),
            Self::And(conditions) => {
                let mut result = Some(true);
                for condition in conditions {
                    match condition.truth(row, ctx)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                Ok(result)
            }
            Self::Or(conditions) => {
                let mut result = Some(false);
                for condition in conditions {
                    match condition.truth(row, ctx)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                Ok(result)
            }
            Self::Not(inner) => Ok(inner.truth(row, ctx)?.map(|b| !b)),
        }
    }

    fn operands(&self) -> Vec<&Operand> {
        match self {
            Self::Compare { left, right, .. } => vec![left, right],
            Self::IsNull(operand) => vec![operand],
            Self::And(conditions) | Self::Or(conditions) => {
                conditions.iter().flat_map(Self::operands).collect()
            }
            Self::Not(inner) => inner.operands(),
        }
    }
}

impl Predicate for Condition {
    fn evaluate(&self, row: &Row, ctx: &ExecutionContext) -> QueryResult<bool> {
        Ok(self.truth(row, ctx)? == Some(true))
    }

    fn needs_bindings(&self) -> bool {
        self.operands().into_iter().any(|o| matches!(o, Operand::Parameter(_)))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Self::IsNull(operand) => write!(f, "{operand} IS NULL"),
            Self::And(conditions) => write_joined(f, conditions, " AND "),
            Self::Or(conditions) => write_joined(f, conditions, " OR "),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, conditions: &[Condition], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{condition}")?;
    }
    write!(f, ")")
}
