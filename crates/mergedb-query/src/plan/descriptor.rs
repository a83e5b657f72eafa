//! Join and set-operation descriptors.
//!
//! Descriptors are what the planner hands to the execution layer: the
//! operator kind, the join condition, and an optional residual predicate.
//! Kinds also parse from the planner's textual codes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::predicate::Predicate;
use crate::error::QueryError;

/// The join algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Every left row paired with every right row.
    Cross,
    /// Matched pairs only.
    Inner,
    /// Matched pairs plus unmatched left rows.
    Left,
    /// Matched pairs plus unmatched right rows.
    Right,
    /// Matched pairs plus unmatched rows of either side.
    Full,
    /// Point lookup of each driving row's key on the determined side.
    FunctionalDependency,
}

impl JoinKind {
    /// Returns true for the kinds that merge two key-ordered streams.
    #[must_use]
    pub const fn is_merge(self) -> bool {
        matches!(self, Self::Inner | Self::Left | Self::Right | Self::Full)
    }

    /// Returns the planner code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Cross => "CROSS",
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
            Self::FunctionalDependency => "FD",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for JoinKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_uppercase().as_str() {
            "CROSS" => Self::Cross,
            "INNER" => Self::Inner,
            "LEFT" | "LEFT OUTER" => Self::Left,
            "RIGHT" | "RIGHT OUTER" => Self::Right,
            "FULL" | "FULL OUTER" => Self::Full,
            "FD" | "FUNCTIONAL DEPENDENCY" => Self::FunctionalDependency,
            _ => return Err(QueryError::internal(format!("unknown join kind: {s}"))),
        };
        Ok(kind)
    }
}

/// One operand of a binary row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    /// The first operand.
    Left,
    /// The second operand.
    Right,
}

impl JoinSide {
    /// Returns the other side.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// An ordered conjunction of column equalities `left = right`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinCondition {
    pairs: Vec<(Arc<str>, Arc<str>)>,
}

impl JoinCondition {
    /// Creates an empty condition.
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Appends the equality `left = right`.
    #[must_use]
    pub fn and(mut self, left: &str, right: &str) -> Self {
        self.pairs.push((Arc::from(left), Arc::from(right)));
        self
    }

    /// Returns the column pairs in order.
    #[must_use]
    pub fn pairs(&self) -> &[(Arc<str>, Arc<str>)] {
        &self.pairs
    }

    /// Returns the columns of one side, in condition order.
    #[must_use]
    pub fn columns(&self, side: JoinSide) -> Vec<Arc<str>> {
        self.pairs
            .iter()
            .map(|(l, r)| match side {
                JoinSide::Left => Arc::clone(l),
                JoinSide::Right => Arc::clone(r),
            })
            .collect()
    }

    /// Returns the number of column pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if the condition has no column pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (l, r)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{l} = {r}")?;
        }
        Ok(())
    }
}

/// Describes a join row set.
#[derive(Debug, Clone)]
pub struct JoinDescriptor {
    /// The join algorithm.
    pub kind: JoinKind,
    /// The equi-join condition (empty for cross joins).
    pub condition: JoinCondition,
    /// Predicate applied to every joined row.
    pub predicate: Option<Arc<dyn Predicate>>,
    /// For functional-dependency joins, the side reached by point lookup.
    pub determined: Option<JoinSide>,
}

impl JoinDescriptor {
    /// Creates a descriptor of the given kind with an empty condition.
    #[must_use]
    pub fn new(kind: JoinKind) -> Self {
        Self { kind, condition: JoinCondition::new(), predicate: None, determined: None }
    }

    /// Creates a cross join.
    #[must_use]
    pub fn cross() -> Self {
        Self::new(JoinKind::Cross)
    }

    /// Creates an inner join.
    #[must_use]
    pub fn inner() -> Self {
        Self::new(JoinKind::Inner)
    }

    /// Creates a left outer join.
    #[must_use]
    pub fn left() -> Self {
        Self::new(JoinKind::Left)
    }

    /// Creates a right outer join.
    #[must_use]
    pub fn right() -> Self {
        Self::new(JoinKind::Right)
    }

    /// Creates a full outer join.
    #[must_use]
    pub fn full() -> Self {
        Self::new(JoinKind::Full)
    }

    /// Creates a functional-dependency join whose `determined` side is
    /// reached by point lookup.
    #[must_use]
    pub fn functional(determined: JoinSide) -> Self {
        Self { determined: Some(determined), ..Self::new(JoinKind::FunctionalDependency) }
    }

    /// Adds the equality `left = right` to the condition.
    #[must_use]
    pub fn on(mut self, left: &str, right: &str) -> Self {
        self.condition = self.condition.and(left, right);
        self
    }

    /// Sets the residual predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn Predicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// The set operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOpKind {
    /// Rows of either operand.
    Union,
    /// Rows of both operands.
    Intersect,
    /// Rows of the left operand not in the right.
    Except,
}

impl SetOpKind {
    /// Returns the planner code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::Intersect => "INTERSECT",
            Self::Except => "EXCEPT",
        }
    }
}

impl fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SetOpKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_uppercase().as_str() {
            "UNION" => Self::Union,
            "INTERSECT" => Self::Intersect,
            "EXCEPT" | "MINUS" => Self::Except,
            _ => return Err(QueryError::internal(format!("unknown set operation: {s}"))),
        };
        Ok(kind)
    }
}

/// Describes a set-operation row set.
#[derive(Debug, Clone)]
pub struct SetOpDescriptor {
    /// The set operation.
    pub kind: SetOpKind,
    /// Set semantics when true, bag semantics when false.
    pub distinct: bool,
    /// Predicate applied to every output row.
    pub predicate: Option<Arc<dyn Predicate>>,
}

impl SetOpDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub const fn new(kind: SetOpKind, distinct: bool) -> Self {
        Self { kind, distinct, predicate: None }
    }

    /// Creates a distinct union.
    #[must_use]
    pub const fn union() -> Self {
        Self::new(SetOpKind::Union, true)
    }

    /// Creates a bag union (`UNION ALL`).
    #[must_use]
    pub const fn union_all() -> Self {
        Self::new(SetOpKind::Union, false)
    }

    /// Creates a distinct intersection.
    #[must_use]
    pub const fn intersect() -> Self {
        Self::new(SetOpKind::Intersect, true)
    }

    /// Creates a bag intersection (`INTERSECT ALL`).
    #[must_use]
    pub const fn intersect_all() -> Self {
        Self::new(SetOpKind::Intersect, false)
    }

    /// Creates a distinct difference.
    #[must_use]
    pub const fn except() -> Self {
        Self::new(SetOpKind::Except, true)
    }

    /// Creates a bag difference (`EXCEPT ALL`).
    #[must_use]
    pub const fn except_all() -> Self {
        Self::new(SetOpKind::Except, false)
    }

    /// Sets the residual predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn Predicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl fmt::Display for SetOpDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let semantics = if self.distinct { "DISTINCT" } else { "ALL" };
        write!(f, "{} {semantics}", self.kind)
    }
}
