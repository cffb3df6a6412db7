//! Operator trees produced by the parser.

use std::fmt;
use std::sync::Arc;

use crate::conditions::{Comparator, Condition, ConditionContext, ConditionError, DynamicCondition};
use crate::region::RegionList;
use crate::sample_policy::{ReconcileError, SamplePolicy};
use crate::solver::RaceState;

/// A condition instantiated with a comparator and literal argument.
#[derive(Clone)]
pub struct CmpOperator {
    pub condition: Arc<Condition>,
    pub comparator: Comparator,
    pub argument: i32,
}

/// Closed AST of the condition grammar; every node carries its governing policy.
#[derive(Clone)]
pub enum Operator {
    Cmp(CmpOperator),
    And {
        left: Box<Operator>,
        right: Box<Operator>,
        policy: SamplePolicy,
    },
    Or {
        left: Box<Operator>,
        right: Box<Operator>,
        policy: SamplePolicy,
    },
}

/// Surviving regions and the combined dynamic condition (`None` is always true).
pub type Applied = (RegionList, Option<DynamicCondition>);

impl Operator {
    #[must_use]
    pub fn cmp(condition: Arc<Condition>, comparator: Comparator, argument: i32) -> Self {
        Self::Cmp(CmpOperator {
            condition,
            comparator,
            argument,
        })
    }

    pub fn and(left: Self, right: Self) -> Result<Self, ReconcileError> {
        let policy = left.policy().reconcile(right.policy())?;
        Ok(Self::And {
            left: Box::new(left),
            right: Box::new(right),
            policy,
        })
    }

    pub fn or(left: Self, right: Self) -> Result<Self, ReconcileError> {
        let policy = left.policy().reconcile(right.policy())?;
        Ok(Self::Or {
            left: Box::new(left),
            right: Box::new(right),
            policy,
        })
    }

    #[must_use]
    pub fn policy(&self) -> &SamplePolicy {
        match self {
            Self::Cmp(cmp) => cmp.condition.policy(),
            Self::And { policy, .. } | Self::Or { policy, .. } => policy,
        }
    }

    /// Narrow `regions` to where this expression can hold.
    ///
    /// `&` feeds the left result into the right side. `@` evaluates both
    /// sides on the original regions and unions them; its dynamic conditions
    /// are OR-ed over the whole union, which is only exact when the branches
    /// differ in either regions or dynamic conditions but not both.
    pub fn apply(
        &self,
        regions: &RegionList,
        ctx: &ConditionContext<'_>,
    ) -> Result<Applied, ConditionError> {
        match self {
            Self::Cmp(cmp) => {
                let out = cmp
                    .condition
                    .apply(cmp.comparator, regions, cmp.argument, ctx)?;
                Ok((out.regions, out.dynamic))
            }
            Self::And { left, right, .. } => {
                let (narrowed, left_cond) = left.apply(regions, ctx)?;
                let (narrowed, right_cond) = right.apply(&narrowed, ctx)?;
                let combined = match (left_cond, right_cond) {
                    (None, None) => None,
                    (Some(c), None) | (None, Some(c)) => Some(c),
                    (Some(a), Some(b)) => Some(all_of(a, b)),
                };
                Ok((narrowed, combined))
            }
            Self::Or { left, right, .. } => {
                let (left_regions, left_cond) = left.apply(regions, ctx)?;
                let (right_regions, right_cond) = right.apply(regions, ctx)?;
                let combined = match (left_cond, right_cond) {
                    (None, None) => None,
                    // one branch is unconditionally true
                    (Some(_), None) | (None, Some(_)) => None,
                    (Some(a), Some(b)) => Some(any_of(a, b)),
                };
                Ok((left_regions.union(&right_regions), combined))
            }
        }
    }

    /// Structural equality: same shape, comparators, arguments and condition names.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Cmp(a), Self::Cmp(b)) => {
                a.comparator == b.comparator
                    && a.argument == b.argument
                    && a.condition.name() == b.condition.name()
            }
            (Self::And { left: l1, right: r1, .. }, Self::And { left: l2, right: r2, .. })
            | (Self::Or { left: l1, right: r1, .. }, Self::Or { left: l2, right: r2, .. }) => {
                l1.same_shape(l2) && r1.same_shape(r2)
            }
            _ => false,
        }
    }
}

fn all_of(a: DynamicCondition, b: DynamicCondition) -> DynamicCondition {
    Arc::new(move |s: &RaceState<'_>| a(s) && b(s))
}

fn any_of(a: DynamicCondition, b: DynamicCondition) -> DynamicCondition {
    Arc::new(move |s: &RaceState<'_>| a(s) || b(s))
}

/// Prints the expression back in condition-string syntax.
impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cmp(cmp) => write!(
                f,
                "{}{}{}",
                cmp.condition.name(),
                cmp.comparator,
                cmp.argument
            ),
            Self::And { left, right, .. } => write!(f, "{left}&{right}"),
            Self::Or { left, right, .. } => write!(f, "{left}@{right}"),
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cmp(cmp) => f
                .debug_struct("Cmp")
                .field("condition", &cmp.condition.name())
                .field("comparator", &cmp.comparator)
                .field("argument", &cmp.argument)
                .finish(),
            Self::And { left, right, policy } => f
                .debug_struct("And")
                .field("left", left)
                .field("right", right)
                .field("policy", &policy.name())
                .finish(),
            Self::Or { left, right, policy } => f
                .debug_struct("Or")
                .field("left", left)
                .field("right", right)
                .field("policy", &policy.name())
                .finish(),
        }
    }
}
