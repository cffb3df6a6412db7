//! Structural search over parsed condition trees.
//!
//! A search pattern is itself a condition expression: a bare condition name
//! matches any comparison on that condition, a comparison matches an
//! identical comparison, and `a&b` matches any conjunction branch that
//! contains both. Conditions are compared by name, so patterns parsed
//! against [`MockConditions`](crate::conditions::MockConditions) can be
//! matched against trees parsed with the real table.

use thiserror::Error;

use crate::conditions::{Condition, ConditionLookup};
use crate::operator::{CmpOperator, Operator};
use crate::parser::{Node, ParseError, parse, parse_any};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("doesn't support @ in search conditions")]
    OrInPattern,
    #[error("doesn't support sole integer as search condition")]
    SoleInteger,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// What a single pattern element requires of a comparison.
#[derive(Clone, Copy)]
enum Needle<'a> {
    Condition(&'a Condition),
    Cmp(&'a CmpOperator),
}

impl Needle<'_> {
    fn matches_cmp(self, cmp: &CmpOperator) -> bool {
        match self {
            Self::Condition(cond) => cmp.condition.name() == cond.name(),
            Self::Cmp(pattern) => {
                cmp.condition.name() == pattern.condition.name()
                    && cmp.argument == pattern.argument
                    && cmp.comparator == pattern.comparator
            }
        }
    }

    /// True when any comparison anywhere in `tree` matches.
    fn occurs_in(self, tree: &Operator) -> bool {
        match tree {
            Operator::Cmp(cmp) => self.matches_cmp(cmp),
            Operator::And { left, right, .. } | Operator::Or { left, right, .. } => {
                self.occurs_in(left) || self.occurs_in(right)
            }
        }
    }
}

/// Collect the comparisons of a left-deep `&` chain, rightmost first.
fn flatten<'a>(op: &'a Operator, out: &mut Vec<Needle<'a>>) -> Result<(), MatchError> {
    match op {
        Operator::Cmp(cmp) => {
            out.push(Needle::Cmp(cmp));
            Ok(())
        }
        Operator::And { left, right, .. } => {
            flatten(right, out)?;
            flatten(left, out)
        }
        Operator::Or { .. } => Err(MatchError::OrInPattern),
    }
}

/// True when some `@` branch of `tree` contains every needle in its `&` chain.
fn and_match(mut needles: Vec<Needle<'_>>, tree: &Operator) -> bool {
    match tree {
        Operator::Or { left, right, .. } => {
            and_match(needles.clone(), left) || and_match(needles, right)
        }
        Operator::And { left, right, .. } => {
            if let Some(idx) = needles.iter().position(|n| n.occurs_in(right)) {
                needles.remove(idx);
            }
            needles.is_empty() || and_match(needles, left)
        }
        Operator::Cmp(cmp) => needles.len() == 1 && needles[0].matches_cmp(cmp),
    }
}

/// Match an already-parsed pattern against `tree`.
pub fn tree_match(pattern: &Node, tree: &Operator) -> Result<bool, MatchError> {
    match pattern {
        Node::Int(_) => Err(MatchError::SoleInteger),
        Node::Cond(cond) => Ok(Needle::Condition(cond).occurs_in(tree)),
        Node::Op(Operator::Cmp(cmp)) => Ok(Needle::Cmp(cmp).occurs_in(tree)),
        Node::Op(op @ Operator::And { .. }) => {
            let mut needles = Vec::new();
            flatten(op, &mut needles)?;
            Ok(and_match(needles, tree))
        }
        Node::Op(Operator::Or { .. }) => Err(MatchError::OrInPattern),
    }
}

/// Compiled search pattern, reusable across many condition strings.
#[derive(Debug, Clone)]
pub struct Pattern {
    node: Node,
}

impl Pattern {
    pub fn new<L: ConditionLookup>(source: &str, lookup: L) -> Result<Self, MatchError> {
        let node = parse_any(source, lookup)?;
        if let Node::Int(_) = node {
            return Err(MatchError::SoleInteger);
        }
        if let Node::Op(Operator::Or { .. }) = node {
            return Err(MatchError::OrInPattern);
        }
        Ok(Self { node })
    }

    pub fn matches(&self, tree: &Operator) -> Result<bool, MatchError> {
        tree_match(&self.node, tree)
    }

    /// Parse `condition` with `lookup` and test it against the pattern.
    pub fn matches_source<L: ConditionLookup>(
        &self,
        condition: &str,
        lookup: L,
    ) -> Result<bool, MatchError> {
        let tree = parse(condition, lookup)?;
        self.matches(&tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{MockConditions, default_table};

    fn check(pattern: &str, condition: &str) -> bool {
        let mock = MockConditions::new();
        Pattern::new(pattern, &mock)
            .expect("pattern parses")
            .matches_source(condition, &mock)
            .expect("condition parses")
    }

    #[test]
    fn bare_condition_matches_any_comparison() {
        assert!(check("phase", "phase>=2&order<=3"));
        assert!(check("order", "phase>=2&order<=3"));
        assert!(!check("corner", "phase>=2&order<=3"));
    }

    #[test]
    fn comparison_requires_same_operator_and_argument() {
        assert!(check("phase>=2", "phase>=2&order<=3"));
        assert!(!check("phase==2", "phase>=2&order<=3"));
        assert!(!check("phase>=1", "phase>=2&order<=3"));
    }

    #[test]
    fn conjunction_must_hold_within_one_branch() {
        let cond = "phase==1&corner!=0@is_last_straight==1&order<=5";
        assert!(check("phase==1&corner!=0", cond));
        assert!(check("order<=5&is_last_straight==1", cond));
        assert!(!check("phase==1&order<=5", cond));
        assert!(check("phase==1", cond));
    }

    #[test]
    fn rejects_unsupported_patterns() {
        let mock = MockConditions::new();
        assert_eq!(
            Pattern::new("a==1@b==1", &mock).expect_err("or"),
            MatchError::OrInPattern
        );
        assert_eq!(
            Pattern::new("3", &mock).expect_err("integer"),
            MatchError::SoleInteger
        );
    }

    #[test]
    fn mock_patterns_match_real_trees() {
        let pattern = Pattern::new("is_finalcorner==1", MockConditions::shared()).expect("parses");
        let tree = parse("is_finalcorner==1&corner==0", default_table()).expect("parses");
        assert!(pattern.matches(&tree).expect("matches"));
    }
}
