//! Named activation conditions.
//!
//! A [`Condition`] bundles a [`SamplePolicy`] with up to six comparison
//! filters. Each filter narrows the candidate [`RegionList`] using static
//! course, horse and race data, and may attach a [`DynamicCondition`] for
//! state only known while the race is running. Conditions are resolved by
//! name through a [`ConditionLookup`]: the default [`ConditionTable`], the
//! variant where activation counts are positional, or [`MockConditions`]
//! for structural analysis.

mod counts_as_random;
mod table;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;

use crate::course::{CourseData, CourseError};
use crate::horse::HorseParameters;
use crate::race_params::{ParamError, RaceParameters};
use crate::region::{Region, RegionList};
use crate::sample_policy::SamplePolicy;
use crate::solver::RaceState;

pub use counts_as_random::counts_as_random_table;
pub use table::default_table;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("unsupported comparison {condition}{comparator}")]
    Unsupported {
        condition: String,
        comparator: Comparator,
    },
    #[error("invalid argument {argument} for {condition}: expected {expected}")]
    InvalidArgument {
        condition: &'static str,
        argument: i32,
        expected: &'static str,
    },
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// One of the six comparison operators of the condition grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparator {
    pub const ALL: [Self; 6] = [Self::Eq, Self::Neq, Self::Lt, Self::Lte, Self::Gt, Self::Gte];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }

    /// Evaluate `lhs <op> rhs`.
    #[must_use]
    pub fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Neq => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == s)
            .ok_or(())
    }
}

/// Predicate over the live race, checked every step inside a trigger region.
pub type DynamicCondition = Arc<dyn Fn(&RaceState<'_>) -> bool + Send + Sync>;

/// Regions surviving a filter plus an optional dynamic check; `None` means always true.
#[derive(Clone)]
pub struct Filtered {
    pub regions: RegionList,
    pub dynamic: Option<DynamicCondition>,
}

impl Filtered {
    #[must_use]
    pub const fn regions(regions: RegionList) -> Self {
        Self {
            regions,
            dynamic: None,
        }
    }

    pub fn dynamic<F>(regions: RegionList, check: F) -> Self
    where
        F: Fn(&RaceState<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            regions,
            dynamic: Some(Arc::new(check)),
        }
    }
}

impl fmt::Debug for Filtered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filtered")
            .field("regions", &self.regions)
            .field("dynamic", &self.dynamic.is_some())
            .finish()
    }
}

/// Static inputs a filter may consult.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub course: &'a CourseData,
    /// Base stats: mood and overcap applied, course and ground not.
    pub horse: &'a HorseParameters,
    pub race: &'a RaceParameters,
    /// Id of the skill whose condition is being evaluated.
    pub skill_id: &'a str,
}

pub type FilterResult = Result<Filtered, ConditionError>;

pub type FilterFn =
    Arc<dyn Fn(&RegionList, i32, &ConditionContext<'_>) -> FilterResult + Send + Sync>;

/// Wrap a closure as a [`FilterFn`].
pub fn filter<F>(f: F) -> FilterFn
where
    F: Fn(&RegionList, i32, &ConditionContext<'_>) -> FilterResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A named predicate family.
#[derive(Clone)]
pub struct Condition {
    name: String,
    policy: SamplePolicy,
    filters: [Option<FilterFn>; 6],
}

impl Condition {
    /// Condition with no supported comparisons yet.
    pub fn new(name: impl Into<String>, policy: SamplePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            filters: Default::default(),
        }
    }

    /// Condition accepting every comparison without narrowing.
    pub fn noop(name: impl Into<String>, policy: SamplePolicy) -> Self {
        let identity = filter(|regions, _, _| Ok(Filtered::regions(regions.clone())));
        let mut condition = Self::new(name, policy);
        for op in Comparator::ALL {
            condition.filters[op.slot()] = Some(Arc::clone(&identity));
        }
        condition
    }

    #[must_use]
    pub fn on(mut self, op: Comparator, f: FilterFn) -> Self {
        self.filters[op.slot()] = Some(f);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn policy(&self) -> &SamplePolicy {
        &self.policy
    }

    #[must_use]
    pub fn supports(&self, op: Comparator) -> bool {
        self.filters[op.slot()].is_some()
    }

    pub fn apply(
        &self,
        op: Comparator,
        regions: &RegionList,
        argument: i32,
        ctx: &ConditionContext<'_>,
    ) -> FilterResult {
        let f = self.filters[op.slot()]
            .as_ref()
            .ok_or_else(|| ConditionError::Unsupported {
                condition: self.name.clone(),
                comparator: op,
            })?;
        f(regions, argument, ctx)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let supported: Vec<&str> = Comparator::ALL
            .into_iter()
            .filter(|op| self.supports(*op))
            .map(Comparator::symbol)
            .collect();
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("policy", &self.policy.name())
            .field("supported", &supported)
            .finish()
    }
}

/// Resolves identifiers of the condition grammar.
pub trait ConditionLookup {
    fn lookup(&self, name: &str) -> Option<Arc<Condition>>;
}

/// Registry of conditions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ConditionTable {
    conditions: HashMap<String, Arc<Condition>>,
}

impl ConditionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, condition: Condition) {
        self.conditions
            .insert(condition.name.clone(), Arc::new(condition));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Condition names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.conditions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ConditionLookup for ConditionTable {
    fn lookup(&self, name: &str) -> Option<Arc<Condition>> {
        self.conditions.get(name).cloned()
    }
}

impl<T: ConditionLookup + ?Sized> ConditionLookup for &T {
    fn lookup(&self, name: &str) -> Option<Arc<Condition>> {
        (**self).lookup(name)
    }
}

/// Accepts any identifier as an immediate no-op condition.
///
/// Repeated lookups of one name return the same instance, so trees parsed
/// against it can be compared structurally.
#[derive(Debug, Default)]
pub struct MockConditions {
    cache: Mutex<HashMap<String, Arc<Condition>>>,
}

impl MockConditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance used by tooling.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<MockConditions> = OnceLock::new();
        SHARED.get_or_init(Self::new)
    }
}

impl ConditionLookup for MockConditions {
    fn lookup(&self, name: &str) -> Option<Arc<Condition>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let condition = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Condition::noop(name, SamplePolicy::Immediate)));
        Some(Arc::clone(condition))
    }
}

/// Clip every region to `bounds`.
fn narrow(regions: &RegionList, bounds: Region) -> RegionList {
    regions.clip(&bounds)
}

/// Intersect every region with each of `bounds`.
fn narrow_each(regions: &RegionList, bounds: &[Region]) -> RegionList {
    regions.rmap(|r| bounds.iter().map(|b| r.intersect(b)).collect::<Vec<_>>())
}

fn expect_arg(
    condition: &'static str,
    argument: i32,
    allowed: &[i32],
    expected: &'static str,
) -> Result<(), ConditionError> {
    if allowed.contains(&argument) {
        Ok(())
    } else {
        Err(ConditionError::InvalidArgument {
            condition,
            argument,
            expected,
        })
    }
}
