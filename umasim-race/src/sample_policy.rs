//! Policies that turn a condition's surviving regions into concrete trigger intervals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;

use crate::numbers::{floor_f64_to_usize, usize_to_f64};
use crate::random::Prng;
use crate::region::{Region, RegionList};

/// Width of a sampled trigger in meters.
pub const TRIGGER_WIDTH: f64 = 10.0;

const ALL_CORNER_MAX_TRIGGERS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("cannot reconcile different distributions")]
    DistinctDistributions,
    #[error("cannot reconcile StraightRandom with AllCornerRandom")]
    StraightWithAllCorner,
}

/// Shape of a distribution-random policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Uniform,
    LogNormal { mu: f64, sigma: f64 },
    Erlang { k: u32, lambda: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DistributionKey {
    Uniform,
    LogNormal(u64, u64),
    Erlang(u32, u64),
}

impl From<Distribution> for DistributionKey {
    fn from(value: Distribution) -> Self {
        match value {
            Distribution::Uniform => Self::Uniform,
            Distribution::LogNormal { mu, sigma } => Self::LogNormal(mu.to_bits(), sigma.to_bits()),
            Distribution::Erlang { k, lambda } => Self::Erlang(k, lambda.to_bits()),
        }
    }
}

/// A condition modeled as a probability distribution over the course rather than a geometric filter.
#[derive(Debug, PartialEq)]
pub struct DistributionRandom {
    distribution: Distribution,
}

impl DistributionRandom {
    #[must_use]
    pub const fn distribution(&self) -> Distribution {
        self.distribution
    }

    /// `n` values in `[0, 1]`, min-max normalized for the non-uniform shapes.
    fn values<R: Prng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        match self.distribution {
            Distribution::Uniform => (0..n).map(|_| rng.random()).collect(),
            Distribution::LogNormal { mu, sigma } => {
                let mut nums = Vec::with_capacity(n + 1);
                for _ in 0..n.div_ceil(2) {
                    let (x, y, r2) = loop {
                        let x = rng.random() * 2.0 - 1.0;
                        let y = rng.random() * 2.0 - 1.0;
                        let r2 = x * x + y * y;
                        if r2 != 0.0 && r2 < 1.0 {
                            break (x, y, r2);
                        }
                    };
                    let m = (-2.0 * r2.ln() / r2).sqrt() * sigma;
                    nums.push((x * m + mu).exp());
                    nums.push((y * m + mu).exp());
                }
                normalize(nums)
            }
            Distribution::Erlang { k, lambda } => {
                let nums = (0..n)
                    .map(|_| {
                        let u: f64 = (0..k).map(|_| rng.random()).product();
                        -u.ln() / lambda
                    })
                    .collect();
                normalize(nums)
            }
        }
    }

    fn sample<R: Prng + ?Sized>(&self, regions: &RegionList, n: usize, rng: &mut R) -> Vec<Region> {
        let sorted = regions.sorted_by_start();
        let Some(last) = sorted.last().copied() else {
            return Vec::new();
        };
        let range = regions.total_length();
        self.values(n, rng)
            .into_iter()
            .take(n)
            .map(|value| {
                let mut pos = (value * range).floor();
                if !pos.is_finite() {
                    pos = 0.0;
                }
                for region in &sorted {
                    pos += region.start;
                    if pos > region.end {
                        pos -= region.end;
                    } else {
                        return Region::new(pos, region.end);
                    }
                }
                Region::new(last.start, last.end)
            })
            .collect()
    }
}

fn normalize(mut nums: Vec<f64>) -> Vec<f64> {
    let min = nums.iter().copied().fold(f64::INFINITY, f64::min);
    let max = nums.iter().copied().fold(0.0, f64::max);
    let range = max - min;
    for value in &mut nums {
        *value = if range > 0.0 && range.is_finite() {
            (*value - min) / range
        } else {
            0.0
        };
    }
    nums
}

fn distribution_cache() -> &'static Mutex<HashMap<DistributionKey, Arc<DistributionRandom>>> {
    static CACHE: OnceLock<Mutex<HashMap<DistributionKey, Arc<DistributionRandom>>>> =
        OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// How a concrete trigger is picked from candidate regions.
#[derive(Debug, Clone)]
pub enum SamplePolicy {
    /// First region, every sample.
    Immediate,
    /// Length-weighted region, then a uniform point.
    Random,
    DistributionRandom(Arc<DistributionRandom>),
    /// Uniform region regardless of length, then a uniform point.
    StraightRandom,
    AllCornerRandom,
}

impl SamplePolicy {
    /// Shared policy for `distribution`; equal parameters return the same instance.
    #[must_use]
    pub fn distribution(distribution: Distribution) -> Self {
        let mut cache = distribution_cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let policy = cache
            .entry(DistributionKey::from(distribution))
            .or_insert_with(|| Arc::new(DistributionRandom { distribution }));
        Self::DistributionRandom(Arc::clone(policy))
    }

    #[must_use]
    pub fn uniform_random() -> Self {
        Self::distribution(Distribution::Uniform)
    }

    #[must_use]
    pub fn log_normal(mu: f64, sigma: f64) -> Self {
        Self::distribution(Distribution::LogNormal { mu, sigma })
    }

    #[must_use]
    pub fn erlang(k: u32, lambda: f64) -> Self {
        Self::distribution(Distribution::Erlang { k, lambda })
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Random => "random",
            Self::DistributionRandom(_) => "distribution-random",
            Self::StraightRandom => "straight-random",
            Self::AllCornerRandom => "all-corner-random",
        }
    }

    /// Produce `n` trigger intervals from `regions`. Empty input yields no triggers.
    pub fn sample<R: Prng + ?Sized>(
        &self,
        regions: &RegionList,
        n: usize,
        rng: &mut R,
    ) -> Vec<Region> {
        if regions.is_empty() {
            return Vec::new();
        }
        match self {
            Self::Immediate => regions.first().copied().into_iter().collect(),
            Self::Random => sample_weighted(regions, n, rng),
            Self::DistributionRandom(policy) => policy.sample(regions, n, rng),
            Self::StraightRandom => (0..n)
                .map(|_| {
                    let idx = floor_f64_to_usize(rng.random() * usize_to_f64(regions.len()))
                        .min(regions.len() - 1);
                    trigger_in(&regions[idx], rng)
                })
                .collect(),
            Self::AllCornerRandom => (0..n)
                .filter_map(|_| place_corner_triggers(regions, rng))
                .collect(),
        }
    }

    /// Policy governing `self` combined with `other`.
    pub fn reconcile(&self, other: &Self) -> Result<Self, ReconcileError> {
        match (self, other) {
            (Self::Immediate, x) | (x, Self::Immediate) => Ok(x.clone()),
            (Self::StraightRandom, Self::AllCornerRandom)
            | (Self::AllCornerRandom, Self::StraightRandom) => {
                Err(ReconcileError::StraightWithAllCorner)
            }
            (x @ (Self::StraightRandom | Self::AllCornerRandom), _)
            | (_, x @ (Self::StraightRandom | Self::AllCornerRandom)) => Ok(x.clone()),
            (Self::Random, _) | (_, Self::Random) => Ok(Self::Random),
            (Self::DistributionRandom(a), Self::DistributionRandom(b)) => {
                if Arc::ptr_eq(a, b) {
                    Ok(self.clone())
                } else {
                    Err(ReconcileError::DistinctDistributions)
                }
            }
        }
    }
}

impl PartialEq for SamplePolicy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::DistributionRandom(a), Self::DistributionRandom(b)) => Arc::ptr_eq(a, b),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

fn trigger_in<R: Prng + ?Sized>(region: &Region, rng: &mut R) -> Region {
    let pos = region.start + (rng.random() * (region.length() - TRIGGER_WIDTH)).floor();
    Region::new(pos, pos + TRIGGER_WIDTH)
}

fn sample_weighted<R: Prng + ?Sized>(regions: &RegionList, n: usize, rng: &mut R) -> Vec<Region> {
    let mut acc = 0.0;
    let weights: Vec<f64> = regions
        .iter()
        .map(|r| {
            acc += r.length();
            acc
        })
        .collect();
    (0..n)
        .map(|_| {
            let threshold = rng.random() * acc;
            let idx = weights
                .iter()
                .position(|&w| w > threshold)
                .unwrap_or(regions.len() - 1);
            trigger_in(&regions[idx], rng)
        })
        .collect()
}

/// Place up to four triggers across sorted candidates and return the earliest.
fn place_corner_triggers<R: Prng + ?Sized>(regions: &RegionList, rng: &mut R) -> Option<Region> {
    let mut candidates = regions.sorted_by_start();
    let mut first = None;
    let mut placed = 0;
    while placed < ALL_CORNER_MAX_TRIGGERS && !candidates.is_empty() {
        let ci = floor_f64_to_usize(rng.random() * usize_to_f64(candidates.len()))
            .min(candidates.len() - 1);
        let c = candidates[ci];
        let start = c.start + (rng.random() * (c.end - c.start - TRIGGER_WIDTH)).floor();
        // corners never overlap, so trimming keeps candidates sorted
        if start + 2.0 * TRIGGER_WIDTH <= c.end {
            candidates[ci] = Region::new(start + TRIGGER_WIDTH, c.end);
        } else {
            candidates.remove(ci);
        }
        candidates.drain(..ci);
        first.get_or_insert(start);
        placed += 1;
    }
    // TODO: keep the later triggers once skills with a cooldown can fire more than once
    first.map(|start| Region::new(start, start + TRIGGER_WIDTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Rule30CARng;

    fn list(regions: &[(f64, f64)]) -> RegionList {
        regions.iter().map(|&(s, e)| Region::new(s, e)).collect()
    }

    #[test]
    fn distribution_policies_are_cached_by_parameters() {
        let a = SamplePolicy::log_normal(-0.4, 0.4);
        let b = SamplePolicy::log_normal(-0.4, 0.4);
        let c = SamplePolicy::log_normal(-0.2, 0.4);
        let d = SamplePolicy::erlang(3, 2.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(SamplePolicy::erlang(3, 2.0), d);
        match (&a, &b) {
            (SamplePolicy::DistributionRandom(x), SamplePolicy::DistributionRandom(y)) => {
                assert!(Arc::ptr_eq(x, y));
            }
            _ => panic!("expected distribution policies"),
        }
    }

    #[test]
    fn reconciliation_follows_precedence() {
        let imm = SamplePolicy::Immediate;
        let rnd = SamplePolicy::Random;
        let dist = SamplePolicy::erlang(3, 2.0);
        let other_dist = SamplePolicy::erlang(5, 1.0);
        let straight = SamplePolicy::StraightRandom;
        let corner = SamplePolicy::AllCornerRandom;

        assert_eq!(imm.reconcile(&rnd), Ok(SamplePolicy::Random));
        assert_eq!(rnd.reconcile(&imm), Ok(SamplePolicy::Random));
        assert_eq!(imm.reconcile(&dist), Ok(dist.clone()));
        assert_eq!(dist.reconcile(&rnd), Ok(SamplePolicy::Random));
        assert_eq!(rnd.reconcile(&dist), Ok(SamplePolicy::Random));
        assert_eq!(dist.reconcile(&dist), Ok(dist.clone()));
        assert_eq!(
            dist.reconcile(&other_dist),
            Err(ReconcileError::DistinctDistributions)
        );
        assert_eq!(dist.reconcile(&straight), Ok(SamplePolicy::StraightRandom));
        assert_eq!(corner.reconcile(&rnd), Ok(SamplePolicy::AllCornerRandom));
        assert_eq!(corner.reconcile(&corner), Ok(SamplePolicy::AllCornerRandom));
        assert_eq!(
            straight.reconcile(&corner),
            Err(ReconcileError::StraightWithAllCorner)
        );
        assert_eq!(
            corner.reconcile(&straight),
            Err(ReconcileError::StraightWithAllCorner)
        );
    }

    #[test]
    fn immediate_takes_the_first_region_once() {
        let mut rng = Rule30CARng::new(1);
        let regions = list(&[(100.0, 200.0), (300.0, 400.0)]);
        let triggers = SamplePolicy::Immediate.sample(&regions, 5, &mut rng);
        assert_eq!(triggers, vec![Region::new(100.0, 200.0)]);
    }

    #[test]
    fn empty_regions_yield_no_triggers() {
        let mut rng = Rule30CARng::new(1);
        for policy in [
            SamplePolicy::Immediate,
            SamplePolicy::Random,
            SamplePolicy::uniform_random(),
            SamplePolicy::StraightRandom,
            SamplePolicy::AllCornerRandom,
        ] {
            assert!(policy.sample(&RegionList::new(), 3, &mut rng).is_empty());
        }
    }

    #[test]
    fn random_triggers_fall_inside_their_region() {
        let mut rng = Rule30CARng::new(42);
        let regions = list(&[(0.0, 100.0), (500.0, 900.0)]);
        for policy in [SamplePolicy::Random, SamplePolicy::StraightRandom] {
            let triggers = policy.sample(&regions, 200, &mut rng);
            assert_eq!(triggers.len(), 200);
            for t in triggers {
                assert!((t.length() - TRIGGER_WIDTH).abs() < f64::EPSILON);
                assert!(
                    regions.iter().any(|r| r.start <= t.start && t.end <= r.end),
                    "{t:?}"
                );
            }
        }
    }

    #[test]
    fn distribution_triggers_run_to_their_region_end() {
        let mut rng = Rule30CARng::new(7);
        let regions = list(&[(600.0, 800.0), (100.0, 300.0)]);
        for policy in [
            SamplePolicy::log_normal(-0.4, 0.4),
            SamplePolicy::erlang(3, 2.0),
            SamplePolicy::uniform_random(),
        ] {
            let triggers = policy.sample(&regions, 50, &mut rng);
            assert_eq!(triggers.len(), 50);
            for t in triggers {
                assert!(t.end == 300.0 || t.end == 800.0, "{t:?}");
                assert!(t.start <= t.end);
            }
        }
    }

    #[test]
    fn single_distribution_sample_lands_at_the_first_region() {
        let mut rng = Rule30CARng::new(3);
        let regions = list(&[(200.0, 400.0)]);
        let triggers = SamplePolicy::erlang(3, 2.0).sample(&regions, 1, &mut rng);
        assert_eq!(triggers, vec![Region::new(200.0, 400.0)]);
    }

    #[test]
    fn all_corner_returns_the_earliest_trigger() {
        let mut rng = Rule30CARng::new(99);
        let corners = list(&[(1000.0, 1150.0), (400.0, 650.0), (650.0, 900.0)]);
        for t in SamplePolicy::AllCornerRandom.sample(&corners, 100, &mut rng) {
            assert!((t.length() - TRIGGER_WIDTH).abs() < f64::EPSILON);
            assert!(corners.iter().any(|c| c.start <= t.start && t.start < c.end));
        }
    }
}
