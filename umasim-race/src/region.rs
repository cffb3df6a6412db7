//! Half-open distance intervals and the list algebra conditions narrow them with.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Half-open interval `[start, end)` over course distance in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub start: f64,
    pub end: f64,
}

impl Region {
    /// Canonical empty region produced by a failed intersection.
    pub const EMPTY: Self = Self {
        start: -1.0,
        end: -1.0,
    };

    #[must_use]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end <= start {
            Self::EMPTY
        } else {
            Self::new(start, end)
        }
    }

    #[must_use]
    pub fn fully_contains(&self, other: &Self) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    #[must_use]
    pub fn contains(&self, pos: f64) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Whether this is a real region rather than the empty sentinel.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.start > -1.0
    }
}

pub(crate) fn by_start(a: &Region, b: &Region) -> Ordering {
    a.start.total_cmp(&b.start)
}

/// Ordered collection of regions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionList(SmallVec<[Region; 4]>);

impl RegionList {
    #[must_use]
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    #[must_use]
    pub fn single(region: Region) -> Self {
        let mut list = Self::new();
        list.push(region);
        list
    }

    pub fn push(&mut self, region: Region) {
        self.0.push(region);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Region> {
        self.0.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Region> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Region] {
        &self.0
    }

    /// Sum of all region lengths.
    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.0.iter().map(Region::length).sum()
    }

    /// Copy of the regions sorted by start.
    #[must_use]
    pub fn sorted_by_start(&self) -> Vec<Region> {
        let mut sorted = self.0.to_vec();
        sorted.sort_by(by_start);
        sorted
    }

    /// Apply `f` to every region, flattening its output and dropping empty results.
    #[must_use]
    pub fn rmap<F, I>(&self, mut f: F) -> Self
    where
        F: FnMut(&Region) -> I,
        I: IntoIterator<Item = Region>,
    {
        self.0
            .iter()
            .flat_map(&mut f)
            .filter(Region::is_valid)
            .collect()
    }

    /// Intersect every region with `bounds`.
    #[must_use]
    pub fn clip(&self, bounds: &Region) -> Self {
        self.rmap(|r| Some(r.intersect(bounds)))
    }

    /// Merge both lists into sorted, non-overlapping, non-adjacent regions.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut all: Vec<Region> = self.0.iter().chain(other.0.iter()).copied().collect();
        let mut out = Self::new();
        if all.is_empty() {
            return out;
        }
        all.sort_by(by_start);
        let mut acc = all[0];
        for next in all.into_iter().skip(1) {
            if acc.fully_contains(&next) {
                continue;
            }
            if acc.start <= next.start && next.start <= acc.end {
                acc = Region::new(acc.start, next.end);
            } else if acc.start < next.end && next.end <= acc.end {
                acc = Region::new(next.start, acc.end);
            } else {
                out.push(acc);
                acc = next;
            }
        }
        out.push(acc);
        out
    }
}

impl FromIterator<Region> for RegionList {
    fn from_iter<T: IntoIterator<Item = Region>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RegionList {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for RegionList {
    type Item = Region;
    type IntoIter = smallvec::IntoIter<[Region; 4]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::ops::Index<usize> for RegionList {
    type Output = Region;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn list(regions: &[(f64, f64)]) -> RegionList {
        regions.iter().map(|&(s, e)| Region::new(s, e)).collect()
    }

    fn random_region(rng: &mut SmallRng) -> Region {
        let start = f64::from(rng.gen_range(0_u32..900));
        let len = f64::from(rng.gen_range(1_u32..200));
        Region::new(start, start + len)
    }

    #[test]
    fn intersection_of_disjoint_regions_is_the_sentinel() {
        let a = Region::new(0.0, 10.0);
        let b = Region::new(10.0, 20.0);
        assert_eq!(a.intersect(&b), Region::EMPTY);
        assert!(!Region::EMPTY.is_valid());
        assert_eq!(
            Region::new(0.0, 15.0).intersect(&b),
            Region::new(10.0, 15.0)
        );
    }

    #[test]
    fn rmap_drops_sentinels_and_flattens() {
        let regions = list(&[(0.0, 100.0), (200.0, 300.0)]);
        let bounds = Region::new(50.0, 150.0);
        assert_eq!(regions.clip(&bounds), list(&[(50.0, 100.0)]));

        let split = regions.rmap(|r| {
            let mid = (r.start + r.end) / 2.0;
            [Region::new(r.start, mid), Region::new(mid, r.end)]
        });
        assert_eq!(split.len(), 4);
    }

    #[test]
    fn union_merges_overlaps_and_keeps_gaps() {
        let a = list(&[(50.0, 80.0), (0.0, 10.0)]);
        let b = list(&[(5.0, 20.0), (60.0, 70.0), (100.0, 120.0)]);
        assert_eq!(
            a.union(&b),
            list(&[(0.0, 20.0), (50.0, 80.0), (100.0, 120.0)])
        );
        assert!(RegionList::new().union(&RegionList::new()).is_empty());
    }

    #[test]
    fn union_joins_adjacent_regions() {
        let a = list(&[(0.0, 10.0)]);
        let b = list(&[(10.0, 20.0)]);
        assert_eq!(a.union(&b), list(&[(0.0, 20.0)]));
    }

    #[test]
    fn intersection_is_symmetric() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..2_000 {
            let a = random_region(&mut rng);
            let b = random_region(&mut rng);
            assert_eq!(a.intersect(&b), b.intersect(&a));
        }
    }

    #[test]
    fn union_is_idempotent_disjoint_and_covering() {
        let mut rng = SmallRng::seed_from_u64(0xface);
        for _ in 0..500 {
            let n = rng.gen_range(0..8);
            let input: RegionList = (0..n).map(|_| random_region(&mut rng)).collect();
            let merged = input.union(&RegionList::new());

            assert_eq!(merged.union(&RegionList::new()), merged);

            for pair in merged.as_slice().windows(2) {
                assert!(pair[0].end < pair[1].start, "{pair:?}");
            }

            for probe in 0..1_100 {
                let pos = f64::from(probe);
                let covered_in = input.iter().any(|r| r.contains(pos));
                let covering = merged.iter().filter(|r| r.contains(pos)).count();
                assert_eq!(covering, usize::from(covered_in), "pos {pos}");
            }
        }
    }
}
