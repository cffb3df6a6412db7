//! Read-only view of a running solver handed to dynamic conditions.

use std::collections::HashSet;

use crate::course::Phase;

/// Snapshot of the live race, rebuilt from the solver whenever a predicate needs it.
#[derive(Debug, Clone, Copy)]
pub struct RaceState<'a> {
    pub accumulatetime: f64,
    /// Skills activated in the early, middle and late race.
    pub activate_count: [u32; 3],
    pub activate_count_heal: u32,
    pub activate_count_later_half: u32,
    pub current_speed: f64,
    pub is_last_spurt: bool,
    pub last_spurt_speed: f64,
    /// Where the spurt starts, `-1` when it starts on entering the late race.
    pub last_spurt_transition: f64,
    pub phase: Phase,
    pub pos: f64,
    pub hp_ratio_remaining: f64,
    pub has_remaining_hp: bool,
    pub used_skills: &'a HashSet<String>,
    pub start_dash: bool,
    pub is_pace_down: bool,
}

impl RaceState<'_> {
    #[must_use]
    pub fn total_activations(&self) -> u32 {
        self.activate_count.iter().sum()
    }
}
