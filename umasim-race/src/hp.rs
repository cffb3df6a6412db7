//! Stamina bookkeeping and the last spurt speed search.

use crate::course::{CourseData, Phase, Surface, phase_start};
use crate::horse::HorseParameters;
use crate::race_params::GroundCondition;
use crate::random::{Prng, Rule30CARng};
use crate::solver::RaceState;

/// Distance before the finish kept in reserve by the spurt search.
const SPURT_MARGIN: f64 = 60.0;
const SPURT_SPEED_STEP: f64 = 0.1;

// indexed by Strategy::index()
const HP_STRATEGY_COEFFICIENT: [f64; 5] = [0.95, 0.89, 1.0, 0.995, 0.86];

// [surface][ground]
const HP_GROUND_MODIFIER: [[f64; 4]; 2] = [[1.0, 1.0, 1.02, 1.02], [1.0, 1.0, 1.01, 1.02]];

/// How a solver spends and queries stamina.
pub trait HpPolicy {
    /// Fix the pool size once gate skills have modified the horse.
    fn init(&mut self, horse: &HorseParameters);
    fn tick(&mut self, state: &RaceState<'_>, dt: f64);
    fn has_remaining_hp(&self) -> bool;
    fn hp_ratio_remaining(&self) -> f64;
    /// Restore `modifier` of the maximum, capped at the maximum.
    fn recover(&mut self, modifier: f64);
    /// Position to begin the spurt at (`-1` for immediately) and the speed to run it at.
    fn last_spurt_pair(
        &mut self,
        state: &RaceState<'_>,
        max_speed: f64,
        base_target_speed: f64,
    ) -> (f64, f64);
}

/// Infinite stamina; the spurt always starts immediately at full speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHpPolicy;

impl HpPolicy for NoopHpPolicy {
    fn init(&mut self, _horse: &HorseParameters) {}

    fn tick(&mut self, _state: &RaceState<'_>, _dt: f64) {}

    fn has_remaining_hp(&self) -> bool {
        true
    }

    fn hp_ratio_remaining(&self) -> f64 {
        1.0
    }

    fn recover(&mut self, _modifier: f64) {}

    fn last_spurt_pair(
        &mut self,
        _state: &RaceState<'_>,
        max_speed: f64,
        _base_target_speed: f64,
    ) -> (f64, f64) {
        (-1.0, max_speed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Status {
    phase: Phase,
    pace_down: bool,
    downhill: bool,
    rushed: bool,
}

impl Status {
    const LAST_LEG: Self = Self {
        phase: Phase::Late,
        pace_down: false,
        downhill: false,
        rushed: false,
    };

    fn modifier(self) -> f64 {
        let mut modifier = 1.0;
        if self.pace_down {
            modifier *= 0.6;
        }
        if self.downhill {
            modifier *= 0.4;
        }
        if self.rushed {
            modifier *= 1.6;
        }
        modifier
    }
}

/// Stamina model of the game.
#[derive(Debug, Clone)]
pub struct GameHpPolicy {
    distance: f64,
    base_speed: f64,
    max_hp: f64,
    hp: f64,
    ground_modifier: f64,
    guts_modifier: f64,
    subpar_accept_chance: u32,
    rng: Rule30CARng,
}

impl GameHpPolicy {
    /// The pool starts at 1.0 so conditions evaluated before [`HpPolicy::init`]
    /// see a horse with stamina left.
    #[must_use]
    pub fn new(course: &CourseData, ground: GroundCondition, rng: Rule30CARng) -> Self {
        let surface = match course.surface {
            Surface::Turf => 0,
            Surface::Dirt => 1,
        };
        Self {
            distance: course.distance,
            base_speed: 20.0 - (course.distance - 2000.0) / 1000.0,
            max_hp: 1.0,
            hp: 1.0,
            ground_modifier: HP_GROUND_MODIFIER[surface][ground.index()],
            guts_modifier: 1.0,
            subpar_accept_chance: 0,
            rng,
        }
    }

    #[must_use]
    pub const fn hp(&self) -> f64 {
        self.hp
    }

    #[must_use]
    pub const fn max_hp(&self) -> f64 {
        self.max_hp
    }

    fn hp_per_second(&self, status: Status, velocity: f64) -> f64 {
        let guts = if status.phase.coefficient_index() >= 2 {
            self.guts_modifier
        } else {
            1.0
        };
        let excess = velocity - self.base_speed + 12.0;
        20.0 * excess * excess / 144.0 * status.modifier() * self.ground_modifier * guts
    }
}

impl HpPolicy for GameHpPolicy {
    fn init(&mut self, horse: &HorseParameters) {
        self.max_hp =
            0.8 * HP_STRATEGY_COEFFICIENT[horse.strategy.index()] * horse.stamina + self.distance;
        self.hp = self.max_hp;
        self.guts_modifier = 1.0 + 200.0 / (600.0 * horse.guts).sqrt();
        self.subpar_accept_chance =
            crate::numbers::round_f64_to_u32((15.0 + 0.05 * horse.wisdom) * 1000.0);
    }

    fn tick(&mut self, state: &RaceState<'_>, dt: f64) {
        let status = Status {
            phase: state.phase,
            pace_down: state.is_pace_down,
            downhill: false,
            rushed: false,
        };
        self.hp -= self.hp_per_second(status, state.current_speed) * dt;
    }

    fn has_remaining_hp(&self) -> bool {
        self.hp > 0.0
    }

    fn hp_ratio_remaining(&self) -> f64 {
        (self.hp / self.max_hp).max(0.0)
    }

    fn recover(&mut self, modifier: f64) {
        self.hp = self.max_hp.min(self.hp + self.max_hp * modifier);
    }

    fn last_spurt_pair(
        &mut self,
        state: &RaceState<'_>,
        max_speed: f64,
        base_target_speed: f64,
    ) -> (f64, f64) {
        let max_dist = self.distance - phase_start(self.distance, Phase::Late);
        let full_spurt_seconds = (max_dist - SPURT_MARGIN) / max_speed;
        let last_leg = Status::LAST_LEG;
        if self.hp >= self.hp_per_second(last_leg, max_speed) * full_spurt_seconds {
            return (-1.0, max_speed);
        }

        let remain = self.distance - SPURT_MARGIN - state.pos;
        let base_cost = self.hp_per_second(last_leg, base_target_speed);
        let mut candidates = Vec::new();
        let mut speed = max_speed - SPURT_SPEED_STEP;
        while speed >= base_target_speed {
            // spend t seconds at `speed`, the rest of `remain` at the base speed, exactly exhausting hp
            let balance = (base_target_speed * self.hp - base_cost * remain)
                / (base_target_speed * self.hp_per_second(last_leg, speed) - base_cost * speed);
            let spurt_seconds = (remain / speed).min(balance.max(0.0));
            let spurt_distance = spurt_seconds * speed + SPURT_MARGIN;
            candidates.push((self.distance - spurt_distance, speed));
            speed -= SPURT_SPEED_STEP;
        }
        let finish_time = |(start, speed): (f64, f64)| {
            (start - state.pos) / base_target_speed + (self.distance - start) / speed
        };
        candidates.sort_by(|&a, &b| finish_time(a).total_cmp(&finish_time(b)));

        for &candidate in &candidates {
            if self.rng.uniform(100_000) <= self.subpar_accept_chance {
                return candidate;
            }
        }
        candidates.last().copied().unwrap_or((-1.0, max_speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::tests::base_horse;
    use crate::course::tests::mile_course;
    use crate::horse::Strategy;
    use std::collections::HashSet;

    fn state(used: &HashSet<String>, pos: f64, speed: f64, phase: Phase) -> RaceState<'_> {
        RaceState {
            accumulatetime: 0.0,
            activate_count: [0; 3],
            activate_count_heal: 0,
            activate_count_later_half: 0,
            current_speed: speed,
            is_last_spurt: false,
            last_spurt_speed: 0.0,
            last_spurt_transition: -1.0,
            phase,
            pos,
            hp_ratio_remaining: 1.0,
            has_remaining_hp: true,
            used_skills: used,
            start_dash: false,
            is_pace_down: false,
        }
    }

    #[test]
    fn pool_scales_with_stamina_and_distance() {
        let course = mile_course();
        let horse = base_horse(Strategy::Sasi);
        let mut hp = GameHpPolicy::new(&course, GroundCondition::Good, Rule30CARng::new(1));
        assert!(hp.has_remaining_hp());
        hp.init(&horse);
        let expected = 0.8 * 1.0 * horse.stamina + 1600.0;
        assert!((hp.max_hp() - expected).abs() < 1e-9);
        assert!((hp.hp_ratio_remaining() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn consumption_grows_with_speed_and_pace_down_saves() {
        let course = mile_course();
        let horse = base_horse(Strategy::Senkou);
        let used = HashSet::new();
        let mut fast = GameHpPolicy::new(&course, GroundCondition::Good, Rule30CARng::new(1));
        fast.init(&horse);
        let mut slow = fast.clone();
        let mut paced = fast.clone();
        fast.tick(&state(&used, 100.0, 20.0, Phase::Early), 1.0);
        slow.tick(&state(&used, 100.0, 15.0, Phase::Early), 1.0);
        let mut pace_down = state(&used, 100.0, 20.0, Phase::Early);
        pace_down.is_pace_down = true;
        paced.tick(&pace_down, 1.0);
        assert!(fast.hp() < slow.hp());
        assert!(paced.hp() > fast.hp());
        let fast_cost = fast.max_hp() - fast.hp();
        let paced_cost = paced.max_hp() - paced.hp();
        assert!((paced_cost - 0.6 * fast_cost).abs() < 1e-9);
    }

    #[test]
    fn recovery_is_capped() {
        let course = mile_course();
        let mut hp = GameHpPolicy::new(&course, GroundCondition::Heavy, Rule30CARng::new(1));
        hp.init(&base_horse(Strategy::Nige));
        hp.recover(0.5);
        assert!((hp.hp() - hp.max_hp()).abs() < 1e-12);
    }

    #[test]
    fn exhausted_horse_picks_a_slower_spurt() {
        let course = mile_course();
        let used = HashSet::new();
        let mut hp = GameHpPolicy::new(&course, GroundCondition::Good, Rule30CARng::new(7));
        hp.init(&base_horse(Strategy::Sasi));
        let at = state(&used, 1070.0, 20.0, Phase::Late);
        // drain almost everything
        hp.recover(-0.95);
        let (start, speed) = hp.last_spurt_pair(&at, 22.0, 20.0);
        assert!(speed < 22.0);
        assert!(speed >= 20.0 - 1e-9);
        assert!(start > at.pos);

        let mut fresh = GameHpPolicy::new(&course, GroundCondition::Good, Rule30CARng::new(7));
        fresh.init(&base_horse(Strategy::Sasi));
        assert_eq!(fresh.last_spurt_pair(&at, 22.0, 20.0), (-1.0, 22.0));
    }

    #[test]
    fn noop_policy_never_runs_out() {
        let used = HashSet::new();
        let mut hp = NoopHpPolicy;
        hp.tick(&state(&used, 0.0, 30.0, Phase::Late), 100.0);
        assert!(hp.has_remaining_hp());
        assert_eq!(
            hp.last_spurt_pair(&state(&used, 0.0, 0.0, Phase::Late), 25.0, 20.0),
            (-1.0, 25.0)
        );
    }
}
