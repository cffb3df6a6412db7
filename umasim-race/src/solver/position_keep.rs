//! Pace-down behavior of non-leading runners trailing a pacer.

use log::trace;

use super::timer::{TimerId, Timers};
use crate::course::Phase;
use crate::horse::Strategy;
use crate::random::Prng;

// indexed by Strategy::index()
const BASE_MIN_THRESHOLD: [f64; 5] = [0.0, 3.0, 6.5, 7.5, 0.0];
const BASE_MAX_THRESHOLD: [f64; 5] = [0.0, 5.0, 7.0, 8.0, 0.0];

/// Seconds before pace-down can be entered again.
const COOLDOWN: f64 = 3.0;
/// Position keep stops after this many course sections.
const SECTIONS: f64 = 10.0;
const SECTIONS_PER_COURSE: f64 = 24.0;

// [opening leg, middle leg]
const EXIT_SCALE: [f64; 2] = [1.0, 0.9];
const SPEED_COEFFICIENT: [f64; 2] = [0.915, 0.945];

fn course_factor(distance: f64) -> f64 {
    0.0008 * (distance - 1000.0) + 1.0
}

/// Gap below which pace-down begins. Senkou ignores the course factor.
#[must_use]
pub fn min_threshold(strategy: Strategy, distance: f64) -> f64 {
    let base = BASE_MIN_THRESHOLD[strategy.index()];
    if strategy == Strategy::Senkou {
        base
    } else {
        base * course_factor(distance)
    }
}

#[must_use]
pub fn max_threshold(strategy: Strategy, distance: f64) -> f64 {
    BASE_MAX_THRESHOLD[strategy.index()] * course_factor(distance)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Normal,
    PaceDown {
        exit_gap: f64,
        exit_position: f64,
        speed_coefficient: f64,
    },
}

/// Inputs read from the solver each step.
#[derive(Debug, Clone, Copy)]
pub struct KeepInput {
    pub pos: f64,
    pub pacer_pos: f64,
    pub phase: Phase,
    /// Any target speed skill is running.
    pub speed_skill_active: bool,
}

#[derive(Debug, Clone)]
pub struct PositionKeep {
    min_threshold: f64,
    max_threshold: f64,
    section_length: f64,
    end: f64,
    cooldown: TimerId,
    mode: Mode,
}

impl PositionKeep {
    pub fn new(strategy: Strategy, distance: f64, timers: &mut Timers) -> Self {
        let section_length = distance / SECTIONS_PER_COURSE;
        Self {
            min_threshold: min_threshold(strategy, distance),
            max_threshold: max_threshold(strategy, distance),
            section_length,
            end: section_length * SECTIONS,
            cooldown: timers.start(0.0),
            mode: Mode::Normal,
        }
    }

    #[must_use]
    pub const fn is_pace_down(&self) -> bool {
        matches!(self.mode, Mode::PaceDown { .. })
    }

    /// Multiplier on the base target speed while pacing down.
    #[must_use]
    pub const fn speed_coefficient(&self) -> f64 {
        match self.mode {
            Mode::Normal => 1.0,
            Mode::PaceDown {
                speed_coefficient, ..
            } => speed_coefficient,
        }
    }

    fn exit(&mut self, timers: &mut Timers, pos: f64) {
        self.mode = Mode::Normal;
        timers.set(self.cooldown, -COOLDOWN);
        trace!("pace down ends at {pos:.2}");
    }

    pub fn update<R: Prng + ?Sized>(&mut self, input: KeepInput, timers: &mut Timers, rng: &mut R) {
        let gap = input.pacer_pos - input.pos;
        match self.mode {
            Mode::PaceDown {
                exit_gap,
                exit_position,
                ..
            } => {
                if input.pos >= self.end
                    || gap > exit_gap
                    || input.pos >= exit_position
                    || input.speed_skill_active
                {
                    self.exit(timers, input.pos);
                }
            }
            Mode::Normal => {
                if input.pos >= self.end
                    || gap >= self.min_threshold
                    || input.speed_skill_active
                    || !timers.expired(self.cooldown)
                {
                    return;
                }
                let leg = input.phase.coefficient_index().min(1);
                let max = self.max_threshold * EXIT_SCALE[leg];
                let exit_gap = self.min_threshold + rng.random() * (max - self.min_threshold);
                self.mode = Mode::PaceDown {
                    exit_gap,
                    exit_position: input.pos + self.section_length,
                    speed_coefficient: SPEED_COEFFICIENT[leg],
                };
                trace!(
                    "pace down at {:.2}, gap {gap:.2}, exits beyond {exit_gap:.2}",
                    input.pos
                );
            }
        }
    }
}
