//! Single-horse race integrator.
//!
//! [`RaceSolver::step`] advances the race by one timestep with velocity
//! Verlet integration: half a velocity update, position, clocks, hills,
//! phase, skill activations, position keep, last spurt planning, target
//! speed and forces, then the rest of the velocity update clamped to
//! `[min_speed, MAX_SPEED]`. Skills are owned by the solver; random-gold
//! effects rewrite the triggers of the solver's own pending list only.

mod position_keep;
mod skill;
mod state;
mod timer;

use log::trace;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::course::{CourseData, CourseError, Phase, Slope, phase_start};
use crate::horse::HorseParameters;
use crate::hp::HpPolicy;
use crate::numbers::floor_f64_to_usize;
use crate::random::{Prng, Rule30CARng};
use crate::region::Region;

pub use position_keep::{KeepInput, PositionKeep, max_threshold, min_threshold};
pub use skill::{
    PendingSkill, Perspective, SkillData, SkillEffect, SkillRarity, SkillType, TARGET_ALL,
    TARGET_SELF, is_target,
};
pub use state::RaceState;
pub use timer::{TimerId, Timers};

// [strategy][phase]
const SPEED_STRATEGY_PHASE_COEFFICIENT: [[f64; 3]; 5] = [
    [1.0, 0.98, 0.962],
    [0.978, 0.991, 0.975],
    [0.938, 0.998, 0.994],
    [0.931, 1.0, 1.0],
    [1.063, 0.962, 0.95],
];
const SPEED_DISTANCE_PROFICIENCY: [f64; 8] = [1.05, 1.0, 0.9, 0.8, 0.6, 0.4, 0.2, 0.1];

const ACCEL_STRATEGY_PHASE_COEFFICIENT: [[f64; 3]; 5] = [
    [1.0, 1.0, 0.996],
    [0.985, 1.0, 0.996],
    [0.975, 1.0, 1.0],
    [0.945, 1.0, 0.997],
    [1.17, 0.94, 0.956],
];
const ACCEL_SURFACE_PROFICIENCY: [f64; 8] = [1.05, 1.0, 0.9, 0.8, 0.7, 0.5, 0.3, 0.1];
const ACCEL_DISTANCE_PROFICIENCY: [f64; 8] = [1.0, 1.0, 1.0, 1.0, 1.0, 0.6, 0.5, 0.4];

const BASE_ACCEL: f64 = 0.0006;
const UPHILL_BASE_ACCEL: f64 = 0.0004;
const START_DASH_ACCEL: f64 = 24.0;
/// Fraction of the base speed at which the start dash ends.
const START_DASH_END: f64 = 0.85;
const START_SPEED: f64 = 3.0;
const PHASE_DECELERATION: [f64; 3] = [-1.2, -0.8, -1.0];
const PACE_DOWN_DECELERATION: f64 = -0.5;
/// Hard cap on speed in m/s.
pub const MAX_SPEED: f64 = 30.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error(transparent)]
    Course(#[from] CourseError),
}

/// Called with the live state and skill id when a skill starts or stops.
pub type SkillCallback = Arc<dyn Fn(&RaceState<'_>, &str) + Send + Sync>;

#[must_use]
pub fn base_speed(course: &CourseData) -> f64 {
    20.0 - (course.distance - 2000.0) / 1000.0
}

fn speed_bonus(horse: &HorseParameters) -> f64 {
    (500.0 * horse.speed).sqrt() * SPEED_DISTANCE_PROFICIENCY[horse.distance_aptitude.index()] * 0.002
}

/// Target speed outside the last spurt for phase index `phase` (0..=2).
#[must_use]
pub fn base_target_speed(horse: &HorseParameters, course: &CourseData, phase: usize) -> f64 {
    let strategy = SPEED_STRATEGY_PHASE_COEFFICIENT[horse.strategy.index()][phase];
    let late = if phase == 2 { speed_bonus(horse) } else { 0.0 };
    base_speed(course) * strategy + late
}

#[must_use]
pub fn last_spurt_speed(horse: &HorseParameters, course: &CourseData) -> f64 {
    (base_target_speed(horse, course, 2) + 0.01 * base_speed(course)) * 1.05
        + speed_bonus(horse)
        + (450.0 * horse.guts).powf(0.597) * 0.0001
}

fn base_accel(base: f64, horse: &HorseParameters, phase: usize) -> f64 {
    base * (500.0 * horse.power).sqrt()
        * ACCEL_STRATEGY_PHASE_COEFFICIENT[horse.strategy.index()][phase]
        * ACCEL_SURFACE_PROFICIENCY[horse.surface_aptitude.index()]
        * ACCEL_DISTANCE_PROFICIENCY[horse.distance_aptitude.index()]
}

/// Uphill tracking over slopes sorted by start.
#[derive(Debug, Clone)]
struct Hills {
    slopes: Vec<Slope>,
    next: usize,
    current: Option<usize>,
}

impl Hills {
    fn new(course: &CourseData) -> Result<Self, CourseError> {
        Ok(Self {
            slopes: course.sorted_slopes()?.to_vec(),
            next: 0,
            current: None,
        })
    }

    fn update(&mut self, pos: f64) {
        match self.current {
            None => {
                if let Some(slope) = self.slopes.get(self.next) {
                    if pos >= slope.start {
                        if slope.slope > 0.0 {
                            self.current = Some(self.next);
                        }
                        self.next += 1;
                    }
                }
            }
            Some(idx) => {
                if pos > self.slopes[idx].end() {
                    self.current = None;
                }
            }
        }
    }

    fn uphill(&self) -> Option<&Slope> {
        self.current.map(|idx| &self.slopes[idx])
    }
}

#[derive(Debug, Clone)]
struct ActiveSkill {
    skill_id: String,
    timer: TimerId,
    modifier: f64,
}

fn drain_expired(list: &mut Vec<ActiveSkill>, timers: &mut Timers, out: &mut Vec<String>) {
    list.retain(|skill| {
        if timers.expired(skill.timer) {
            timers.release(skill.timer);
            out.push(skill.skill_id.clone());
            false
        } else {
            true
        }
    });
}

/// Everything needed to start one race.
pub struct SolverParams {
    pub horse: HorseParameters,
    pub course: Arc<CourseData>,
    pub rng: Rule30CARng,
    pub skills: Vec<PendingSkill>,
    pub hp: Box<dyn HpPolicy>,
    pub pacer: Option<RaceSolver>,
    pub on_skill_activate: Option<SkillCallback>,
    pub on_skill_deactivate: Option<SkillCallback>,
}

// Expands to field-level borrows so the view can coexist with `&mut self.hp`.
macro_rules! race_state {
    ($s:ident) => {
        RaceState {
            accumulatetime: $s.accumulatetime,
            activate_count: $s.activate_count,
            activate_count_heal: $s.activate_count_heal,
            activate_count_later_half: $s.activate_count_later_half,
            current_speed: $s.current_speed,
            is_last_spurt: $s.is_last_spurt,
            last_spurt_speed: $s.last_spurt_speed,
            last_spurt_transition: $s.last_spurt_transition,
            phase: $s.phase,
            pos: $s.pos,
            hp_ratio_remaining: $s.hp.hp_ratio_remaining(),
            has_remaining_hp: $s.hp.has_remaining_hp(),
            used_skills: &$s.used_skills,
            start_dash: $s.start_dash,
            is_pace_down: $s.position_keep.is_pace_down(),
        }
    };
}

pub struct RaceSolver {
    horse: HorseParameters,
    course: Arc<CourseData>,
    hp: Box<dyn HpPolicy>,
    rng: Rule30CARng,
    pacer: Option<Box<RaceSolver>>,
    pending_skills: Vec<PendingSkill>,
    used_skills: HashSet<String>,
    timers: Timers,
    active_target_speed: Vec<ActiveSkill>,
    active_accel: Vec<ActiveSkill>,
    current_speed_modifier: f64,
    activate_count: [u32; 3],
    activate_count_heal: u32,
    activate_count_later_half: u32,
    accumulatetime: f64,
    pos: f64,
    current_speed: f64,
    target_speed: f64,
    min_speed: f64,
    accel: f64,
    start_dash: bool,
    phase: Phase,
    hills: Hills,
    base_speed: f64,
    base_target_speed: [f64; 3],
    // [flat phase 0..=2, uphill phase 0..=2]
    base_accel: [f64; 6],
    is_last_spurt: bool,
    spurt_planned: bool,
    last_spurt_speed: f64,
    last_spurt_transition: f64,
    position_keep: PositionKeep,
    on_skill_activate: Option<SkillCallback>,
    on_skill_deactivate: Option<SkillCallback>,
}

impl RaceSolver {
    /// Set up the race and run the gate round of skill activations.
    ///
    /// Speed floors and per-phase targets are derived after the gate round so
    /// that stat skills firing at the start are reflected in them.
    pub fn new(params: SolverParams) -> Result<Self, SolverError> {
        let SolverParams {
            horse,
            course,
            rng,
            skills,
            hp,
            pacer,
            on_skill_activate,
            on_skill_deactivate,
        } = params;
        let hills = Hills::new(&course)?;
        let mut timers = Timers::new();
        let position_keep = PositionKeep::new(horse.strategy, course.distance, &mut timers);
        let base = base_speed(&course);
        let mut solver = Self {
            horse,
            course,
            hp,
            rng,
            pacer: pacer.map(Box::new),
            pending_skills: skills,
            used_skills: HashSet::new(),
            timers,
            active_target_speed: Vec::new(),
            active_accel: Vec::new(),
            current_speed_modifier: 0.0,
            activate_count: [0; 3],
            activate_count_heal: 0,
            activate_count_later_half: 0,
            accumulatetime: 0.0,
            pos: 0.0,
            current_speed: START_SPEED,
            target_speed: START_DASH_END * base,
            min_speed: START_DASH_END * base,
            accel: 0.0,
            start_dash: true,
            phase: Phase::Early,
            hills,
            base_speed: base,
            base_target_speed: [0.0; 3],
            base_accel: [0.0; 6],
            is_last_spurt: false,
            spurt_planned: false,
            last_spurt_speed: 0.0,
            last_spurt_transition: -1.0,
            position_keep,
            on_skill_activate,
            on_skill_deactivate,
        };
        solver.hills.update(0.0);
        solver.process_skill_activations();

        let horse = &solver.horse;
        let course = &*solver.course;
        solver.min_speed = START_DASH_END * base + (200.0 * horse.guts).sqrt() * 0.001;
        solver.base_target_speed = [0, 1, 2].map(|phase| base_target_speed(horse, course, phase));
        solver.last_spurt_speed = last_spurt_speed(horse, course);
        solver.base_accel = [0, 1, 2, 3, 4, 5].map(|i| {
            let constant = if i > 2 { UPHILL_BASE_ACCEL } else { BASE_ACCEL };
            base_accel(constant, horse, i % 3)
        });
        solver.hp.init(&solver.horse);
        solver.update_target_speed();
        solver.apply_forces();
        Ok(solver)
    }

    /// Advance the race by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.step(dt);
        }
        let cap = self.speed_cap();
        let halfv = (self.current_speed + 0.5 * dt * self.accel).min(cap);
        self.pos += halfv * dt;
        self.accumulatetime += dt;
        self.timers.advance(dt);
        self.hills.update(self.pos);
        self.update_phase();
        self.process_skill_activations();
        self.apply_position_keep();
        self.update_last_spurt_state();
        self.update_target_speed();
        self.apply_forces();
        self.tick_hp(dt);

        let cap = self.speed_cap();
        let mut speed = (halfv + 0.5 * dt * self.accel).min(cap) + self.current_speed_modifier;
        if !self.start_dash {
            speed = speed.max(self.min_speed);
        }
        self.current_speed = speed.min(MAX_SPEED);
        self.current_speed_modifier = 0.0;
    }

    /// Step until the finish line and return the number of steps taken.
    pub fn run_to_finish(&mut self, dt: f64) -> usize {
        let mut steps = 0;
        while !self.finished() {
            self.step(dt);
            steps += 1;
        }
        steps
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.pos >= self.course.distance
    }

    #[must_use]
    pub fn state(&self) -> RaceState<'_> {
        race_state!(self)
    }

    #[must_use]
    pub const fn pos(&self) -> f64 {
        self.pos
    }

    #[must_use]
    pub const fn accumulatetime(&self) -> f64 {
        self.accumulatetime
    }

    #[must_use]
    pub const fn current_speed(&self) -> f64 {
        self.current_speed
    }

    #[must_use]
    pub const fn target_speed(&self) -> f64 {
        self.target_speed
    }

    #[must_use]
    pub const fn min_speed(&self) -> f64 {
        self.min_speed
    }

    #[must_use]
    pub const fn accel(&self) -> f64 {
        self.accel
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn horse(&self) -> &HorseParameters {
        &self.horse
    }

    #[must_use]
    pub fn course(&self) -> &CourseData {
        &self.course
    }

    #[must_use]
    pub fn pacer(&self) -> Option<&Self> {
        self.pacer.as_deref()
    }

    #[must_use]
    pub const fn is_pace_down(&self) -> bool {
        self.position_keep.is_pace_down()
    }

    #[must_use]
    pub const fn is_last_spurt(&self) -> bool {
        self.is_last_spurt
    }

    #[must_use]
    pub fn hp_ratio_remaining(&self) -> f64 {
        self.hp.hp_ratio_remaining()
    }

    #[must_use]
    pub const fn used_skills(&self) -> &HashSet<String> {
        &self.used_skills
    }

    #[must_use]
    pub fn pending_skills(&self) -> &[PendingSkill] {
        &self.pending_skills
    }

    fn speed_cap(&self) -> f64 {
        // let the horse decelerate when the target drops below its speed
        if self.current_speed > self.target_speed {
            MAX_SPEED
        } else {
            self.target_speed
        }
    }

    fn update_phase(&mut self) {
        while let Some(next) = self.phase.next() {
            if self.pos < phase_start(self.course.distance, next) {
                break;
            }
            self.phase = next;
        }
    }

    fn tick_hp(&mut self, dt: f64) {
        let state = race_state!(self);
        self.hp.tick(&state, dt);
    }

    fn process_skill_activations(&mut self) {
        let mut expired = Vec::new();
        drain_expired(&mut self.active_target_speed, &mut self.timers, &mut expired);
        drain_expired(&mut self.active_accel, &mut self.timers, &mut expired);
        if let Some(callback) = &self.on_skill_deactivate {
            let state = self.state();
            for skill_id in &expired {
                callback(&state, skill_id);
            }
        }

        let mut pending = std::mem::take(&mut self.pending_skills);
        let mut i = pending.len();
        while i > 0 {
            i -= 1;
            let skill = &pending[i];
            // triggers are half-open: at `end` the skill is out of range
            if self.pos >= skill.trigger.end {
                pending.remove(i);
            } else if self.pos >= skill.trigger.start && self.condition_holds(skill) {
                let skill = pending.remove(i);
                self.activate(&skill, &mut pending);
            }
        }
        self.pending_skills = pending;
    }

    fn condition_holds(&self, skill: &PendingSkill) -> bool {
        skill
            .extra_condition
            .as_ref()
            .is_none_or(|check| check(&self.state()))
    }

    fn activate(&mut self, skill: &PendingSkill, pending: &mut [PendingSkill]) {
        self.activate_count[self.phase.coefficient_index()] += 1;
        if self.pos >= self.course.distance / 2.0 {
            self.activate_count_later_half += 1;
        }
        self.used_skills.insert(skill.skill_id.clone());
        trace!(
            "skill {} activates at {:.2} ({:.3}s)",
            skill.skill_id, self.pos, self.accumulatetime
        );
        for effect in &skill.effects {
            self.apply_effect(&skill.skill_id, effect, pending);
        }
        if let Some(callback) = &self.on_skill_activate {
            callback(&self.state(), &skill.skill_id);
        }
    }

    fn apply_effect(&mut self, skill_id: &str, effect: &SkillEffect, pending: &mut [PendingSkill]) {
        let duration = effect.base_duration * self.course.distance / 1000.0;
        let modifier = effect.modifier;
        let horse = &mut self.horse;
        match effect.effect_type {
            SkillType::SpeedUp => horse.speed = (horse.speed + modifier).max(1.0),
            SkillType::StaminaUp => {
                horse.stamina = (horse.stamina + modifier).max(1.0);
                horse.raw_stamina = (horse.raw_stamina + modifier).max(1.0);
            }
            SkillType::PowerUp => horse.power = (horse.power + modifier).max(1.0),
            SkillType::GutsUp => horse.guts = (horse.guts + modifier).max(1.0),
            SkillType::WisdomUp => horse.wisdom = (horse.wisdom + modifier).max(1.0),
            SkillType::Recovery => {
                self.activate_count_heal += 1;
                self.hp.recover(modifier);
            }
            SkillType::CurrentSpeed | SkillType::CurrentSpeedWithNaturalDeceleration => {
                self.current_speed_modifier += modifier;
            }
            SkillType::TargetSpeed => {
                let timer = self.timers.countdown(duration);
                self.active_target_speed.push(ActiveSkill {
                    skill_id: skill_id.to_string(),
                    timer,
                    modifier,
                });
            }
            SkillType::Accel => {
                let timer = self.timers.countdown(duration);
                self.active_accel.push(ActiveSkill {
                    skill_id: skill_id.to_string(),
                    timer,
                    modifier,
                });
            }
            SkillType::ActivateRandomGold => {
                self.activate_random_gold(floor_f64_to_usize(modifier), pending);
            }
            SkillType::Noop => {}
        }
    }

    /// Fire `count` still-pending gold skills chosen uniformly at random.
    fn activate_random_gold(&mut self, count: usize, pending: &mut [PendingSkill]) {
        let mut eligible: Vec<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, skill)| {
                skill.trigger.end > self.pos
                    && skill.is_random_gold_candidate()
                    && !skill
                        .effects
                        .iter()
                        .any(|e| e.effect_type == SkillType::ActivateRandomGold)
            })
            .map(|(idx, _)| idx)
            .collect();
        let n = count.min(eligible.len());
        for i in 0..n {
            let remaining = u32::try_from(eligible.len() - i).unwrap_or(u32::MAX);
            let j = i + usize::try_from(self.rng.uniform(remaining)).unwrap_or(0);
            eligible.swap(i, j);
        }
        for &idx in &eligible[..n] {
            // zero-length trigger so the normal pass drops it
            pending[idx].trigger = Region::new(self.pos, self.pos);
            let gold = pending[idx].clone();
            self.activate(&gold, pending);
        }
    }

    fn apply_position_keep(&mut self) {
        if self.horse.strategy.is_front_runner() {
            return;
        }
        let Some(pacer_pos) = self.pacer.as_ref().map(|p| p.pos) else {
            return;
        };
        let input = KeepInput {
            pos: self.pos,
            pacer_pos,
            phase: self.phase,
            speed_skill_active: !self.active_target_speed.is_empty(),
        };
        self.position_keep
            .update(input, &mut self.timers, &mut self.rng);
    }

    fn update_last_spurt_state(&mut self) {
        if self.is_last_spurt || self.phase.coefficient_index() < 2 {
            return;
        }
        if !self.spurt_planned {
            let state = race_state!(self);
            let (transition, speed) =
                self.hp
                    .last_spurt_pair(&state, self.last_spurt_speed, self.base_target_speed[2]);
            self.last_spurt_transition = transition;
            self.last_spurt_speed = speed;
            self.spurt_planned = true;
            trace!("last spurt from {transition:.2} at {speed:.3} m/s");
        }
        if self.pos >= self.last_spurt_transition {
            self.is_last_spurt = true;
        }
    }

    fn update_target_speed(&mut self) {
        if !self.start_dash {
            let base = if self.is_last_spurt {
                self.last_spurt_speed
            } else {
                self.base_target_speed[self.phase.coefficient_index()]
                    * self.position_keep.speed_coefficient()
            };
            let skills: f64 = self.active_target_speed.iter().map(|s| s.modifier).sum();
            self.target_speed = if self.hp.has_remaining_hp() {
                base + skills
            } else {
                self.min_speed
            };
        }
        if let Some(hill) = self.hills.uphill() {
            let penalty = hill.slope / 10000.0 * 200.0 / self.horse.power;
            self.target_speed = (self.target_speed - penalty).max(self.min_speed);
        }
    }

    fn apply_forces(&mut self) {
        if self.start_dash && self.current_speed >= START_DASH_END * self.base_speed {
            self.start_dash = false;
        }
        let phase = self.phase.coefficient_index();
        if self.current_speed > self.target_speed {
            self.accel = if self.position_keep.is_pace_down() {
                PACE_DOWN_DECELERATION
            } else {
                PHASE_DECELERATION[phase]
            };
            return;
        }
        let uphill = if self.hills.uphill().is_some() { 3 } else { 0 };
        self.accel = self.base_accel[phase + uphill];
        if self.start_dash {
            self.accel += START_DASH_ACCEL;
        }
        self.accel += self.active_accel.iter().map(|s| s.modifier).sum::<f64>();
    }
}

impl fmt::Debug for RaceSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaceSolver")
            .field("pos", &self.pos)
            .field("current_speed", &self.current_speed)
            .field("target_speed", &self.target_speed)
            .field("accel", &self.accel)
            .field("phase", &self.phase)
            .field("start_dash", &self.start_dash)
            .field("pending_skills", &self.pending_skills.len())
            .field("has_pacer", &self.pacer.is_some())
            .finish_non_exhaustive()
    }
}
