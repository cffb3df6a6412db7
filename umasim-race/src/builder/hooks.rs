//! Extra skills derived from the horse rather than picked by the user.

use log::debug;
use std::sync::Arc;

use super::skill_data::NEVER_START;
use crate::course::{CourseData, DistanceType, Phase, phase_start};
use crate::horse::{HorseDesc, HorseParameters};
use crate::race_params::Mood;
use crate::region::{Region, RegionList};
use crate::sample_policy::SamplePolicy;
use crate::solver::{
    PendingSkill, Perspective, RaceState, SkillData, SkillEffect, SkillRarity, SkillType,
};

/// Stat above which the passive bonuses start.
const PASSIVE_THRESHOLD: f64 = 1200.0;

const ASITAME_BASE_MODIFIER: f64 = 0.00875;
// [distance type][strategy]
const ASITAME_COEFFICIENT: [[f64; 5]; 4] = [
    [1.0, 0.7, 0.75, 0.7, 1.0],
    [1.0, 0.8, 0.7, 0.75, 1.0],
    [1.0, 0.9, 0.875, 0.86, 1.0],
    [1.0, 0.9, 1.0, 0.9, 1.0],
];

const STAMINA_SYOUBU_BASE_MODIFIER: f64 = 0.0085;

const fn distance_row(distance_type: DistanceType) -> usize {
    match distance_type {
        DistanceType::Short => 0,
        DistanceType::Mile => 1,
        DistanceType::Mid => 2,
        DistanceType::Long => 3,
    }
}

#[must_use]
pub fn asitame_modifier(power: f64, horse: &HorseParameters, course: &CourseData) -> f64 {
    ASITAME_BASE_MODIFIER
        * (power - PASSIVE_THRESHOLD).sqrt()
        * ASITAME_COEFFICIENT[distance_row(course.distance_type)][horse.strategy.index()]
}

#[must_use]
pub fn stamina_syoubu_distance_factor(distance: f64) -> f64 {
    if distance < 2101.0 {
        0.0
    } else if distance < 2201.0 {
        0.5
    } else if distance < 2401.0 {
        1.0
    } else if distance < 2601.0 {
        1.2
    } else {
        1.5
    }
}

#[must_use]
pub fn stamina_syoubu_modifier(stamina: f64, distance: f64) -> f64 {
    (stamina - PASSIVE_THRESHOLD).sqrt()
        * STAMINA_SYOUBU_BASE_MODIFIER
        * stamina_syoubu_distance_factor(distance)
}

/// Sum of `effect_type` modifiers over skills that can trigger on the course.
fn green_bonus(skills: &[SkillData], effect_type: SkillType) -> f64 {
    skills
        .iter()
        .filter(|sd| sd.regions.first().is_some_and(|r| r.start < NEVER_START))
        .filter_map(|sd| sd.effect(effect_type))
        .map(|e| e.modifier)
        .sum()
}

fn last_leg(course: &CourseData) -> RegionList {
    RegionList::single(Region::new(
        phase_start(course.distance, Phase::Late),
        course.distance,
    ))
}

/// Passive effects appended to the compiled skill list before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillHook {
    /// Late-race acceleration from high displayed power.
    Asiwotameru,
    /// Late-race target speed from high raw stamina on long courses.
    StaminaSyoubu,
}

impl SkillHook {
    /// Append this hook's skill to `skills` when the horse qualifies.
    ///
    /// `horse` holds base stats. Asiwotameru reads the displayed power: the
    /// entered stat scaled by mood, without overcap compression.
    pub fn apply(
        self,
        skills: &mut Vec<SkillData>,
        desc: &HorseDesc,
        horse: &HorseParameters,
        mood: Mood,
        course: &CourseData,
    ) {
        match self {
            Self::Asiwotameru => {
                let power =
                    desc.power * mood.coefficient() + green_bonus(skills, SkillType::PowerUp);
                if power <= PASSIVE_THRESHOLD {
                    return;
                }
                let modifier = asitame_modifier(power, horse, course);
                debug!("asiwotameru at power {power:.1}: accel {modifier:.4}");
                skills.push(SkillData {
                    skill_id: "asitame".to_string(),
                    perspective: Perspective::Own,
                    chance: 1.0,
                    rarity: SkillRarity::White,
                    sample_policy: SamplePolicy::Immediate,
                    regions: last_leg(course),
                    extra_condition: None,
                    effects: vec![SkillEffect {
                        effect_type: SkillType::Accel,
                        base_duration: 3.0 / (course.distance / 1000.0),
                        modifier,
                    }],
                });
            }
            Self::StaminaSyoubu => {
                let stamina = horse.raw_stamina + green_bonus(skills, SkillType::StaminaUp);
                if stamina <= PASSIVE_THRESHOLD {
                    return;
                }
                let modifier = stamina_syoubu_modifier(stamina, course.distance);
                debug!("stamina syoubu at stamina {stamina:.1}: target speed {modifier:.4}");
                skills.push(SkillData {
                    skill_id: "staminasyoubu".to_string(),
                    perspective: Perspective::Own,
                    chance: 1.0,
                    rarity: SkillRarity::White,
                    sample_policy: SamplePolicy::Immediate,
                    regions: last_leg(course),
                    extra_condition: Some(Arc::new(|s: &RaceState<'_>| {
                        s.current_speed >= s.last_spurt_speed
                    })),
                    effects: vec![SkillEffect {
                        effect_type: SkillType::TargetSpeed,
                        base_duration: 9999.0,
                        modifier,
                    }],
                });
            }
        }
    }
}

/// Opening-leg acceleration skills given to the default pacer.
#[must_use]
pub fn opening_leg_skills() -> Vec<PendingSkill> {
    let accel = |base_duration| SkillEffect {
        effect_type: SkillType::Accel,
        base_duration,
        modifier: 0.2,
    };
    let opening = Region::new(0.0, 100.0);
    vec![
        PendingSkill::unconditional("201601", SkillRarity::White, opening, vec![accel(3.0)]),
        PendingSkill::unconditional("200532", SkillRarity::White, opening, vec![accel(1.2)]),
    ]
}
