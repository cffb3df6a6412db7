//! Skill descriptors consumed by the solver.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conditions::DynamicCondition;
use crate::course::numeric_enum;
use crate::race_params::ParamError;
use crate::region::{Region, RegionList};
use crate::sample_policy::SamplePolicy;

numeric_enum!(
    /// Effect kinds the simulator implements. Anything else is loaded as [`SkillType::Noop`].
    SkillType, "skill type", ParamError, {
        Noop = 0,
        SpeedUp = 1,
        StaminaUp = 2,
        PowerUp = 3,
        GutsUp = 4,
        WisdomUp = 5,
        Recovery = 9,
        CurrentSpeed = 21,
        CurrentSpeedWithNaturalDeceleration = 22,
        TargetSpeed = 27,
        Accel = 31,
        ActivateRandomGold = 37,
    }
);

impl SkillType {
    /// Read a raw effect type, mapping unsupported kinds to `Noop`.
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        Self::try_from(raw).unwrap_or(Self::Noop)
    }

    #[must_use]
    pub const fn is_stat_up(self) -> bool {
        matches!(
            self,
            Self::SpeedUp | Self::StaminaUp | Self::PowerUp | Self::GutsUp | Self::WisdomUp
        )
    }
}

numeric_enum!(
    /// Skill rarity; every unique tier collapses to [`SkillRarity::Unique`].
    SkillRarity, "skill rarity", ParamError, { White = 1, Gold = 2, Unique = 3, Evolution = 6 }
);

impl SkillRarity {
    /// Map raw rarity, where 3, 4 and 5 are the unique star tiers.
    pub fn from_raw(raw: i64) -> Result<Self, ParamError> {
        match raw {
            3..=5 => Ok(Self::Unique),
            other => Self::try_from(other),
        }
    }
}

/// Whose point of view a skill is evaluated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// The simulated horse's own skill.
    #[default]
    Own,
    /// A skill used by another runner that may affect this one.
    Other,
    /// Apply every effect regardless of its target.
    Any,
}

/// Effect target code: the user itself.
pub const TARGET_SELF: i64 = 1;
/// Effect target code: every runner.
pub const TARGET_ALL: i64 = 2;

/// Whether an effect with `target` applies to the simulated horse from `perspective`.
#[must_use]
pub fn is_target(perspective: Perspective, target: i64) -> bool {
    target == TARGET_ALL
        || perspective == Perspective::Any
        || ((perspective == Perspective::Own) == (target == TARGET_SELF))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillEffect {
    pub effect_type: SkillType,
    /// Seconds at 1000 m; negative for effects without a duration.
    pub base_duration: f64,
    pub modifier: f64,
}

/// A skill compiled against one horse and course, shared by every sample of a batch.
#[derive(Clone)]
pub struct SkillData {
    pub skill_id: String,
    pub perspective: Perspective,
    pub chance: f64,
    pub rarity: SkillRarity,
    pub sample_policy: SamplePolicy,
    pub regions: RegionList,
    pub extra_condition: Option<DynamicCondition>,
    pub effects: Vec<SkillEffect>,
}

impl SkillData {
    /// First effect of the given kind, if any.
    #[must_use]
    pub fn effect(&self, effect_type: SkillType) -> Option<&SkillEffect> {
        self.effects.iter().find(|e| e.effect_type == effect_type)
    }

    /// Whether the skill has a reachable trigger region on the course.
    #[must_use]
    pub fn reachable(&self, distance: f64) -> bool {
        self.regions.first().is_some_and(|r| r.start < distance)
    }

    /// Pair this skill with one sampled trigger.
    #[must_use]
    pub fn pending(&self, trigger: Region) -> PendingSkill {
        PendingSkill {
            skill_id: self.skill_id.clone(),
            perspective: self.perspective,
            rarity: self.rarity,
            trigger,
            extra_condition: self.extra_condition.clone(),
            effects: self.effects.clone(),
            chance: self.chance,
        }
    }
}

impl fmt::Debug for SkillData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillData")
            .field("skill_id", &self.skill_id)
            .field("perspective", &self.perspective)
            .field("rarity", &self.rarity)
            .field("sample_policy", &self.sample_policy.name())
            .field("regions", &self.regions)
            .field("dynamic", &self.extra_condition.is_some())
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

/// A skill with one concrete trigger, owned by exactly one solver.
#[derive(Clone)]
pub struct PendingSkill {
    pub skill_id: String,
    pub perspective: Perspective,
    pub rarity: SkillRarity,
    pub trigger: Region,
    pub extra_condition: Option<DynamicCondition>,
    pub effects: Vec<SkillEffect>,
    pub chance: f64,
}

impl PendingSkill {
    /// Skill that always activates inside `trigger`.
    #[must_use]
    pub fn unconditional(
        skill_id: impl Into<String>,
        rarity: SkillRarity,
        trigger: Region,
        effects: Vec<SkillEffect>,
    ) -> Self {
        Self {
            skill_id: skill_id.into(),
            perspective: Perspective::Own,
            rarity,
            trigger,
            extra_condition: None,
            effects,
            chance: 1.0,
        }
    }

    /// Gold skills without stat effects can be fired by random-gold effects.
    #[must_use]
    pub fn is_random_gold_candidate(&self) -> bool {
        self.rarity == SkillRarity::Gold && self.effects.iter().all(|e| !e.effect_type.is_stat_up())
    }
}

impl fmt::Debug for PendingSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSkill")
            .field("skill_id", &self.skill_id)
            .field("trigger", &self.trigger)
            .field("dynamic", &self.extra_condition.is_some())
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}
