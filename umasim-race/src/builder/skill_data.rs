//! Compiling catalog skills against one horse, course and race.

use log::debug;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::BuildError;
use crate::conditions::{ConditionContext, ConditionLookup};
use crate::parser::parse;
use crate::region::{Region, RegionList};
use crate::sample_policy::SamplePolicy;
use crate::skills::SkillEntry;
use crate::solver::{Perspective, RaceState, SkillData, SkillRarity};

/// Start of the placeholder region for skills that can never trigger on their own.
pub const NEVER_START: f64 = 9999.0;

/// A skill the builder was asked to add.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRequest {
    pub skill_id: String,
    pub perspective: Perspective,
    /// Activation chance used for skills of other runners.
    pub chance: f64,
}

fn places_second_trigger(condition: &str) -> bool {
    static MULTI: OnceLock<Option<Regex>> = OnceLock::new();
    MULTI
        .get_or_init(|| Regex::new("is_activate_other_skill_detail|is_used_skill_id").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(condition))
}

/// Resolve every alternative of `entry` whose conditions can hold.
///
/// Only the first satisfiable alternative is kept unless a later one waits
/// on another skill. When none can hold, the first alternative is placed
/// past the finish with a condition that never passes so random-gold
/// effects can still fire it.
pub fn build_skill_data<L: ConditionLookup>(
    entry: &SkillEntry,
    request: &SkillRequest,
    ctx: &ConditionContext<'_>,
    whole: &RegionList,
    lookup: L,
) -> Result<Vec<SkillData>, BuildError> {
    let rarity = SkillRarity::from_raw(entry.rarity)?;
    let course_end = whole.last().map_or(ctx.course.distance, |r| r.end);
    let mut triggers = Vec::new();
    for alternative in &entry.alternatives {
        let mut full = whole.clone();
        if alternative.has_precondition() {
            let pre = parse(&alternative.precondition, &lookup)?;
            let (pre_regions, _) = pre.apply(whole, ctx)?;
            let Some(first) = pre_regions.first() else {
                continue;
            };
            full = full.clip(&Region::new(first.start, course_end));
        }
        let op = parse(&alternative.condition, &lookup)?;
        let (regions, extra_condition) = op.apply(&full, ctx)?;
        if regions.is_empty() {
            continue;
        }
        if !triggers.is_empty() && !places_second_trigger(&alternative.condition) {
            continue;
        }
        let effects = alternative.effects(request.perspective);
        if effects.is_empty() {
            continue;
        }
        triggers.push(SkillData {
            skill_id: request.skill_id.clone(),
            perspective: request.perspective,
            chance: request.chance,
            rarity,
            sample_policy: op.policy().clone(),
            regions,
            extra_condition,
            effects,
        });
    }
    if !triggers.is_empty() {
        return Ok(triggers);
    }

    let Some(first) = entry.alternatives.first() else {
        return Ok(Vec::new());
    };
    let effects = first.effects(request.perspective);
    if effects.is_empty() {
        return Ok(Vec::new());
    }
    debug!(
        "skill {} cannot trigger on this course; placing it past the finish",
        request.skill_id
    );
    Ok(vec![SkillData {
        skill_id: request.skill_id.clone(),
        perspective: request.perspective,
        chance: request.chance,
        rarity,
        sample_policy: SamplePolicy::Immediate,
        regions: RegionList::single(Region::new(NEVER_START, NEVER_START)),
        extra_condition: Some(Arc::new(|_: &RaceState<'_>| false)),
        effects,
    }])
}
