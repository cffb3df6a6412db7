//! Table variant where activation-count conditions are placed at a random point of
//! the part of the course they count over, instead of waiting on live counts.
//!
//! Useful when the counted skills belong to other runners and are not simulated.

use std::sync::OnceLock;

use super::table::build_default_table;
use super::{Comparator, Condition, ConditionTable, Filtered, filter, narrow};
use crate::course::{Phase, phase_end, phase_start};
use crate::region::{Region, RegionList};
use crate::sample_policy::SamplePolicy;

/// Skills activated over a whole race by a full field.
const EXPECTED_FIELD_ACTIVATIONS: f64 = 23.0;
/// Length of the window used for `activate_count_all>=7`.
const SEVENTH_SKILL_WINDOW: f64 = 11.0;

pub fn counts_as_random_table() -> &'static ConditionTable {
    static TABLE: OnceLock<ConditionTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = build_default_table();
        table.insert(activate_count_all());
        table.insert(
            Condition::new("activate_count_start", SamplePolicy::Immediate).on(
                Comparator::Gte,
                filter(|regions, _, ctx| {
                    let d = ctx.course.distance;
                    Ok(Filtered::regions(narrow(
                        regions,
                        Region::new(0.0, phase_end(d, Phase::Early)),
                    )))
                }),
            ),
        );
        table.insert(
            Condition::new("activate_count_middle", SamplePolicy::Random).on(
                Comparator::Gte,
                filter(|regions, n, ctx| {
                    let d = ctx.course.distance;
                    let start = phase_start(d, Phase::Middle);
                    let end = phase_end(d, Phase::Middle);
                    let reach = start + f64::from(n) / 10.0 * (end - start);
                    Ok(Filtered::regions(narrow(regions, Region::new(start, reach))))
                }),
            ),
        );
        table.insert(
            Condition::new("activate_count_end_after", SamplePolicy::Random).on(
                Comparator::Gte,
                filter(|regions, _, ctx| {
                    let d = ctx.course.distance;
                    Ok(Filtered::regions(narrow(
                        regions,
                        Region::new(phase_start(d, Phase::Late), d),
                    )))
                }),
            ),
        );
        table.insert(
            Condition::new("activate_count_later_half", SamplePolicy::Random).on(
                Comparator::Gte,
                filter(|regions, _, ctx| {
                    let d = ctx.course.distance;
                    Ok(Filtered::regions(narrow(regions, Region::new(d / 2.0, d))))
                }),
            ),
        );
        table.insert(Condition::noop("activate_count_heal", SamplePolicy::Random));
        table
    })
}

/// Spread the field's activations evenly over the race, with a ±20% window.
fn activate_count_all() -> Condition {
    Condition::new("activate_count_all", SamplePolicy::Random)
        .on(
            Comparator::Gte,
            filter(|regions, n, ctx| {
                if n == 7 {
                    return Ok(Filtered::regions(regions.rmap(|r| {
                        Some(Region::new(r.start, r.start + SEVENTH_SKILL_WINDOW))
                    })));
                }
                let d = ctx.course.distance;
                let share = f64::from(n) / EXPECTED_FIELD_ACTIVATIONS;
                let bounds = Region::new((share - 0.2).min(0.6) * d, (share + 0.2).min(1.0) * d);
                Ok(Filtered::regions(narrow(regions, bounds)))
            }),
        )
        .on(
            Comparator::Lte,
            filter(|_, _, _| Ok(Filtered::regions(RegionList::new()))),
        )
}
