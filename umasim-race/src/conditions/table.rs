use std::sync::OnceLock;

use super::{
    Comparator, Condition, ConditionContext, ConditionError, ConditionTable, Filtered, expect_arg,
    filter, narrow, narrow_each,
};
use crate::course::{DistanceType, Phase, phase_end, phase_start};
use crate::horse::{Strategy, strategy_matches};
use crate::numbers::usize_to_f64;
use crate::region::{Region, RegionList};
use crate::sample_policy::SamplePolicy;

/// Skills whose `phase==n` window extends 10m into the next phase, since the
/// phase check runs after skill activation in game.
const PHASE_FUDGE_SKILLS: [&str; 9] = [
    "100591", "900591", "110261", "910261", "110191", "910191", "120451", "920451", "101502121",
];

const DIRT_GRADE_TRACKS: [u32; 4] = [10101, 10103, 10104, 10105];

/// Conditions depending on other runners, modeled as Erlang(3, 2) over the whole course.
const ERLANG_NOOP: &[&str] = &[
    "bashin_diff_behind",
    "bashin_diff_infront",
    "behind_near_lane_time",
    "behind_near_lane_time_set1",
    "blocked_all_continuetime",
    "blocked_front",
    "blocked_front_continuetime",
    "blocked_side_continuetime",
    "change_order_onetime",
    "infront_near_lane_time",
    "is_surrounded",
    "near_count",
    "overtake_target_no_order_up_time",
    "overtake_target_time",
];

/// Conditions the simulator cannot evaluate and treats as always true.
const IMMEDIATE_NOOP: &[&str] = &[
    "always",
    "distance_diff_rate",
    "distance_diff_top",
    "distance_diff_top_float",
    "is_badstart",
    "is_behind_in",
    "is_exist_chara_id",
    "is_temptation",
    "lane_type",
    "popularity",
    "post_number",
    "random_lot",
    "remain_distance_viewer_id",
    "running_style_count_same",
    "running_style_count_same_rate",
    "running_style_count_nige_otherself",
    "running_style_count_senko_otherself",
    "running_style_count_sashi_otherself",
    "running_style_count_oikomi_otherself",
    "running_style_equal_popularity_one",
    "running_style_temptation_count_nige",
    "running_style_temptation_count_senko",
    "running_style_temptation_count_sashi",
    "running_style_temptation_count_oikomi",
    "same_skill_horse_count",
    "temptation_count",
    "temptation_count_behind",
    "temptation_count_infront",
    "visiblehorse",
];

/// The default condition table, built once per process.
pub fn default_table() -> &'static ConditionTable {
    static TABLE: OnceLock<ConditionTable> = OnceLock::new();
    TABLE.get_or_init(build_default_table)
}

pub(super) fn build_default_table() -> ConditionTable {
    let mut table = ConditionTable::new();

    for &name in IMMEDIATE_NOOP {
        table.insert(Condition::noop(name, SamplePolicy::Immediate));
    }
    for &name in ERLANG_NOOP {
        table.insert(Condition::noop(name, SamplePolicy::erlang(3, 2.0)));
    }
    table.insert(Condition::noop("is_move_lane", SamplePolicy::erlang(5, 1.0)));
    table.insert(Condition::noop("is_overtake", SamplePolicy::erlang(1, 2.0)));

    insert_value_conditions(&mut table);
    insert_dynamic_conditions(&mut table);
    insert_order_conditions(&mut table);
    insert_phase_conditions(&mut table);
    insert_geometry_conditions(&mut table);
    insert_random_conditions(&mut table);
    insert_distribution_conditions(&mut table);

    table
}

fn keep_if(regions: &RegionList, keep: bool) -> RegionList {
    if keep {
        regions.clone()
    } else {
        RegionList::new()
    }
}

/// Compare a static value against the argument, keeping all regions or none.
fn value_filter(name: &'static str, value: fn(&ConditionContext<'_>) -> f64) -> Condition {
    Comparator::ALL
        .into_iter()
        .fold(Condition::new(name, SamplePolicy::Immediate), |cond, op| {
            cond.on(
                op,
                filter(move |regions, arg, ctx| {
                    let keep = op.holds(value(ctx), f64::from(arg));
                    Ok(Filtered::regions(keep_if(regions, keep)))
                }),
            )
        })
}

fn insert_value_conditions(table: &mut ConditionTable) {
    // base stats: greens are not applied yet when conditions are evaluated
    table.insert(value_filter("base_speed", |ctx| ctx.horse.speed));
    table.insert(value_filter("base_stamina", |ctx| ctx.horse.stamina));
    table.insert(value_filter("base_power", |ctx| ctx.horse.power));
    table.insert(value_filter("base_guts", |ctx| ctx.horse.guts));
    table.insert(value_filter("base_wiz", |ctx| ctx.horse.wisdom));
    table.insert(value_filter("corner_count", |ctx| {
        usize_to_f64(ctx.course.corners.len())
    }));
    table.insert(value_filter("course_distance", |ctx| ctx.course.distance));
    table.insert(value_filter("grade", |ctx| f64::from(ctx.race.grade.id())));
    table.insert(value_filter("ground_condition", |ctx| {
        f64::from(ctx.race.ground_condition.id())
    }));
    table.insert(value_filter("ground_type", |ctx| f64::from(ctx.course.surface.id())));
    // mood is -2..=2, the condition uses 1..=5
    table.insert(value_filter("motivation", |ctx| f64::from(ctx.race.mood.value() + 3)));
    table.insert(value_filter("rotation", |ctx| f64::from(ctx.course.turn.id())));
    table.insert(value_filter("season", |ctx| f64::from(ctx.race.season.id())));
    table.insert(value_filter("time", |ctx| f64::from(ctx.race.time.id())));
    table.insert(value_filter("track_id", |ctx| f64::from(ctx.course.race_track_id)));
    table.insert(value_filter("weather", |ctx| f64::from(ctx.race.weather.id())));
}

fn insert_dynamic_conditions(table: &mut ConditionTable) {
    table.insert(
        Condition::new("accumulatetime", SamplePolicy::Immediate).on(
            Comparator::Gte,
            filter(|regions, t, _| {
                let t = f64::from(t);
                Ok(Filtered::dynamic(regions.clone(), move |s| s.accumulatetime >= t))
            }),
        ),
    );
    table.insert(activate_count_all());
    table.insert(activate_count_dynamic("activate_count_start", |s| s.activate_count[0]));
    table.insert(activate_count_dynamic("activate_count_middle", |s| s.activate_count[1]));
    table.insert(activate_count_dynamic("activate_count_end_after", |s| s.activate_count[2]));
    table.insert(activate_count_dynamic("activate_count_later_half", |s| {
        s.activate_count_later_half
    }));
    table.insert(activate_count_dynamic("activate_count_heal", |s| s.activate_count_heal));

    table.insert(
        Condition::new("hp_per", SamplePolicy::Immediate)
            .on(
                Comparator::Lte,
                filter(|regions, per, _| {
                    let ratio = f64::from(per) / 100.0;
                    Ok(Filtered::dynamic(regions.clone(), move |s| {
                        s.hp_ratio_remaining <= ratio
                    }))
                }),
            )
            .on(
                Comparator::Gte,
                filter(|regions, per, _| {
                    let ratio = f64::from(per) / 100.0;
                    Ok(Filtered::dynamic(regions.clone(), move |s| {
                        s.hp_ratio_remaining >= ratio
                    }))
                }),
            ),
    );

    table.insert(
        Condition::new("is_activate_other_skill_detail", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, one, ctx| {
                expect_arg("is_activate_other_skill_detail", one, &[1], "1")?;
                let id = ctx.skill_id.to_string();
                Ok(Filtered::dynamic(regions.clone(), move |s| {
                    s.used_skills.contains(&id)
                }))
            }),
        ),
    );

    table.insert(
        Condition::new("is_used_skill_id", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, skill_id, _| {
                let id = skill_id.to_string();
                Ok(Filtered::dynamic(regions.clone(), move |s| {
                    s.used_skills.contains(&id)
                }))
            }),
        ),
    );

    table.insert(
        Condition::new("is_hp_empty_onetime", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, one, _| {
                expect_arg("is_hp_empty_onetime", one, &[1], "1")?;
                Ok(Filtered::dynamic(regions.clone(), |s| !s.has_remaining_hp))
            }),
        ),
    );

    table.insert(
        Condition::new("is_lastspurt", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, one, ctx| {
                expect_arg("is_lastspurt", one, &[1], "1")?;
                let bounds = late_race(ctx);
                Ok(Filtered::dynamic(narrow(regions, bounds), |s| s.is_last_spurt))
            }),
        ),
    );

    table.insert(
        Condition::new("lastspurt", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, case, ctx| {
                let narrowed = narrow(regions, late_race(ctx));
                match case {
                    1 => Ok(Filtered::dynamic(narrowed, |s| {
                        s.is_last_spurt && s.last_spurt_transition != -1.0
                    })),
                    2 => Ok(Filtered::dynamic(narrowed, |s| {
                        s.is_last_spurt && s.last_spurt_transition == -1.0
                    })),
                    3 => Ok(Filtered::dynamic(narrowed, |s| !s.is_last_spurt)),
                    _ => Err(ConditionError::InvalidArgument {
                        condition: "lastspurt",
                        argument: case,
                        expected: "1, 2 or 3",
                    }),
                }
            }),
        ),
    );
}

fn activate_count_all() -> Condition {
    let total = |s: &crate::solver::RaceState<'_>| -> i64 {
        s.activate_count.iter().map(|&n| i64::from(n)).sum()
    };
    [Comparator::Lte, Comparator::Gte]
        .into_iter()
        .fold(Condition::new("activate_count_all", SamplePolicy::Immediate), |cond, op| {
            cond.on(
                op,
                filter(move |regions, n, _| {
                    let n = i64::from(n);
                    Ok(Filtered::dynamic(regions.clone(), move |s| op.holds(total(s), n)))
                }),
            )
        })
}

fn activate_count_dynamic(
    name: &'static str,
    count: fn(&crate::solver::RaceState<'_>) -> u32,
) -> Condition {
    Condition::new(name, SamplePolicy::Immediate).on(
        Comparator::Gte,
        filter(move |regions, n, _| {
            let n = i64::from(n);
            Ok(Filtered::dynamic(regions.clone(), move |s| i64::from(count(s)) >= n))
        }),
    )
}

#[derive(Clone, Copy)]
enum OrderMetric {
    Position,
    Rate,
}

/// Whether some finishing position in the configured range satisfies `test`.
/// Without an order range (or runner count, for rates) the condition cannot be judged and passes.
fn any_order(ctx: &ConditionContext<'_>, metric: OrderMetric, test: impl Fn(f64) -> bool) -> bool {
    let Some((lo, hi)) = ctx.race.order_range else {
        return true;
    };
    match metric {
        OrderMetric::Position => (lo..=hi).any(|p| test(f64::from(p))),
        OrderMetric::Rate => match ctx.race.num_umas {
            Some(n) if n > 0 => (lo..=hi).any(|p| test(f64::from(p) * 100.0 / f64::from(n))),
            _ => true,
        },
    }
}

fn order_condition(name: &'static str, metric: OrderMetric) -> Condition {
    Comparator::ALL
        .into_iter()
        .fold(Condition::new(name, SamplePolicy::Immediate), |cond, op| {
            cond.on(
                op,
                filter(move |regions, arg, ctx| {
                    let keep = any_order(ctx, metric, |v| op.holds(v, f64::from(arg)));
                    Ok(Filtered::regions(keep_if(regions, keep)))
                }),
            )
        })
}

fn order_rate_continue(name: &'static str, threshold: f64, inside: bool) -> Condition {
    Condition::new(name, SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(move |regions, one, ctx| {
            expect_arg(name, one, &[1], "1")?;
            let keep = any_order(ctx, OrderMetric::Rate, |rate| {
                if inside {
                    rate <= threshold
                } else {
                    rate >= threshold
                }
            });
            Ok(Filtered::regions(keep_if(regions, keep)))
        }),
    )
}

fn insert_order_conditions(table: &mut ConditionTable) {
    table.insert(order_condition("order", OrderMetric::Position));
    table.insert(order_condition("order_rate", OrderMetric::Rate));
    for (name, threshold) in [
        ("order_rate_in20_continue", 20.0),
        ("order_rate_in40_continue", 40.0),
        ("order_rate_in80_continue", 80.0),
    ] {
        table.insert(order_rate_continue(name, threshold, true));
    }
    for (name, threshold) in [
        ("order_rate_out20_continue", 20.0),
        ("order_rate_out40_continue", 40.0),
        ("order_rate_out50_continue", 50.0),
        ("order_rate_out70_continue", 70.0),
    ] {
        table.insert(order_rate_continue(name, threshold, false));
    }
}

fn phase_arg(arg: i32) -> Result<Phase, ConditionError> {
    Ok(Phase::try_from(i64::from(arg))?)
}

fn phase_bounds(ctx: &ConditionContext<'_>, phase: Phase) -> Region {
    let d = ctx.course.distance;
    Region::new(phase_start(d, phase), phase_end(d, phase))
}

fn late_race(ctx: &ConditionContext<'_>) -> Region {
    let d = ctx.course.distance;
    Region::new(phase_start(d, Phase::Late), d)
}

/// A phase-relative window `[start + from * len, start + to * len)`.
fn phase_window(name: &'static str, policy: SamplePolicy, from: f64, to: f64) -> Condition {
    Condition::new(name, policy).on(
        Comparator::Eq,
        filter(move |regions, arg, ctx| {
            let phase = phase_bounds(ctx, phase_arg(arg)?);
            let len = phase.length();
            let bounds = Region::new(phase.start + len * from, phase.start + len * to);
            Ok(Filtered::regions(narrow(regions, bounds)))
        }),
    )
}

fn insert_phase_conditions(table: &mut ConditionTable) {
    table.insert(
        Condition::new("phase", SamplePolicy::Immediate)
            .on(
                Comparator::Eq,
                filter(|regions, arg, ctx| {
                    let phase = phase_arg(arg)?;
                    let fudge = if PHASE_FUDGE_SKILLS.contains(&ctx.skill_id) {
                        10.0
                    } else {
                        0.0
                    };
                    let d = ctx.course.distance;
                    let bounds = Region::new(phase_start(d, phase), phase_end(d, phase) + fudge);
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            )
            .on(
                Comparator::Lt,
                filter(|regions, arg, ctx| {
                    let phase = phase_arg(arg)?;
                    if phase == Phase::Early {
                        return Err(ConditionError::InvalidArgument {
                            condition: "phase",
                            argument: arg,
                            expected: "phase > 0 for <",
                        });
                    }
                    let bounds = Region::new(0.0, phase_start(ctx.course.distance, phase));
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            )
            .on(
                Comparator::Lte,
                filter(|regions, arg, ctx| {
                    let phase = phase_arg(arg)?;
                    let bounds = Region::new(0.0, phase_end(ctx.course.distance, phase));
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            )
            .on(
                Comparator::Gt,
                filter(|regions, arg, ctx| {
                    let next = phase_arg(arg)?.next().ok_or(ConditionError::InvalidArgument {
                        condition: "phase",
                        argument: arg,
                        expected: "phase < 3 for >",
                    })?;
                    let d = ctx.course.distance;
                    let bounds = Region::new(phase_start(d, next), d);
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            )
            .on(
                Comparator::Gte,
                filter(|regions, arg, ctx| {
                    let d = ctx.course.distance;
                    let bounds = Region::new(phase_start(d, phase_arg(arg)?), d);
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            ),
    );

    table.insert(phase_window("phase_random", SamplePolicy::Random, 0.0, 1.0));
    table.insert(phase_window("phase_firsthalf_random", SamplePolicy::Random, 0.0, 0.5));
    table.insert(phase_window("phase_laterhalf_random", SamplePolicy::Random, 0.5, 1.0));
    table.insert(phase_window("phase_firstquarter", SamplePolicy::Immediate, 0.0, 0.25));
    table.insert(phase_window("phase_firstquarter_random", SamplePolicy::Random, 0.0, 0.25));

    table.insert(Condition::new("phase_corner_random", SamplePolicy::Random).on(
        Comparator::Eq,
        filter(|regions, arg, ctx| {
            let phase = phase_bounds(ctx, phase_arg(arg)?);
            let corners: Vec<Region> = ctx
                .course
                .sorted_corners()?
                .iter()
                .filter(|c| phase.contains(c.start) || phase.contains(c.end()))
                .map(|c| Region::new(c.start.max(phase.start), c.end().min(phase.end)))
                .collect();
            Ok(Filtered::regions(narrow_each(regions, &corners)))
        }),
    ));

    table.insert(Condition::new("phase_straight_random", SamplePolicy::StraightRandom).on(
        Comparator::Eq,
        filter(|regions, arg, ctx| {
            let phase = phase_bounds(ctx, phase_arg(arg)?);
            let straights = straight_regions(ctx)?;
            Ok(Filtered::regions(narrow(&narrow_each(regions, &straights), phase)))
        }),
    ));
}

fn corner_regions(ctx: &ConditionContext<'_>) -> Result<Vec<Region>, ConditionError> {
    Ok(ctx
        .course
        .sorted_corners()?
        .iter()
        .map(|c| Region::new(c.start, c.end()))
        .collect())
}

fn straight_regions(ctx: &ConditionContext<'_>) -> Result<Vec<Region>, ConditionError> {
    Ok(ctx
        .course
        .sorted_straights()?
        .iter()
        .map(|s| Region::new(s.start, s.end))
        .collect())
}

fn last_straight(ctx: &ConditionContext<'_>) -> Result<Region, ConditionError> {
    let s = ctx.course.last_straight()?;
    Ok(Region::new(s.start, s.end))
}

/// Corners numbered from the last: `corner==4` is the final corner and so on,
/// repeating every four corners on courses that loop more than once.
fn numbered_corners(ctx: &ConditionContext<'_>, n: i32) -> Result<Vec<Region>, ConditionError> {
    let corners = corner_regions(ctx)?;
    let count = i64::try_from(corners.len()).unwrap_or(i64::MAX);
    let mut idx = count + i64::from(n) - 5;
    let mut picked = Vec::new();
    while idx >= 0 {
        if let Some(corner) = usize::try_from(idx).ok().and_then(|i| corners.get(i)) {
            picked.push(*corner);
        }
        idx -= 4;
    }
    picked.reverse();
    Ok(picked)
}

fn insert_geometry_conditions(table: &mut ConditionTable) {
    table.insert(
        Condition::new("corner", SamplePolicy::Immediate)
            .on(
                Comparator::Eq,
                filter(|regions, n, ctx| {
                    if n == 0 {
                        // not the straights: some stretches are neither
                        let mut last_end = 0.0;
                        let mut gaps: Vec<Region> = corner_regions(ctx)?
                            .into_iter()
                            .map(|c| {
                                let gap = Region::new(last_end, c.start);
                                last_end = c.end;
                                gap
                            })
                            .collect();
                        if last_end != ctx.course.distance {
                            gaps.push(Region::new(last_end, ctx.course.distance));
                        }
                        Ok(Filtered::regions(narrow_each(regions, &gaps)))
                    } else {
                        let corners = numbered_corners(ctx, n)?;
                        Ok(Filtered::regions(narrow_each(regions, &corners)))
                    }
                }),
            )
            .on(
                Comparator::Neq,
                filter(|regions, n, ctx| {
                    expect_arg("corner", n, &[0], "corner!=0")?;
                    Ok(Filtered::regions(narrow_each(regions, &corner_regions(ctx)?)))
                }),
            ),
    );

    table.insert(
        Condition::new("distance_rate", SamplePolicy::Immediate)
            .on(
                Comparator::Lte,
                filter(|regions, rate, ctx| {
                    let d = ctx.course.distance;
                    let bounds = Region::new(0.0, d * f64::from(rate) / 100.0);
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            )
            .on(
                Comparator::Gte,
                filter(|regions, rate, ctx| {
                    let d = ctx.course.distance;
                    let bounds = Region::new(d * f64::from(rate) / 100.0, d);
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            ),
    );

    table.insert(
        Condition::new("distance_type", SamplePolicy::Immediate)
            .on(
                Comparator::Eq,
                filter(|regions, ty, ctx| {
                    let ty = DistanceType::try_from(i64::from(ty))?;
                    Ok(Filtered::regions(keep_if(regions, ctx.course.distance_type == ty)))
                }),
            )
            .on(
                Comparator::Neq,
                filter(|regions, ty, ctx| {
                    let ty = DistanceType::try_from(i64::from(ty))?;
                    Ok(Filtered::regions(keep_if(regions, ctx.course.distance_type != ty)))
                }),
            ),
    );

    table.insert(Condition::new("is_basis_distance", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, flag, ctx| {
            expect_arg("is_basis_distance", flag, &[0, 1], "0 or 1")?;
            let off_basis = (ctx.course.distance % 400.0).min(1.0);
            Ok(Filtered::regions(keep_if(regions, off_basis != f64::from(flag))))
        }),
    ));

    table.insert(Condition::new("is_dirtgrade", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, flag, ctx| {
            expect_arg("is_dirtgrade", flag, &[1], "1")?;
            let keep = DIRT_GRADE_TRACKS.contains(&ctx.course.race_track_id);
            Ok(Filtered::regions(keep_if(regions, keep)))
        }),
    ));

    table.insert(Condition::new("is_finalcorner", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, flag, ctx| {
            expect_arg("is_finalcorner", flag, &[0, 1], "0 or 1")?;
            let Some(fc) = ctx.course.last_corner()? else {
                return Ok(Filtered::regions(RegionList::new()));
            };
            let bounds = if flag == 1 {
                Region::new(fc.start, ctx.course.distance)
            } else {
                Region::new(0.0, fc.start)
            };
            Ok(Filtered::regions(narrow(regions, bounds)))
        }),
    ));

    table.insert(Condition::new("is_finalcorner_laterhalf", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, one, ctx| {
            expect_arg("is_finalcorner_laterhalf", one, &[1], "1")?;
            let Some(fc) = ctx.course.last_corner()? else {
                return Ok(Filtered::regions(RegionList::new()));
            };
            let bounds = Region::new((fc.start + fc.end()) / 2.0, fc.end());
            Ok(Filtered::regions(narrow(regions, bounds)))
        }),
    ));

    table.insert(
        Condition::new("is_last_straight", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, one, ctx| {
                expect_arg("is_last_straight", one, &[1], "1")?;
                Ok(Filtered::regions(narrow(regions, last_straight(ctx)?)))
            }),
        ),
    );

    table.insert(
        Condition::new("is_last_straight_onetime", SamplePolicy::Immediate).on(
            Comparator::Eq,
            filter(|regions, one, ctx| {
                expect_arg("is_last_straight_onetime", one, &[1], "1")?;
                let start = last_straight(ctx)?.start;
                Ok(Filtered::regions(narrow(regions, Region::new(start, start + 10.0))))
            }),
        ),
    );

    table.insert(
        Condition::new("remain_distance", SamplePolicy::Immediate)
            .on(
                Comparator::Lte,
                filter(|regions, remain, ctx| {
                    let d = ctx.course.distance;
                    let bounds = Region::new(d - f64::from(remain), d);
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            )
            .on(
                Comparator::Gte,
                filter(|regions, remain, ctx| {
                    let d = ctx.course.distance;
                    let bounds = Region::new(0.0, d - f64::from(remain));
                    Ok(Filtered::regions(narrow(regions, bounds)))
                }),
            ),
    );

    table.insert(Condition::new("running_style", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, id, ctx| {
            let strategy = Strategy::from_id(id)?;
            let keep = strategy_matches(ctx.horse.strategy, strategy);
            Ok(Filtered::regions(keep_if(regions, keep)))
        }),
    ));

    table.insert(Condition::new("slope", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, kind, ctx| {
            expect_arg("slope", kind, &[0, 1, 2], "0 (flat), 1 (uphill) or 2 (downhill)")?;
            let course = ctx.course;
            let slopes = course
                .sorted_slopes()?
                .iter()
                .filter(|s| (kind != 2 && s.slope > 0.0) || (kind != 1 && s.slope < 0.0));
            let bounds: Vec<Region> = if kind == 0 {
                let mut last_end = 0.0;
                let mut flats: Vec<Region> = slopes
                    .map(|s| {
                        let flat = Region::new(last_end, s.start);
                        last_end = s.end();
                        flat
                    })
                    .collect();
                if last_end != course.distance {
                    flats.push(Region::new(last_end, course.distance));
                }
                flats
            } else {
                slopes.map(|s| Region::new(s.start, s.end())).collect()
            };
            Ok(Filtered::regions(narrow_each(regions, &bounds)))
        }),
    ));

    table.insert(Condition::new("straight_front_type", SamplePolicy::Immediate).on(
        Comparator::Eq,
        filter(|regions, front, ctx| {
            expect_arg("straight_front_type", front, &[1, 2], "1 or 2")?;
            let straights: Vec<Region> = ctx
                .course
                .straights
                .iter()
                .filter(|s| s.front_type == front)
                .map(|s| Region::new(s.start, s.end))
                .collect();
            Ok(Filtered::regions(narrow_each(regions, &straights)))
        }),
    ));
}

fn insert_random_conditions(table: &mut ConditionTable) {
    table.insert(Condition::new("all_corner_random", SamplePolicy::AllCornerRandom).on(
        Comparator::Eq,
        filter(|regions, one, ctx| {
            expect_arg("all_corner_random", one, &[1], "1")?;
            Ok(Filtered::regions(narrow_each(regions, &corner_regions(ctx)?)))
        }),
    ));

    // TODO: `corner_random==1@corner_random==2` should sample from a single
    // corner rather than the merged pair once multiple triggers are placed
    table.insert(Condition::new("corner_random", SamplePolicy::Random).on(
        Comparator::Eq,
        filter(|regions, n, ctx| {
            let corners = corner_regions(ctx)?;
            let count = i64::try_from(corners.len()).unwrap_or(i64::MAX);
            let idx = usize::try_from(count + i64::from(n) - 5).ok();
            let picked: Vec<Region> = idx.and_then(|i| corners.get(i)).copied().into_iter().collect();
            Ok(Filtered::regions(narrow_each(regions, &picked)))
        }),
    ));

    table.insert(Condition::new("distance_rate_after_random", SamplePolicy::Random).on(
        Comparator::Eq,
        filter(|regions, rate, ctx| {
            let d = ctx.course.distance;
            let bounds = Region::new(d * f64::from(rate) / 100.0, d);
            Ok(Filtered::regions(narrow(regions, bounds)))
        }),
    ));

    table.insert(slope_random("down_slope_random", false));
    table.insert(slope_random("up_slope_random", true));

    table.insert(Condition::new("is_finalcorner_random", SamplePolicy::Random).on(
        Comparator::Eq,
        filter(|regions, one, ctx| {
            expect_arg("is_finalcorner_random", one, &[1], "1")?;
            let Some(fc) = ctx.course.last_corner()? else {
                return Ok(Filtered::regions(RegionList::new()));
            };
            Ok(Filtered::regions(narrow(regions, Region::new(fc.start, fc.end()))))
        }),
    ));

    table.insert(Condition::new("last_straight_random", SamplePolicy::Random).on(
        Comparator::Eq,
        filter(|regions, one, ctx| {
            expect_arg("last_straight_random", one, &[1], "1")?;
            Ok(Filtered::regions(narrow(regions, last_straight(ctx)?)))
        }),
    ));

    table.insert(Condition::new("straight_random", SamplePolicy::StraightRandom).on(
        Comparator::Eq,
        filter(|regions, one, ctx| {
            expect_arg("straight_random", one, &[1], "1")?;
            Ok(Filtered::regions(narrow_each(regions, &straight_regions(ctx)?)))
        }),
    ));
}

fn slope_random(name: &'static str, uphill: bool) -> Condition {
    Condition::new(name, SamplePolicy::Random).on(
        Comparator::Eq,
        filter(move |regions, one, ctx| {
            expect_arg(name, one, &[1], "1")?;
            let slopes: Vec<Region> = ctx
                .course
                .slopes
                .iter()
                .filter(|s| if uphill { s.slope > 0.0 } else { s.slope < 0.0 })
                .map(|s| Region::new(s.start, s.end()))
                .collect();
            Ok(Filtered::regions(narrow_each(regions, &slopes)))
        }),
    )
}

fn insert_distribution_conditions(table: &mut ConditionTable) {
    table.insert(Condition::new("change_order_up_end_after", SamplePolicy::erlang(3, 2.0)).on(
        Comparator::Gte,
        filter(|regions, _, ctx| Ok(Filtered::regions(narrow(regions, late_race(ctx))))),
    ));

    table.insert(
        Condition::new("change_order_up_finalcorner_after", SamplePolicy::erlang(3, 2.0)).on(
            Comparator::Gte,
            filter(|regions, _, ctx| {
                let Some(fc) = ctx.course.last_corner()? else {
                    return Ok(Filtered::regions(RegionList::new()));
                };
                let bounds = Region::new(fc.start, ctx.course.distance);
                Ok(Filtered::regions(narrow(regions, bounds)))
            }),
        ),
    );

    table.insert(Condition::new("change_order_up_middle", SamplePolicy::erlang(3, 2.0)).on(
        Comparator::Gte,
        filter(|regions, _, ctx| {
            Ok(Filtered::regions(narrow(regions, phase_bounds(ctx, Phase::Middle))))
        }),
    ));

    table.insert(Condition::new("compete_fight_count", SamplePolicy::uniform_random()).on(
        Comparator::Gt,
        filter(|regions, _, ctx| Ok(Filtered::regions(narrow(regions, last_straight(ctx)?)))),
    ));
}
