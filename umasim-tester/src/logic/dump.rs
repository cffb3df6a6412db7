use anyhow::{Context, Result, bail};
use log::info;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use umasim_race::{RaceConfig, RaceSolver};

use super::TesterAssets;

/// Solver readings after one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoint {
    pub t: f64,
    pub pos: f64,
    pub speed: f64,
    pub target_speed: f64,
    pub accel: f64,
    pub hp: f64,
}

impl TracePoint {
    fn read(solver: &RaceSolver) -> Self {
        Self {
            t: solver.accumulatetime(),
            pos: solver.pos(),
            speed: solver.current_speed(),
            target_speed: solver.target_speed(),
            accel: solver.accel(),
            hp: solver.hp_ratio_remaining(),
        }
    }
}

/// When and where a skill was active.
///
/// Skills still running at the finish end there.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSpan {
    pub skill_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub start_pos: f64,
    pub end_pos: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceTrace {
    pub course_id: u32,
    pub sample: usize,
    pub timestep: f64,
    pub points: Vec<TracePoint>,
    pub skills: Vec<SkillSpan>,
}

#[derive(Debug)]
struct Activation {
    skill_id: String,
    start: (f64, f64),
    end: Option<(f64, f64)>,
}

type ActivationLog = Arc<Mutex<Vec<Activation>>>;

/// Run one sample of the scenario with its presupposed skills and skills
/// under test, recording every step.
pub fn trace_race(
    assets: &TesterAssets,
    config: &RaceConfig,
    sample: usize,
    timestep: f64,
) -> Result<RaceTrace> {
    config.validate().context("invalid scenario")?;
    if sample >= config.nsamples {
        bail!(
            "sample {sample} is out of range for a scenario with {} samples",
            config.nsamples
        );
    }
    let log: ActivationLog = Arc::default();
    let on_start = Arc::clone(&log);
    let on_end = Arc::clone(&log);
    let mut builder = config
        .standard_builder(&assets.courses, Arc::clone(&assets.skills))
        .context("preparing the race")?
        .on_skill_activate(move |state, skill_id| {
            on_start
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Activation {
                    skill_id: skill_id.to_string(),
                    start: (state.accumulatetime, state.pos),
                    end: None,
                });
        })
        .on_skill_deactivate(move |state, skill_id| {
            let mut log = on_end.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(open) = log
                .iter_mut()
                .rev()
                .find(|a| a.skill_id == skill_id && a.end.is_none())
            {
                open.end = Some((state.accumulatetime, state.pos));
            }
        });
    for skill_id in &config.skills_under_test {
        builder = builder.add_skill(skill_id.clone());
    }

    let mut solvers = builder.build().context("building the race")?;
    let Some(solver) = solvers.nth(sample) else {
        bail!("sample {sample} was not produced");
    };
    let mut solver = solver.context("starting the race")?;

    let mut points = vec![TracePoint::read(&solver)];
    while !solver.finished() {
        solver.step(timestep);
        points.push(TracePoint::read(&solver));
    }
    let finish = (solver.accumulatetime(), solver.pos());
    let skills = log
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .map(|a| {
            let end = a.end.unwrap_or(finish);
            SkillSpan {
                skill_id: a.skill_id,
                start_time: a.start.0,
                end_time: end.0,
                start_pos: a.start.1,
                end_pos: end.1,
            }
        })
        .collect();
    info!(
        "traced sample {sample} on course {}: {} steps",
        config.course_id,
        points.len() - 1
    );
    Ok(RaceTrace {
        course_id: config.course_id,
        sample,
        timestep,
        points,
        skills,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use umasim_race::{Aptitude, GroundCondition, HorseDesc, Mood, Strategy};

    fn assets() -> TesterAssets {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
        TesterAssets::load(
            &root.join("course_data.json"),
            &root.join("skill_data.json"),
        )
        .expect("sample data loads")
    }

    fn scenario(skills_under_test: Vec<String>) -> RaceConfig {
        RaceConfig {
            seed: 9,
            course_id: 10504,
            ground_condition: GroundCondition::Good,
            mood: Mood::BEST,
            horse: HorseDesc {
                speed: 1100.0,
                stamina: 900.0,
                power: 900.0,
                guts: 500.0,
                wisdom: 900.0,
                strategy: Strategy::Nige,
                distance_aptitude: Aptitude::A,
                surface_aptitude: Aptitude::A,
                strategy_aptitude: Aptitude::A,
            },
            pace_effects_enabled: false,
            nsamples: 3,
            presupposed_skills: Vec::new(),
            skills_under_test,
        }
    }

    #[test]
    fn trace_runs_to_the_finish() {
        let trace = trace_race(&assets(), &scenario(Vec::new()), 1, 1.0 / 60.0).expect("traces");
        let first = trace.points.first().expect("start point");
        let last = trace.points.last().expect("finish point");
        assert!(first.t.abs() < f64::EPSILON);
        assert!(last.pos >= 1600.0);
        assert!(trace.points.windows(2).all(|w| w[1].pos > w[0].pos && w[1].t > w[0].t));
        assert!(trace.points.iter().all(|p| (0.0..=1.0).contains(&p.hp)));
        assert!(trace.skills.is_empty());
    }

    #[test]
    fn unique_skills_leave_a_span() {
        let trace = trace_race(&assets(), &scenario(vec!["100011".into()]), 0, 1.0 / 15.0)
            .expect("traces");
        let span = trace
            .skills
            .iter()
            .find(|s| s.skill_id == "100011")
            .expect("unique activates");
        assert!(span.end_time > span.start_time);
        assert!(span.end_pos > span.start_pos);
        assert!(span.start_pos >= 1600.0 * 0.6);
    }

    #[test]
    fn samples_past_the_scenario_are_rejected() {
        assert!(trace_race(&assets(), &scenario(Vec::new()), 3, 1.0 / 15.0).is_err());
    }
}
