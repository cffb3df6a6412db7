use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use log::{debug, warn};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use umasim_race::{
    Aptitude, GainResult, GroundCondition, HorseDesc, Mood, RaceConfig, RaceSolverBuilder,
    Strategy, run_config,
};

use super::TesterAssets;

/// Relative tolerance when comparing recorded gains.
const EPSILON: f64 = 5e11 * f64::EPSILON;
const CHECKPOINT_DATE_FORMAT: &str = "%Y%m%d";

/// One recorded scenario and what it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub params: RaceConfig,
    pub result: GainResult,
    pub timestep: f64,
}

/// Bounds for randomly generated scenarios.
#[derive(Debug, Clone, Copy)]
pub struct CaseLimits {
    pub max_samples: usize,
    pub max_presupposed: usize,
    pub max_under_test: usize,
}

impl Default for CaseLimits {
    fn default() -> Self {
        Self {
            max_samples: 200,
            max_presupposed: 30,
            max_under_test: 30,
        }
    }
}

#[must_use]
pub fn almost_equal(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() < (EPSILON * (a.abs() + b.abs())).max(f64::EPSILON)
}

/// Skills that compile and produce a solver for a plain test horse.
///
/// Scenarios only draw from these so a checkpoint records simulator
/// behavior rather than unsupported conditions.
pub fn usable_skills(assets: &TesterAssets) -> Result<Vec<String>> {
    let Some(&course_id) = assets.courses.ids().first() else {
        bail!("course data is empty");
    };
    let course = assets.courses.get(course_id)?.clone();
    let horse = HorseDesc {
        speed: 1000.0,
        stamina: 1000.0,
        power: 1000.0,
        guts: 1000.0,
        wisdom: 1000.0,
        strategy: Strategy::Nige,
        distance_aptitude: Aptitude::A,
        surface_aptitude: Aptitude::A,
        strategy_aptitude: Aptitude::A,
    };
    let usable = assets
        .skills
        .ids()
        .into_iter()
        .filter(|id| {
            let mut builder = RaceSolverBuilder::new(1, Arc::clone(&assets.skills))
                .seed(0)
                .course(course.clone())
                .horse(horse.clone())
                .add_skill(*id);
            let ok = builder
                .build()
                .is_ok_and(|mut solvers| solvers.next().is_some_and(|s| s.is_ok()));
            if !ok {
                debug!("skipping skill {id}: does not build");
            }
            ok
        })
        .map(str::to_string)
        .collect();
    Ok(usable)
}

fn random_stat(rng: &mut SmallRng) -> f64 {
    f64::from(rng.gen_range(1_u32..=2000))
}

fn random_aptitude(rng: &mut SmallRng) -> Aptitude {
    Aptitude::ALL[rng.gen_range(0..Aptitude::ALL.len())]
}

fn random_skills(rng: &mut SmallRng, skills: &[String], max: usize) -> Vec<String> {
    if skills.is_empty() {
        return Vec::new();
    }
    let n = rng.gen_range(0..=max);
    (0..n)
        .filter_map(|_| skills.choose(rng).cloned())
        .collect()
}

fn random_case(
    rng: &mut SmallRng,
    course_ids: &[u32],
    skills: &[String],
    limits: CaseLimits,
) -> Result<RaceConfig> {
    const STRATEGIES: [Strategy; 5] = [
        Strategy::Nige,
        Strategy::Senkou,
        Strategy::Sasi,
        Strategy::Oikomi,
        Strategy::Oonige,
    ];
    const GROUNDS: [GroundCondition; 4] = [
        GroundCondition::Good,
        GroundCondition::Yielding,
        GroundCondition::Soft,
        GroundCondition::Heavy,
    ];
    let Some(&course_id) = course_ids.choose(rng) else {
        bail!("course data is empty");
    };
    let seed = rng.r#gen::<u32>();
    let ground_condition = GROUNDS[rng.gen_range(0..GROUNDS.len())];
    let mood = Mood::try_from(rng.gen_range(-2_i64..=2))?;
    let horse = HorseDesc {
        speed: random_stat(rng),
        stamina: random_stat(rng),
        power: random_stat(rng),
        guts: random_stat(rng),
        wisdom: random_stat(rng),
        strategy: STRATEGIES[rng.gen_range(0..STRATEGIES.len())],
        distance_aptitude: random_aptitude(rng),
        surface_aptitude: random_aptitude(rng),
        strategy_aptitude: random_aptitude(rng),
    };
    Ok(RaceConfig {
        seed,
        course_id,
        ground_condition,
        mood,
        horse,
        pace_effects_enabled: rng.gen_bool(0.5),
        nsamples: rng.gen_range(1..=limits.max_samples.max(1)),
        presupposed_skills: random_skills(rng, skills, limits.max_presupposed),
        skills_under_test: random_skills(rng, skills, limits.max_under_test),
    })
}

fn evaluate(assets: &TesterAssets, config: &RaceConfig, timestep: f64) -> GainResult {
    match run_config(config, &assets.courses, Arc::clone(&assets.skills), timestep) {
        Ok(result) => result,
        Err(err) => {
            warn!("scenario on course {} failed to build: {err}", config.course_id);
            GainResult {
                err: true,
                gain: Vec::new(),
            }
        }
    }
}

/// Generate `count` random scenarios from `seed` and record their gains.
pub fn create_entries(
    assets: &TesterAssets,
    count: usize,
    seed: u64,
    timestep: f64,
    limits: CaseLimits,
) -> Result<Vec<CheckpointEntry>> {
    let skills = usable_skills(assets)?;
    let course_ids = assets.courses.ids();
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let params = random_case(&mut rng, &course_ids, &skills, limits)?;
        let result = evaluate(assets, &params, timestep);
        debug!("case {index}: {} samples, err={}", result.gain.len(), result.err);
        entries.push(CheckpointEntry {
            params,
            result,
            timestep,
        });
    }
    Ok(entries)
}

/// A sample whose gain no longer matches the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub params: RaceConfig,
    pub case_idx: usize,
    pub sample_idx: usize,
    pub expected: f64,
    pub actual: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub cases: usize,
    pub samples: usize,
    pub failures: Vec<Failure>,
    /// Cases whose error flag differs from the recorded one.
    pub err_mismatches: Vec<usize>,
}

impl CheckReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.err_mismatches.is_empty()
    }
}

/// Re-run every entry and compare against its recorded result.
#[must_use]
pub fn check_entries(assets: &TesterAssets, entries: &[CheckpointEntry]) -> CheckReport {
    let mut report = CheckReport {
        cases: entries.len(),
        ..CheckReport::default()
    };
    for (case_idx, entry) in entries.iter().enumerate() {
        let result = evaluate(assets, &entry.params, entry.timestep);
        let mut err = result.err;
        for (sample_idx, &actual) in result.gain.iter().enumerate() {
            let Some(&expected) = entry.result.gain.get(sample_idx) else {
                err = true;
                break;
            };
            report.samples += 1;
            if !almost_equal(actual, expected) {
                report.failures.push(Failure {
                    params: entry.params.clone(),
                    case_idx,
                    sample_idx,
                    expected,
                    actual,
                });
            }
        }
        if err != entry.result.err {
            report.err_mismatches.push(case_idx);
        }
    }
    report
}

pub fn read_entries(path: &Path) -> Result<Vec<CheckpointEntry>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading checkpoint {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing checkpoint {}", path.display()))
}

/// File name for a checkpoint created today.
#[must_use]
pub fn todays_checkpoint_name() -> String {
    format!("{}.json", Local::now().format(CHECKPOINT_DATE_FORMAT))
}

fn checkpoint_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next()?;
    NaiveDate::parse_from_str(stem, CHECKPOINT_DATE_FORMAT).ok()
}

/// Newest checkpoint in `dir`, judged by the date in its file name.
///
/// File times are not used since a fresh clone resets them.
pub fn latest_checkpoint(dir: &Path) -> Result<PathBuf> {
    let newest = fs::read_dir(dir)
        .with_context(|| format!("listing checkpoints in {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| checkpoint_date(&path).map(|date| (date, path)))
        .max_by_key(|(date, _)| *date);
    match newest {
        Some((_, path)) => Ok(path),
        None => bail!("no dated checkpoints in {}", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> TesterAssets {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
        TesterAssets::load(
            &root.join("course_data.json"),
            &root.join("skill_data.json"),
        )
        .expect("sample data loads")
    }

    fn small() -> CaseLimits {
        CaseLimits {
            max_samples: 3,
            max_presupposed: 3,
            max_under_test: 2,
        }
    }

    #[test]
    fn tolerance_is_relative() {
        assert!(almost_equal(0.0, 0.0));
        assert!(almost_equal(100.0, 100.0 + 1e-6));
        assert!(!almost_equal(100.0, 100.5));
        assert!(almost_equal(0.0, f64::EPSILON / 2.0));
        assert!(!almost_equal(0.0, 1e-9));
    }

    #[test]
    fn created_checkpoints_check_clean() {
        let assets = assets();
        let entries =
            create_entries(&assets, 4, 11, 1.0 / 15.0, small()).expect("entries created");
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.params.validate().is_ok()));
        let again = create_entries(&assets, 4, 11, 1.0 / 15.0, small()).expect("entries created");
        assert_eq!(entries, again);

        let report = check_entries(&assets, &entries);
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.cases, 4);
    }

    #[test]
    fn drifted_gains_are_reported() {
        let assets = assets();
        let mut entries =
            create_entries(&assets, 2, 5, 1.0 / 15.0, small()).expect("entries created");
        let target = entries
            .iter()
            .position(|e| !e.result.gain.is_empty())
            .expect("a case with samples");
        entries[target].result.gain[0] += 1.0;
        let report = check_entries(&assets, &entries);
        assert!(!report.passed());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].case_idx, target);
        assert_eq!(report.failures[0].sample_idx, 0);

        entries[target].result.err = !entries[target].result.err;
        let report = check_entries(&assets, &entries);
        assert_eq!(report.err_mismatches, vec![target]);
    }

    #[test]
    fn latest_checkpoint_uses_the_file_name_date() {
        let dir = std::env::temp_dir().join(format!(
            "umasim-checkpoints-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        for name in ["20240105.json", "20231231.json", "notes.txt"] {
            fs::write(dir.join(name), "[]").expect("write");
        }
        let latest = latest_checkpoint(&dir).expect("found");
        assert_eq!(latest.file_name().and_then(|n| n.to_str()), Some("20240105.json"));
        assert_eq!(read_entries(&latest).expect("parses"), Vec::new());
        fs::remove_dir_all(&dir).expect("cleanup");
        assert!(todays_checkpoint_name().ends_with(".json"));
    }
}
