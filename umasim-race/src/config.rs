//! Comparison scenarios: one horse on one course, run with and without a set of skills.
//!
//! A [`RaceConfig`] is the unit stored in regression checkpoints and accepted
//! by the `gain` tool. [`compare_gain`] runs the baseline and the baseline
//! plus the skills under test in lockstep and reports how far ahead the
//! boosted horse finished in each sample.

use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::builder::{BuildError, RaceSolverBuilder};
use crate::course::CourseCatalog;
use crate::horse::HorseDesc;
use crate::race_params::{GroundCondition, Mood};
use crate::skills::SkillCatalog;

/// Integration timestep used by the game: one frame at 15 fps.
pub const DEFAULT_TIMESTEP: f64 = 1.0 / 15.0;
pub const MIN_STAT: f64 = 1.0;
pub const MAX_STAT: f64 = 2000.0;
pub const MAX_SAMPLES: usize = 10_000;
pub const MAX_SKILLS: usize = 30;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid race config: {0}")]
    Parse(String),
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} lists {count} skills (at most {max} allowed)")]
    TooManySkills {
        field: &'static str,
        max: usize,
        count: usize,
    },
}

/// One comparison scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceConfig {
    pub seed: u32,
    pub course_id: u32,
    #[serde(default = "RaceConfig::default_ground")]
    pub ground_condition: GroundCondition,
    #[serde(default)]
    pub mood: Mood,
    pub horse: HorseDesc,
    /// Race against the default pacer so position keeping applies.
    #[serde(default)]
    pub pace_effects_enabled: bool,
    #[serde(default = "RaceConfig::default_nsamples")]
    pub nsamples: usize,
    /// Skills both runs have.
    #[serde(default)]
    pub presupposed_skills: Vec<String>,
    /// Skills only the compared run has.
    #[serde(default)]
    pub skills_under_test: Vec<String>,
}

impl RaceConfig {
    const fn default_ground() -> GroundCondition {
        GroundCondition::Good
    }

    const fn default_nsamples() -> usize {
        500
    }

    /// Parse and validate a JSON scenario.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the document is malformed or out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check stat, sample and skill-count bounds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stats = [
            ("horse.speed", self.horse.speed),
            ("horse.stamina", self.horse.stamina),
            ("horse.power", self.horse.power),
            ("horse.guts", self.horse.guts),
            ("horse.wisdom", self.horse.wisdom),
        ];
        for (field, value) in stats {
            if !(MIN_STAT..=MAX_STAT).contains(&value) {
                return Err(ConfigError::RangeViolation {
                    field,
                    min: MIN_STAT,
                    max: MAX_STAT,
                    value,
                });
            }
        }
        if !(1..=MAX_SAMPLES).contains(&self.nsamples) {
            return Err(ConfigError::RangeViolation {
                field: "nsamples",
                min: 1.0,
                max: 10_000.0,
                value: crate::numbers::usize_to_f64(self.nsamples),
            });
        }
        for (field, skills) in [
            ("presupposedSkills", &self.presupposed_skills),
            ("skillsUnderTest", &self.skills_under_test),
        ] {
            if skills.len() > MAX_SKILLS {
                return Err(ConfigError::TooManySkills {
                    field,
                    max: MAX_SKILLS,
                    count: skills.len(),
                });
            }
        }
        Ok(())
    }

    /// Builder for the baseline run: the horse with its presupposed skills,
    /// Asiwotameru, and the default pacer when pace effects are enabled.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Course` when the course id is unknown.
    pub fn standard_builder(
        &self,
        courses: &CourseCatalog,
        catalog: Arc<SkillCatalog>,
    ) -> Result<RaceSolverBuilder, BuildError> {
        let course = courses.get(self.course_id)?.clone();
        let mut builder = RaceSolverBuilder::new(self.nsamples, catalog)
            .seed(self.seed)
            .course(course)
            .ground(self.ground_condition)
            .mood(self.mood)
            .horse(self.horse.clone());
        if self.pace_effects_enabled {
            builder = builder.use_default_pacer(true);
        }
        builder = builder.with_asiwotameru();
        for skill_id in &self.presupposed_skills {
            builder = builder.add_skill(skill_id.clone());
        }
        Ok(builder)
    }

    /// Baseline builder and a fork of it carrying the skills under test.
    ///
    /// # Errors
    ///
    /// Same as [`standard_builder`](Self::standard_builder).
    pub fn builders(
        &self,
        courses: &CourseCatalog,
        catalog: Arc<SkillCatalog>,
    ) -> Result<(RaceSolverBuilder, RaceSolverBuilder), BuildError> {
        let standard = self.standard_builder(courses, catalog)?;
        let mut compare = standard.fork();
        for skill_id in &self.skills_under_test {
            compare = compare.add_skill(skill_id.clone());
        }
        Ok((standard, compare))
    }
}

/// Per-sample distance gained by the skills under test, in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainResult {
    /// A solver failed mid-run; `gain` holds the samples completed before it.
    pub err: bool,
    pub gain: Vec<f64>,
}

/// Run both builders sample by sample. The compared horse runs to the finish;
/// the baseline then runs for the same time and the gap is recorded.
///
/// The compared builder is built first so forks consume the shared RNG in
/// the same order every time.
///
/// # Errors
///
/// Returns `BuildError` when either builder cannot compile its skills.
pub fn compare_gain(
    standard: &mut RaceSolverBuilder,
    compare: &mut RaceSolverBuilder,
    timestep: f64,
) -> Result<GainResult, BuildError> {
    let boosted = compare.build()?;
    let baseline = standard.build()?;
    let mut result = GainResult {
        err: false,
        gain: Vec::with_capacity(standard.nsamples()),
    };
    for (s1, s2) in boosted.zip(baseline) {
        let (mut s1, mut s2) = match (s1, s2) {
            (Ok(s1), Ok(s2)) => (s1, s2),
            (Err(err), _) | (_, Err(err)) => {
                debug!("sample {} failed: {err}", result.gain.len());
                result.err = true;
                break;
            }
        };
        s1.run_to_finish(timestep);
        while s2.accumulatetime() < s1.accumulatetime() {
            s2.step(timestep);
        }
        result.gain.push(s1.pos() - s2.pos());
    }
    Ok(result)
}

/// Convenience wrapper: build both runs from `config` and compare them.
///
/// # Errors
///
/// Returns `BuildError` when the course is unknown or a skill fails to compile.
pub fn run_config(
    config: &RaceConfig,
    courses: &CourseCatalog,
    catalog: Arc<SkillCatalog>,
    timestep: f64,
) -> Result<GainResult, BuildError> {
    let (mut standard, mut compare) = config.builders(courses, catalog)?;
    compare_gain(&mut standard, &mut compare, timestep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horse::{Aptitude, Strategy};

    const COURSES: &str = r#"{
        "10001": {"courses": {"10101": {
            "distance": 1600, "distanceType": 2, "surface": 1, "turn": 1,
            "courseSetStatus": [],
            "corners": [{"start": 400, "length": 250}, {"start": 650, "length": 250},
                        {"start": 1000, "length": 150}, {"start": 1150, "length": 150}],
            "straights": [{"start": 0, "end": 400, "frontType": 1}, {"start": 1300, "end": 1600, "frontType": 1}],
            "slopes": []
        }}}
    }"#;

    const SKILLS: &str = r#"{
        "200331": {"rarity": 2, "alternatives": [
            {"condition": "phase_random==2", "baseDuration": 30000,
             "effects": [{"type": 27, "modifier": 3500, "target": 1}]}
        ]},
        "200011": {"rarity": 1, "alternatives": [
            {"condition": "always==1", "baseDuration": -1,
             "effects": [{"type": 1, "modifier": 400000, "target": 1}]}
        ]}
    }"#;

    fn horse() -> HorseDesc {
        HorseDesc {
            speed: 1200.0,
            stamina: 900.0,
            power: 1100.0,
            guts: 600.0,
            wisdom: 800.0,
            strategy: Strategy::Senkou,
            distance_aptitude: Aptitude::A,
            surface_aptitude: Aptitude::A,
            strategy_aptitude: Aptitude::A,
        }
    }

    fn config(nsamples: usize) -> RaceConfig {
        RaceConfig {
            seed: 77,
            course_id: 10101,
            ground_condition: GroundCondition::Good,
            mood: Mood::BEST,
            horse: horse(),
            pace_effects_enabled: true,
            nsamples,
            presupposed_skills: vec!["200011".into()],
            skills_under_test: vec!["200331".into()],
        }
    }

    fn data() -> (CourseCatalog, Arc<SkillCatalog>) {
        (
            CourseCatalog::from_json(COURSES).expect("courses parse"),
            Arc::new(SkillCatalog::from_json(SKILLS).expect("skills parse")),
        )
    }

    #[test]
    fn parses_with_defaults() {
        let json = r#"{
            "seed": 3, "courseId": 10101,
            "horse": {"speed": 1000, "stamina": 1000, "power": 1000, "guts": 1000, "wisdom": 1000,
                      "strategy": "Sasi", "distanceAptitude": "A", "surfaceAptitude": "A",
                      "strategyAptitude": "B"}
        }"#;
        let config = RaceConfig::from_json(json).expect("config parses");
        assert_eq!(config.nsamples, 500);
        assert_eq!(config.mood, Mood::BEST);
        assert_eq!(config.ground_condition, GroundCondition::Good);
        assert!(!config.pace_effects_enabled);
        assert!(config.skills_under_test.is_empty());
    }

    #[test]
    fn validation_reports_the_offending_field() {
        let mut bad = config(10);
        bad.horse.power = 2400.0;
        assert_eq!(
            bad.validate(),
            Err(ConfigError::RangeViolation {
                field: "horse.power",
                min: MIN_STAT,
                max: MAX_STAT,
                value: 2400.0,
            })
        );
        let mut bad = config(0);
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::RangeViolation { field: "nsamples", .. })
        ));
        bad.nsamples = 5;
        bad.skills_under_test = vec!["200331".into(); 31];
        assert_eq!(
            bad.validate(),
            Err(ConfigError::TooManySkills {
                field: "skillsUnderTest",
                max: MAX_SKILLS,
                count: 31,
            })
        );
        assert!(matches!(
            RaceConfig::from_json("{\"seed\": 1}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unknown_course_is_a_build_error() {
        let (courses, catalog) = data();
        let mut missing = config(1);
        missing.course_id = 99999;
        assert!(matches!(
            missing.standard_builder(&courses, catalog),
            Err(BuildError::Course(_))
        ));
    }

    #[test]
    fn speed_skill_gains_ground_on_average() {
        let (courses, catalog) = data();
        let result =
            run_config(&config(12), &courses, catalog, DEFAULT_TIMESTEP).expect("runs");
        assert!(!result.err);
        assert_eq!(result.gain.len(), 12);
        assert!(result.gain.iter().all(|g| g.is_finite()));
        let mean = result.gain.iter().sum::<f64>() / 12.0;
        assert!(mean > 0.0, "mean gain {mean}");
    }

    #[test]
    fn gains_are_deterministic() {
        let (courses, catalog) = data();
        let a = run_config(&config(6), &courses, Arc::clone(&catalog), DEFAULT_TIMESTEP)
            .expect("runs");
        let b = run_config(&config(6), &courses, catalog, DEFAULT_TIMESTEP).expect("runs");
        assert_eq!(a, b);
    }

    #[test]
    fn result_serializes_like_a_checkpoint_entry() {
        let result = GainResult {
            err: false,
            gain: vec![1.5, 0.25],
        };
        let json = serde_json::to_string(&result).expect("serializes");
        assert_eq!(json, r#"{"err":false,"gain":[1.5,0.25]}"#);
    }
}
