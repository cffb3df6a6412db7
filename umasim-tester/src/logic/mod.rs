pub mod checkpoint;
pub mod dump;
pub mod gain;
pub mod grep;
pub mod reports;
pub mod seeds;
pub mod table;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use umasim_race::{CourseCatalog, SkillCatalog};

pub use checkpoint::{check_entries, create_entries, latest_checkpoint, todays_checkpoint_name};
pub use dump::trace_race;
pub use gain::{GainOverrides, GainSummary, run_gain};
pub use grep::{GrepScope, grep_skills};
pub use seeds::{fast_subset, parse_timestep, resolve_seed};
pub use table::{DEFAULT_THRESHOLDS, build_table};

/// Course and skill catalogs shared by every tool.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    pub courses: Arc<CourseCatalog>,
    pub skills: Arc<SkillCatalog>,
}

impl TesterAssets {
    pub fn load(courses: &Path, skills: &Path) -> Result<Self> {
        let course_json = fs::read_to_string(courses)
            .with_context(|| format!("reading course data from {}", courses.display()))?;
        let skill_json = fs::read_to_string(skills)
            .with_context(|| format!("reading skill data from {}", skills.display()))?;
        Ok(Self {
            courses: Arc::new(
                CourseCatalog::from_json(&course_json).context("parsing course data")?,
            ),
            skills: Arc::new(SkillCatalog::from_json(&skill_json).context("parsing skill data")?),
        })
    }
}
