use anyhow::{Context, Result};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use umasim_race::{RaceConfig, compare_gain};

use super::TesterAssets;
use super::gain::GainSummary;

/// Columns printed when none are requested.
pub const DEFAULT_THRESHOLDS: [f64; 3] = [-0.25, 0.75, 1.5];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub skill_id: String,
    /// A sample failed mid-run and the summary covers the ones before it.
    pub err: bool,
    pub summary: GainSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSkill {
    pub skill_id: String,
    pub reason: String,
}

/// Per-skill gains against one baseline, best mean first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillTable {
    pub rows: Vec<TableRow>,
    /// Skills that failed to compile for this scenario.
    pub skipped: Vec<SkippedSkill>,
    /// Skills that never finished ahead of the baseline.
    pub no_gain: Vec<String>,
}

/// Compare every catalog skill on its own against the scenario's baseline.
///
/// The scenario's skills under test are ignored and its presupposed skills
/// are left out of the table. A skill that does not build is recorded in
/// `skipped` and the run continues.
pub fn build_table(
    assets: &TesterAssets,
    config: &RaceConfig,
    thresholds: &[f64],
    timestep: f64,
) -> Result<SkillTable> {
    config.validate().context("invalid scenario")?;
    let standard = config
        .standard_builder(&assets.courses, Arc::clone(&assets.skills))
        .context("preparing the baseline")?;
    standard.fork().build().context("building the baseline")?;

    let mut table = SkillTable::default();
    for id in assets.skills.ids() {
        if config.presupposed_skills.iter().any(|p| p == id) {
            continue;
        }
        let mut baseline = standard.fork();
        let mut boosted = baseline.fork().add_skill(id);
        let result = match compare_gain(&mut baseline, &mut boosted, timestep) {
            Ok(result) => result,
            Err(err) => {
                debug!("skipping skill {id}: {err}");
                table.skipped.push(SkippedSkill {
                    skill_id: id.to_string(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        match GainSummary::from_meters(&result.gain, thresholds) {
            Some(summary) if summary.max > 0.0 => table.rows.push(TableRow {
                skill_id: id.to_string(),
                err: result.err,
                summary,
            }),
            _ => table.no_gain.push(id.to_string()),
        }
    }
    table.rows.sort_by(|a, b| b.summary.mean.total_cmp(&a.summary.mean));
    info!(
        "tabulated {} skills ({} skipped, {} without gain) on course {}",
        table.rows.len(),
        table.skipped.len(),
        table.no_gain.len(),
        config.course_id
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use umasim_race::{Aptitude, GroundCondition, HorseDesc, Mood, SkillCatalog, Strategy};

    fn assets() -> TesterAssets {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
        TesterAssets::load(
            &root.join("course_data.json"),
            &root.join("skill_data.json"),
        )
        .expect("sample data loads")
    }

    fn scenario() -> RaceConfig {
        RaceConfig {
            seed: 5,
            course_id: 10504,
            ground_condition: GroundCondition::Good,
            mood: Mood::BEST,
            horse: HorseDesc {
                speed: 1200.0,
                stamina: 900.0,
                power: 1000.0,
                guts: 600.0,
                wisdom: 1100.0,
                strategy: Strategy::Senkou,
                distance_aptitude: Aptitude::A,
                surface_aptitude: Aptitude::A,
                strategy_aptitude: Aptitude::A,
            },
            pace_effects_enabled: false,
            nsamples: 4,
            presupposed_skills: vec!["200011".into()],
            skills_under_test: vec!["202051".into()],
        }
    }

    #[test]
    fn rows_are_sorted_and_leave_out_presupposed_skills() {
        let assets = assets();
        let table = build_table(&assets, &scenario(), &DEFAULT_THRESHOLDS, 1.0 / 15.0)
            .expect("table builds");
        assert!(!table.rows.is_empty());
        assert!(
            table
                .rows
                .windows(2)
                .all(|pair| pair[0].summary.mean >= pair[1].summary.mean)
        );
        assert!(table.rows.iter().all(|row| row.summary.samples == 4));
        assert!(table.rows.iter().all(|row| row.summary.thresholds.len() == 3));
        let listed = table.rows.len() + table.skipped.len() + table.no_gain.len();
        assert_eq!(listed, assets.skills.len() - 1);
        let mentions = |id: &str| {
            table.rows.iter().any(|r| r.skill_id == id)
                || table.skipped.iter().any(|s| s.skill_id == id)
                || table.no_gain.iter().any(|s| s == id)
        };
        assert!(!mentions("200011"));
    }

    #[test]
    fn skills_that_fail_to_compile_are_skipped() {
        let mut skills: serde_json::Value = serde_json::from_str(include_str!(
            "../../../data/skill_data.json"
        ))
        .expect("skill data is json");
        skills["299999"] = serde_json::json!({
            "rarity": 1,
            "alternatives": [{"condition": "phase==&corner==0", "baseDuration": 30000,
                              "effects": [{"type": 27, "modifier": 3500, "target": 1}]}]
        });
        let mut assets = assets();
        assets.skills = Arc::new(
            SkillCatalog::from_json(&skills.to_string()).expect("catalog parses"),
        );
        let table = build_table(&assets, &scenario(), &[], 1.0 / 15.0).expect("table builds");
        let broken = table
            .skipped
            .iter()
            .find(|s| s.skill_id == "299999")
            .expect("broken skill is skipped");
        assert!(!broken.reason.is_empty());
        assert!(table.rows.iter().all(|row| row.skill_id != "299999"));
        assert!(!table.rows.is_empty());
    }

    #[test]
    fn broken_baseline_is_an_error() {
        let mut config = scenario();
        config.presupposed_skills.push("123456789".into());
        assert!(build_table(&assets(), &config, &[], 1.0 / 15.0).is_err());
    }
}
