use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use umasim_race::{Aptitude, GainResult, HorseDesc, RaceConfig, compare_gain};

use super::TesterAssets;

/// Meters per horse length.
pub const BASHIN: f64 = 2.5;

/// Command-line adjustments applied on top of a scenario file.
#[derive(Debug, Clone, Default)]
pub struct GainOverrides {
    pub nsamples: Option<usize>,
    /// Appended to the scenario's skills under test.
    pub extra_skills: Vec<String>,
    /// Run the compared horse with a different distance aptitude.
    pub distance_aptitude: Option<Aptitude>,
    pub surface_aptitude: Option<Aptitude>,
}

impl GainOverrides {
    fn apply(&self, config: &RaceConfig) -> RaceConfig {
        let mut config = config.clone();
        if let Some(n) = self.nsamples {
            config.nsamples = n;
        }
        config
            .skills_under_test
            .extend(self.extra_skills.iter().cloned());
        config
    }

    fn compared_horse(&self, horse: &HorseDesc) -> Option<HorseDesc> {
        if self.distance_aptitude.is_none() && self.surface_aptitude.is_none() {
            return None;
        }
        Some(HorseDesc {
            distance_aptitude: self.distance_aptitude.unwrap_or(horse.distance_aptitude),
            surface_aptitude: self.surface_aptitude.unwrap_or(horse.surface_aptitude),
            ..horse.clone()
        })
    }
}

/// Run the baseline and the compared horse for every sample.
pub fn run_gain(
    assets: &TesterAssets,
    config: &RaceConfig,
    overrides: &GainOverrides,
    timestep: f64,
) -> Result<(RaceConfig, GainResult)> {
    let config = overrides.apply(config);
    config.validate().context("invalid scenario")?;
    let (mut standard, mut compare) = config
        .builders(&assets.courses, Arc::clone(&assets.skills))
        .context("preparing builders")?;
    if let Some(horse) = overrides.compared_horse(&config.horse) {
        compare = compare.horse(horse);
    }
    info!(
        "comparing {} skill(s) over {} samples on course {}",
        config.skills_under_test.len(),
        config.nsamples,
        config.course_id
    );
    let result = compare_gain(&mut standard, &mut compare, timestep).context("running samples")?;
    Ok((config, result))
}

/// Share of samples past one threshold.
///
/// A non-negative threshold counts gains at or above it; a negative one
/// counts gains below its magnitude, so `-0.25` reads "under a quarter length".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdShare {
    pub threshold: f64,
    pub percent: f64,
}

impl ThresholdShare {
    fn counts(threshold: f64, gain: f64) -> bool {
        if threshold < 0.0 {
            gain < -threshold
        } else {
            gain >= threshold
        }
    }
}

/// Column label for a threshold, e.g. `≥0.75` or `<0.25`.
#[must_use]
pub fn threshold_label(threshold: f64) -> String {
    if threshold < 0.0 {
        format!("<{:.2}", -threshold)
    } else {
        format!("≥{threshold:.2}")
    }
}

/// Distribution of gains in horse lengths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainSummary {
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
    pub thresholds: Vec<ThresholdShare>,
}

impl GainSummary {
    /// Summarize per-sample gains given in meters. `None` when there are no samples.
    #[must_use]
    pub fn from_meters(gains: &[f64], thresholds: &[f64]) -> Option<Self> {
        let mut lengths: Vec<f64> = gains.iter().map(|g| g / BASHIN).collect();
        lengths.sort_by(f64::total_cmp);
        let (&min, &max) = (lengths.first()?, lengths.last()?);
        #[allow(clippy::cast_precision_loss)]
        let n = lengths.len() as f64;
        let mid = lengths.len() / 2;
        let median = if lengths.len() % 2 == 0 {
            f64::midpoint(lengths[mid - 1], lengths[mid])
        } else {
            lengths[mid]
        };
        let mean = lengths.iter().sum::<f64>() / n;
        let thresholds = thresholds
            .iter()
            .map(|&threshold| {
                #[allow(clippy::cast_precision_loss)]
                let hits = lengths
                    .iter()
                    .filter(|&&g| ThresholdShare::counts(threshold, g))
                    .count() as f64;
                ThresholdShare {
                    threshold,
                    percent: hits / n * 100.0,
                }
            })
            .collect();
        Some(Self {
            samples: lengths.len(),
            min,
            max,
            median,
            mean,
            thresholds,
        })
    }
}
