use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use umasim_race::{GainResult, RaceConfig};

use super::checkpoint::CheckReport;
use super::dump::RaceTrace;
use super::gain::{GainSummary, threshold_label};
use super::grep::GrepMatch;
use super::table::SkillTable;

#[derive(Debug, Serialize)]
struct GainReport<'a> {
    params: &'a RaceConfig,
    result: &'a GainResult,
    summary: Option<&'a GainSummary>,
}

pub fn write_gain_console(
    out: &mut dyn Write,
    config: &RaceConfig,
    result: &GainResult,
    summary: Option<&GainSummary>,
) -> Result<()> {
    writeln!(
        out,
        "{} {} on course {} ({} samples)",
        "🏇".bright_cyan(),
        config.skills_under_test.join(", ").bold(),
        config.course_id,
        result.gain.len()
    )?;
    if result.err {
        writeln!(out, "{}", "⚠️  a sample failed; results are partial".yellow())?;
    }
    let Some(summary) = summary else {
        writeln!(out, "{}", "no samples completed".red())?;
        return Ok(());
    };
    writeln!(out, "min:\t{:.2}", summary.min)?;
    writeln!(out, "max:\t{:.2}", summary.max)?;
    writeln!(out, "median:\t{:.2}", summary.median)?;
    writeln!(out, "mean:\t{}", format!("{:.2}", summary.mean).green())?;
    if !summary.thresholds.is_empty() {
        writeln!(out)?;
    }
    for share in &summary.thresholds {
        writeln!(out, "{} | {:.1}%", threshold_label(share.threshold), share.percent)?;
    }
    Ok(())
}

pub fn write_gain_json(
    out: &mut dyn Write,
    config: &RaceConfig,
    result: &GainResult,
    summary: Option<&GainSummary>,
) -> Result<()> {
    let report = GainReport {
        params: config,
        result,
        summary,
    };
    write_json(out, &report)
}

pub fn write_check_console(out: &mut dyn Write, report: &CheckReport) -> Result<()> {
    writeln!(
        out,
        "Checked {} cases ({} samples)",
        report.cases, report.samples
    )?;
    if report.passed() {
        writeln!(out, "{}", "✅ all samples match the checkpoint".green())?;
        return Ok(());
    }
    for failure in &report.failures {
        writeln!(
            out,
            "   {} case {} sample {}: expected {} got {}",
            "•".red(),
            failure.case_idx,
            failure.sample_idx,
            failure.expected,
            failure.actual
        )?;
    }
    for case_idx in &report.err_mismatches {
        writeln!(
            out,
            "   {} case {case_idx}: error flag differs from the checkpoint",
            "•".red()
        )?;
    }
    writeln!(
        out,
        "{}",
        format!(
            "❌ {} mismatched samples, {} mismatched error flags",
            report.failures.len(),
            report.err_mismatches.len()
        )
        .red()
    )?;
    Ok(())
}

pub fn write_grep(out: &mut dyn Write, found: &[GrepMatch], list_only: bool) -> Result<()> {
    for skill in found {
        writeln!(out, "{}", skill.skill_id.bold())?;
        if list_only {
            continue;
        }
        for alt in &skill.alternatives {
            if !alt.precondition.is_empty() {
                writeln!(out, "Precondition:\t{}", alt.precondition)?;
            }
            writeln!(out, "   Condition:\t{}", alt.condition)?;
        }
    }
    Ok(())
}

/// Pretty-printed JSON followed by a newline.
pub fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_table_csv(
    out: &mut dyn Write,
    table: &SkillTable,
    thresholds: &[f64],
) -> Result<()> {
    let mut header = vec!["mean", "skill", "min", "max", "median"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    header.extend(thresholds.iter().map(|&t| threshold_label(t)));
    writeln!(out, "{}", header.join(","))?;
    for row in &table.rows {
        let s = &row.summary;
        let mut cols = vec![
            format!("{:.2}", s.mean),
            row.skill_id.clone(),
            format!("{:.2}", s.min),
            format!("{:.2}", s.max),
            format!("{:.2}", s.median),
        ];
        cols.extend(s.thresholds.iter().map(|share| format!("{:.2}", share.percent)));
        writeln!(out, "{}", cols.join(","))?;
    }
    Ok(())
}

pub fn write_table_console(
    out: &mut dyn Write,
    table: &SkillTable,
    thresholds: &[f64],
) -> Result<()> {
    write!(
        out,
        "{}",
        format!(
            "{:>8} {:<10} {:>7} {:>7} {:>7}",
            "mean", "skill", "min", "max", "median"
        )
        .bold()
    )?;
    for &threshold in thresholds {
        write!(out, " {:>7}", threshold_label(threshold).bold())?;
    }
    writeln!(out)?;
    for row in &table.rows {
        let s = &row.summary;
        write!(
            out,
            "{} {:<10} {:>7.2} {:>7.2} {:>7.2}",
            format!("{:>8.2}", s.mean).green(),
            row.skill_id,
            s.min,
            s.max,
            s.median
        )?;
        for share in &s.thresholds {
            write!(out, " {:>6.1}%", share.percent)?;
        }
        if row.err {
            write!(out, " {}", "⚠️ partial".yellow())?;
        }
        writeln!(out)?;
    }
    if !table.no_gain.is_empty() {
        writeln!(out, "no gain: {}", table.no_gain.join(", "))?;
    }
    for skipped in &table.skipped {
        writeln!(
            out,
            "{} skipped {}: {}",
            "⚠️".yellow(),
            skipped.skill_id,
            skipped.reason
        )?;
    }
    Ok(())
}

pub fn write_trace_csv(out: &mut dyn Write, trace: &RaceTrace) -> Result<()> {
    writeln!(out, "t,pos,speed,targetSpeed,accel,hp")?;
    for p in &trace.points {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            p.t, p.pos, p.speed, p.target_speed, p.accel, p.hp
        )?;
    }
    Ok(())
}
