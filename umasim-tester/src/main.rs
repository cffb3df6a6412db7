mod logic;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;
use umasim_race::{Aptitude, RaceConfig};

use logic::checkpoint::{CaseLimits, read_entries};
use logic::reports::{
    write_check_console, write_gain_console, write_gain_json, write_grep, write_json,
    write_table_console, write_table_csv, write_trace_csv,
};
use logic::seeds::FAST_SUBSET;
use logic::{
    DEFAULT_THRESHOLDS, GainOverrides, GainSummary, GrepScope, TesterAssets, build_table,
    check_entries, create_entries, fast_subset, grep_skills, latest_checkpoint, parse_timestep,
    resolve_seed, run_gain, todays_checkpoint_name, trace_race,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary
    Console,
    /// Scenario, raw per-sample gains and summary as JSON
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TableFormat {
    /// Aligned columns with skipped skills listed below
    Console,
    /// mean,skill,min,max,median and one column per threshold
    Csv,
    /// Rows, skipped skills and skills without gain as JSON
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TraceFormat {
    /// Every step plus skill activation spans
    Json,
    /// One line per step: t,pos,speed,targetSpeed,accel,hp
    Csv,
}

#[derive(Debug, Parser)]
#[command(name = "umasim-tester", version = "0.1.0")]
#[command(about = "Skill gain comparison, regression checkpoints and condition search for umasim")]
struct Args {
    /// Course data JSON
    #[arg(long, global = true, default_value = "data/course_data.json")]
    courses: PathBuf,

    /// Skill data JSON
    #[arg(long, global = true, default_value = "data/skill_data.json")]
    skills: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compare a scenario with and without its skills under test
    Gain(GainArgs),
    /// Record or verify regression checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// List skills whose conditions contain an expression
    Grep(GrepArgs),
    /// Gain of every catalog skill on its own against a scenario's baseline
    Table(TableArgs),
    /// Record position, speed and HP at every step of one sample
    Dump(DumpArgs),
}

#[derive(Debug, clap::Args)]
struct GainArgs {
    /// Scenario JSON (see RaceConfig)
    config: PathBuf,

    /// Number of samples, overriding the scenario
    #[arg(short = 'N', long)]
    nsamples: Option<usize>,

    /// Additional skill under test (repeatable)
    #[arg(long = "skill")]
    extra_skills: Vec<String>,

    /// Run the compared horse with this distance aptitude
    #[arg(short = 'D', long)]
    distance_aptitude: Option<Aptitude>,

    /// Run the compared horse with this surface aptitude
    #[arg(short = 'S', long)]
    surface_aptitude: Option<Aptitude>,

    /// Print how often the gain reaches each of these lengths
    #[arg(long, value_delimiter = ',', default_values_t = [0.5, 1.0, 1.5, 2.0, 2.5])]
    thresholds: Vec<f64>,

    /// Integration timestep in seconds, e.g. 1/15 or 0.05
    #[arg(long, default_value = "1/15", value_parser = parse_timestep)]
    timestep: f64,

    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Write the report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum CheckpointAction {
    /// Generate random scenarios and record their gains
    Create {
        /// Number of scenarios
        #[arg(short = 't', long, default_value_t = 1000)]
        tests: usize,

        #[arg(long, default_value = "1/15", value_parser = parse_timestep)]
        timestep: f64,

        /// Scenario generator seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = 200)]
        max_samples: usize,

        #[arg(long, default_value_t = 30)]
        max_skills: usize,

        /// Checkpoint file; defaults to a dated file in --dir
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "checkpoints")]
        dir: PathBuf,
    },
    /// Re-run a checkpoint and compare every sample
    Check {
        /// Checkpoint file; defaults to the newest dated file in --dir
        cases: Option<PathBuf>,

        /// Check a random subset of the cases
        #[arg(long)]
        fast: bool,

        /// Shuffle seed for --fast (implies --fast)
        #[arg(long)]
        seed: Option<u32>,

        /// Where to write failing samples
        #[arg(short = 'l', long, default_value = "failures.json")]
        failure_log: PathBuf,

        #[arg(long, default_value = "checkpoints")]
        dir: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct TableArgs {
    /// Scenario JSON; its skills under test are ignored
    config: PathBuf,

    /// Number of samples, overriding the scenario
    #[arg(short = 'N', long)]
    nsamples: Option<usize>,

    /// Threshold columns in lengths; negative values count gains below the magnitude
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_values_t = DEFAULT_THRESHOLDS
    )]
    thresholds: Vec<f64>,

    #[arg(long, default_value = "1/15", value_parser = parse_timestep)]
    timestep: f64,

    #[arg(long, value_enum, default_value_t = TableFormat::Console)]
    report: TableFormat,

    /// Write the table here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct DumpArgs {
    /// Scenario JSON; presupposed skills and skills under test both run
    config: PathBuf,

    /// Additional skill (repeatable)
    #[arg(long = "skill")]
    extra_skills: Vec<String>,

    /// Which of the scenario's samples to trace
    #[arg(long, default_value_t = 0)]
    sample: usize,

    #[arg(long, default_value = "1/60", value_parser = parse_timestep)]
    timestep: f64,

    #[arg(long, value_enum, default_value_t = TraceFormat::Json)]
    format: TraceFormat,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct GrepArgs {
    /// Condition name (blocked_side_continuetime) or expression (corner==0&order_rate<80)
    condition: String,

    /// Search only preconditions
    #[arg(short = 'P', long)]
    pre: bool,

    /// Do not search preconditions
    #[arg(short = 'X', long)]
    exclude_pre: bool,

    /// Print skill ids only
    #[arg(short = 'l', long)]
    list: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let assets = TesterAssets::load(&args.courses, &args.skills)?;

    match args.command {
        Command::Gain(gain) => run_gain_command(&assets, &gain),
        Command::Checkpoint { action } => match action {
            CheckpointAction::Create {
                tests,
                timestep,
                seed,
                max_samples,
                max_skills,
                output,
                dir,
            } => {
                let limits = CaseLimits {
                    max_samples,
                    max_presupposed: max_skills,
                    max_under_test: max_skills,
                };
                let path = output.unwrap_or_else(|| dir.join(todays_checkpoint_name()));
                run_create_command(&assets, tests, timestep, resolve_seed(seed), limits, &path)
            }
            CheckpointAction::Check {
                cases,
                fast,
                seed,
                failure_log,
                dir,
            } => {
                let path = match cases {
                    Some(path) => path,
                    None => latest_checkpoint(&dir)?,
                };
                let subset_seed = (fast || seed.is_some()).then(|| resolve_seed(seed));
                let passed = run_check_command(&assets, &path, subset_seed, &failure_log)?;
                if !passed {
                    std::process::exit(1);
                }
                Ok(())
            }
        },
        Command::Grep(grep) => {
            let scope = GrepScope::from_flags(grep.pre, grep.exclude_pre);
            let found = grep_skills(&assets.skills, &grep.condition, scope)?;
            let mut out = OutputTarget::new(None)?;
            write_grep(out.writer(), &found, grep.list)?;
            out.flush_inner()?;
            Ok(())
        }
        Command::Table(table) => run_table_command(&assets, &table),
        Command::Dump(dump) => run_dump_command(&assets, &dump),
    }
}

fn read_scenario(path: &Path) -> Result<RaceConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    RaceConfig::from_json(&json).with_context(|| format!("loading scenario {}", path.display()))
}

fn run_gain_command(assets: &TesterAssets, gain: &GainArgs) -> Result<()> {
    let config = read_scenario(&gain.config)?;
    let overrides = GainOverrides {
        nsamples: gain.nsamples,
        extra_skills: gain.extra_skills.clone(),
        distance_aptitude: gain.distance_aptitude,
        surface_aptitude: gain.surface_aptitude,
    };
    let (config, result) = run_gain(assets, &config, &overrides, gain.timestep)?;
    let summary = GainSummary::from_meters(&result.gain, &gain.thresholds);

    let mut out = OutputTarget::new(gain.output.clone())?;
    match gain.report {
        ReportFormat::Console => {
            write_gain_console(out.writer(), &config, &result, summary.as_ref())?;
        }
        ReportFormat::Json => write_gain_json(out.writer(), &config, &result, summary.as_ref())?,
    }
    out.flush_inner()?;
    Ok(())
}

fn run_table_command(assets: &TesterAssets, args: &TableArgs) -> Result<()> {
    let mut config = read_scenario(&args.config)?;
    if let Some(n) = args.nsamples {
        config.nsamples = n;
    }
    let start = Instant::now();
    let table = build_table(assets, &config, &args.thresholds, args.timestep)?;

    let mut out = OutputTarget::new(args.output.clone())?;
    match args.report {
        TableFormat::Console => write_table_console(out.writer(), &table, &args.thresholds)?,
        TableFormat::Csv => write_table_csv(out.writer(), &table, &args.thresholds)?,
        TableFormat::Json => write_json(out.writer(), &table)?,
    }
    out.flush_inner()?;
    info!("table finished in {:?}", start.elapsed());
    Ok(())
}

fn run_dump_command(assets: &TesterAssets, args: &DumpArgs) -> Result<()> {
    let mut config = read_scenario(&args.config)?;
    config
        .skills_under_test
        .extend(args.extra_skills.iter().cloned());
    let trace = trace_race(assets, &config, args.sample, args.timestep)?;

    let mut out = OutputTarget::new(args.output.clone())?;
    match args.format {
        TraceFormat::Json => write_json(out.writer(), &trace)?,
        TraceFormat::Csv => write_trace_csv(out.writer(), &trace)?,
    }
    out.flush_inner()?;
    Ok(())
}

fn run_create_command(
    assets: &TesterAssets,
    tests: usize,
    timestep: f64,
    seed: u64,
    limits: CaseLimits,
    path: &Path,
) -> Result<()> {
    println!("{}", "🏁 Creating checkpoint".bright_cyan().bold());
    let start = Instant::now();
    let entries = create_entries(assets, tests, seed, timestep, limits)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut out = OutputTarget::new(Some(path.to_path_buf()))?;
    serde_json::to_writer(out.writer(), &entries)?;
    out.flush_inner()?;
    let errors = entries.iter().filter(|e| e.result.err).count();
    println!(
        "Wrote {} cases ({} with errors) to {} in {:?}",
        entries.len(),
        errors,
        path.display(),
        start.elapsed()
    );
    println!("seed {seed}");
    Ok(())
}

fn run_check_command(
    assets: &TesterAssets,
    path: &Path,
    subset_seed: Option<u32>,
    failure_log: &Path,
) -> Result<bool> {
    println!(
        "{} {}",
        "🔍 Checking".bright_cyan().bold(),
        path.display()
    );
    let mut entries = read_entries(path)?;
    if let Some(seed) = subset_seed {
        entries = fast_subset(entries, seed, FAST_SUBSET);
    }
    let report = check_entries(assets, &entries);

    let mut out = OutputTarget::new(None)?;
    write_check_console(out.writer(), &report)?;
    out.flush_inner()?;

    if !report.failures.is_empty() {
        let mut log = OutputTarget::new(Some(failure_log.to_path_buf()))?;
        serde_json::to_writer(log.writer(), &report.failures)?;
        log.flush_inner()?;
        let plural = if report.failures.len() == 1 { "" } else { "s" };
        println!(
            "wrote {} failure{plural} to {}",
            report.failures.len(),
            failure_log.display()
        );
    }
    if let Some(seed) = subset_seed {
        println!("seed {seed}");
    }
    Ok(report.passed())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}
