use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use env_logger::{Builder, Env};

use sched_analysis::batch::{analyze_runs, expand_runs, BatchConfig, BatchRunner};
use sched_analysis::reconstruct::ReconstructOptions;
use sched_analysis::report::{BatchReport, RunSummary};
use sched_analysis::run::RunOptions;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Analyzes outputs of scheduler simulation runs
struct Args {
    /// Run directories or directories containing run directories
    runs: Vec<PathBuf>,

    /// Path to YAML file with batch configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to produced JSON file with run summaries
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to produced CSV file with per-resource utilization
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Number of threads to use (default - use all available cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Per-run timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Accept placements on resources not declared by any worker pool
    #[arg(long)]
    no_validate_resources: bool,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

fn print_table(runs: &[RunSummary]) {
    println!(
        "{:<30} {:<16} {:>8} {:>10} {:>10} {:>12}",
        "run", "scheduler", "slo", "eff util", "total util", "sched p50 s"
    );
    for run in runs.iter() {
        println!(
            "{:<30} {:<16} {:>8} {:>10} {:>10} {:>12}",
            run.name,
            run.scheduler.as_deref().unwrap_or("-"),
            fmt_opt(run.slo),
            fmt_opt(run.cluster.as_ref().map(|c| c.mean_effective_utilization)),
            fmt_opt(run.cluster.as_ref().map(|c| c.mean_total_utilization)),
            fmt_opt(run.scheduler_runtime_s.as_ref().map(|s| s.median)),
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BatchConfig::from_file(path)?,
        None => BatchConfig::default(),
    };
    config.runs.extend(args.runs.iter().cloned());
    if config.runs.is_empty() {
        return Err("no runs given".into());
    }

    let runner = BatchRunner::new(
        args.threads.or(config.threads).unwrap_or(BatchRunner::default().threads),
        args.timeout.map(Duration::from_secs).or_else(|| config.timeout()),
    );
    let options = RunOptions {
        reconstruct: ReconstructOptions {
            validate_resources: !args.no_validate_resources,
        },
        ..Default::default()
    };

    let dirs = expand_runs(&config.runs)?;
    let outcomes = analyze_runs(dirs, options, &runner);
    let report = BatchReport::from_outcomes(&outcomes);

    print_table(&report.runs);
    for failure in report.failures.iter() {
        log::error!("{}: {}", failure.dir.display(), failure.error);
    }

    if let Some(path) = &args.output {
        report.save_json(path)?;
        log::info!("wrote report to {}", path.display());
    }
    if let Some(path) = &args.csv {
        report.save_utilization_csv(path)?;
        log::info!("wrote utilization table to {}", path.display());
    }
    Ok(())
}
