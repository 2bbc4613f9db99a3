//! Analysis of an experiment run directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::error::AnalysisError;
use crate::metrics::ArrivalRates;
use crate::reconstruct::ReconstructOptions;
use crate::solver_log::{LogFormat, LogMetricsExtractor, SolverRecord};
use crate::stats::Summary;
use crate::trace::TraceAnalysis;

/// Scheduler-side logs share the run directory with the simulator files and are skipped.
const IGNORED_LOG_PREFIX: &str = "tetrisched_";
const IGNORED_CSV_PREFIX: &str = "libtetrisched_";

/// Input files of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    pub dir: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
    pub trace: PathBuf,
}

impl RunFiles {
    /// Locates the config, log and trace files of a run directory.
    ///
    /// For every kind the first matching file in sorted file name order is taken.
    pub fn discover(dir: &Path) -> Result<Self, AnalysisError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| AnalysisError::io(dir, e))? {
            let entry = entry.map_err(|e| AnalysisError::io(dir, e))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let find = |what: &'static str, ext: &str, ignored_prefix: Option<&str>| {
            names
                .iter()
                .find(|name| {
                    name.ends_with(ext) && ignored_prefix.map_or(true, |prefix| !name.starts_with(prefix))
                })
                .map(|name| dir.join(name))
                .ok_or_else(|| AnalysisError::MissingFile {
                    dir: dir.to_path_buf(),
                    what,
                })
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            config: find("config (*.conf)", ".conf", None)?,
            log: find("log (*.log)", ".log", Some(IGNORED_LOG_PREFIX))?,
            trace: find("trace (*.csv)", ".csv", Some(IGNORED_CSV_PREFIX))?,
        })
    }

    /// Directory name used to label the run in reports.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.display().to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub reconstruct: ReconstructOptions,
    pub log_format: LogFormat,
}

/// Trace, solver log and config of one run.
#[derive(Debug, Clone)]
pub struct RunAnalysis {
    pub name: String,
    pub files: RunFiles,
    pub config: RunConfig,
    pub arrival_rates: ArrivalRates,
    pub trace: TraceAnalysis,
    pub solver_records: Vec<SolverRecord>,
}

impl RunAnalysis {
    pub fn load(dir: &Path, options: &RunOptions) -> Result<Self, AnalysisError> {
        let files = RunFiles::discover(dir)?;
        let config = RunConfig::load(&files.config)?;
        let arrival_rates = ArrivalRates::new(config.arrival_rates.clone());
        let trace = TraceAnalysis::from_file(&files.trace, options.reconstruct)?;
        let solver_records = LogMetricsExtractor::new(options.log_format.clone()).extract_file(&files.log)?;
        log::debug!(
            "loaded run {}: {} events, {} solver records",
            dir.display(),
            trace.events.len(),
            solver_records.len()
        );
        Ok(Self {
            name: files.name(),
            files,
            config,
            arrival_rates,
            trace,
            solver_records,
        })
    }

    /// Solver times in seconds, in log order, for records that report one.
    pub fn solver_times(&self) -> Vec<f64> {
        self.solver_records.iter().filter_map(|r| r.solver_time_s).collect()
    }

    pub fn solver_total_times(&self) -> Vec<f64> {
        self.solver_records.iter().filter_map(|r| r.total_time_s).collect()
    }

    pub fn num_constraints(&self) -> Vec<u64> {
        self.solver_records.iter().filter_map(|r| r.num_constraints).collect()
    }

    pub fn num_variables(&self) -> Vec<u64> {
        self.solver_records.iter().filter_map(|r| r.num_variables).collect()
    }

    pub fn scheduler_runtime_summary(&self) -> Option<Summary> {
        Summary::of(self.trace.scheduler_runtimes.iter().copied())
    }

    pub fn solver_time_summary(&self) -> Option<Summary> {
        Summary::of(self.solver_times())
    }
}
