//! Serializable summaries of analyzed runs and their JSON/CSV export.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::batch::RunOutcome;
use crate::error::ReportError;
use crate::metrics::{ArrivalRates, TaskGraphCounts};
use crate::run::RunAnalysis;
use crate::stats::Summary;
use crate::utilization::{ClusterSummary, DegenerateMetric};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub capacity: f64,
    pub effective_utilization: f64,
    pub total_utilization: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<DegenerateMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverSummary {
    pub records: usize,
    pub solver_time_s: Option<Summary>,
    pub total_time_s: Option<Summary>,
    pub num_variables: Option<Summary>,
    pub num_constraints: Option<Summary>,
}

/// Report entry of one run. Per-tick series are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub dir: PathBuf,
    pub scheduler: Option<String>,
    pub arrival_rates: ArrivalRates,
    pub num_invocations: Option<Vec<u64>>,
    pub complete: bool,
    /// SLO attainment percentage, absent without LOG_STATS.
    pub slo: Option<f64>,
    pub task_graphs: Option<TaskGraphCounts>,
    pub end_tick: u64,
    pub utilization: IndexMap<String, ResourceSummary>,
    pub cluster: Option<ClusterSummary>,
    pub scheduler_runtime_s: Option<Summary>,
    pub deadline_slack: Option<Summary>,
    pub solver: SolverSummary,
}

fn summary_of_counts(values: Vec<u64>) -> Option<Summary> {
    Summary::of(values.into_iter().map(|v| v as f64))
}

impl RunSummary {
    pub fn new(run: &RunAnalysis) -> Self {
        let trace = &run.trace;
        let utilization = trace
            .utilization
            .resources
            .iter()
            .map(|(name, r)| {
                (
                    name.clone(),
                    ResourceSummary {
                        capacity: r.capacity,
                        effective_utilization: r.effective_utilization,
                        total_utilization: r.total_utilization,
                        degenerate: r.degenerate,
                    },
                )
            })
            .collect();
        let slo = match trace.slo() {
            Ok(slo) => Some(slo),
            Err(e) => {
                log::warn!("run {}: {}", run.name, e);
                None
            }
        };
        Self {
            name: run.name.clone(),
            dir: run.files.dir.clone(),
            scheduler: run.config.scheduler.clone(),
            arrival_rates: run.arrival_rates.clone(),
            num_invocations: run.config.num_invocations.clone(),
            complete: trace.is_complete(),
            slo,
            task_graphs: trace.task_graph_counts(),
            end_tick: trace.utilization.end_tick,
            utilization,
            cluster: trace.utilization.summary(),
            scheduler_runtime_s: run.scheduler_runtime_summary(),
            deadline_slack: Summary::of(trace.slacks.iter().map(|&s| s as f64)),
            solver: SolverSummary {
                records: run.solver_records.len(),
                solver_time_s: run.solver_time_summary(),
                total_time_s: Summary::of(run.solver_total_times()),
                num_variables: summary_of_counts(run.num_variables()),
                num_constraints: summary_of_counts(run.num_constraints()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub dir: PathBuf,
    pub error: String,
}

/// Summaries of successful runs and the errors of failed ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub runs: Vec<RunSummary>,
    pub failures: Vec<RunFailure>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: &[RunOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes.iter() {
            match &outcome.result {
                Ok(run) => report.runs.push(RunSummary::new(run)),
                Err(e) => report.failures.push(RunFailure {
                    dir: outcome.dir.clone(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ReportError> {
        self.write_json(create(path)?)
    }

    /// Rows of the utilization table sorted by run and resource.
    pub fn utilization_rows(&self) -> Vec<UtilizationRow> {
        let mut rows: Vec<UtilizationRow> = self
            .runs
            .iter()
            .flat_map(|run| {
                run.utilization.iter().map(move |(resource, r)| UtilizationRow {
                    run: run.name.clone(),
                    resource: resource.clone(),
                    effective_utilization: r.effective_utilization,
                    total_utilization: r.total_utilization,
                })
            })
            .collect();
        rows.sort_by(|a, b| (&a.run, &a.resource).cmp(&(&b.run, &b.resource)));
        rows
    }

    pub fn write_utilization_csv<W: Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in self.utilization_rows().iter() {
            wtr.serialize(row)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn save_utilization_csv(&self, path: &Path) -> Result<(), ReportError> {
        self.write_utilization_csv(create(path)?)
    }
}

fn create(path: &Path) -> Result<File, ReportError> {
    File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtilizationRow {
    pub run: String,
    pub resource: String,
    pub effective_utilization: f64,
    pub total_utilization: f64,
}
