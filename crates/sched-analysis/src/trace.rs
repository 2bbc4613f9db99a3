//! Analysis of one simulator trace.

use std::fs;
use std::io::Read;
use std::path::Path;

use itertools::Itertools;

use crate::error::{AnalysisError, MissingDataError, ParseError};
use crate::event::{parse_trace, Event};
use crate::metrics::{LogStats, MetricsAggregator, SchedulerLoad, TaskGraphCounts};
use crate::reconstruct::{reconstruct, EntitySet, ReconstructOptions};
use crate::utilization::{cluster_utilization, ClusterUtilization};

/// Entities and derived metrics of a trace, computed once at construction.
///
/// Construction either succeeds completely or fails with a [`ParseError`]; there is no partially built analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceAnalysis {
    pub events: Vec<Event>,
    pub entities: EntitySet,
    pub utilization: ClusterUtilization,
    /// Last LOG_STATS row, if the trace has one.
    pub log_stats: Option<LogStats>,
    /// Scheduler runtimes in seconds.
    pub scheduler_runtimes: Vec<f64>,
    pub scheduler_load: Vec<SchedulerLoad>,
    pub slacks: Vec<i64>,
    complete: bool,
}

impl TraceAnalysis {
    pub fn from_events(events: Vec<Event>, options: ReconstructOptions) -> Result<Self, ParseError> {
        let entities = reconstruct(&events, options)?;
        let utilization = cluster_utilization(&entities);
        let metrics = MetricsAggregator::new(&events);
        let log_stats = metrics.log_stats();
        let scheduler_runtimes = metrics.scheduler_runtimes()?;
        let scheduler_load = metrics.scheduler_load()?;
        let slacks = metrics.slacks()?;
        let complete = metrics.is_complete();
        if !complete {
            log::debug!("trace does not end with SIMULATOR_END");
        }
        Ok(Self {
            events,
            entities,
            utilization,
            log_stats,
            scheduler_runtimes,
            scheduler_load,
            slacks,
            complete,
        })
    }

    pub fn from_reader<R: Read>(reader: R, options: ReconstructOptions) -> Result<Self, ParseError> {
        Self::from_events(parse_trace(reader)?, options)
    }

    pub fn parse(text: &str, options: ReconstructOptions) -> Result<Self, ParseError> {
        Self::from_reader(text.as_bytes(), options)
    }

    pub fn from_lines<I, S>(lines: I, options: ReconstructOptions) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = lines.into_iter().map(|line| line.as_ref().to_string()).join("\n");
        Self::parse(&text, options)
    }

    pub fn from_file(path: &Path, options: ReconstructOptions) -> Result<Self, AnalysisError> {
        let text = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        let analysis = Self::parse(&text, options)?;
        log::debug!("analyzed trace {}", path.display());
        Ok(analysis)
    }

    /// SLO attainment percentage.
    ///
    /// Fails if the trace has no LOG_STATS row or its attainment field is malformed.
    pub fn slo(&self) -> Result<f64, AnalysisError> {
        match &self.log_stats {
            Some(stats) => Ok(stats.slo()?),
            None => Err(MissingDataError::NoLogStats.into()),
        }
    }

    /// Task graph counts of the last LOG_STATS row, if present and well formed.
    pub fn task_graph_counts(&self) -> Option<TaskGraphCounts> {
        self.log_stats.as_ref().and_then(|stats| stats.counts)
    }

    /// The trace ends with a SIMULATOR_END event.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}
