//! Scalar and series metrics derived from trace events and run configuration.

use serde::Serialize;

use crate::error::{AnalysisError, MissingDataError, ParseError};
use crate::event::{kind, Event};

const MICROS_PER_SECOND: f64 = 1e6;

// LOG_STATS parameter positions.
const LOG_STATS_FINISHED: usize = 3;
const LOG_STATS_CANCELLED: usize = 4;
const LOG_STATS_MISSED: usize = 5;
const LOG_STATS_ATTAINMENT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskGraphCounts {
    pub total: u64,
    pub finished: u64,
    pub cancelled: u64,
    pub missed_deadline: u64,
}

/// Contents of a LOG_STATS row.
///
/// Counts are optional: a row whose counts are missing or not whole numbers still carries the attainment.
/// A malformed attainment is kept as an error and only reported when the SLO is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct LogStats {
    pub tick: u64,
    pub counts: Option<TaskGraphCounts>,
    attainment: Result<f64, ParseError>,
}

/// Counts are written as floats by some simulator versions, so `18.0` is accepted.
fn parse_count(event: &Event, index: usize, field: &'static str) -> Result<u64, ParseError> {
    let value: f64 = event.parse_param(index, field)?;
    if !value.is_finite() || value < 0. || value.fract() != 0. {
        return Err(ParseError::InvalidNumber {
            line: event.line,
            kind: event.kind.clone(),
            field,
            value: event.param(index, field)?.to_string(),
        });
    }
    Ok(value as u64)
}

fn parse_counts(event: &Event) -> Result<TaskGraphCounts, ParseError> {
    let finished = parse_count(event, LOG_STATS_FINISHED, "finished")?;
    let cancelled = parse_count(event, LOG_STATS_CANCELLED, "cancelled")?;
    Ok(TaskGraphCounts {
        total: finished.saturating_add(cancelled),
        finished,
        cancelled,
        missed_deadline: parse_count(event, LOG_STATS_MISSED, "missed_deadline")?,
    })
}

impl LogStats {
    pub fn from_event(event: &Event) -> Self {
        let counts = match parse_counts(event) {
            Ok(counts) => Some(counts),
            Err(e) => {
                log::debug!("ignoring task graph counts: {}", e);
                None
            }
        };
        Self {
            tick: event.tick,
            counts,
            attainment: event.parse_param(LOG_STATS_ATTAINMENT, "attainment"),
        }
    }

    /// Fraction of task graphs meeting their deadline, in `[0, 1]`.
    pub fn attainment(&self) -> Result<f64, ParseError> {
        self.attainment.clone()
    }

    /// SLO attainment as a percentage.
    pub fn slo(&self) -> Result<f64, ParseError> {
        Ok(self.attainment()? * 100.)
    }
}

/// Scheduler queue state at a SCHEDULER_START event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerLoad {
    pub tick: u64,
    pub schedulable_tasks: u64,
    pub placed_tasks: u64,
}

/// Per-class arrival rates and their sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrivalRates {
    pub rates: Vec<f64>,
    pub total: f64,
}

impl ArrivalRates {
    pub fn new(rates: Vec<f64>) -> Self {
        let total = rates.iter().sum();
        Self { rates, total }
    }
}

/// Derives metrics from the events of one trace.
pub struct MetricsAggregator<'a> {
    events: &'a [Event],
}

impl<'a> MetricsAggregator<'a> {
    pub fn new(events: &'a [Event]) -> Self {
        Self { events }
    }

    /// The last LOG_STATS row of the trace.
    pub fn log_stats(&self) -> Option<LogStats> {
        self.events
            .iter()
            .rev()
            .find(|e| e.is(kind::LOG_STATS))
            .map(LogStats::from_event)
    }

    /// SLO attainment percentage from the last LOG_STATS row.
    pub fn slo(&self) -> Result<f64, AnalysisError> {
        match self.log_stats() {
            Some(stats) => Ok(stats.slo()?),
            None => Err(MissingDataError::NoLogStats.into()),
        }
    }

    /// Runtimes in seconds of scheduler invocations that placed or unplaced at least one task.
    pub fn scheduler_runtimes(&self) -> Result<Vec<f64>, ParseError> {
        let mut runtimes = Vec::new();
        for event in self.events.iter().filter(|e| e.is(kind::SCHEDULER_FINISHED)) {
            let first: u64 = event.parse_param(1, "first_count")?;
            let second: u64 = event.parse_param(2, "second_count")?;
            if first == 0 && second == 0 {
                continue;
            }
            let runtime: f64 = event.parse_last_param("runtime_us")?;
            runtimes.push(runtime / MICROS_PER_SECOND);
        }
        Ok(runtimes)
    }

    pub fn scheduler_load(&self) -> Result<Vec<SchedulerLoad>, ParseError> {
        self.events
            .iter()
            .filter(|e| e.is(kind::SCHEDULER_START))
            .map(|e| {
                Ok(SchedulerLoad {
                    tick: e.tick,
                    schedulable_tasks: e.parse_param(0, "schedulable_tasks")?,
                    placed_tasks: e.parse_param(1, "placed_tasks")?,
                })
            })
            .collect()
    }

    /// Deadline slack of each released task graph: `deadline - (release + critical_path_runtime)`.
    pub fn slacks(&self) -> Result<Vec<i64>, ParseError> {
        self.events
            .iter()
            .filter(|e| e.is(kind::TASK_GRAPH_RELEASE))
            .map(|e| {
                let release: i64 = e.parse_param(0, "release_tick")?;
                let deadline: i64 = e.parse_param(1, "deadline_tick")?;
                let critical_path: i64 = e.parse_last_param("critical_path_runtime")?;
                Ok(deadline - (release + critical_path))
            })
            .collect()
    }

    /// The trace ends with a SIMULATOR_END event.
    pub fn is_complete(&self) -> bool {
        self.events.last().map_or(false, |e| e.is(kind::SIMULATOR_END))
    }
}
