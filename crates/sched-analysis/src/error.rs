//! Error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Malformed input that aborts construction of a trace analysis.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: invalid tick {value:?}")]
    InvalidTick { line: usize, value: String },

    #[error("line {line}: row has no event kind")]
    MissingKind { line: usize },

    #[error("line {line}: {kind} row is missing field {index} ({field})")]
    MissingField {
        line: usize,
        kind: String,
        index: usize,
        field: &'static str,
    },

    #[error("line {line}: {kind} field {field} is not numeric: {value:?}")]
    InvalidNumber {
        line: usize,
        kind: String,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("task {task_id} references unknown task graph {task_graph_id}")]
    UnknownTaskGraph { task_id: String, task_graph_id: String },

    #[error("task {task_id} uses resource {resource} which no worker pool declares")]
    UnknownResource { task_id: String, resource: String },
}

/// A metric was requested that the trace has no data for.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MissingDataError {
    #[error("trace has no LOG_STATS event")]
    NoLogStats,
}

/// Invalid run configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("required flag {0} is missing")]
    MissingKey(&'static str),

    #[error("flag {key} has malformed value {value:?}")]
    Malformed { key: &'static str, value: String },
}

/// Any failure while analyzing one run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {what} file found in {dir}")]
    MissingFile { dir: PathBuf, what: &'static str },

    #[error("invalid batch config {path}: {source}")]
    BatchConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    MissingData(#[from] MissingDataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of one run inside a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("analysis did not finish within {0:?}")]
    Timeout(Duration),

    #[error("analysis panicked: {0}")]
    Panicked(String),
}

/// Failure while writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
