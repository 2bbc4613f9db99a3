//! Extraction of solver statistics from free-text scheduler logs.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::error::AnalysisError;

const MICROS_PER_SECOND: f64 = 1e6;

/// Markers selecting the log lines that carry a solver record.
#[derive(Debug, Clone)]
pub struct LogFormat {
    /// Component and level prefix, e.g. `TetriSchedScheduler INFO`.
    pub component_marker: String,
    /// Name of the bracketed `key=value` record, e.g. `SolverSolution`.
    pub record_marker: String,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            component_marker: "TetriSchedScheduler INFO".to_string(),
            record_marker: "SolverSolution".to_string(),
        }
    }
}

/// Statistics of one solver invocation. Keys absent from the log line are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SolverRecord {
    /// 1-based line number in the log.
    pub line: usize,
    /// Time spent inside the solver (`solverTimeMicroseconds`).
    pub solver_time_s: Option<f64>,
    /// Wall time reported by the scheduler around the solve (`took <N>µs to solve`).
    pub total_time_s: Option<f64>,
    pub num_variables: Option<u64>,
    pub num_cached_variables: Option<u64>,
    pub num_uncached_variables: Option<u64>,
    pub num_constraints: Option<u64>,
    pub num_deactivated_constraints: Option<u64>,
    pub num_non_zero_coefficients: Option<u64>,
    pub num_solutions: Option<u64>,
}

impl SolverRecord {
    /// Problem size as uncached variables plus constraints, `None` if either is absent or the sum overflows.
    pub fn complexity(&self) -> Option<u64> {
        self.num_uncached_variables?.checked_add(self.num_constraints?)
    }
}

/// Leading decimal digits of `s`.
fn leading_integer(s: &str) -> Option<u64> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

fn record_body<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let rest = &line[line.find(marker)? + marker.len()..];
    let open = rest.find(|c: char| matches!(c, '<' | '[' | '{' | '('))?;
    let close = match rest.as_bytes()[open] {
        b'<' => '>',
        b'[' => ']',
        b'{' => '}',
        _ => ')',
    };
    let body = &rest[open + 1..];
    Some(body.find(close).map_or(body, |end| &body[..end]))
}

fn took_micros(prefix: &str) -> Option<u64> {
    let start = prefix.find("took ")? + "took ".len();
    let rest = &prefix[start..];
    if !rest.contains(" to solve") {
        return None;
    }
    leading_integer(rest)
}

pub struct LogMetricsExtractor {
    format: LogFormat,
}

impl Default for LogMetricsExtractor {
    fn default() -> Self {
        Self::new(LogFormat::default())
    }
}

impl LogMetricsExtractor {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }

    /// Parses one log line, returning `None` if it does not carry a solver record.
    pub fn parse_line(&self, line: &str, line_no: usize) -> Option<SolverRecord> {
        if !line.contains(&self.format.component_marker) {
            return None;
        }
        let marker_at = line.find(&self.format.record_marker)?;
        let mut record = SolverRecord {
            line: line_no,
            total_time_s: took_micros(&line[..marker_at]).map(|us| us as f64 / MICROS_PER_SECOND),
            ..Default::default()
        };
        let Some(body) = record_body(line, &self.format.record_marker) else {
            return Some(record);
        };
        for token in body.split(',') {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let slot = match key.trim() {
                "numVariables" => &mut record.num_variables,
                "numCachedVariables" => &mut record.num_cached_variables,
                "numUncachedVariables" => &mut record.num_uncached_variables,
                "numConstraints" => &mut record.num_constraints,
                "numDeactivatedConstraints" => &mut record.num_deactivated_constraints,
                "numNonZeroCoefficients" => &mut record.num_non_zero_coefficients,
                "numSolutions" => &mut record.num_solutions,
                "solverTimeMicroseconds" => {
                    record.solver_time_s = leading_integer(value.trim()).map(|us| us as f64 / MICROS_PER_SECOND);
                    continue;
                }
                _ => continue,
            };
            *slot = leading_integer(value.trim());
        }
        Some(record)
    }

    /// Extracts records from raw log bytes, decoding invalid UTF-8 permissively.
    pub fn extract<R: BufRead>(&self, reader: R) -> std::io::Result<Vec<SolverRecord>> {
        let mut records = Vec::new();
        for (idx, chunk) in reader.split(b'\n').enumerate() {
            let chunk = chunk?;
            let line = String::from_utf8_lossy(&chunk);
            if let Some(record) = self.parse_line(&line, idx + 1) {
                records.push(record);
            }
        }
        log::debug!("extracted {} solver records", records.len());
        Ok(records)
    }

    pub fn extract_file(&self, path: &Path) -> Result<Vec<SolverRecord>, AnalysisError> {
        let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        self.extract(BufReader::new(file)).map_err(|e| AnalysisError::io(path, e))
    }
}
