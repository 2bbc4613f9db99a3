//! Trace events and the line-level trace parser.

use std::io::Read;
use std::str::FromStr;

use csv::{ReaderBuilder, Trim};
use serde::Serialize;

use crate::error::ParseError;

/// Event kinds recognized by the analysis.
pub mod kind {
    pub const WORKER_POOL: &str = "WORKER_POOL";
    pub const TASK_GRAPH_RELEASE: &str = "TASK_GRAPH_RELEASE";
    pub const TASK_GRAPH_FINISHED: &str = "TASK_GRAPH_FINISHED";
    pub const TASK_GRAPH_CANCEL: &str = "TASK_GRAPH_CANCEL";
    pub const MISSED_TASK_GRAPH_DEADLINE: &str = "MISSED_TASK_GRAPH_DEADLINE";
    pub const TASK_RELEASE: &str = "TASK_RELEASE";
    pub const TASK_PLACEMENT: &str = "TASK_PLACEMENT";
    pub const TASK_FINISHED: &str = "TASK_FINISHED";
    pub const TASK_PREEMPT: &str = "TASK_PREEMPT";
    pub const SCHEDULER_START: &str = "SCHEDULER_START";
    pub const SCHEDULER_FINISHED: &str = "SCHEDULER_FINISHED";
    pub const LOG_STATS: &str = "LOG_STATS";
    pub const SIMULATOR_END: &str = "SIMULATOR_END";
}

/// One data row of a trace: `tick,kind,params...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// 1-based line number in the trace file.
    pub line: usize,
    pub tick: u64,
    pub kind: String,
    pub params: Vec<String>,
}

impl Event {
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Returns the parameter at `index`, naming it `field` in the error if absent.
    pub fn param(&self, index: usize, field: &'static str) -> Result<&str, ParseError> {
        self.params
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ParseError::MissingField {
                line: self.line,
                kind: self.kind.clone(),
                index,
                field,
            })
    }

    pub fn parse_param<T: FromStr>(&self, index: usize, field: &'static str) -> Result<T, ParseError> {
        let value = self.param(index, field)?;
        self.parse_value(value, field)
    }

    /// Parses the final parameter of the row.
    pub fn parse_last_param<T: FromStr>(&self, field: &'static str) -> Result<T, ParseError> {
        match self.params.last() {
            Some(value) => self.parse_value(value, field),
            None => Err(ParseError::MissingField {
                line: self.line,
                kind: self.kind.clone(),
                index: 0,
                field,
            }),
        }
    }

    pub(crate) fn parse_value<T: FromStr>(&self, value: &str, field: &'static str) -> Result<T, ParseError> {
        value.parse().map_err(|_| ParseError::InvalidNumber {
            line: self.line,
            kind: self.kind.clone(),
            field,
            value: value.to_string(),
        })
    }

    /// Parameters starting at `index`, empty if the row is shorter.
    pub fn params_from(&self, index: usize) -> &[String] {
        self.params.get(index..).unwrap_or(&[])
    }
}

fn parse_tick(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Reads the rows of a comma-delimited trace into events.
///
/// Leading records are skipped until the first one whose first field is an integer tick. From there on every
/// non-blank record must be a data row, otherwise a [`ParseError`] is returned. Events keep the order of the file.
pub fn parse_trace<R: Read>(reader: R) -> Result<Vec<Event>, ParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut events = Vec::new();
    let mut in_data = false;
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::MalformedRow {
            line: e.position().map_or(0, |p| p.line() as usize),
            reason: e.to_string(),
        })?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        let first = record.get(0).unwrap_or_default();
        if !in_data {
            if parse_tick(first).is_none() {
                continue;
            }
            in_data = true;
        }
        if record.len() == 1 && first.is_empty() {
            continue;
        }
        let tick = parse_tick(first).ok_or_else(|| ParseError::InvalidTick {
            line,
            value: first.to_string(),
        })?;
        let kind = match record.get(1) {
            Some(kind) if !kind.is_empty() => kind.to_string(),
            _ => return Err(ParseError::MissingKind { line }),
        };
        events.push(Event {
            line,
            tick,
            kind,
            params: record.iter().skip(2).map(str::to_string).collect(),
        });
    }
    log::debug!("parsed {} trace events", events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_header_lines() {
        let trace = "# simulator trace\ntime,event,params\n0,SIMULATOR_START,a,b\n\n   \n15,LOG_STATS, 1 ,2\n";
        let events = parse_trace(trace.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 0);
        assert_eq!(events[0].line, 3);
        assert_eq!(events[0].params, vec!["a", "b"]);
        assert_eq!(events[1].kind, "LOG_STATS");
        assert_eq!(events[1].line, 6);
        assert_eq!(events[1].params, vec!["1", "2"]);
    }

    #[test]
    fn quoted_field_keeps_commas() {
        let events = parse_trace("3,TASK_RELEASE,\"g,0\",t0\n".as_bytes()).unwrap();
        assert_eq!(events[0].params, vec!["g,0", "t0"]);
    }

    #[test]
    fn rejects_bad_tick_after_data_start() {
        let err = parse_trace("1,SIMULATOR_START\nx,LOG_STATS".as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidTick {
                line: 2,
                value: "x".to_string()
            }
        );
    }

    #[test]
    fn rejects_row_without_kind() {
        let err = parse_trace("1,SIMULATOR_START\n2".as_bytes()).unwrap_err();
        assert_eq!(err, ParseError::MissingKind { line: 2 });
    }

    #[test]
    fn empty_trace_has_no_events() {
        assert!(parse_trace("header only\n".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn param_accessors() {
        let event = parse_trace("7,SCHEDULER_FINISHED,0,3,oops,1500".as_bytes()).unwrap().remove(0);
        assert_eq!(event.parse_param::<u64>(1, "count").unwrap(), 3);
        assert_eq!(event.parse_last_param::<f64>("runtime").unwrap(), 1500.);
        assert!(matches!(
            event.parse_param::<u64>(2, "count"),
            Err(ParseError::InvalidNumber { line: 1, .. })
        ));
        assert!(matches!(
            event.param(9, "missing"),
            Err(ParseError::MissingField { index: 9, .. })
        ));
        assert_eq!(event.params_from(3), &["1500".to_string()]);
        assert!(event.params_from(10).is_empty());
    }
}
