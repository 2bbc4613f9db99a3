use log::Level;

use crate::error::ParseError;
use crate::reconstruct::ReconstructOptions;
use crate::trace::TraceAnalysis;
use crate::utilization::DegenerateMetric;

const PRECISION: f64 = 1e-12;

/// Captures log records emitted on the current test thread.
mod capture {
    use std::cell::RefCell;
    use std::sync::Once;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
    }

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.with(|r| r.borrow_mut().push((record.level(), record.args().to_string())));
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INIT: Once = Once::new();

    pub fn logged<T>(f: impl FnOnce() -> T) -> (T, Vec<(Level, String)>) {
        INIT.call_once(|| {
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(LevelFilter::Debug);
            }
        });
        RECORDS.with(|r| r.borrow_mut().clear());
        let value = f();
        let records = RECORDS.with(|r| r.borrow_mut().drain(..).collect());
        (value, records)
    }
}

fn has_warning(records: &[(Level, String)], parts: &[&str]) -> bool {
    records
        .iter()
        .any(|(level, msg)| *level == Level::Warn && parts.iter().all(|p| msg.contains(p)))
}

fn analyze(lines: &[&str]) -> TraceAnalysis {
    TraceAnalysis::from_lines(lines.iter().copied(), ReconstructOptions::default()).unwrap()
}

fn analyze_err(lines: &[&str], options: ReconstructOptions) -> ParseError {
    TraceAnalysis::from_lines(lines.iter().copied(), options).unwrap_err()
}

fn assert_close(x: f64, y: f64) {
    assert!((x - y).abs() < PRECISION, "{} != {}", x, y);
}

#[test]
fn single_good_task() {
    let analysis = analyze(&[
        "Time,Event,Params",
        "0,WORKER_POOL,pool0,GPU,2,CPU,8",
        "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
        "0,TASK_RELEASE,g0,t0",
        "0,TASK_PLACEMENT,g0,t0,GPU,1",
        "10,TASK_FINISHED,g0,t0",
        "10,TASK_GRAPH_FINISHED,g0",
        "11,SIMULATOR_END",
    ]);
    // The usage window is [0, end_tick) with end_tick being the last tick the resource is held,
    // so the placement over [0, 10) gives a window of 9 ticks and the ratio stays 10/20 = 9/18.
    assert_eq!(analysis.utilization.end_tick, 9);
    let gpu = analysis.utilization.get("GPU").unwrap();
    assert_eq!(gpu.series.len(), 9);
    assert_eq!(gpu.capacity, 2.);
    assert_close(gpu.effective_utilization, 0.5);
    assert_close(gpu.total_utilization, 0.5);
    assert_eq!(gpu.bad_usage(), 0.);
    assert!(gpu.degenerate.is_none());
    // CPU is declared but never used.
    assert!(analysis.utilization.get("CPU").is_none());
    assert_eq!(analysis.utilization.resources.len(), 1);
    assert!(analysis.is_complete());
}

#[test]
fn usage_at_end_tick_is_excluded() {
    // The window ends at the last tick a resource is held, so the final tick of the
    // longest placement falls outside of it.
    let analysis = analyze(&[
        "0,WORKER_POOL,pool0,GPU,1",
        "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
        "0,TASK_PLACEMENT,g0,t0,GPU,1",
        "10,TASK_FINISHED,g0,t0",
        "10,TASK_GRAPH_FINISHED,g0",
    ]);
    assert_eq!(analysis.utilization.end_tick, 9);
    let gpu = analysis.utilization.get("GPU").unwrap();
    assert_eq!(gpu.series.len(), 9);
    assert_eq!(gpu.good_usage(), 9.);
    assert_close(gpu.effective_utilization, 1.);
}

#[test]
fn good_and_bad_usage() {
    let analysis = analyze(&[
        "0,WORKER_POOL,pool0,GPU,1",
        "0,WORKER_POOL,pool1,GPU,1",
        "0,TASK_GRAPH_RELEASE,0,10,g0,1,4",
        "0,TASK_GRAPH_RELEASE,0,5,g1,1,8",
        "0,TASK_PLACEMENT,g0,t0,GPU,1",
        "0,TASK_PLACEMENT,g1,t0,GPU,1",
        "4,TASK_FINISHED,g0,t0",
        "4,TASK_GRAPH_FINISHED,g0",
        "5,MISSED_TASK_GRAPH_DEADLINE,g1",
        "8,TASK_FINISHED,g1,t0",
        "8,TASK_GRAPH_FINISHED,g1",
        "9,SIMULATOR_END",
    ]);
    assert_eq!(analysis.utilization.end_tick, 7);
    let gpu = analysis.utilization.get("GPU").unwrap();
    assert_eq!(gpu.capacity, 2.);
    assert_eq!(gpu.good_usage(), 4.);
    assert_eq!(gpu.bad_usage(), 7.);
    assert_close(gpu.effective_utilization, 4. / 14.);
    assert_close(gpu.total_utilization, 11. / 14.);
    assert!(gpu.effective_utilization <= gpu.total_utilization);
    assert_eq!(gpu.series[3], (1., 1.));
    assert_eq!(gpu.series[4], (0., 1.));
}

#[test]
fn cancelled_and_unfinished_graphs_are_bad() {
    let analysis = analyze(&[
        "0,WORKER_POOL,pool0,CPU,4",
        "0,TASK_GRAPH_RELEASE,0,50,g0,1,5",
        "0,TASK_GRAPH_RELEASE,0,50,g1,1,5",
        "0,TASK_PLACEMENT,g0,t0,CPU,2",
        "0,TASK_PLACEMENT,g1,t0,CPU,0.5",
        "5,TASK_FINISHED,g0,t0",
        "5,TASK_GRAPH_CANCEL,g0",
        "6,TASK_FINISHED,g1,t0",
    ]);
    let cpu = analysis.utilization.get("CPU").unwrap();
    assert_eq!(cpu.good_usage(), 0.);
    assert_close(cpu.bad_usage(), 2. * 5. + 0.5 * 5.);
    assert_close(cpu.effective_utilization, 0.);
    assert_close(cpu.total_utilization, 12.5 / 20.);
}

#[test]
fn preempted_task_has_several_placements() {
    let analysis = analyze(&[
        "0,WORKER_POOL,pool0,GPU,1",
        "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
        "0,TASK_PLACEMENT,g0,t0,GPU,1",
        "3,TASK_PREEMPT,g0,t0",
        "6,TASK_PLACEMENT,g0,t0,GPU,1",
        "9,TASK_FINISHED,g0,t0",
        "9,TASK_GRAPH_FINISHED,g0",
    ]);
    assert_eq!(analysis.entities.tasks.len(), 1);
    let placements = &analysis.entities.tasks[0].placements;
    assert_eq!(placements.len(), 2);
    assert_eq!((placements[0].placement_tick, placements[0].completion_tick), (0, 3));
    assert_eq!((placements[1].placement_tick, placements[1].completion_tick), (6, 9));
    let gpu = analysis.utilization.get("GPU").unwrap();
    assert_eq!(gpu.series[4], (0., 0.));
    assert_eq!(gpu.good_usage(), 5.);
}

#[test]
fn running_task_is_closed_at_simulator_end() {
    let analysis = analyze(&[
        "0,WORKER_POOL,pool0,GPU,1",
        "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
        "2,TASK_PLACEMENT,g0,t0,GPU,1",
        "20,SIMULATOR_END",
    ]);
    let placement = &analysis.entities.tasks[0].placements[0];
    assert_eq!(placement.completion_tick, 20);
    assert_eq!(analysis.utilization.end_tick, 19);
}

#[test]
fn zero_capacity_is_degenerate() {
    let lines = [
        "0,WORKER_POOL,pool0,GPU,1",
        "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
        "0,TASK_PLACEMENT,g0,t0,TPU,1",
        "5,TASK_FINISHED,g0,t0",
    ];
    let options = ReconstructOptions {
        validate_resources: false,
    };
    let (analysis, records) = capture::logged(|| TraceAnalysis::from_lines(lines, options).unwrap());
    assert!(has_warning(&records, &["TPU", "ZeroCapacity"]));
    let tpu = analysis.utilization.get("TPU").unwrap();
    assert_eq!(tpu.capacity, 0.);
    assert_eq!(tpu.effective_utilization, 0.);
    assert_eq!(tpu.total_utilization, 0.);
    assert_eq!(tpu.degenerate, Some(DegenerateMetric::ZeroCapacity));

    assert_eq!(
        analyze_err(&lines, ReconstructOptions::default()),
        ParseError::UnknownResource {
            task_id: "t0".to_string(),
            resource: "TPU".to_string()
        }
    );
}

#[test]
fn empty_window_is_degenerate() {
    let (analysis, records) = capture::logged(|| {
        analyze(&[
            "0,WORKER_POOL,pool0,GPU,1",
            "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
            "3,TASK_PLACEMENT,g0,t0,GPU,1",
            "3,TASK_FINISHED,g0,t0",
        ])
    });
    assert!(has_warning(&records, &["GPU", "EmptyWindow"]));
    assert_eq!(analysis.utilization.end_tick, 0);
    let gpu = analysis.utilization.get("GPU").unwrap();
    assert!(gpu.series.is_empty());
    assert_eq!(gpu.effective_utilization, 0.);
    assert_eq!(gpu.degenerate, Some(DegenerateMetric::EmptyWindow));
}

#[test]
fn task_of_unknown_graph() {
    let err = analyze_err(
        &["0,WORKER_POOL,pool0,GPU,1", "0,TASK_RELEASE,g9,t0"],
        ReconstructOptions::default(),
    );
    assert_eq!(
        err,
        ParseError::UnknownTaskGraph {
            task_id: "t0".to_string(),
            task_graph_id: "g9".to_string()
        }
    );
}

#[test]
fn malformed_rows() {
    let options = ReconstructOptions::default();
    let header = ["0,WORKER_POOL,pool0,GPU,1", "0,TASK_GRAPH_RELEASE,0,100,g0,1,10"];
    let with = |row: &'static str| header.iter().copied().chain([row]).collect::<Vec<_>>();

    assert!(matches!(
        analyze_err(&with("1,TASK_FINISHED,g0,t0"), options),
        ParseError::MalformedRow { line: 3, .. }
    ));
    assert!(matches!(
        analyze_err(&with("1,TASK_PLACEMENT,g0,t0,GPU"), options),
        ParseError::MalformedRow { line: 3, .. }
    ));
    assert!(matches!(
        analyze_err(&with("1,TASK_PLACEMENT,g0,t0,GPU,lots"), options),
        ParseError::InvalidNumber {
            field: "resource_quantity",
            ..
        }
    ));
    assert!(matches!(
        analyze_err(&with("1,TASK_GRAPH_FINISHED,g7"), options),
        ParseError::MalformedRow { line: 3, .. }
    ));
    assert!(matches!(
        analyze_err(&with("1,TASK_GRAPH_RELEASE,soon,100,g1,1,10"), options),
        ParseError::InvalidNumber { field: "release_tick", .. }
    ));

    let mut rows = with("5,TASK_PLACEMENT,g0,t0,GPU,1");
    rows.push("3,TASK_FINISHED,g0,t0");
    assert!(matches!(
        analyze_err(&rows, options),
        ParseError::MalformedRow { line: 4, .. }
    ));
}

#[test]
fn cluster_summary() {
    let analysis = analyze(&[
        "0,WORKER_POOL,pool0,GPU,2,CPU,4",
        "0,TASK_GRAPH_RELEASE,0,100,g0,1,10",
        "0,TASK_PLACEMENT,g0,t0,CPU,1,GPU,2",
        "5,TASK_FINISHED,g0,t0",
        "5,TASK_GRAPH_FINISHED,g0",
    ]);
    let names: Vec<_> = analysis.utilization.resources.keys().cloned().collect();
    assert_eq!(names, vec!["CPU", "GPU"]);
    let summary = analysis.utilization.summary().unwrap();
    assert_eq!(summary.resource_count, 2);
    assert_eq!(summary.best_resource, "GPU");
    assert_eq!(summary.worst_resource, "CPU");
    assert_close(summary.mean_effective_utilization, (0.25 + 1.) / 2.);
}

#[test]
fn repeated_analysis_is_identical() {
    let lines = [
        "0,WORKER_POOL,pool0,GPU,3",
        "0,TASK_GRAPH_RELEASE,0,100,g0,2,10",
        "1,TASK_PLACEMENT,g0,t0,GPU,0.1",
        "2,TASK_PLACEMENT,g0,t1,GPU,0.7",
        "13,TASK_FINISHED,g0,t0",
        "17,TASK_FINISHED,g0,t1",
        "17,TASK_GRAPH_FINISHED,g0",
        "18,LOG_STATS,0,0,0,1,0,0,1.0",
        "18,SIMULATOR_END",
    ];
    let first = analyze(&lines);
    let second = analyze(&lines);
    assert_eq!(first, second);
    let (a, b) = (first.utilization.get("GPU").unwrap(), second.utilization.get("GPU").unwrap());
    assert_eq!(a.effective_utilization.to_bits(), b.effective_utilization.to_bits());
    assert_eq!(a.total_utilization.to_bits(), b.total_utilization.to_bits());
}
