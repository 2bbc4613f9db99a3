#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn assert_float_eq(x: f64, y: f64, eps: f64) {
    assert!(x > y - eps && x < y + eps, "{} != {}", x, y);
}

pub const CONF: &str = "--scheduler=TetriSched\n\
    --release_taskgraphs\n\
    --override_poisson_arrival_rates=0.01,0.03\n\
    --override_num_invocations=5,15\n";

pub const LOG: &str = "2025-04-12,04:39:40.100 Simulator INFO: starting\n\
    2025-04-12,04:39:41.005 TetriSchedScheduler INFO: [21] Solver returned utility of 2.0 and took 52512\u{b5}s \
    to solve. The solution result was SolverSolution<type=FEASIBLE, numVariables=12720, numCachedVariables=700, \
    numUncachedVariables=12020, numConstraints=6470, numDeactivatedConstraints=400, numNonZeroCoefficients=31828, \
    numSolutions=1, objectiveValue=2.000000, objectiveValueBound=2.000000, solverTimeMicroseconds=29925>.\n\
    2025-04-12,04:39:42.310 TetriSchedScheduler INFO: [22] SolverSolution<type=OPTIMAL, numVariables=100, \
    numConstraints=30, solverTimeMicroseconds=75>\n";

/// Builds a trace row by row.
#[derive(Default)]
pub struct TraceBuilder {
    rows: Vec<String>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self {
            rows: vec!["Time,Event,Params".to_string()],
        }
    }

    pub fn row(mut self, tick: u64, kind: &str, params: &[&str]) -> Self {
        let mut fields = vec![tick.to_string(), kind.to_string()];
        fields.extend(params.iter().map(|p| p.to_string()));
        self.rows.push(fields.join(","));
        self
    }

    pub fn worker_pool(self, id: &str, resources: &[(&str, f64)]) -> Self {
        let mut params = vec![id.to_string()];
        for (name, quantity) in resources.iter() {
            params.push(name.to_string());
            params.push(quantity.to_string());
        }
        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        self.row(0, "WORKER_POOL", &params)
    }

    /// Releases a graph of one task placed on `resources` for `[start, end)`.
    pub fn single_task_graph(self, graph: &str, start: u64, end: u64, resources: &[(&str, f64)], good: bool) -> Self {
        let deadline = if good { end + 10 } else { end - 1 };
        let mut placement = vec![graph.to_string(), "t0".to_string()];
        for (name, quantity) in resources.iter() {
            placement.push(name.to_string());
            placement.push(quantity.to_string());
        }
        let placement: Vec<&str> = placement.iter().map(String::as_str).collect();
        let mut builder = self
            .row(start, "TASK_GRAPH_RELEASE", &[&start.to_string(), &deadline.to_string(), graph, "1", "5"])
            .row(start, "TASK_RELEASE", &[graph, "t0"])
            .row(start, "TASK_PLACEMENT", &placement)
            .row(end, "TASK_FINISHED", &[graph, "t0"])
            .row(end, "TASK_GRAPH_FINISHED", &[graph]);
        if !good {
            builder = builder.row(end, "MISSED_TASK_GRAPH_DEADLINE", &[graph]);
        }
        builder
    }

    pub fn log_stats(self, tick: u64, finished: u64, cancelled: u64, missed: u64, attainment: f64) -> Self {
        self.row(
            tick,
            "LOG_STATS",
            &[
                "0",
                "0",
                "0",
                &finished.to_string(),
                &cancelled.to_string(),
                &missed.to_string(),
                &attainment.to_string(),
            ],
        )
    }

    pub fn end(self, tick: u64) -> Self {
        self.row(tick, "SIMULATOR_END", &[])
    }

    pub fn build(&self) -> String {
        let mut text = self.rows.join("\n");
        text.push('\n');
        text
    }
}

/// Simple trace with one good and one bad task graph on a GPU pool of capacity 2.
pub fn sample_trace() -> TraceBuilder {
    TraceBuilder::new()
        .worker_pool("pool0", &[("GPU", 2.), ("CPU", 8.)])
        .single_task_graph("g0", 0, 10, &[("GPU", 1.)], true)
        .single_task_graph("g1", 0, 10, &[("GPU", 1.), ("CPU", 2.)], false)
        .row(10, "SCHEDULER_FINISHED", &["0", "1", "0", "1500"])
        .row(11, "SCHEDULER_FINISHED", &["0", "0", "0", "20"])
        .log_stats(12, 2, 0, 1, 0.5)
        .end(12)
}

pub fn write_run(dir: &Path, trace: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("run.conf"), CONF).unwrap();
    fs::write(dir.join("run.log"), LOG).unwrap();
    fs::write(dir.join("run.csv"), trace).unwrap();
    dir.to_path_buf()
}
