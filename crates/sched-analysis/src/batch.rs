//! Parallel analysis of many runs.
//!
//! Runs are independent: each one is analyzed on its own thread, so a run that fails, panics or exceeds the
//! timeout is reported as a [`BatchError`] without affecting the others.

use std::any::Any;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::error::{AnalysisError, BatchError};
use crate::run::{RunAnalysis, RunOptions};

/// Batch description loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Run directories, or directories containing run directories.
    pub runs: Vec<PathBuf>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl BatchConfig {
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        serde_yaml::from_reader(file).map_err(|source| AnalysisError::BatchConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn has_trace(dir: &Path) -> Result<bool, AnalysisError> {
    for entry in fs::read_dir(dir).map_err(|e| AnalysisError::io(dir, e))? {
        let path = entry.map_err(|e| AnalysisError::io(dir, e))?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "csv") {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Resolves configured paths into run directories.
///
/// A directory without a trace file is treated as a parent of run directories and its subdirectories are
/// taken in sorted order. Paths that turn out not to be runs are kept so that their failure is reported per run.
pub fn expand_runs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, AnalysisError> {
    let mut runs = Vec::new();
    for path in paths.iter() {
        if !path.is_dir() || has_trace(path)? {
            runs.push(path.clone());
            continue;
        }
        let mut children = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| AnalysisError::io(path, e))? {
            let child = entry.map_err(|e| AnalysisError::io(path, e))?.path();
            if child.is_dir() {
                children.push(child);
            }
        }
        if children.is_empty() {
            runs.push(path.clone());
        } else {
            children.sort();
            runs.append(&mut children);
        }
    }
    Ok(runs)
}

/// Result of one run of a batch.
#[derive(Debug)]
pub struct RunOutcome<T = RunAnalysis> {
    pub dir: PathBuf,
    pub result: Result<T, BatchError>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Executes a job for every run on a fixed number of workers.
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    pub threads: usize,
    /// Per-run limit; a timed out run keeps its thread until it finishes on its own.
    pub timeout: Option<Duration>,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
            timeout: None,
        }
    }
}

impl BatchRunner {
    pub fn new(threads: usize, timeout: Option<Duration>) -> Self {
        Self {
            threads: threads.max(1),
            timeout,
        }
    }

    /// Returns outcomes in the order of `dirs`.
    pub fn run<T, F>(&self, dirs: Vec<PathBuf>, job: F) -> Vec<RunOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(&Path) -> Result<T, AnalysisError> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let pool = ThreadPool::new(self.threads.max(1));
        let (tx, rx) = channel();
        let total = dirs.len();
        for (id, dir) in dirs.into_iter().enumerate() {
            let tx = tx.clone();
            let job = job.clone();
            let timeout = self.timeout;
            pool.execute(move || {
                let result = run_isolated(&dir, job, timeout);
                match &result {
                    Ok(_) => log::info!("[{}/{}] analyzed {}", id + 1, total, dir.display()),
                    Err(e) => log::error!("[{}/{}] {} failed: {}", id + 1, total, dir.display(), e),
                }
                let _ = tx.send((id, RunOutcome { dir, result }));
            });
        }
        drop(tx);
        let mut outcomes: Vec<_> = rx.iter().collect();
        outcomes.sort_by_key(|x| x.0);
        outcomes.into_iter().map(|x| x.1).collect()
    }
}

fn run_isolated<T, F>(dir: &Path, job: Arc<F>, timeout: Option<Duration>) -> Result<T, BatchError>
where
    T: Send + 'static,
    F: Fn(&Path) -> Result<T, AnalysisError> + Send + Sync + 'static,
{
    let (tx, rx) = channel();
    let path = dir.to_path_buf();
    let handle = thread::Builder::new()
        .name(format!("run-{}", dir.display()))
        .spawn(move || {
            let _ = tx.send((*job)(&path));
        })
        .map_err(|e| AnalysisError::io(dir, e))?;

    let received = match timeout {
        Some(limit) => match rx.recv_timeout(limit) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => return Err(BatchError::Timeout(limit)),
            Err(RecvTimeoutError::Disconnected) => None,
        },
        None => rx.recv().ok(),
    };
    match received {
        Some(result) => {
            let _ = handle.join();
            Ok(result?)
        }
        None => match handle.join() {
            Err(payload) => Err(BatchError::Panicked(panic_message(payload))),
            Ok(()) => Err(BatchError::Panicked("worker exited without a result".to_string())),
        },
    }
}

/// Analyzes every run directory, isolating failures per run.
pub fn analyze_runs(dirs: Vec<PathBuf>, options: RunOptions, runner: &BatchRunner) -> Vec<RunOutcome> {
    log::info!("analyzing {} runs on {} threads", dirs.len(), runner.threads);
    runner.run(dirs, move |dir| RunAnalysis::load(dir, &options))
}
