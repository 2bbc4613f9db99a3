//! Entities reconstructed from a trace.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAmount {
    pub name: String,
    /// Resource share, may be fractional.
    pub quantity: f64,
}

impl ResourceAmount {
    pub fn new(name: &str, quantity: f64) -> Self {
        Self {
            name: name.to_string(),
            quantity,
        }
    }
}

/// An assignment of a task to a set of resources for the half-open tick interval
/// `[placement_tick, completion_tick)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub placement_tick: u64,
    pub completion_tick: u64,
    pub resources_used: Vec<ResourceAmount>,
}

impl Placement {
    pub fn duration(&self) -> u64 {
        self.completion_tick - self.placement_tick
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub task_graph_id: String,
    /// Zero or more placements, several if the task was preempted and placed again.
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskGraph {
    pub id: String,
    pub release_tick: u64,
    pub deadline_tick: u64,
    pub critical_path_runtime: u64,
    pub was_completed: bool,
    pub missed_deadline: bool,
    pub was_cancelled: bool,
}

impl TaskGraph {
    /// Usage by tasks of this graph counts as good utilization.
    pub fn is_good(&self) -> bool {
        self.was_completed && !self.missed_deadline
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerPool {
    pub id: String,
    pub resources: Vec<ResourceAmount>,
}

impl WorkerPool {
    /// Total quantity of the named resource in this pool.
    pub fn capacity_of(&self, resource: &str) -> f64 {
        self.resources
            .iter()
            .filter(|r| r.name == resource)
            .map(|r| r.quantity)
            .sum()
    }

    pub fn provides(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r.name == resource)
    }
}
