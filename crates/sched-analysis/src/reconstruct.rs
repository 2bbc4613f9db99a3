//! Reconstruction of tasks, task graphs, placements and worker pools from trace events.

use indexmap::IndexMap;
use itertools::Itertools;

use crate::entities::{Placement, ResourceAmount, Task, TaskGraph, WorkerPool};
use crate::error::ParseError;
use crate::event::{kind, Event};

#[derive(Debug, Clone, Copy)]
pub struct ReconstructOptions {
    /// Fail if a placement uses a resource that no worker pool declares.
    pub validate_resources: bool,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            validate_resources: true,
        }
    }
}

/// All entities of one trace. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySet {
    pub worker_pools: Vec<WorkerPool>,
    pub task_graphs: IndexMap<String, TaskGraph>,
    pub tasks: Vec<Task>,
}

impl EntitySet {
    /// Installed capacity of a resource summed over all worker pools.
    pub fn capacity(&self, resource: &str) -> f64 {
        self.worker_pools.iter().map(|pool| pool.capacity_of(resource)).sum()
    }

    pub fn task_graph(&self, id: &str) -> Option<&TaskGraph> {
        self.task_graphs.get(id)
    }

    pub fn placements(&self) -> impl Iterator<Item = (&Task, &Placement)> {
        self.tasks
            .iter()
            .flat_map(|task| task.placements.iter().map(move |p| (task, p)))
    }
}

struct OpenPlacement {
    tick: u64,
    resources: Vec<ResourceAmount>,
}

struct TaskState {
    task: Task,
    open: Option<OpenPlacement>,
}

/// Builds an [`EntitySet`] by consuming trace events in file order.
pub struct EntityReconstructor {
    options: ReconstructOptions,
    pools: IndexMap<String, WorkerPool>,
    task_graphs: IndexMap<String, TaskGraph>,
    tasks: IndexMap<(String, String), TaskState>,
    last_tick: u64,
    simulator_end: Option<u64>,
}

impl EntityReconstructor {
    pub fn new(options: ReconstructOptions) -> Self {
        Self {
            options,
            pools: IndexMap::new(),
            task_graphs: IndexMap::new(),
            tasks: IndexMap::new(),
            last_tick: 0,
            simulator_end: None,
        }
    }

    pub fn process(&mut self, event: &Event) -> Result<(), ParseError> {
        self.last_tick = self.last_tick.max(event.tick);
        match event.kind.as_str() {
            kind::WORKER_POOL => {
                let id = event.param(0, "pool_id")?.to_string();
                let resources = parse_resources(event, 1)?;
                if self.pools.contains_key(&id) {
                    log::debug!("worker pool {} redeclared at line {}", id, event.line);
                }
                self.pools.insert(id.clone(), WorkerPool { id, resources });
            }
            kind::TASK_GRAPH_RELEASE => {
                let release_tick = event.parse_param(0, "release_tick")?;
                let deadline_tick = event.parse_param(1, "deadline_tick")?;
                let id = event.param(2, "task_graph_id")?.to_string();
                let critical_path_runtime = event.parse_last_param("critical_path_runtime")?;
                self.task_graphs.insert(
                    id.clone(),
                    TaskGraph {
                        id,
                        release_tick,
                        deadline_tick,
                        critical_path_runtime,
                        was_completed: false,
                        missed_deadline: false,
                        was_cancelled: false,
                    },
                );
            }
            kind::TASK_GRAPH_FINISHED => self.task_graph_mut(event)?.was_completed = true,
            kind::MISSED_TASK_GRAPH_DEADLINE => self.task_graph_mut(event)?.missed_deadline = true,
            kind::TASK_GRAPH_CANCEL => self.task_graph_mut(event)?.was_cancelled = true,
            kind::TASK_RELEASE => {
                self.task_mut(event)?;
            }
            kind::TASK_PLACEMENT => {
                let resources = parse_resources(event, 2)?;
                let state = self.task_mut(event)?;
                if state.open.is_some() {
                    return Err(ParseError::MalformedRow {
                        line: event.line,
                        reason: format!("task {} placed while already running", state.task.id),
                    });
                }
                state.open = Some(OpenPlacement {
                    tick: event.tick,
                    resources,
                });
            }
            kind::TASK_FINISHED | kind::TASK_PREEMPT => {
                let state = self.task_mut(event)?;
                let open = state.open.take().ok_or_else(|| ParseError::MalformedRow {
                    line: event.line,
                    reason: format!("task {} has no running placement", state.task.id),
                })?;
                if event.tick < open.tick {
                    return Err(ParseError::MalformedRow {
                        line: event.line,
                        reason: format!(
                            "task {} completes at {} before its placement at {}",
                            state.task.id, event.tick, open.tick
                        ),
                    });
                }
                state.task.placements.push(Placement {
                    placement_tick: open.tick,
                    completion_tick: event.tick,
                    resources_used: open.resources,
                });
            }
            kind::SIMULATOR_END => self.simulator_end = Some(event.tick),
            _ => {}
        }
        Ok(())
    }

    /// Closes dangling placements, validates references and returns the entities.
    pub fn finish(self) -> Result<EntitySet, ParseError> {
        let end_tick = self.simulator_end.unwrap_or(self.last_tick);
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for (_, mut state) in self.tasks.into_iter() {
            if let Some(open) = state.open.take() {
                log::debug!("closing running task {} at trace end {}", state.task.id, end_tick);
                state.task.placements.push(Placement {
                    placement_tick: open.tick,
                    completion_tick: end_tick.max(open.tick),
                    resources_used: open.resources,
                });
            }
            tasks.push(state.task);
        }

        let entities = EntitySet {
            worker_pools: self.pools.into_values().collect(),
            task_graphs: self.task_graphs,
            tasks,
        };

        for task in entities.tasks.iter() {
            if !entities.task_graphs.contains_key(&task.task_graph_id) {
                return Err(ParseError::UnknownTaskGraph {
                    task_id: task.id.clone(),
                    task_graph_id: task.task_graph_id.clone(),
                });
            }
            if self.options.validate_resources {
                let resources = task.placements.iter().flat_map(|p| p.resources_used.iter());
                for resource in resources {
                    if !entities.worker_pools.iter().any(|pool| pool.provides(&resource.name)) {
                        return Err(ParseError::UnknownResource {
                            task_id: task.id.clone(),
                            resource: resource.name.clone(),
                        });
                    }
                }
            }
        }
        log::debug!(
            "reconstructed {} tasks in {} task graphs over {} worker pools",
            entities.tasks.len(),
            entities.task_graphs.len(),
            entities.worker_pools.len()
        );
        Ok(entities)
    }

    fn task_graph_mut(&mut self, event: &Event) -> Result<&mut TaskGraph, ParseError> {
        let id = event.param(0, "task_graph_id")?;
        self.task_graphs.get_mut(id).ok_or_else(|| ParseError::MalformedRow {
            line: event.line,
            reason: format!("{} for unknown task graph {}", event.kind, id),
        })
    }

    fn task_mut(&mut self, event: &Event) -> Result<&mut TaskState, ParseError> {
        let task_graph_id = event.param(0, "task_graph_id")?.to_string();
        let task_id = event.param(1, "task_id")?.to_string();
        Ok(self
            .tasks
            .entry((task_graph_id.clone(), task_id.clone()))
            .or_insert_with(|| TaskState {
                task: Task {
                    id: task_id,
                    task_graph_id,
                    placements: Vec::new(),
                },
                open: None,
            }))
    }
}

/// Parses `(name, quantity)` pairs from the event parameters starting at `start`.
fn parse_resources(event: &Event, start: usize) -> Result<Vec<ResourceAmount>, ParseError> {
    let fields = event.params_from(start);
    if fields.len() % 2 != 0 {
        return Err(ParseError::MalformedRow {
            line: event.line,
            reason: format!("{} has an unpaired resource field", event.kind),
        });
    }
    let mut resources = Vec::with_capacity(fields.len() / 2);
    for (name, quantity) in fields.iter().tuples() {
        let quantity: f64 = event.parse_value(quantity, "resource_quantity")?;
        if !quantity.is_finite() || quantity < 0. {
            return Err(ParseError::InvalidNumber {
                line: event.line,
                kind: event.kind.clone(),
                field: "resource_quantity",
                value: quantity.to_string(),
            });
        }
        resources.push(ResourceAmount::new(name, quantity));
    }
    Ok(resources)
}

/// Reconstructs the entities of a whole trace.
pub fn reconstruct(events: &[Event], options: ReconstructOptions) -> Result<EntitySet, ParseError> {
    let mut reconstructor = EntityReconstructor::new(options);
    for event in events.iter() {
        reconstructor.process(event)?;
    }
    reconstructor.finish()
}
