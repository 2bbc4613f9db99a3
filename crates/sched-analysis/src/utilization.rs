//! Per-resource good/bad utilization accounting.
//!
//! Usage of every placement is attributed tick by tick to the resources it holds. Usage counts as good when the
//! task graph owning the task completed without missing its deadline, and as bad otherwise. The normalization
//! window is `[0, end_tick)` where `end_tick` is the last tick at which any placement holds a resource, so usage
//! at `end_tick` itself is not counted.

use indexmap::IndexMap;
use serde::Serialize;

use crate::entities::TaskGraph;
use crate::reconstruct::EntitySet;

/// Reason why a resource's utilization ratios were defined as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateMetric {
    /// No worker pool provides any of the resource.
    ZeroCapacity,
    /// The utilization window is empty.
    EmptyWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceUtilization {
    pub capacity: f64,
    /// Good usage divided by available capacity over the window.
    pub effective_utilization: f64,
    /// Good and bad usage divided by available capacity over the window.
    pub total_utilization: f64,
    /// `(good, bad)` usage for each tick of the window.
    pub series: Vec<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<DegenerateMetric>,
}

impl ResourceUtilization {
    pub fn good_usage(&self) -> f64 {
        self.series.iter().map(|(good, _)| good).sum()
    }

    pub fn bad_usage(&self) -> f64 {
        self.series.iter().map(|(_, bad)| bad).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterUtilization {
    pub end_tick: u64,
    /// Resources in the order they were first used by a placement.
    pub resources: IndexMap<String, ResourceUtilization>,
}

/// Averages over resources of a [`ClusterUtilization`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub resource_count: usize,
    pub mean_effective_utilization: f64,
    pub mean_total_utilization: f64,
    /// Resource with the highest effective utilization.
    pub best_resource: String,
    /// Resource with the lowest effective utilization.
    pub worst_resource: String,
}

impl ClusterUtilization {
    pub fn get(&self, resource: &str) -> Option<&ResourceUtilization> {
        self.resources.get(resource)
    }

    /// Returns `None` if no resource was used.
    pub fn summary(&self) -> Option<ClusterSummary> {
        if self.resources.is_empty() {
            return None;
        }
        let count = self.resources.len() as f64;
        let mean_effective_utilization = self.resources.values().map(|r| r.effective_utilization).sum::<f64>() / count;
        let mean_total_utilization = self.resources.values().map(|r| r.total_utilization).sum::<f64>() / count;

        let mut best = self.resources.first()?;
        let mut worst = best;
        for entry in self.resources.iter() {
            if entry.1.effective_utilization > best.1.effective_utilization {
                best = entry;
            }
            if entry.1.effective_utilization < worst.1.effective_utilization {
                worst = entry;
            }
        }
        Some(ClusterSummary {
            resource_count: self.resources.len(),
            mean_effective_utilization,
            mean_total_utilization,
            best_resource: best.0.clone(),
            worst_resource: worst.0.clone(),
        })
    }
}

pub struct UtilizationAccountant<'a> {
    entities: &'a EntitySet,
}

impl<'a> UtilizationAccountant<'a> {
    pub fn new(entities: &'a EntitySet) -> Self {
        Self { entities }
    }

    /// Last tick at which any placement holds a resource, 0 if none does.
    pub fn end_tick(&self) -> u64 {
        self.entities
            .placements()
            .filter(|(_, p)| !p.resources_used.is_empty() && p.completion_tick > p.placement_tick)
            .map(|(_, p)| p.completion_tick - 1)
            .max()
            .unwrap_or(0)
    }

    pub fn compute(&self) -> ClusterUtilization {
        // First pass: window length and the set of used resources.
        let end_tick = self.end_tick();
        let window = end_tick as usize;
        let mut usage: IndexMap<&str, Vec<(f64, f64)>> = IndexMap::new();
        for (_, placement) in self.entities.placements() {
            for resource in placement.resources_used.iter() {
                usage
                    .entry(resource.name.as_str())
                    .or_insert_with(|| vec![(0., 0.); window]);
            }
        }

        // Second pass: accumulate usage into fixed-size per-tick series.
        for (task, placement) in self.entities.placements() {
            let is_good = self
                .entities
                .task_graph(&task.task_graph_id)
                .map_or(false, TaskGraph::is_good);
            let from = placement.placement_tick.min(end_tick) as usize;
            let to = placement.completion_tick.min(end_tick) as usize;
            for resource in placement.resources_used.iter() {
                let Some(series) = usage.get_mut(resource.name.as_str()) else {
                    continue;
                };
                for point in series[from..to].iter_mut() {
                    if is_good {
                        point.0 += resource.quantity;
                    } else {
                        point.1 += resource.quantity;
                    }
                }
            }
        }

        let mut resources = IndexMap::with_capacity(usage.len());
        for (name, series) in usage.into_iter() {
            let capacity = self.entities.capacity(name);
            let mut good_total = 0.;
            let mut total = 0.;
            for (good, bad) in series.iter() {
                good_total += good;
                total += good + bad;
            }
            let degenerate = if capacity == 0. {
                Some(DegenerateMetric::ZeroCapacity)
            } else if end_tick == 0 {
                Some(DegenerateMetric::EmptyWindow)
            } else {
                None
            };
            let (effective_utilization, total_utilization) = match degenerate {
                Some(reason) => {
                    log::warn!(
                        "utilization of {} is degenerate ({:?}, capacity {}, end tick {}), reporting 0",
                        name,
                        reason,
                        capacity,
                        end_tick
                    );
                    (0., 0.)
                }
                None => {
                    let available = capacity * end_tick as f64;
                    (good_total / available, total / available)
                }
            };
            resources.insert(
                name.to_string(),
                ResourceUtilization {
                    capacity,
                    effective_utilization,
                    total_utilization,
                    series,
                    degenerate,
                },
            );
        }
        ClusterUtilization { end_tick, resources }
    }
}

pub fn cluster_utilization(entities: &EntitySet) -> ClusterUtilization {
    UtilizationAccountant::new(entities).compute()
}
