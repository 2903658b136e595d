use crate::job::Job;
use crate::schedule::Schedule;
use chrono::{DateTime, Duration, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Minimum hours between a prerequisite's end and its dependent's start.
pub const MIN_GAP_HOURS: i64 = 2;

pub fn min_gap() -> Duration {
    Duration::hours(MIN_GAP_HOURS)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub prerequisite: String,
    pub dependent: String,
}

impl DependencyEdge {
    pub fn new(prerequisite: impl Into<String>, dependent: impl Into<String>) -> Self {
        Self {
            prerequisite: prerequisite.into(),
            dependent: dependent.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DependencyError {
    #[error("adding {prerequisite} -> {dependent} would create a dependency cycle")]
    Cycle {
        prerequisite: String,
        dependent: String,
    },
    #[error(
        "job {dependent} starts at {dependent_start} but must wait until {earliest_start} ({gap}h after {prerequisite} ends)",
        gap = MIN_GAP_HOURS
    )]
    Ordering {
        prerequisite: String,
        dependent: String,
        earliest_start: DateTime<Utc>,
        dependent_start: DateTime<Utc>,
    },
}

/// Prerequisite -> dependent edges between jobs, referenced by id only.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges<I>(edges: I) -> Result<Self, DependencyError>
    where
        I: IntoIterator<Item = DependencyEdge>,
    {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_dependency(&edge.prerequisite, &edge.dependent)?;
        }
        Ok(graph)
    }

    pub fn add_dependency(
        &mut self,
        prerequisite: &str,
        dependent: &str,
    ) -> Result<DependencyEdge, DependencyError> {
        let cycle = || DependencyError::Cycle {
            prerequisite: prerequisite.to_string(),
            dependent: dependent.to_string(),
        };
        if prerequisite == dependent {
            return Err(cycle());
        }

        if let (Some(&p), Some(&d)) = (
            self.id_to_index.get(prerequisite),
            self.id_to_index.get(dependent),
        ) {
            if self.graph.contains_edge(p, d) {
                return Ok(DependencyEdge::new(prerequisite, dependent));
            }
            if creates_cycle(&self.graph, p, d) {
                return Err(cycle());
            }
        }

        let p = self.node(prerequisite);
        let d = self.node(dependent);
        self.graph.add_edge(p, d, ());
        Ok(DependencyEdge::new(prerequisite, dependent))
    }

    pub fn remove_dependency(&mut self, prerequisite: &str, dependent: &str) -> bool {
        let (Some(&p), Some(&d)) = (
            self.id_to_index.get(prerequisite),
            self.id_to_index.get(dependent),
        ) else {
            return false;
        };
        match self.graph.find_edge(p, d) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    pub fn prerequisites_of(&self, job_id: &str) -> Vec<String> {
        self.neighbors(job_id, Direction::Incoming)
    }

    pub fn dependents_of(&self, job_id: &str) -> Vec<String> {
        self.neighbors(job_id, Direction::Outgoing)
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(p, d)| DependencyEdge::new(self.graph[p].clone(), self.graph[d].clone()))
            .collect();
        edges.sort_by(|a, b| {
            a.prerequisite
                .cmp(&b.prerequisite)
                .then_with(|| a.dependent.cmp(&b.dependent))
        });
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    /// Checks `dependent.start >= prerequisite.end + MIN_GAP_HOURS`.
    ///
    /// Returns the slack in hours beyond the minimum gap.
    pub fn validate_temporal_order(
        &self,
        prerequisite: &Job,
        dependent: &Job,
    ) -> Result<f64, DependencyError> {
        let earliest_start = prerequisite.end + min_gap();
        if dependent.start < earliest_start {
            return Err(DependencyError::Ordering {
                prerequisite: prerequisite.id.clone(),
                dependent: dependent.id.clone(),
                earliest_start,
                dependent_start: dependent.start,
            });
        }
        let slack = dependent.start - earliest_start;
        Ok(slack.num_minutes() as f64 / 60.0)
    }

    pub fn temporal_violations(&self, schedule: &Schedule) -> Vec<DependencyError> {
        self.edges()
            .into_iter()
            .filter_map(|edge| {
                let prerequisite = schedule.job(&edge.prerequisite)?;
                let dependent = schedule.job(&edge.dependent)?;
                self.validate_temporal_order(prerequisite, dependent).err()
            })
            .collect()
    }

    fn node(&mut self, job_id: &str) -> NodeIndex {
        if let Some(&ix) = self.id_to_index.get(job_id) {
            return ix;
        }
        let ix = self.graph.add_node(job_id.to_string());
        self.id_to_index.insert(job_id.to_string(), ix);
        ix
    }

    fn neighbors(&self, job_id: &str, direction: Direction) -> Vec<String> {
        let Some(&ix) = self.id_to_index.get(job_id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(ix, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Whether adding `prerequisite -> dependent` would close a cycle, i.e. the
/// prerequisite is already reachable from the dependent along existing edges.
pub fn creates_cycle(
    graph: &DiGraph<String, ()>,
    prerequisite: NodeIndex,
    dependent: NodeIndex,
) -> bool {
    if prerequisite == dependent {
        return true;
    }
    let mut dfs = Dfs::new(graph, dependent);
    while let Some(node) = dfs.next(graph) {
        if node == prerequisite {
            return true;
        }
    }
    false
}
