pub mod dependency_graph;

pub use dependency_graph::{
    DependencyEdge, DependencyError, DependencyGraph, MIN_GAP_HOURS, creates_cycle, min_gap,
};
