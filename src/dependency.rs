//! Dependencies between jobs of a bundle

/// Forward dependency graph, cycle detection and submission order
pub mod graph;

/// Add scheduler job IDs to the dependency directive of written scripts
pub mod inject;

pub use graph::{resolve, DependencyGraph, MissingDependencyPolicy, Resolution};
pub use inject::inject_dependencies;
