use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

use clap::ValueEnum;
use log::{info, warn};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::bundle::Bundle;
use crate::error::{MilexError, Result};

/// What to do when a job depends on a name that has no job in the bundle
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum MissingDependencyPolicy {
    /// Keep the name as a graph node with no predecessors; nothing is submitted for it
    #[default]
    Ignore,
    /// Fail resolution with a structural error
    Error,
}

impl fmt::Display for MissingDependencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MissingDependencyPolicy::Ignore => write!(f, "ignore"),
            MissingDependencyPolicy::Error => write!(f, "error"),
        }
    }
}

/// Forward dependency graph: each node maps to the jobs that directly depend on it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    /// jobs in bundle order, then dependency-only names in order of first reference
    nodes: Vec<String>,
    dependents: HashMap<String, Vec<String>>,
    external: Vec<String>,
}

impl DependencyGraph {
    /// Immediate dependents of `name`, in bundle order
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(|d| d.as_slice()).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|s| s.as_str())
    }

    /// Names that are depended on but have no job in the bundle
    pub fn external(&self) -> &[String] {
        &self.external
    }

    fn add_node(&mut self, name: &str) {
        self.nodes.push(name.to_string());
        self.dependents.insert(name.to_string(), Vec::new());
    }

    fn add_edge(&mut self, dependency: &str, dependent: &str) {
        let dependents = self.dependents.entry(dependency.to_string()).or_default();
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_string());
        }
    }
}

/// A validated graph and the submission order derived from it
#[derive(Debug, Clone)]
pub struct Resolution {
    pub graph: DependencyGraph,
    /// Job names, each after every job it depends on; ties keep bundle order
    pub order: Vec<String>,
}

/// Build the dependency graph of a bundle and order its jobs
///
/// Duplicate job names are rejected before anything else is looked at. Cycles (including a job
/// depending on itself) are rejected before an order is produced.
pub fn resolve(bundle: &Bundle, policy: MissingDependencyPolicy) -> Result<Resolution> {
    ensure_unique_names(bundle)?;
    let graph = build_graph(bundle, policy)?;
    ensure_acyclic(&graph)?;
    let order = topological_order(bundle, &graph);
    info!("Resolved submission order for {}: {}", bundle.name, order.join(" -> "));
    Ok(Resolution { graph, order })
}

fn ensure_unique_names(bundle: &Bundle) -> Result<()> {
    let mut seen = HashSet::new();
    for name in bundle.jobs.keys() {
        if !seen.insert(name) {
            return Err(MilexError::DuplicateJob(name.to_string()));
        }
    }
    Ok(())
}

fn build_graph(bundle: &Bundle, policy: MissingDependencyPolicy) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::default();
    for name in bundle.jobs.keys() {
        graph.add_node(name);
    }

    for (name, job) in bundle.jobs.iter() {
        for dependency in job.dependency_names() {
            if !bundle.jobs.contains_key(dependency) {
                match policy {
                    MissingDependencyPolicy::Error => {
                        return Err(MilexError::UnknownDependency {
                            job: name.to_string(),
                            dependency: dependency.clone(),
                        })
                    }
                    MissingDependencyPolicy::Ignore => {
                        if !graph.external.contains(dependency) {
                            warn!("Job {name} depends on {dependency}, which is not in the bundle. Ignoring");
                            graph.external.push(dependency.clone());
                            graph.add_node(dependency);
                        }
                    }
                }
            }
            graph.add_edge(dependency, name);
        }
    }
    Ok(graph)
}

fn ensure_acyclic(graph: &DependencyGraph) -> Result<()> {
    // Edge direction: dependency -> dependent
    let mut petgraph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for node in graph.nodes() {
        petgraph.add_node(node);
    }
    for node in graph.nodes() {
        for dependent in graph.dependents_of(node) {
            petgraph.add_edge(node, dependent.as_str(), ());
        }
    }

    if toposort(&petgraph, None).is_ok() {
        return Ok(());
    }

    let in_cycle: HashSet<&str> = tarjan_scc(&petgraph)
        .into_iter()
        .filter(|component| component.len() > 1 || petgraph.contains_edge(component[0], component[0]))
        .flatten()
        .collect();
    let members = graph.nodes().filter(|n| in_cycle.contains(n)).map(String::from).collect();
    Err(MilexError::DependencyCycle(members))
}

/// Kahn's algorithm, always taking the earliest ready node
///
/// Dependency-only names rank before every job since nothing can precede them; jobs rank in
/// bundle order.
fn topological_order(bundle: &Bundle, graph: &DependencyGraph) -> Vec<String> {
    let ranked: Vec<&str> = graph.external.iter().map(String::as_str).chain(bundle.jobs.keys()).collect();
    let index: HashMap<&str, usize> = ranked.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let mut in_degree = vec![0usize; ranked.len()];
    for node in &ranked {
        for dependent in graph.dependents_of(node) {
            in_degree[index[dependent.as_str()]] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..in_degree.len()).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(bundle.jobs.len());

    while let Some(Reverse(i)) = ready.pop() {
        let name = ranked[i];
        if bundle.jobs.contains_key(name) {
            order.push(name.to_string());
        }
        for dependent in graph.dependents_of(name) {
            let j = index[dependent.as_str()];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }
    order
}
