//! Trait dependency graph
//!
//! Built over a whole trait library. Nodes are trait names, edges are the
//! declared `dependencies`. Validation reports:
//! - Cycles (with the full path, origin repeated at the end)
//! - Missing dependencies
//! - Incompatible traits (declared `conflicts_with` among traits that
//!   necessarily co-occur)
//!
//! The topological order lists dependencies before dependents; independent
//! traits keep their input order.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::{TraitDefinition, normalize_name};

/// A graph consistency problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphError {
    #[error("Circular dependency: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Trait \"{trait_name}\" depends on missing trait \"{dependency}\"")]
    MissingDependency { trait_name: String, dependency: String },

    #[error("Traits \"{first}\" and \"{second}\" are incompatible ({reason})")]
    IncompatibleTraits {
        first: String,
        second: String,
        reason: String,
    },
}

/// Outcome of validating a dependency graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphReport {
    pub errors: Vec<GraphError>,
}

impl GraphReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn cycles(&self) -> impl Iterator<Item = &Vec<String>> {
        self.errors.iter().filter_map(|e| match e {
            GraphError::Cycle { path } => Some(path),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    dependencies: Vec<String>,
    conflicts: Vec<String>,
}

/// Dependency graph over a set of trait definitions
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build a graph; the first definition wins when names collide
    pub fn from_definitions<'a>(definitions: impl IntoIterator<Item = &'a TraitDefinition>) -> Self {
        let mut graph = DependencyGraph::default();

        for def in definitions {
            let key = normalize_name(def.name());
            if graph.index.contains_key(&key) {
                continue;
            }
            graph.index.insert(key, graph.nodes.len());
            graph.nodes.push(Node {
                name: def.name().to_string(),
                dependencies: def.dependency_names().map(str::to_string).collect(),
                conflicts: def.metadata.conflicts_with.clone(),
            });
        }

        graph.edges = graph
            .nodes
            .iter()
            .map(|node| {
                let mut seen = HashSet::new();
                node.dependencies
                    .iter()
                    .filter_map(|dep| graph.lookup(dep))
                    .filter(|idx| seen.insert(*idx))
                    .collect()
            })
            .collect();

        graph
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        // Dependencies may be written with directory segments ("core/Auditable")
        let leaf = name.rsplit('/').next().unwrap_or(name);
        self.index
            .get(&normalize_name(name))
            .or_else(|| self.index.get(&normalize_name(leaf)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Direct dependencies of a trait that exist in the graph
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.lookup(name)
            .map(|idx| self.edges[idx].iter().map(|&d| self.nodes[d].name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Run every consistency check
    pub fn validate(&self) -> GraphReport {
        let mut errors = Vec::new();

        for node in &self.nodes {
            for dep in &node.dependencies {
                if self.lookup(dep).is_none() {
                    errors.push(GraphError::MissingDependency {
                        trait_name: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        errors.extend(self.find_cycles().into_iter().map(|path| GraphError::Cycle { path }));
        errors.extend(self.find_incompatibilities());

        GraphReport { errors }
    }

    /// Every distinct cycle, each reported once starting from its earliest node
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut state = vec![Visit::New; self.nodes.len()];
        let mut stack = Vec::new();
        let mut found: Vec<Vec<usize>> = Vec::new();

        for start in 0..self.nodes.len() {
            if state[start] == Visit::New {
                self.visit(start, &mut state, &mut stack, &mut found);
            }
        }

        found
            .into_iter()
            .map(|cycle| cycle.iter().map(|&i| self.nodes[i].name.clone()).collect())
            .collect()
    }

    fn visit(&self, node: usize, state: &mut [Visit], stack: &mut Vec<usize>, found: &mut Vec<Vec<usize>>) {
        state[node] = Visit::Active;
        stack.push(node);

        for &next in &self.edges[node] {
            match state[next] {
                Visit::New => self.visit(next, state, stack, found),
                Visit::Active => {
                    if let Some(pos) = stack.iter().position(|&n| n == next) {
                        let cycle = canonical_cycle(&stack[pos..]);
                        if !found.contains(&cycle) {
                            found.push(cycle);
                        }
                    }
                }
                Visit::Done => {}
            }
        }

        stack.pop();
        state[node] = Visit::Done;
    }

    /// Transitive dependencies of a node (excluding itself)
    fn closure(&self, start: usize) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut pending = vec![start];
        seen[start] = true;

        while let Some(current) = pending.pop() {
            for &dep in &self.edges[current] {
                if !seen[dep] {
                    seen[dep] = true;
                    order.push(dep);
                    pending.push(dep);
                }
            }
        }

        order
    }

    /// Conflicts among traits that always load together (a trait and its dependency closure)
    fn find_incompatibilities(&self) -> Vec<GraphError> {
        let mut reported: HashSet<(usize, usize)> = HashSet::new();
        let mut errors = Vec::new();

        for start in 0..self.nodes.len() {
            let mut group = vec![start];
            group.extend(self.closure(start));

            for (i, &a) in group.iter().enumerate() {
                for &b in &group[i + 1..] {
                    let pair = (a.min(b), a.max(b));
                    if !self.declares_conflict(a, b) || !reported.insert(pair) {
                        continue;
                    }
                    errors.push(GraphError::IncompatibleTraits {
                        first: self.nodes[pair.0].name.clone(),
                        second: self.nodes[pair.1].name.clone(),
                        reason: format!("both are required by \"{}\"", self.nodes[start].name),
                    });
                }
            }
        }

        errors
    }

    fn declares_conflict(&self, a: usize, b: usize) -> bool {
        let names = |x: usize, y: usize| {
            self.nodes[x]
                .conflicts
                .iter()
                .any(|c| normalize_name(c) == normalize_name(&self.nodes[y].name))
        };
        names(a, b) || names(b, a)
    }

    /// Incompatible pairs within one object's trait selection
    pub fn check_selection(&self, names: &[&str]) -> Vec<GraphError> {
        let indices: Vec<usize> = names.iter().filter_map(|n| self.lookup(n)).collect();
        let mut errors = Vec::new();

        for (i, &a) in indices.iter().enumerate() {
            for &b in &indices[i + 1..] {
                if a != b && self.declares_conflict(a, b) {
                    errors.push(GraphError::IncompatibleTraits {
                        first: self.nodes[a].name.clone(),
                        second: self.nodes[b].name.clone(),
                        reason: "declared in conflicts_with".to_string(),
                    });
                }
            }
        }

        errors
    }

    /// Linear load order: dependencies first, ties broken by input order
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (node, deps) in self.edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].name.clone());
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let path = self.find_cycles().into_iter().next().unwrap_or_default();
            return Err(GraphError::Cycle { path });
        }

        Ok(order)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Rotate a cycle so it starts at its smallest index, then close it
fn canonical_cycle(cycle: &[usize]) -> Vec<usize> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated: Vec<usize> = cycle[start..].iter().chain(&cycle[..start]).copied().collect();
    if let Some(&first) = rotated.first() {
        rotated.push(first);
    }
    rotated
}

/// Index pairs of definitions that declare each other (either direction) as conflicting
pub fn conflicting_pairs(definitions: &[&TraitDefinition]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in definitions.iter().enumerate() {
        for (j, b) in definitions.iter().enumerate().skip(i + 1) {
            if a.conflicts_with(b.name()) || b.conflicts_with(a.name()) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}
