//! Dependency graph construction and topological linearization.
//!
//! The graph keeps both directions of every edge: `dependencies` answers what
//! a plugin needs, `dependents` answers who is built on top of it. Startup
//! walks the [`LaunchOrder`] forwards, and restart cascades walk `dependents`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::warn;

use crate::error::LaunchError;
use crate::manifest::PluginRecord;

const GRAPH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::graph");

/// Prefix of a dependency reference.
pub const DEPENDS_PREFIX: &str = "depends:";

/// A parsed dependency reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// `depends:<identifier>`.
    DependsOn(&'a str),
    /// Any other syntax; ignored with a warning.
    Unrecognised(&'a str),
}

impl<'a> Requirement<'a> {
    /// Parses one reference.
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        match raw.trim().strip_prefix(DEPENDS_PREFIX) {
            Some(identifier) if !identifier.trim().is_empty() => Self::DependsOn(identifier.trim()),
            _ => Self::Unrecognised(raw),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Adjacency {
    dependencies: BTreeSet<String>,
    dependents: BTreeSet<String>,
}

/// Forward and reverse dependency edges keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Adjacency>,
}

impl DependencyGraph {
    /// Builds the graph over the accepted records.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::DuplicateIdentifier`] when two records share an
    /// identifier and [`LaunchError::MissingDependency`] when a reference
    /// names an identifier outside the set.
    pub fn build<'r, I>(records: I) -> Result<Self, LaunchError>
    where
        I: IntoIterator<Item = &'r PluginRecord>,
    {
        let accepted: Vec<&PluginRecord> = records.into_iter().collect();
        let mut nodes: BTreeMap<String, Adjacency> = BTreeMap::new();
        for record in &accepted {
            if nodes
                .insert(record.identifier().to_owned(), Adjacency::default())
                .is_some()
            {
                return Err(LaunchError::DuplicateIdentifier {
                    identifier: record.identifier().to_owned(),
                });
            }
        }

        for record in &accepted {
            let plugin = record.identifier();
            for raw in record.requirements() {
                let dependency = match Requirement::parse(raw) {
                    Requirement::DependsOn(dependency) => dependency,
                    Requirement::Unrecognised(reference) => {
                        warn!(
                            target: GRAPH_TARGET,
                            plugin,
                            requirement = reference,
                            "ignoring unrecognised requirement"
                        );
                        continue;
                    }
                };
                let Some(target) = nodes.get_mut(dependency) else {
                    return Err(LaunchError::MissingDependency {
                        plugin: plugin.to_owned(),
                        dependency: dependency.to_owned(),
                    });
                };
                target.dependents.insert(plugin.to_owned());
                if let Some(source) = nodes.get_mut(plugin) {
                    source.dependencies.insert(dependency.to_owned());
                }
            }
        }

        Ok(Self { nodes })
    }

    /// Number of plugins in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `identifier` is a node.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.nodes.contains_key(identifier)
    }

    /// Identifiers in lexicographic order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Direct dependencies of `identifier`.
    #[must_use]
    pub fn dependencies(&self, identifier: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(identifier).map(|node| &node.dependencies)
    }

    /// Direct dependents of `identifier`.
    #[must_use]
    pub fn dependents(&self, identifier: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(identifier).map(|node| &node.dependents)
    }

    /// Every plugin that depends on `identifier`, directly or transitively,
    /// in breadth-first order. `identifier` itself is not included.
    #[must_use]
    pub fn transitive_dependents(&self, identifier: &str) -> Vec<String> {
        let mut visited: BTreeSet<&str> = BTreeSet::from([identifier]);
        let mut queue: VecDeque<&str> = VecDeque::from([identifier]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            let Some(dependents) = self.dependents(current) else {
                continue;
            };
            for dependent in dependents {
                if visited.insert(dependent.as_str()) {
                    found.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }
        found
    }

    /// Produces a total order with every dependency ahead of its dependents.
    ///
    /// Kahn's algorithm over an ordered ready set; unconstrained identifiers
    /// come out lexicographically, so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::CyclicDependency`] when any cycle exists.
    pub fn linearize(&self) -> Result<LaunchOrder, LaunchError> {
        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(identifier, node)| (identifier.as_str(), node.dependencies.len()))
            .collect();
        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(identifier, _)| *identifier)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(identifier) = ready.pop_first() {
            pending.remove(identifier);
            order.push(identifier.to_owned());
            for dependent in self.dependents(identifier).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        if pending.is_empty() {
            Ok(LaunchOrder(order))
        } else {
            let remaining: BTreeSet<&str> = pending.into_keys().collect();
            Err(LaunchError::CyclicDependency {
                participants: self.cycle_core(remaining),
            })
        }
    }

    /// Strips plugins that merely hang off a cycle, leaving those on (or
    /// between) cycles.
    fn cycle_core<'g>(&'g self, mut remaining: BTreeSet<&'g str>) -> Vec<String> {
        loop {
            let leaves: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|identifier| {
                    self.dependents(identifier).is_none_or(|dependents| {
                        dependents
                            .iter()
                            .all(|dependent| !remaining.contains(dependent.as_str()))
                    })
                })
                .collect();
            if leaves.is_empty() {
                break;
            }
            for leaf in leaves {
                remaining.remove(leaf);
            }
        }
        remaining.into_iter().map(str::to_owned).collect()
    }

    /// Drops every node not in `keep`, together with its edges.
    pub fn retain(&mut self, keep: &BTreeSet<String>) {
        self.nodes.retain(|identifier, _| keep.contains(identifier));
        for node in self.nodes.values_mut() {
            node.dependencies.retain(|identifier| keep.contains(identifier));
            node.dependents.retain(|identifier| keep.contains(identifier));
        }
    }
}

/// Startup order: each dependency precedes its dependents.
///
/// Computed once per launch and reused for restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOrder(Vec<String>);

impl LaunchOrder {
    /// Identifiers in launch order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Iterates in launch order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of `identifier`.
    #[must_use]
    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.0.iter().position(|entry| entry == identifier)
    }

    /// Keeps only identifiers in `keep`, preserving relative order.
    pub fn retain(&mut self, keep: &BTreeSet<String>) {
        self.0.retain(|identifier| keep.contains(identifier));
    }
}
