//! Dependency Registry
//!
//! The registry owns the edge bookkeeping of the reactive graph. Every live
//! node has one entry holding its kind, a handle used to dispatch
//! invalidation and disposal, and two insertion-ordered edge sets:
//!
//! - `dependencies`: the nodes this node reads from
//! - `dependents`: the nodes that read from this node
//!
//! The two sets are always kept mirror images of each other. Cycles are
//! rejected when an edge is created, so the graph never has to be repaired
//! after the fact.
//!
//! Entries are removed when a node is disposed. Dropping the entry drops the
//! handle, so the registry never keeps a disposed node alive.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};

use super::node::{NodeId, NodeKind};
use crate::error::ReactiveError;

struct Entry<N> {
    kind: NodeKind,
    handle: N,
    dependencies: IndexSet<NodeId>,
    dependents: IndexSet<NodeId>,
}

/// Bidirectional edge bookkeeping between dependents and dependencies.
///
/// `N` is the handle stored for each node. The reactive runtime stores a
/// tagged node reference; tests can store `()`.
pub struct Registry<N> {
    entries: IndexMap<NodeId, Entry<N>>,
}

impl<N> Registry<N> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Register a node. Re-registering an id replaces its handle and keeps
    /// its edges.
    pub fn register(&mut self, id: NodeId, kind: NodeKind, handle: N) {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.kind = kind;
                entry.handle = handle;
            }
            None => {
                self.entries.insert(
                    id,
                    Entry {
                        kind,
                        handle,
                        dependencies: IndexSet::new(),
                        dependents: IndexSet::new(),
                    },
                );
            }
        }
    }

    /// Remove a node and every edge touching it, returning its handle.
    ///
    /// The caller should drop the handle after releasing any lock guarding
    /// the registry.
    pub fn deregister(&mut self, id: NodeId) -> Option<N> {
        let entry = self.entries.shift_remove(&id)?;

        for dependency in &entry.dependencies {
            if let Some(other) = self.entries.get_mut(dependency) {
                other.dependents.shift_remove(&id);
            }
        }
        for dependent in &entry.dependents {
            if let Some(other) = self.entries.get_mut(dependent) {
                other.dependencies.shift_remove(&id);
            }
        }

        Some(entry.handle)
    }

    /// Whether the node is registered.
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The kind of a registered node.
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.entries.get(&id).map(|entry| entry.kind)
    }

    /// Add the edge `dependent -> dependency`.
    ///
    /// Returns `Ok(true)` if the edge was created and `Ok(false)` if it
    /// already existed. Fails without touching the graph if either node is
    /// not registered, if `dependent` is a state cell or `dependency` an
    /// effect, or if `dependency` already reaches `dependent`.
    pub fn bind(&mut self, dependent: NodeId, dependency: NodeId) -> Result<bool, ReactiveError> {
        let dependent_kind = self.kind(dependent).ok_or(ReactiveError::Disposed(dependent))?;
        let dependency_kind = self.kind(dependency).ok_or(ReactiveError::Disposed(dependency))?;
        if dependent_kind == NodeKind::State || dependency_kind == NodeKind::Effect {
            return Err(ReactiveError::InvalidEdge {
                dependent,
                dependent_kind,
                dependency,
                dependency_kind,
            });
        }
        if self.is_bound(dependent, dependency) {
            return Ok(false);
        }
        if self.reaches(dependency, dependent) {
            return Err(ReactiveError::CircularDependency {
                dependent,
                dependency,
            });
        }

        if let Some(entry) = self.entries.get_mut(&dependent) {
            entry.dependencies.insert(dependency);
        }
        if let Some(entry) = self.entries.get_mut(&dependency) {
            entry.dependents.insert(dependent);
        }
        Ok(true)
    }

    /// Remove the edge `dependent -> dependency`. Returns whether it existed.
    pub fn unbind(&mut self, dependent: NodeId, dependency: NodeId) -> bool {
        let removed = self
            .entries
            .get_mut(&dependent)
            .map_or(false, |entry| entry.dependencies.shift_remove(&dependency));

        if let Some(entry) = self.entries.get_mut(&dependency) {
            entry.dependents.shift_remove(&dependent);
        }
        removed
    }

    /// Remove every edge from `dependent` to its dependencies.
    ///
    /// Returns the dependencies that were released.
    pub fn unbind_all(&mut self, dependent: NodeId) -> Vec<NodeId> {
        let released: Vec<NodeId> = match self.entries.get_mut(&dependent) {
            Some(entry) => entry.dependencies.drain(..).collect(),
            None => return Vec::new(),
        };

        for dependency in &released {
            if let Some(entry) = self.entries.get_mut(dependency) {
                entry.dependents.shift_remove(&dependent);
            }
        }
        released
    }

    /// Whether the edge `dependent -> dependency` exists.
    pub fn is_bound(&self, dependent: NodeId, dependency: NodeId) -> bool {
        self.entries
            .get(&dependent)
            .map_or(false, |entry| entry.dependencies.contains(&dependency))
    }

    /// Snapshot of the nodes reading from `id`, in insertion order.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.entries
            .get(&id)
            .map(|entry| entry.dependents.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the nodes `id` reads from, in insertion order.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.entries
            .get(&id)
            .map(|entry| entry.dependencies.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `target` is reachable from `from` by following dependencies.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack: SmallVec<[NodeId; 16]> = smallvec![from];
        let mut visited = HashSet::new();

        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(entry) = self.entries.get(&id) {
                stack.extend(entry.dependencies.iter().copied());
            }
        }
        false
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no node is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.entries.values().map(|entry| entry.dependencies.len()).sum()
    }

    /// Serializable view of the whole graph, in registration order.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .entries
            .iter()
            .map(|(id, entry)| NodeSnapshot {
                id: *id,
                kind: entry.kind,
                dependencies: entry.dependencies.iter().copied().collect(),
                dependents: entry.dependents.iter().copied().collect(),
            })
            .collect();
        GraphSnapshot { nodes }
    }
}

impl<N: Clone> Registry<N> {
    /// Clone of the handle registered for `id`.
    pub fn handle(&self, id: NodeId) -> Option<N> {
        self.entries.get(&id).map(|entry| entry.handle.clone())
    }

    /// Handles of the nodes reading from `id`, in insertion order.
    pub fn dependent_handles(&self, id: NodeId) -> Vec<N> {
        let Some(entry) = self.entries.get(&id) else {
            return Vec::new();
        };
        entry
            .dependents
            .iter()
            .filter_map(|dependent| self.entries.get(dependent))
            .map(|dependent| dependent.handle.clone())
            .collect()
    }
}

impl<N> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the graph, for debugging and tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    /// The snapshot of a single node.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// One node of a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}
