//! Dependency Graph
//!
//! This module implements the bookkeeping half of the reactive system: which
//! nodes exist and which nodes read from which.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are state cells, computeds, or effects
//! - An edge `dependent -> dependency` means the dependent read the
//!   dependency during its last run
//!
//! When a dependency changes, the reactive runtime walks its dependents (in
//! the order they were bound) and invalidates each one.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized rather than spread over the nodes, which
//!    keeps cycle detection and consistency checks in one place.
//!
//! 2. Both directions are stored so sweeps and teardown never have to scan
//!    the whole graph.
//!
//! 3. Edge sets are insertion-ordered so propagation order is deterministic.

mod node;
mod registry;

pub use node::{NodeId, NodeKind};
pub use registry::{GraphSnapshot, NodeSnapshot, Registry};
