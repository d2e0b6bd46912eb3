//! Reactive Primitives
//!
//! This module implements the nodes of the reactive graph: state cells,
//! computeds, and effects.
//!
//! # Concepts
//!
//! ## State
//!
//! A [`State`] is a container for mutable data. When it is read within a
//! tracking context (a computed or effect run), the reader is bound to it.
//! When its value is set, every reader is invalidated.
//!
//! ## Computed
//!
//! A [`Computed`] is a derived value. It recomputes synchronously whenever
//! one of its dependencies changes, then invalidates its own readers.
//!
//! ## Effect
//!
//! An [`Effect`] is a side-effecting callback that re-runs whenever its
//! dependencies change, either immediately or deferred to a scheduler.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local context stack to detect
//! dependencies automatically, and a process-wide registry (see
//! [`Runtime`]) for the edges between nodes.
//!
//! Disposal is explicit. Every node keeps a teardown list from construction;
//! disposing a node runs it, releases the node's dependencies and disposes
//! everything that reads from it.

mod computed;
mod context;
mod effect;
mod lifecycle;
mod runtime;
mod state;

pub use computed::Computed;
pub use context::{untrack, Observer, ReactiveContext};
pub use effect::{Cleanup, Effect, EffectMode, IntoCleanup};
pub use lifecycle::Teardown;
pub use runtime::Runtime;
pub use state::State;
