//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects state cells,
//! computeds, and effects. It owns the process-wide dependency registry and
//! implements the graph-level operations:
//!
//! 1. **Tracking**: when a node is read inside a `Subscription` context, the
//!    runtime binds the observing dependent to it.
//!
//! 2. **Notification**: when a dependency changes, the runtime takes a
//!    snapshot of its dependents and invalidates each live one, in the order
//!    they were bound.
//!
//! 3. **Disposal**: runs a node's teardown list, unbinds it from its
//!    dependencies, disposes everything depending on it, and finally drops
//!    the registry's handle to it.
//!
//! # Locking
//!
//! All graph mutations go through one `parking_lot::Mutex`. The lock is only
//! held for registry bookkeeping, never while user code runs: handles are
//! cloned out first and invoked after the guard is released.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::context::{Observer, ReactiveContext};
use super::effect::EffectInner;
use super::lifecycle::NodeCore;
use crate::error::{ReactiveError, TeardownError};
use crate::graph::{GraphSnapshot, NodeId, Registry};

/// Type-erased computed node.
///
/// Erases only the value type so the registry can hold computeds of any `T`.
pub(crate) trait Recompute: Send + Sync {
    fn core(&self) -> &NodeCore;

    /// Re-run the computation and notify dependents.
    fn recompute(&self) -> Result<(), ReactiveError>;
}

/// The registry's handle to a live node.
///
/// Invalidation and disposal are dispatched by matching on the variant.
///
/// State cells are never dependents, so nothing invalidates or cascades into
/// them; their handle carries nothing.
#[derive(Clone)]
pub(crate) enum NodeRef {
    State,
    Computed(Arc<dyn Recompute>),
    Effect(Arc<EffectInner>),
}

impl NodeRef {
    fn is_disposed(&self) -> bool {
        match self {
            NodeRef::State => false,
            NodeRef::Computed(computed) => computed.core().is_disposed(),
            NodeRef::Effect(effect) => effect.core().is_disposed(),
        }
    }

    fn invalidate(&self) -> Result<(), ReactiveError> {
        match self {
            NodeRef::State => Ok(()),
            NodeRef::Computed(computed) => computed.recompute(),
            NodeRef::Effect(effect) => EffectInner::invalidate(effect),
        }
    }

    fn dispose(&self) -> Result<(), ReactiveError> {
        match self {
            NodeRef::State => Ok(()),
            NodeRef::Computed(computed) => Runtime::dispose(computed.core()),
            NodeRef::Effect(effect) => Runtime::dispose(effect.core()),
        }
    }
}

static REGISTRY: OnceLock<Mutex<Registry<NodeRef>>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry<NodeRef>> {
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}

/// The global reactive runtime.
///
/// This is a singleton that manages all reactive nodes in the process.
pub struct Runtime;

impl Runtime {
    /// Register a freshly constructed node.
    pub(crate) fn register(core: &NodeCore, handle: NodeRef) {
        registry().lock().register(core.id(), core.kind(), handle);
    }

    /// Bind `dependent` to `dependency`.
    ///
    /// Returns whether a new edge was created. Fails with
    /// [`ReactiveError::CircularDependency`] if the edge would close a cycle
    /// and with [`ReactiveError::InvalidEdge`] if a state cell would become a
    /// dependent or an effect a dependency; the graph is left unchanged in
    /// both cases.
    pub fn bind(dependent: NodeId, dependency: NodeId) -> Result<bool, ReactiveError> {
        let created = registry().lock().bind(dependent, dependency)?;
        if created {
            trace!(%dependent, %dependency, "bound");
        }
        Ok(created)
    }

    /// Remove the edge `dependent -> dependency`, if present.
    pub fn unbind(dependent: NodeId, dependency: NodeId) -> bool {
        let removed = registry().lock().unbind(dependent, dependency);
        if removed {
            trace!(%dependent, %dependency, "unbound");
        }
        removed
    }

    /// Remove every edge from `dependent` to its dependencies.
    pub(crate) fn unbind_all(dependent: NodeId) -> Vec<NodeId> {
        registry().lock().unbind_all(dependent)
    }

    /// Snapshot of the nodes currently reading from `id`.
    pub fn dependents(id: NodeId) -> Vec<NodeId> {
        registry().lock().dependents(id)
    }

    /// Snapshot of the nodes `id` currently reads from.
    pub fn dependencies(id: NodeId) -> Vec<NodeId> {
        registry().lock().dependencies(id)
    }

    /// Whether `id` is registered, i.e. constructed and not yet disposed.
    pub fn is_registered(id: NodeId) -> bool {
        registry().lock().contains(id)
    }

    /// Serializable view of every live node and edge.
    pub fn snapshot() -> GraphSnapshot {
        registry().lock().snapshot()
    }

    /// The current observer.
    pub fn current_observer() -> Observer {
        ReactiveContext::current()
    }

    /// Check if reads are currently tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }

    /// Record a read of `dependency` by the current observer, if any.
    ///
    /// Tracking failures are recorded on the observer's context and reported
    /// by the node that owns it once its run completes.
    pub(crate) fn track(dependency: NodeId) {
        let Some(dependent) = ReactiveContext::current_dependent() else {
            return;
        };

        if let Err(err) = Self::bind(dependent, dependency) {
            ReactiveContext::record_error(err);
        }
    }

    /// Invalidate every live dependent of `dependency`.
    ///
    /// Every dependent is visited even if an earlier one fails; the first
    /// failure is returned.
    pub(crate) fn notify(dependency: NodeId) -> Result<(), ReactiveError> {
        let dependents = registry().lock().dependent_handles(dependency);

        let mut first = None;
        for node in dependents {
            // An earlier dependent in this sweep may have disposed it.
            if node.is_disposed() {
                continue;
            }
            if let Err(err) = node.invalidate() {
                if first.is_none() {
                    first = Some(err);
                } else {
                    warn!(%dependency, %err, "invalidation failed after an earlier failure");
                }
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Dispose a node. Idempotent.
    ///
    /// Runs the node's teardown list, unbinds it from its dependencies,
    /// disposes every node depending on it and finally deregisters it. Every
    /// failure along the way is collected into one [`TeardownError`] chain.
    pub(crate) fn dispose(core: &NodeCore) -> Result<(), ReactiveError> {
        if !core.begin_dispose() {
            return Ok(());
        }
        let id = core.id();

        let mut failure = core.run_teardown();

        let released = Self::unbind_all(id);

        let dependents = registry().lock().dependent_handles(id);
        let cascaded = dependents.len();
        for node in dependents {
            if let Err(err) = node.dispose() {
                failure = Some(TeardownError::chain(failure, Box::new(err)));
            }
        }

        // Dropped after the registry lock is released.
        let handle = registry().lock().deregister(id);
        drop(handle);

        debug!(
            node = %id,
            kind = %core.kind(),
            released = released.len(),
            cascaded,
            "disposed"
        );

        match failure {
            Some(source) => Err(ReactiveError::Teardown { node: id, source }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::reactive::{Computed, Effect, State};

    fn state_core() -> NodeCore {
        let core = NodeCore::new(NodeKind::State);
        Runtime::register(&core, NodeRef::State);
        core
    }

    /// An effect that reads nothing, used as a bare dependent.
    fn idle_reader() -> Effect {
        Effect::sync(|| ()).unwrap()
    }

    #[test]
    fn runtime_binds_and_unbinds() {
        let source = state_core();
        let reader = idle_reader();

        assert!(Runtime::bind(reader.id(), source.id()).unwrap());
        assert_eq!(Runtime::dependents(source.id()), vec![reader.id()]);
        assert_eq!(Runtime::dependencies(reader.id()), vec![source.id()]);

        assert!(Runtime::unbind(reader.id(), source.id()));
        assert!(Runtime::dependents(source.id()).is_empty());
    }

    #[test]
    fn track_outside_context_is_untracked() {
        let source = state_core();

        Runtime::track(source.id());

        assert!(Runtime::dependents(source.id()).is_empty());
    }

    #[test]
    fn track_inside_context_binds_once() {
        let source = state_core();
        let reader = idle_reader();

        {
            let ctx = ReactiveContext::subscribe(reader.id());
            Runtime::track(source.id());
            Runtime::track(source.id());
            Runtime::track(source.id());
            assert!(ctx.finish().is_ok());
        }

        assert_eq!(Runtime::dependents(source.id()), vec![reader.id()]);
    }

    #[test]
    fn dispose_deregisters_and_is_idempotent() {
        let core = state_core();
        assert!(Runtime::is_registered(core.id()));

        Runtime::dispose(&core).unwrap();
        assert!(!Runtime::is_registered(core.id()));
        assert!(core.is_disposed());

        Runtime::dispose(&core).unwrap();
    }

    #[test]
    fn tracking_a_disposed_node_is_recorded() {
        let source = state_core();
        let reader = idle_reader();
        Runtime::dispose(&source).unwrap();

        let ctx = ReactiveContext::subscribe(reader.id());
        Runtime::track(source.id());

        assert!(matches!(
            ctx.finish(),
            Err(ReactiveError::Disposed(id)) if id == source.id()
        ));
    }

    #[test]
    fn state_cell_cannot_become_a_dependent() {
        let state = State::new(0);
        let computed = Computed::new(|| 1).unwrap();

        let err = Runtime::bind(state.id(), computed.id()).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidEdge { dependent, .. } if dependent == state.id()));
        assert!(Runtime::dependencies(state.id()).is_empty());

        computed.dispose().unwrap();
        assert!(!state.is_disposed());
        state.set(1).unwrap();
    }

    #[test]
    fn effect_cannot_become_a_dependency() {
        let computed = Computed::new(|| 1).unwrap();
        let effect = idle_reader();

        assert!(matches!(
            Runtime::bind(computed.id(), effect.id()),
            Err(ReactiveError::InvalidEdge { dependency, .. }) if dependency == effect.id()
        ));
        assert!(Runtime::dependents(effect.id()).is_empty());
    }
}
