//! Computed Implementation
//!
//! A Computed is a derived value: both something that can be read and
//! something that reads.
//!
//! # How Computeds Work
//!
//! 1. On construction the computation runs once, inside a subscription
//!    context for the computed, so every node it reads becomes a dependency.
//!
//! 2. When any dependency changes, the computed is invalidated and recomputes
//!    immediately. Recomputation is always synchronous.
//!
//! 3. Before each run all previous dependencies are released, so the
//!    dependency set always reflects what the latest run actually read.
//!
//! 4. After storing the new value, the computed invalidates its own
//!    dependents so the change keeps flowing downstream.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::context::ReactiveContext;
use super::lifecycle::NodeCore;
use super::runtime::{NodeRef, Recompute, Runtime};
use crate::error::{BoxError, ReactiveError};
use crate::graph::{NodeId, NodeKind};

struct ComputedInner<T> {
    core: NodeCore,

    /// The computation function.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value. Only `None` until the first run completes.
    value: RwLock<Option<T>>,

    /// Number of completed runs.
    version: AtomicU64,
}

impl<T> Recompute for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn recompute(&self) -> Result<(), ReactiveError> {
        self.core.ensure_live()?;
        let id = self.core.id();

        Runtime::unbind_all(id);

        let ctx = ReactiveContext::subscribe(id);
        let value = (self.compute)();
        let tracked = ctx.finish();

        *self.value.write() = Some(value);
        self.version.fetch_add(1, Ordering::Relaxed);

        let notified = Runtime::notify(id);
        tracked.and(notified)
    }
}

/// A derived value that recomputes whenever its dependencies change.
///
/// Cloning a `Computed` creates a new handle to the same node.
///
/// # Example
///
/// ```rust
/// use quiver_core::{Computed, State};
///
/// let count = State::new(2);
/// let doubled = {
///     let count = count.clone();
///     Computed::new(move || count.get() * 2).unwrap()
/// };
///
/// count.set(5).unwrap();
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed and run it once.
    ///
    /// Fails if the first run could not track what it read, e.g. because a
    /// read would close a dependency cycle. The partially built node is
    /// disposed before the error is returned.
    pub fn new<F>(compute: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(ComputedInner {
            core: NodeCore::new(NodeKind::Computed),
            compute: Box::new(compute),
            value: RwLock::new(None),
            version: AtomicU64::new(0),
        });
        Runtime::register(&inner.core, NodeRef::Computed(inner.clone()));

        if let Err(err) = inner.recompute() {
            if let Err(teardown) = Runtime::dispose(&inner.core) {
                warn!(node = %inner.core.id(), %teardown, "dispose of failed computed also failed");
            }
            return Err(err);
        }

        Ok(Self { inner })
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// Get the cached value.
    ///
    /// If called within a reactive context, this also binds the current
    /// computation to this computed.
    ///
    /// # Panics
    ///
    /// Panics if the computed has been disposed.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`get`](Self::get), but returns an error instead of panicking.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.inner.core.ensure_live()?;
        Runtime::track(self.id());
        Ok(self.cached())
    }

    /// Get the cached value without tracking dependencies.
    ///
    /// # Panics
    ///
    /// Panics if the computed has been disposed.
    pub fn get_untracked(&self) -> T {
        if let Err(err) = self.inner.core.ensure_live() {
            panic!("{err}");
        }
        self.cached()
    }

    fn cached(&self) -> T {
        self.inner
            .value
            .read()
            .clone()
            .expect("computed runs once before its handle is returned")
    }

    /// Number of times the computation has run.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    /// Add an action to run when the computed is disposed.
    pub fn on_dispose<F>(&self, action: F) -> Result<(), ReactiveError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.inner.core.append(action)
    }

    /// Dispose the computed and, transitively, everything that reads it.
    ///
    /// Calling this more than once is a no-op.
    pub fn dispose(&self) -> Result<(), ReactiveError> {
        Runtime::dispose(&self.inner.core)
    }

    /// Check if the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    /// Get the number of dependencies read by the latest run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependencies(self.id()).len()
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependents(self.id()).len()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("value", &*self.inner.value.read())
            .field("version", &self.version())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::State;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn computed_runs_on_construction() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        })
        .unwrap();

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(computed.version(), 1);
        assert_eq!(computed.get(), 42);
    }

    #[test]
    fn computed_caches_between_changes() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        })
        .unwrap();

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_recomputes_on_every_set() {
        let state = State::new(1);
        let call_count = Arc::new(AtomicI32::new(0));

        let computed = {
            let state = state.clone();
            let call_count = call_count.clone();
            Computed::new(move || {
                call_count.fetch_add(1, Ordering::SeqCst);
                state.get() * 10
            })
            .unwrap()
        };

        state.set(2).unwrap();
        assert_eq!(computed.get(), 20);

        // Same value still counts as a change
        state.set(2).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn computed_chain_propagates() {
        let base = State::new(5);

        let doubled = {
            let base = base.clone();
            Computed::new(move || base.get() * 2).unwrap()
        };
        let plus_ten = {
            let doubled = doubled.clone();
            Computed::new(move || doubled.get() + 10).unwrap()
        };

        assert_eq!(plus_ten.get(), 20);

        base.set(10).unwrap();

        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn dependencies_follow_the_latest_run() {
        let use_left = State::new(true);
        let left = State::new("left");
        let right = State::new("right");

        let picked = {
            let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
            Computed::new(move || if use_left.get() { left.get() } else { right.get() }).unwrap()
        };

        assert_eq!(picked.dependency_count(), 2);
        assert_eq!(left.dependent_count(), 1);
        assert_eq!(right.dependent_count(), 0);

        use_left.set(false).unwrap();

        assert_eq!(picked.get(), "right");
        assert_eq!(left.dependent_count(), 0);
        assert_eq!(right.dependent_count(), 1);
    }

    #[test]
    fn disposing_source_cascades() {
        let state = State::new(1);
        let computed = {
            let state = state.clone();
            Computed::new(move || state.get() + 1).unwrap()
        };

        state.dispose().unwrap();

        assert!(computed.is_disposed());
        assert!(computed.try_get().is_err());
        assert!(!Runtime::is_registered(computed.id()));
    }

    #[test]
    fn dispose_releases_dependencies() {
        let state = State::new(1);
        let computed = {
            let state = state.clone();
            Computed::new(move || state.get() + 1).unwrap()
        };
        assert_eq!(state.dependent_count(), 1);

        computed.dispose().unwrap();

        assert_eq!(state.dependent_count(), 0);
        assert!(!state.is_disposed());
        state.set(7).unwrap();
    }
}
