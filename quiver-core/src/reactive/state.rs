//! State Cell
//!
//! A state cell is the leaf of the reactive graph. It holds a value and
//! tracks which computeds and effects read it.
//!
//! # How State Cells Work
//!
//! 1. When a cell is read inside a reactive context (computed/effect), the
//!    runtime binds that context's node to the cell.
//!
//! 2. When a new value is set, every dependent is invalidated before `set`
//!    returns. There is no equality check: every `set` is a change.
//!
//! 3. Using a cell after it has been disposed is a programmer error. `get`
//!    panics, the fallible operations return [`ReactiveError::Disposed`].

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::lifecycle::NodeCore;
use super::runtime::{NodeRef, Runtime};
use crate::error::{BoxError, ReactiveError};
use crate::graph::{NodeId, NodeKind};

struct StateInner<T> {
    core: NodeCore,
    value: RwLock<T>,
}

/// A mutable reactive cell holding a value of type `T`.
///
/// Cloning a `State` creates a new handle to the same cell.
///
/// # Example
///
/// ```rust
/// use quiver_core::State;
///
/// let count = State::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct State<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<StateInner<T>>,
}

impl<T> State<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        let core = NodeCore::new(NodeKind::State);
        Runtime::register(&core, NodeRef::State);

        Self {
            inner: Arc::new(StateInner {
                core,
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also binds the current
    /// computation to this cell.
    ///
    /// # Panics
    ///
    /// Panics if the cell has been disposed.
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
        Ok(self.inner.value.read().clone())
    }

    /// Get the current value without tracking dependencies.
    ///
    /// # Panics
    ///
    /// Panics if the cell has been disposed.
    pub fn get_untracked(&self) -> T {
        if let Err(err) = self.inner.core.ensure_live() {
            panic!("{err}");
        }
        self.inner.value.read().clone()
    }

    /// Store a new value and synchronously invalidate every dependent.
    ///
    /// Returns the first error raised while propagating the change.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        self.inner.core.ensure_live()?;
        *self.inner.value.write() = value;
        Runtime::notify(self.id())
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        self.inner.core.ensure_live()?;
        let current = self.inner.value.read().clone();
        self.set(f(&current))
    }

    /// Add an action to run when the cell is disposed.
    pub fn on_dispose<F>(&self, action: F) -> Result<(), ReactiveError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.inner.core.append(action)
    }

    /// Dispose the cell and, transitively, everything that reads it.
    ///
    /// Calling this more than once is a no-op.
    pub fn dispose(&self) -> Result<(), ReactiveError> {
        Runtime::dispose(&self.inner.core)
    }

    /// Check if the cell has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependents(self.id()).len()
    }
}

impl<T> Clone for State<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for State<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id())
            .field("value", &*self.inner.value.read())
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
    use crate::reactive::context::ReactiveContext;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn state_get_and_set() {
        let state = State::new(0);
        assert_eq!(state.get(), 0);

        state.set(42).unwrap();
        assert_eq!(state.get(), 42);
    }

    #[test]
    fn state_update() {
        let state = State::new(10);
        state.update(|v| v + 5).unwrap();
        assert_eq!(state.get(), 15);
    }

    #[test]
    fn update_closure_may_write_the_cell() {
        let state = State::new(2);
        let inner = state.clone();

        state
            .update(move |v| {
                inner.set(100).unwrap();
                v + 1
            })
            .unwrap();
        assert_eq!(state.get(), 3);
    }

    #[test]
    fn state_clone_shares_cell() {
        let state1 = State::new(0);
        let state2 = state1.clone();

        state1.set(42).unwrap();
        assert_eq!(state2.get(), 42);
        assert_eq!(state1.id(), state2.id());
    }

    #[test]
    fn untracked_read_creates_no_edge() {
        let state = State::new(1);
        assert_eq!(state.get(), 1);
        assert_eq!(state.dependent_count(), 0);
    }

    #[test]
    fn repeated_tracked_reads_bind_once() {
        let state = State::new(1);
        let reader = Effect::sync(|| ()).unwrap();

        {
            let _ctx = ReactiveContext::subscribe(reader.id());
            state.get();
            state.get();
            state.get_untracked();
            state.get();
        }

        assert_eq!(Runtime::dependents(state.id()), vec![reader.id()]);
    }

    #[test]
    fn disposed_state_rejects_use() {
        let state = State::new(3);
        state.dispose().unwrap();

        assert!(state.is_disposed());
        assert!(matches!(state.try_get(), Err(ReactiveError::Disposed(_))));
        assert!(matches!(state.set(4), Err(ReactiveError::Disposed(_))));
        assert!(state.on_dispose(|| Ok(())).is_err());
    }

    #[test]
    #[should_panic(expected = "used after dispose")]
    fn get_on_disposed_state_panics() {
        let state = State::new(3);
        state.dispose().unwrap();
        state.get();
    }

    #[test]
    fn dispose_runs_teardown_once() {
        let state = State::new(0);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        state
            .on_dispose(move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        state.dispose().unwrap();
        state.dispose().unwrap();
        state.dispose().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
