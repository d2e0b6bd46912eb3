//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs (or, in async mode, schedules) its
//!    callback to establish initial dependencies.
//!
//! 2. When any dependency changes, the effect runs again. A sync effect runs
//!    before the triggering `set` returns; an async effect defers to the next
//!    turn of its scheduler, collapsing every request made in between.
//!
//! 3. Each run calls the previous run's cleanup, releases the old
//!    dependencies, and tracks new ones while the callback executes.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not, and nothing reads an effect.
//! - Effects may defer their runs; computeds always recompute synchronously.
//!
//! # Cleanup
//!
//! The callback may return a [`Cleanup`]. It is called before the next run,
//! or exactly once when the effect is disposed.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use super::context::ReactiveContext;
use super::lifecycle::NodeCore;
use super::runtime::{NodeRef, Runtime};
use crate::error::{BoxError, ReactiveError};
use crate::graph::{NodeId, NodeKind};
use crate::schedule::{Coalescer, Scheduler};

/// Action returned by an effect run, called before the next run or on
/// dispose.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect callback may return.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// When an effect re-runs.
#[derive(Clone)]
pub enum EffectMode {
    /// Run immediately, on construction and on every invalidation.
    Sync,
    /// Defer every run to the scheduler, collapsing repeated requests.
    Async(Arc<dyn Scheduler>),
}

impl fmt::Debug for EffectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectMode::Sync => f.write_str("Sync"),
            EffectMode::Async(_) => f.write_str("Async"),
        }
    }
}

pub(crate) struct EffectInner {
    core: NodeCore,

    /// The effect function.
    callback: Box<dyn Fn() -> Option<Cleanup> + Send + Sync>,

    /// Cleanup returned by the latest run.
    cleanup: Mutex<Option<Cleanup>>,

    /// Present in async mode.
    coalescer: Option<Coalescer>,

    /// Number of times the callback has run.
    run_count: AtomicUsize,
}

impl EffectInner {
    pub(crate) fn core(&self) -> &NodeCore {
        &self.core
    }

    /// React to a dependency change according to the effect's mode.
    pub(crate) fn invalidate(this: &Arc<Self>) -> Result<(), ReactiveError> {
        match &this.coalescer {
            None => this.run(),
            Some(coalescer) => {
                let weak = Arc::downgrade(this);
                coalescer.request(move || match weak.upgrade() {
                    Some(effect) => effect.run(),
                    None => Ok(()),
                });
                Ok(())
            }
        }
    }

    fn run(&self) -> Result<(), ReactiveError> {
        self.core.ensure_live()?;
        let id = self.core.id();

        let previous = self.cleanup.lock().take();
        if let Some(cleanup) = previous {
            cleanup.run();
        }

        Runtime::unbind_all(id);

        let ctx = ReactiveContext::subscribe(id);
        let cleanup = (self.callback)();
        let tracked = ctx.finish();

        self.run_count.fetch_add(1, Ordering::Relaxed);

        // The callback disposed its own effect: nothing will call this later.
        if self.core.is_disposed() {
            if let Some(cleanup) = cleanup {
                cleanup.run();
            }
            return Ok(());
        }

        *self.cleanup.lock() = cleanup;
        tracked
    }

    fn take_cleanup(this: &Weak<Self>) -> Result<(), BoxError> {
        let Some(effect) = this.upgrade() else {
            return Ok(());
        };
        let cleanup = effect.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
        Ok(())
    }

    fn cancel_pending(this: &Weak<Self>) -> Result<(), BoxError> {
        if let Some(effect) = this.upgrade() {
            if let Some(coalescer) = &effect.coalescer {
                coalescer.cancel("effect disposed");
            }
        }
        Ok(())
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Cloning an `Effect` creates a new handle to the same node. Dropping every
/// handle does not stop the effect; only [`dispose`](Self::dispose) (or
/// disposal of something it reads) does.
///
/// # Example
///
/// ```rust
/// use quiver_core::{Effect, State};
///
/// let count = State::new(0);
///
/// let effect = {
///     let count = count.clone();
///     Effect::sync(move || println!("Count is: {}", count.get())).unwrap()
/// };
///
/// count.set(5).unwrap(); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect.
    ///
    /// In `Sync` mode the callback runs before this returns. In `Async` mode
    /// the first run is scheduled like any other.
    pub fn new<F, R>(mode: EffectMode, callback: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoCleanup,
    {
        let coalescer = match mode {
            EffectMode::Sync => None,
            EffectMode::Async(scheduler) => Some(Coalescer::new(scheduler)),
        };
        let inner = Arc::new(EffectInner {
            core: NodeCore::new(NodeKind::Effect),
            callback: Box::new(move || callback().into_cleanup()),
            cleanup: Mutex::new(None),
            coalescer,
            run_count: AtomicUsize::new(0),
        });

        // Reverse order on dispose: cancel any pending run, then clean up.
        let weak = Arc::downgrade(&inner);
        inner.core.append(move || EffectInner::take_cleanup(&weak))?;
        let weak = Arc::downgrade(&inner);
        inner.core.append(move || EffectInner::cancel_pending(&weak))?;

        Runtime::register(&inner.core, NodeRef::Effect(inner.clone()));

        if let Err(err) = EffectInner::invalidate(&inner) {
            if let Err(teardown) = Runtime::dispose(&inner.core) {
                warn!(node = %inner.core.id(), %teardown, "dispose of failed effect also failed");
            }
            return Err(err);
        }

        Ok(Self { inner })
    }

    /// Create an effect that runs synchronously.
    pub fn sync<F, R>(callback: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoCleanup,
    {
        Self::new(EffectMode::Sync, callback)
    }

    /// Create an effect whose runs are deferred to `scheduler`.
    pub fn deferred<F, R>(scheduler: Arc<dyn Scheduler>, callback: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoCleanup,
    {
        Self::new(EffectMode::Async(scheduler), callback)
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// Whether an async run is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.inner
            .coalescer
            .as_ref()
            .map_or(false, |coalescer| coalescer.is_pending())
    }

    /// Add an action to run when the effect is disposed.
    pub fn on_dispose<F>(&self, action: F) -> Result<(), ReactiveError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.inner.core.append(action)
    }

    /// Dispose of the effect.
    ///
    /// Cancels any pending run and calls the latest cleanup. Calling this
    /// more than once is a no-op.
    pub fn dispose(&self) -> Result<(), ReactiveError> {
        Runtime::dispose(&self.inner.core)
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of dependencies read by the latest run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependencies(self.id()).len()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("pending", &self.is_pending())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
