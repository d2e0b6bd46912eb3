//! Node Lifecycle
//!
//! Every node embeds a [`NodeCore`]: its identity, its disposed flag, and
//! its teardown list. The teardown list runs once, in reverse registration
//! order, the first time the node is disposed.
//!
//! The graph-level half of disposal (unbinding, cascading to dependents,
//! deregistering) lives in the runtime, which owns the registry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::{BoxError, ReactiveError, TeardownError};
use crate::graph::{NodeId, NodeKind};

/// A teardown action. May fail; failures are chained, never dropped.
pub type Teardown = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Identity, disposed flag and teardown list shared by every node kind.
pub struct NodeCore {
    id: NodeId,
    kind: NodeKind,
    disposed: AtomicBool,
    teardown: Mutex<SmallVec<[Teardown; 2]>>,
}

impl NodeCore {
    /// Create a live core with a fresh id.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            disposed: AtomicBool::new(false),
            teardown: Mutex::new(SmallVec::new()),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fail with [`ReactiveError::Disposed`] if the node has been disposed.
    pub fn ensure_live(&self) -> Result<(), ReactiveError> {
        if self.is_disposed() {
            Err(ReactiveError::Disposed(self.id))
        } else {
            Ok(())
        }
    }

    /// Add a teardown action.
    pub fn append<F>(&self, action: F) -> Result<(), ReactiveError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let mut actions = self.teardown.lock();
        self.ensure_live()?;
        actions.push(Box::new(action));
        Ok(())
    }

    /// Number of teardown actions still waiting to run.
    pub fn pending_teardown(&self) -> usize {
        self.teardown.lock().len()
    }

    /// Flip the disposed flag. Returns false if it was already set.
    pub(crate) fn begin_dispose(&self) -> bool {
        let _actions = self.teardown.lock();
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    /// Run every teardown action in reverse order, chaining failures.
    pub(crate) fn run_teardown(&self) -> Option<TeardownError> {
        let actions = std::mem::take(&mut *self.teardown.lock());

        let mut failure = None;
        for action in actions.into_iter().rev() {
            if let Err(error) = action() {
                failure = Some(TeardownError::chain(failure, error));
            }
        }
        failure
    }
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("disposed", &self.is_disposed())
            .field("pending_teardown", &self.pending_teardown())
            .finish()
    }
}
