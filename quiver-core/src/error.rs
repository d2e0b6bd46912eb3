//! Error types for the reactive graph.
//!
//! Every fallible graph operation returns [`ReactiveError`]. Disposal
//! failures carry a [`TeardownError`], a linked chain holding every error
//! raised while a node (and the nodes depending on it) were torn down.

use std::error::Error as StdError;

use thiserror::Error;

use crate::graph::{NodeId, NodeKind};

/// Boxed error returned by user-supplied teardown actions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by the reactive graph.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// Binding `dependent` to `dependency` would close a cycle, because
    /// `dependency` already (transitively) depends on `dependent`.
    ///
    /// The edge is never created.
    #[error("binding {dependent} to {dependency} would create a dependency cycle")]
    CircularDependency {
        dependent: NodeId,
        dependency: NodeId,
    },

    /// The edge would make a state cell a dependent or an effect a
    /// dependency. State cells only get read and effects only read.
    #[error("{dependent_kind} {dependent} cannot depend on {dependency_kind} {dependency}")]
    InvalidEdge {
        dependent: NodeId,
        dependent_kind: NodeKind,
        dependency: NodeId,
        dependency_kind: NodeKind,
    },

    /// The node was used after it had been disposed.
    #[error("node {0} used after dispose")]
    Disposed(NodeId),

    /// One or more teardown actions failed while disposing `node`.
    #[error("dispose of {node} failed: {source}")]
    Teardown {
        node: NodeId,
        #[source]
        source: TeardownError,
    },
}

/// A chain of errors raised during a single dispose.
///
/// Teardown actions run in reverse registration order and all of them run,
/// even after one fails. Each failure wraps the chain collected so far as
/// its suppressed error, so the outermost link is the most recent failure
/// and [`source`](StdError::source) walks back to the first one.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TeardownError {
    error: BoxError,
    #[source]
    suppressed: Option<Box<TeardownError>>,
}

impl TeardownError {
    /// Link `error` on top of the chain collected so far.
    pub(crate) fn chain(suppressed: Option<TeardownError>, error: BoxError) -> Self {
        Self {
            error,
            suppressed: suppressed.map(Box::new),
        }
    }

    /// The error raised by this link.
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }

    /// The earlier failure this one suppressed, if any.
    pub fn suppressed(&self) -> Option<&TeardownError> {
        self.suppressed.as_deref()
    }

    /// Every error in the chain, most recent first.
    pub fn causes(&self) -> Vec<&(dyn StdError + Send + Sync + 'static)> {
        let mut causes = Vec::new();
        let mut link = Some(self);
        while let Some(current) = link {
            causes.push(current.error());
            link = current.suppressed();
        }
        causes
    }

    /// Number of errors in the chain.
    pub fn len(&self) -> usize {
        1 + self.suppressed.as_ref().map_or(0, |s| s.len())
    }

    /// Always false: a chain holds at least one error.
    pub fn is_empty(&self) -> bool {
        false
    }
}
