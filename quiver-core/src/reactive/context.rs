//! Reactive Context
//!
//! The reactive context tracks which node is currently observing. This
//! enables automatic dependency tracking: when a state cell or computed is
//! read, the runtime binds the current observer to it.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Entering a context pushes a frame
//! and returns a guard; dropping the guard pops it, so the previous observer
//! is restored even if the body panics.
//!
//! A frame is either `Empty` (reads are untracked) or a `Subscription` for a
//! dependent. A frame also holds the first tracking error raised inside it,
//! since reads themselves are infallible and the owning node reports the
//! error once its body returns.

use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::warn;

use crate::error::ReactiveError;
use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Who is currently reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observer {
    /// Reads are untracked.
    Empty,
    /// Reads bind the given dependent.
    Subscription(NodeId),
}

#[derive(Debug)]
struct Frame {
    observer: Observer,
    error: Option<ReactiveError>,
}

/// Guard that restores the previous observer when dropped.
///
/// Guards must be dropped on the thread that created them.
pub struct ReactiveContext {
    observer: Observer,
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl ReactiveContext {
    /// Make `observer` current until the returned guard is dropped.
    pub fn enter(observer: Observer) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Frame {
                observer,
                error: None,
            });
            stack.len()
        });

        Self {
            observer,
            depth,
            _not_send: PhantomData,
        }
    }

    /// Enter a context in which reads bind `dependent`.
    pub fn subscribe(dependent: NodeId) -> Self {
        Self::enter(Observer::Subscription(dependent))
    }

    /// Enter a context in which reads are untracked.
    pub fn untracked() -> Self {
        Self::enter(Observer::Empty)
    }

    /// The current observer. `Empty` outside of any context.
    pub fn current() -> Observer {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map_or(Observer::Empty, |frame| frame.observer)
        })
    }

    /// The dependent that reads currently bind, if any.
    pub fn current_dependent() -> Option<NodeId> {
        match Self::current() {
            Observer::Subscription(dependent) => Some(dependent),
            Observer::Empty => None,
        }
    }

    /// Whether reads are currently tracked.
    pub fn is_tracking() -> bool {
        Self::current_dependent().is_some()
    }

    /// Record a tracking failure on the innermost frame.
    ///
    /// Only the first error per frame is kept; later ones are logged.
    pub(crate) fn record_error(err: ReactiveError) {
        let dropped = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(frame) if frame.error.is_none() => {
                    frame.error = Some(err);
                    None
                }
                _ => Some(err),
            }
        });

        if let Some(err) = dropped {
            warn!(%err, "tracking error suppressed by an earlier failure");
        }
    }

    /// The observer this guard installed.
    pub fn observer(&self) -> Observer {
        self.observer
    }

    /// Leave the context, returning the first tracking error raised in it.
    pub fn finish(self) -> Result<(), ReactiveError> {
        let error = CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .get_mut(self.depth - 1)
                .and_then(|frame| frame.error.take())
        });
        drop(self);

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "ReactiveContext dropped out of order"
            );
            let popped = stack.pop();

            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.observer, self.observer,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.observer, frame.observer
                );
                if let Some(err) = frame.error {
                    warn!(%err, "tracking error discarded with its context");
                }
            }
        });
    }
}

/// Run `f` with tracking disabled.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}
