//! Scheduler backed by a tokio runtime.

use std::panic::{self, AssertUnwindSafe};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{Scheduler, Task};

/// Runs deferred tasks on a tokio runtime, one at a time.
///
/// Tasks are fed through a channel to a single consumer task, so they run in
/// the order they were deferred and never overlap, even on a multi-thread
/// runtime. Failures and panics are logged; there is no caller left to
/// return them to.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    sender: mpsc::UnboundedSender<Task>,
}

impl TokioScheduler {
    /// Spawn the consumer task onto `handle`.
    pub fn new(handle: &Handle) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();

        handle.spawn(async move {
            while let Some(task) = receiver.recv().await {
                match panic::catch_unwind(AssertUnwindSafe(task)) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(%err, "deferred invalidation failed"),
                    Err(_) => error!("deferred invalidation panicked"),
                }
            }
            debug!("tokio scheduler closed");
        });

        Self { sender }
    }

    /// Use the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(&Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn defer(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("tokio runtime shut down, deferred task dropped");
        }
    }
}
