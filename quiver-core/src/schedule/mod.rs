//! Deferred Scheduling
//!
//! Async-mode effects do not run when they are invalidated. Instead they
//! hand a task to a [`Scheduler`], which runs it on a later turn of some
//! cooperative loop. The graph itself never decides when that turn happens.
//!
//! - [`Coalescer`] sits between a node and its scheduler and guarantees at
//!   most one pending task per node.
//! - [`TurnQueue`] is a FIFO queue whose turns are driven by the host.
//! - [`TokioScheduler`] runs tasks one at a time on a tokio runtime.

mod coalescer;
mod queue;
mod tokio_scheduler;

pub use coalescer::{Coalescer, PendingRun};
pub use queue::TurnQueue;
pub use tokio_scheduler::TokioScheduler;

use crate::error::ReactiveError;

/// A deferred unit of work. Errors are reported to whoever drives the turn.
pub type Task = Box<dyn FnOnce() -> Result<(), ReactiveError> + Send>;

/// Runs tasks on a later turn of a cooperative loop.
///
/// Tasks deferred from one node must run in the order they were deferred.
pub trait Scheduler: Send + Sync {
    fn defer(&self, task: Task);
}
