//! Host-driven turn queue.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tracing::warn;

use super::{Scheduler, Task};
use crate::error::ReactiveError;

/// A FIFO task queue whose turns are driven explicitly by the host.
///
/// A turn runs exactly the tasks that were queued when it started; tasks
/// deferred while it runs wait for the next turn.
#[derive(Default)]
pub struct TurnQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for a turn.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Run one turn. Returns how many tasks ran.
    ///
    /// Every task in the turn runs even if an earlier one fails; the first
    /// failure is returned and later ones are logged. Tasks are taken off
    /// the queue one at a time, so if one panics the rest stay queued for
    /// the next turn.
    pub fn run_turn(&self) -> Result<usize, ReactiveError> {
        let queued = self.tasks.lock().len();

        let mut ran = 0;
        let mut first = None;
        for _ in 0..queued {
            let next = self.tasks.lock().pop_front();
            let Some(task) = next else {
                break;
            };
            ran += 1;
            if let Err(err) = task() {
                if first.is_none() {
                    first = Some(err);
                } else {
                    warn!(%err, "deferred task failed after an earlier failure");
                }
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(ran),
        }
    }

    /// Run turns until the queue is empty. Returns how many tasks ran.
    ///
    /// Stops at the first turn that reports a failure. Does not return if
    /// every turn keeps deferring new work.
    pub fn run_until_idle(&self) -> Result<usize, ReactiveError> {
        let mut total = 0;
        while !self.is_empty() {
            total += self.run_turn()?;
        }
        Ok(total)
    }
}

impl Scheduler for TurnQueue {
    fn defer(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for TurnQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnQueue").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    #[test]
    fn tasks_run_in_fifo_order() {
        let queue = TurnQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for step in 0..4 {
            let order = order.clone();
            queue.defer(Box::new(move || {
                order.lock().push(step);
                Ok(())
            }));
        }

        assert_eq!(queue.run_turn().unwrap(), 4);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn tasks_deferred_during_a_turn_wait_for_the_next() {
        let queue = Arc::new(TurnQueue::new());
        let inner = queue.clone();

        queue.defer(Box::new(move || {
            inner.defer(Box::new(|| Ok(())));
            Ok(())
        }));

        assert_eq!(queue.run_turn().unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_until_idle().unwrap(), 1);
    }

    #[test]
    fn failing_task_does_not_stop_the_turn() {
        let queue = TurnQueue::new();
        let ran = Arc::new(Mutex::new(0));

        queue.defer(Box::new(|| Err(ReactiveError::Disposed(NodeId::from(1)))));
        let counter = ran.clone();
        queue.defer(Box::new(move || {
            *counter.lock() += 1;
            Ok(())
        }));

        assert!(matches!(queue.run_turn(), Err(ReactiveError::Disposed(_))));
        assert_eq!(*ran.lock(), 1);
    }

    #[test]
    fn panicking_task_leaves_the_rest_queued() {
        let queue = TurnQueue::new();
        let ran = Arc::new(Mutex::new(0));

        queue.defer(Box::new(|| -> Result<(), ReactiveError> { panic!("task failed") }));
        for _ in 0..2 {
            let counter = ran.clone();
            queue.defer(Box::new(move || {
                *counter.lock() += 1;
                Ok(())
            }));
        }

        assert!(panic::catch_unwind(AssertUnwindSafe(|| queue.run_turn())).is_err());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.run_turn().unwrap(), 2);
        assert_eq!(*ran.lock(), 2);
    }
}
