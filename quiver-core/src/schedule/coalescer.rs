//! Invalidation Coalescing
//!
//! A [`Coalescer`] wraps a node's invalidate operation for async mode. The
//! first request in a turn schedules a task; later requests find the pending
//! handle and do nothing. When the task fires it clears the handle before
//! running, so invalidations raised by the run itself schedule a fresh one.
//! A task that is dropped without running clears the handle too.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::Scheduler;
use crate::error::ReactiveError;

/// Handle for a scheduled-but-not-yet-fired run.
#[derive(Debug, Default)]
pub struct PendingRun {
    canceled: AtomicBool,
}

impl PendingRun {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

type Slot = Arc<Mutex<Option<Arc<PendingRun>>>>;

/// Owned by a deferred task; releases the slot when the task fires or is
/// dropped unrun.
struct SlotRelease {
    slot: Slot,
    handle: Arc<PendingRun>,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut pending = self.slot.lock();
        if pending.as_ref().map_or(false, |p| Arc::ptr_eq(p, &self.handle)) {
            *pending = None;
        }
    }
}

/// Collapses repeated invalidation requests into one deferred run.
pub struct Coalescer {
    scheduler: Arc<dyn Scheduler>,
    pending: Slot,
}

impl Coalescer {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a run is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Schedule `run` unless a run is already pending.
    ///
    /// Returns whether a new task was scheduled.
    pub fn request<F>(&self, run: F) -> bool
    where
        F: FnOnce() -> Result<(), ReactiveError> + Send + 'static,
    {
        let handle = {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                trace!("invalidation coalesced into pending run");
                return false;
            }
            let handle = Arc::new(PendingRun::default());
            *pending = Some(Arc::clone(&handle));
            handle
        };

        let release = SlotRelease {
            slot: Arc::clone(&self.pending),
            handle,
        };
        self.scheduler.defer(Box::new(move || {
            if release.handle.is_canceled() {
                return Ok(());
            }
            drop(release);
            run()
        }));
        true
    }

    /// Cancel the pending run, if any. Returns whether one was canceled.
    pub fn cancel(&self, reason: &str) -> bool {
        let pending = self.pending.lock().take();
        match pending {
            Some(handle) => {
                handle.cancel();
                debug!(reason, "pending run canceled");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Task, TurnQueue};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicI32, Ordering};

    /// Drops every task without running it.
    struct Discard;

    impl Scheduler for Discard {
        fn defer(&self, _task: Task) {}
    }

    fn counting_run(count: &Arc<AtomicI32>) -> impl FnOnce() -> Result<(), ReactiveError> + Send + 'static {
        let count = count.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn requests_in_one_turn_collapse() {
        let queue = Arc::new(TurnQueue::new());
        let coalescer = Coalescer::new(queue.clone());
        let count = Arc::new(AtomicI32::new(0));

        assert!(coalescer.request(counting_run(&count)));
        assert!(!coalescer.request(counting_run(&count)));
        assert!(!coalescer.request(counting_run(&count)));
        assert_eq!(queue.len(), 1);

        queue.run_turn().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_pending());

        // A new turn can schedule again
        assert!(coalescer.request(counting_run(&count)));
        queue.run_turn().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn canceled_run_never_fires() {
        let queue = Arc::new(TurnQueue::new());
        let coalescer = Coalescer::new(queue.clone());
        let count = Arc::new(AtomicI32::new(0));

        coalescer.request(counting_run(&count));
        assert!(coalescer.cancel("test"));
        assert!(!coalescer.cancel("test"));

        queue.run_turn().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn request_after_cancel_schedules_fresh_run() {
        let queue = Arc::new(TurnQueue::new());
        let coalescer = Coalescer::new(queue.clone());
        let count = Arc::new(AtomicI32::new(0));

        coalescer.request(counting_run(&count));
        coalescer.cancel("test");
        assert!(coalescer.request(counting_run(&count)));

        queue.run_turn().unwrap();
        // The canceled task is a no-op and the fresh one runs
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_pending());
    }

    #[test]
    fn dropped_task_releases_the_slot() {
        let coalescer = Coalescer::new(Arc::new(Discard));
        let count = Arc::new(AtomicI32::new(0));

        assert!(coalescer.request(counting_run(&count)));
        assert!(!coalescer.is_pending());
        assert!(coalescer.request(counting_run(&count)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_run_releases_the_slot() {
        let queue = Arc::new(TurnQueue::new());
        let coalescer = Coalescer::new(queue.clone());

        coalescer.request(|| panic!("run failed"));
        assert!(panic::catch_unwind(AssertUnwindSafe(|| queue.run_turn())).is_err());

        assert!(!coalescer.is_pending());
        let count = Arc::new(AtomicI32::new(0));
        assert!(coalescer.request(counting_run(&count)));
        queue.run_turn().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
