//! Quiver Core
//!
//! This crate provides a fine-grained reactive dependency graph. It
//! implements:
//!
//! - Reactive nodes (state cells, computeds, effects)
//! - Automatic dependency tracking with cycle detection
//! - Synchronous invalidation propagation
//! - Coalesced, cancelable deferred effect runs
//! - Explicit, cascading disposal
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node identity and the dependency registry
//! - `reactive`: State, Computed, Effect and the runtime that wires them
//! - `schedule`: Deferred-run coalescing and schedulers
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use quiver_core::{Computed, Effect, State};
//!
//! let count = State::new(1);
//!
//! let doubled = {
//!     let count = count.clone();
//!     Computed::new(move || count.get() * 2).unwrap()
//! };
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let _effect = {
//!     let (doubled, log) = (doubled.clone(), log.clone());
//!     Effect::sync(move || log.lock().unwrap().push(doubled.get())).unwrap()
//! };
//!
//! count.set(5).unwrap();
//! assert_eq!(*log.lock().unwrap(), vec![2, 10]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;
pub mod schedule;

pub use error::{BoxError, ReactiveError, TeardownError};
pub use graph::{GraphSnapshot, NodeId, NodeKind};
pub use reactive::{untrack, Cleanup, Computed, Effect, EffectMode, Runtime, State};
pub use schedule::{Scheduler, TokioScheduler, TurnQueue};
