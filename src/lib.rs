//! A bounded-lifetime, multi-producer / multi-consumer in-process queue with
//! coordinated shutdown, and a small task-loop runner to drive workers against it.
//!
//! Four pieces, leaves first:
//!
//! * [`StopScope`] — a cancellable context shared by a group of tasks. One thread
//!   calls [`StopScope::abort`], every other participant observes it.
//! * [`Queue`] — a plain thread-safe FIFO with a single condvar.
//! * [`run`] / [`run_with_heartbeat`] — a driver that repeatedly invokes a worker
//!   function under a `StopScope`, honoring a three-valued return protocol and an
//!   optional heartbeat.
//! * [`ManagedQueue`] — binds a `Queue`, a `StopScope` and exactly one [`Consumer`],
//!   and guarantees that everything pushed before shutdown is drained before the
//!   managed queue is gone.
//!
//! Nothing here is async. Every loop this crate spawns owns one OS thread for its
//! lifetime (see the crate's design notes for why).
//!
//! Out of scope, by design: persistence, cross-process transport, fairness or
//! priority between consumers, bounded capacity, and anything about what `T` means.
//! Those are a collaborator's problem, built on top of the four pieces above.

mod error;
mod queue;
mod scope;
mod task;

pub mod managed_queue;

#[cfg(test)]
pub(crate) mod testonly;

#[cfg(test)]
mod scenarios;

pub use error::{ManagedQueueError, TaskFailure};
pub use managed_queue::{Consumer, ManagedQueue, QueueHandle, VoidConsumer};
pub use queue::Queue;
pub use scope::{CvReference, Lockable, OnStop, StopScope};
pub use task::{run, run_with_heartbeat, IntoTaskStatus, TaskHandle, TaskStatus};

/// Re-exported so callers can construct condvars to pass to
/// [`StopScope::register_cv`] without taking a direct `parking_lot` dependency.
pub use parking_lot::{Condvar, Mutex, MutexGuard};
