//! Binds a [`Queue`], a [`StopScope`] and exactly one [`Consumer`] into a single
//! owned unit that guarantees a post-stop drain: every item successfully pushed
//! before `abort` is delivered to the consumer before the managed queue is gone.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::MutexGuard;

use crate::error::{ManagedQueueError, TaskFailure};
use crate::queue::Queue;
use crate::scope::StopScope;
use crate::task::{self, TaskHandle, TaskStatus};

/// The capability a [`ManagedQueue`] requires of whatever processes its items.
///
/// Invoked from a single dedicated thread, so implementations need not be
/// internally thread-safe — the managed queue serializes every call.
pub trait Consumer<T> {
    fn consume(&mut self, item: T) -> TaskStatus;
}

impl<T, F: FnMut(T) -> TaskStatus> Consumer<T> for F {
    fn consume(&mut self, item: T) -> TaskStatus {
        self(item)
    }
}

/// Wraps a void-returning closure so it can be used as a [`Consumer`] too: the void
/// shape is implicit `Continue` unless it panics, same as a [`crate::task::run`]
/// worker.
pub struct VoidConsumer<F>(pub F);

impl<T, F: FnMut(T)> Consumer<T> for VoidConsumer<F> {
    fn consume(&mut self, item: T) -> TaskStatus {
        (self.0)(item);
        TaskStatus::Continue
    }
}

/// A cheap, clonable reference to a managed queue's queue and scope. This is what
/// [`ManagedQueue::loop_producer`] hands to producer-loop closures, and what
/// [`ManagedQueue`] keeps internally alongside the consumer's task handle.
#[derive(Clone)]
pub struct QueueHandle<T> {
    queue: Arc<Queue<T>>,
    scope: StopScope,
}

impl<T> QueueHandle<T> {
    /// Pushes `value` unless the scope has already been stopped.
    ///
    /// Returns `false` (rejecting the push, no side effect) once the scope is
    /// stopped; producers should treat a `false` return as their cue to return
    /// `TaskStatus::Halt`.
    pub fn push(&self, value: T) -> bool {
        if self.scope.stopped() {
            return false;
        }
        self.queue.push(value);
        true
    }

    pub fn try_extract(&self) -> Option<T> {
        self.queue.try_extract()
    }

    pub fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock()
    }

    pub fn scope(&self) -> &StopScope {
        &self.scope
    }
}

/// Owns a [`Queue`], a [`StopScope`] and exactly one [`Consumer`], and the consumer's
/// dedicated worker thread.
///
/// Dropping a `ManagedQueue` aborts its scope (if not already aborted), waits for the
/// consumer to finish draining, and then — if the consumer's worker panicked —
/// either routes the failure to a registered error sink or logs it.
pub struct ManagedQueue<T> {
    handle: QueueHandle<T>,
    consumer_handle: Option<TaskHandle<TaskStatus>>,
    error_sink: Option<Box<dyn Fn(TaskFailure) + Send + Sync>>,
}

impl<T: Send + 'static> ManagedQueue<T> {
    /// Adopts `scope` and spawns `consumer`'s dedicated worker thread.
    pub fn new<C>(scope: StopScope, consumer: C) -> Self
    where
        C: Consumer<T> + Send + 'static,
    {
        Self::build(scope, consumer, None)
    }

    /// As [`ManagedQueue::new`], but routes a consumer panic to `sink` instead of
    /// logging it, when the managed queue is dropped.
    pub fn new_with_error_sink<C, S>(scope: StopScope, consumer: C, sink: S) -> Self
    where
        C: Consumer<T> + Send + 'static,
        S: Fn(TaskFailure) + Send + Sync + 'static,
    {
        Self::build(scope, consumer, Some(Box::new(sink)))
    }

    fn build<C>(scope: StopScope, consumer: C, error_sink: Option<Box<dyn Fn(TaskFailure) + Send + Sync>>) -> Self
    where
        C: Consumer<T> + Send + 'static,
    {
        let queue = Arc::new(Queue::new());
        let handle = QueueHandle { queue, scope: scope.clone() };
        let loop_handle = handle.clone();

        // `run_draining`, not `run`: the generic loop's own pre-invocation stop check
        // would be able to exit between two iterations — or before the very first one
        // — the moment the scope is aborted, regardless of whether the queue still
        // has items sitting in it. This body already decides for itself, through
        // `wait_for_item_or_stop`'s own "pop before stop" ordering, whether there is
        // more to drain, so the outer loop must call it unconditionally and trust its
        // `Halt` return to be the only way out.
        let consumer_handle =
            task::run_draining(scope, move |scope| match loop_handle.queue.wait_for_item_or_stop(scope) {
                Some(item) => consumer.consume(item),
                None => TaskStatus::Halt,
            });

        Self { handle, consumer_handle: Some(consumer_handle), error_sink }
    }

    /// Pushes `value` unless the scope has already been stopped. See
    /// [`QueueHandle::push`].
    pub fn push(&self, value: T) -> bool {
        self.handle.push(value)
    }

    pub fn try_extract(&self) -> Option<T> {
        self.handle.try_extract()
    }

    pub fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.handle.lock()
    }

    pub fn scope(&self) -> &StopScope {
        self.handle.scope()
    }

    /// Spawns a producer loop on this managed queue's scope. `f` receives a
    /// [`QueueHandle`] so it can push; a `false` return from `push` should be
    /// treated by `f` as a cue to return `TaskStatus::Halt`.
    pub fn loop_producer<F, R>(&self, f: F) -> TaskHandle<TaskStatus>
    where
        F: FnMut(&QueueHandle<T>) -> R + Send + 'static,
        R: crate::task::IntoTaskStatus,
    {
        self.spawn_producer(None, f)
    }

    /// As [`ManagedQueue::loop_producer`], paced by `heartbeat`.
    pub fn loop_producer_with_heartbeat<F, R>(&self, heartbeat: Duration, f: F) -> TaskHandle<TaskStatus>
    where
        F: FnMut(&QueueHandle<T>) -> R + Send + 'static,
        R: crate::task::IntoTaskStatus,
    {
        self.spawn_producer(Some(heartbeat), f)
    }

    fn spawn_producer<F, R>(&self, heartbeat: Option<Duration>, f: F) -> TaskHandle<TaskStatus>
    where
        F: FnMut(&QueueHandle<T>) -> R + Send + 'static,
        R: crate::task::IntoTaskStatus,
    {
        let producer_handle = self.handle.clone();
        let scope = self.handle.scope.clone();
        let body = move |_scope: &StopScope| f(&producer_handle);
        match heartbeat {
            Some(heartbeat) => task::run_with_heartbeat(scope, heartbeat, body),
            None => task::run(scope, body),
        }
    }
}

impl<T> Drop for ManagedQueue<T> {
    fn drop(&mut self) {
        self.handle.scope.abort();
        let Some(consumer_handle) = self.consumer_handle.take() else { return };
        match consumer_handle.join() {
            Ok(_) => {
                debug_assert!(self.handle.queue.empty(), "managed queue consumer returned without draining");
            }
            Err(failure) => {
                if let Some(sink) = self.error_sink.take() {
                    sink(failure);
                } else {
                    let error = ManagedQueueError::from(failure);
                    tracing::error!(%error, "managed queue consumer failed during shutdown");
                }
            }
        }
    }
}
