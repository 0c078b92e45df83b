//! A plain thread-safe FIFO queue with a single condition variable.
//!
//! `Queue<T>` has no notion of shutdown by itself — [`Queue::wait_for_item_or_stop`]
//! is the composition point where a [`crate::scope::StopScope`] is layered on top,
//! which is exactly what [`crate::managed_queue::ManagedQueue`] uses internally.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::scope::StopScope;

/// An unbounded, thread-safe FIFO queue.
///
/// Ordering is FIFO across the whole queue; when multiple consumers are blocked on
/// the same queue, which one wakes up on a given push is left to the OS and is not
/// guaranteed to be fair.
pub struct Queue<T> {
    // `Arc`-wrapped so `wait_for_item_or_stop` can hand a clone to
    // `StopScope::register_cv` as the mutex `abort` locks before notifying `cv` —
    // see `Lockable`'s doc comment for why that pairing matters.
    items: Arc<Mutex<VecDeque<T>>>,
    cv: Arc<Condvar>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self { items: Arc::new(Mutex::new(VecDeque::new())), cv: Arc::new(Condvar::new()) }
    }

    /// Appends `value` and wakes one waiter.
    pub fn push(&self, value: T) {
        let mut guard = self.items.lock();
        guard.push_back(value);
        drop(guard);
        self.cv.notify_one();
    }

    /// As [`Queue::push`], but with the mutex already held by the caller, so several
    /// pushes can be batched into one critical section before a single notification.
    /// `guard` must be a guard obtained from this queue's own [`Queue::lock`] — the
    /// implementation trusts the caller on this rather than checking it at runtime.
    pub fn push_locked(&self, guard: &mut MutexGuard<'_, VecDeque<T>>, value: T) {
        guard.push_back(value);
    }

    /// Removes and returns the front item, or `None` if the queue is empty.
    pub fn try_extract(&self) -> Option<T> {
        let mut guard = self.items.lock();
        guard.pop_front()
    }

    /// As [`Queue::try_extract`], but with the mutex already held.
    pub fn try_extract_locked(&self, guard: &mut MutexGuard<'_, VecDeque<T>>) -> Option<T> {
        guard.pop_front()
    }

    pub fn size(&self) -> usize {
        self.items.lock().len()
    }

    pub fn empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Acquires the queue's mutex directly, for composing multi-step critical
    /// sections with [`Queue::push_locked`] / [`Queue::try_extract_locked`].
    pub fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock()
    }

    pub fn mutex(&self) -> &Mutex<VecDeque<T>> {
        self.items.as_ref()
    }

    pub fn cv(&self) -> &Condvar {
        self.cv.as_ref()
    }

    /// Blocks until either an item is available or `scope` is stopped, registering
    /// this queue's condvar with `scope` for the duration of the wait so that
    /// `abort` wakes it immediately. Returns the extracted item, or `None` once
    /// "stopped and empty" is observed under one held lock.
    ///
    /// Items always win: if a push and an abort race, this always drains the pushed
    /// item before returning `None`, because the check order below is "non-empty
    /// first".
    ///
    /// Registers `self.items` itself (not a private dummy mutex) as the condvar's
    /// paired lock, because that's the mutex this method actually holds across its
    /// "pop, then check stopped, then wait" critical section — `abort` must lock and
    /// release that same mutex before notifying, or a waiter that is between its
    /// `stopped()` check and its `cv.wait()` call (both performed while still holding
    /// `guard`) can miss the notification and block forever.
    pub fn wait_for_item_or_stop(&self, scope: &StopScope) -> Option<T>
    where
        T: Send + 'static,
    {
        let _cv_guard = scope.register_cv(self.cv.clone(), self.items.clone());
        let mut guard = self.items.lock();
        loop {
            if let Some(item) = guard.pop_front() {
                return Some(item);
            }
            if scope.stopped() {
                return None;
            }
            self.cv.wait(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_extract_is_fifo() {
        let q: Queue<i32> = Queue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_extract(), Some(1));
        assert_eq!(q.try_extract(), Some(2));
        assert_eq!(q.try_extract(), Some(3));
        assert_eq!(q.try_extract(), None);
    }

    #[test]
    fn size_and_empty() {
        let q: Queue<i32> = Queue::new();
        assert!(q.empty());
        assert_eq!(q.size(), 0);
        q.push(1);
        assert!(!q.empty());
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn wait_for_item_wakes_on_push() {
        let q = std::sync::Arc::new(Queue::<i32>::new());
        let scope = StopScope::new();
        let q2 = q.clone();
        let waiter = std::thread::spawn(move || q2.wait_for_item_or_stop(&scope));
        std::thread::sleep(std::time::Duration::from_millis(20));
        q.push(42);
        assert_eq!(waiter.join().unwrap(), Some(42));
    }

    #[test]
    fn wait_for_item_wakes_on_abort() {
        let q = std::sync::Arc::new(Queue::<i32>::new());
        let scope = StopScope::new();
        let q2 = q.clone();
        let scope2 = scope.clone();
        let waiter = std::thread::spawn(move || q2.wait_for_item_or_stop(&scope2));
        std::thread::sleep(std::time::Duration::from_millis(20));
        scope.abort();
        assert_eq!(waiter.join().unwrap(), None);
    }
}
