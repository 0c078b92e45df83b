//! A cancellable context shared by a group of cooperating tasks.
//!
//! `StopScope` is a value-typed handle over shared state (an `Arc` under the hood):
//! cloning it is cheap and every clone observes the same `stopped` flag. Calling
//! [`StopScope::abort`] on any clone is visible to all the others and to anything
//! waiting on [`StopScope::wait`] or on a condvar registered via
//! [`StopScope::register_cv`].
//!
//! There is exactly one state transition: `RUNNING` → `STOPPED`, via `abort`. It
//! never reverses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::task::{self, TaskHandle};

/// Anything a condvar registered via [`StopScope::register_cv`] is waited under.
///
/// `abort` briefly locks and releases this before notifying the paired condvar, which
/// is what closes the gap between a waiter's "check the predicate" step and its
/// "park on the condvar" step: as long as both the waiter and `abort` agree on this
/// same lock, `abort` cannot complete its notification until the waiter either has
/// not yet reached its `cv.wait()` call (in which case it still holds the lock, and
/// will see `stopped() == true` on its very next predicate check) or is already
/// parked on the condvar (in which case the notification reaches it). Implemented for
/// `parking_lot::Mutex<T>` so callers can register with whatever mutex already guards
/// their own waited-on state.
pub trait Lockable: Send + Sync {
    /// Acquires and immediately releases the lock. Never observes or mutates what it
    /// guards — this exists purely to synchronize with a waiter's critical section.
    fn lock_unlock(&self);
}

impl<T: Send> Lockable for Mutex<T> {
    fn lock_unlock(&self) {
        drop(self.lock());
    }
}

struct CvEntry {
    cv: Arc<Condvar>,
    mutex: Arc<dyn Lockable>,
    count: usize,
}

struct Inner {
    stopped: RwLock<bool>,
    on_stop_fired: Mutex<bool>,
    on_stop_cv: Condvar,
    cv_refs: Mutex<HashMap<usize, CvEntry>>,
}

/// A cancellable context shared by a group of tasks.
///
/// Clone it to hand it to every task in the group; `abort` on any clone stops them
/// all.
#[derive(Clone)]
pub struct StopScope {
    inner: Arc<Inner>,
}

impl Default for StopScope {
    fn default() -> Self {
        Self::new()
    }
}

impl StopScope {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopped: RwLock::new(false),
                on_stop_fired: Mutex::new(false),
                on_stop_cv: Condvar::new(),
                cv_refs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Wait-free after `abort` has run once.
    pub fn stopped(&self) -> bool {
        *self.inner.stopped.read()
    }

    /// Idempotent: the second and later calls are no-ops. Never blocks on user code.
    pub fn abort(&self) {
        {
            let mut stopped = self.inner.stopped.write();
            if *stopped {
                return;
            }
            *stopped = true;
        }

        {
            let mut fired = self.inner.on_stop_fired.lock();
            *fired = true;
        }
        self.inner.on_stop_cv.notify_all();

        {
            let refs = self.inner.cv_refs.lock();
            for entry in refs.values() {
                if entry.count > 0 {
                    // Lock and release the waiter's own mutex before notifying: this
                    // is what guarantees the waiter is either still on the near side
                    // of its `cv.wait()` call (and will observe `stopped()` on its
                    // next check) or already parked on `entry.cv` (and receives this
                    // notification). Without it, a waiter that read `stopped() ==
                    // false` and hasn't yet called `cv.wait()` can miss this
                    // notification entirely and block forever.
                    entry.mutex.lock_unlock();
                    entry.cv.notify_all();
                }
            }
        }

        tracing::debug!("stop scope aborted");
    }

    /// Blocks until `abort` has run. Returns immediately if it already has.
    pub fn wait(&self) {
        self.on_stop().wait();
    }

    /// A clonable handle to the scope's one-shot stop event.
    pub fn on_stop(&self) -> OnStop {
        OnStop { inner: self.inner.clone() }
    }

    /// Spawns a worker that aborts the scope after `duration`, unless some other
    /// participant aborts it first.
    ///
    /// Resolves to `true` if the timeout fired the abort, `false` if it was raced by
    /// an external `abort`.
    pub fn set_timeout(&self, duration: Duration) -> TaskHandle<bool> {
        self.set_timeout_at(Instant::now() + duration)
    }

    /// As [`StopScope::set_timeout`], but against an absolute deadline.
    pub fn set_timeout_at(&self, deadline: Instant) -> TaskHandle<bool> {
        let scope = self.clone();
        task::spawn_raw(move || {
            let cv = Arc::new(Condvar::new());
            let lock = Arc::new(Mutex::new(()));
            let _guard = scope.register_cv(cv.clone(), lock.clone());
            let mut locked = lock.lock();
            loop {
                if scope.stopped() {
                    return false;
                }
                let now = Instant::now();
                if now >= deadline {
                    scope.abort();
                    return true;
                }
                let result = cv.wait_for(&mut locked, deadline - now);
                if result.timed_out() {
                    if scope.stopped() {
                        return false;
                    }
                    scope.abort();
                    return true;
                }
                // Spurious wakeup, or the real abort notification: loop back and
                // re-check `stopped()` rather than trusting the wakeup reason.
            }
        })
    }

    /// Registers `cv` — waited under `mutex` — to be notified when this scope is
    /// aborted, for as long as the returned guard lives. `mutex` must be the same
    /// mutex the waiter holds while checking its predicate and calling
    /// `cv.wait(&mut guard)`; `abort` locks and releases it before notifying, closing
    /// the race where a waiter checks `stopped()`, sees `false`, and is pre-empted
    /// before it can call `cv.wait()` (see [`Lockable`]).
    ///
    /// Safe to call on an already-stopped scope: the guard's condvar is woken on the
    /// caller's very next `wait`, because `abort` has already broadcast and `cv.wait`
    /// on a stopped scope should always be paired with a `stopped()` check (see
    /// [`crate::queue::Queue::wait_for_item_or_stop`] for the pattern).
    pub fn register_cv<M>(&self, cv: Arc<Condvar>, mutex: Arc<M>) -> CvReference
    where
        M: Lockable + 'static,
    {
        let key = Arc::as_ptr(&cv) as usize;
        {
            let mut refs = self.inner.cv_refs.lock();
            refs.entry(key).or_insert_with(|| CvEntry { cv, mutex, count: 0 }).count += 1;
        }
        CvReference { inner: self.inner.clone(), key }
    }
}

/// A clonable handle to a `StopScope`'s one-shot stop event.
#[derive(Clone)]
pub struct OnStop {
    inner: Arc<Inner>,
}

impl OnStop {
    /// Blocks until the scope this event belongs to is aborted. Returns immediately
    /// if it already has been.
    pub fn wait(&self) {
        let mut fired = self.inner.on_stop_fired.lock();
        while !*fired {
            self.inner.on_stop_cv.wait(&mut fired);
        }
    }
}

/// RAII guard proving a condvar is registered with a [`StopScope`] for
/// notify-on-abort. Dropping the guard deregisters the condvar. Movable, not
/// `Clone` — the refcount it represents is exactly one registration.
pub struct CvReference {
    inner: Arc<Inner>,
    key: usize,
}

impl Drop for CvReference {
    fn drop(&mut self) {
        let mut refs = self.inner.cv_refs.lock();
        if let std::collections::hash_map::Entry::Occupied(mut entry) = refs.entry(self.key) {
            let count = &mut entry.get_mut().count;
            debug_assert!(*count > 0, "CvReference dropped more times than it was registered");
            *count = count.saturating_sub(1);
            if *count == 0 {
                entry.remove();
            }
        } else {
            debug_assert!(false, "CvReference dropped for a condvar that was never registered");
        }
    }
}

#[cfg(test)]
mod tests;
