//! Drives a worker function repeatedly under a [`StopScope`], honoring a
//! three-valued return protocol and an optional heartbeat between invocations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::TaskFailure;
use crate::scope::StopScope;

/// The return protocol a task-loop worker function uses to tell its loop, and the
/// scope it runs under, what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Run the worker function again.
    Continue,
    /// End this loop. The scope is left untouched.
    Halt,
    /// End this loop and abort the scope.
    Abort,
}

/// Converts a worker function's return value into a [`TaskStatus`].
///
/// Implemented for `TaskStatus` itself and for `()`, so a worker can return either
/// shape: the void shape is treated as an implicit `Continue` unless it panics.
pub trait IntoTaskStatus {
    fn into_task_status(self) -> TaskStatus;
}

impl IntoTaskStatus for TaskStatus {
    fn into_task_status(self) -> TaskStatus {
        self
    }
}

impl IntoTaskStatus for () {
    fn into_task_status(self) -> TaskStatus {
        TaskStatus::Continue
    }
}

/// A joinable handle to a worker spawned by [`run`], [`run_with_heartbeat`], or
/// [`StopScope::set_timeout`](crate::scope::StopScope::set_timeout).
///
/// Dropping the handle without joining does not kill the worker thread — it keeps
/// running to completion — but its result (or captured panic) can then no longer be
/// observed.
pub struct TaskHandle<T> {
    thread: Option<std::thread::JoinHandle<Result<T, TaskFailure>>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the worker finishes, returning its result or the panic it
    /// captured.
    pub fn join(mut self) -> Result<T, TaskFailure> {
        let thread = self.thread.take().expect("TaskHandle joined more than once");
        thread.join().unwrap_or_else(|payload| Err(TaskFailure::new(payload)))
    }
}

pub(crate) fn spawn_raw<T, F>(f: F) -> TaskHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let thread = std::thread::Builder::new()
        .name("workqueue-task".into())
        .spawn(move || std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(TaskFailure::new))
        .expect("failed to spawn worker thread");
    TaskHandle { thread: Some(thread) }
}

/// Aborts the scope it holds a reference to if the thread is currently unwinding.
/// Used so a worker panic both escapes (to be captured by the enclosing
/// `catch_unwind`) and aborts the scope, without the loop having to catch and
/// re-raise the panic itself.
struct AbortOnUnwind<'a>(&'a StopScope);

impl Drop for AbortOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

/// Spawns a worker that repeatedly invokes `f` under `scope` until it returns `Halt`
/// or `Abort`, the scope is externally stopped, or `f` panics.
pub fn run<F, R>(scope: StopScope, f: F) -> TaskHandle<TaskStatus>
where
    F: FnMut(&StopScope) -> R + Send + 'static,
    R: IntoTaskStatus,
{
    run_loop(scope, None, PrecheckStop::Yes, f)
}

/// As [`run`], but paces successive invocations by `heartbeat`: after a `Continue`,
/// the loop sleeps for `heartbeat`, measured from the end of one call to the start of
/// the next, interruptible by `scope.abort()`.
pub fn run_with_heartbeat<F, R>(scope: StopScope, heartbeat: Duration, f: F) -> TaskHandle<TaskStatus>
where
    F: FnMut(&StopScope) -> R + Send + 'static,
    R: IntoTaskStatus,
{
    run_loop(scope, Some(heartbeat), PrecheckStop::Yes, f)
}

/// As [`run`], but without the generic algorithm's step-1 pre-invocation stop check.
///
/// [`run`]'s per-iteration algorithm treats "stopped" as a reason to stop calling `f`
/// at all, which is correct for an ordinary worker but wrong for a body that must keep
/// draining after stop: a `ManagedQueue`'s consumer loop body (built on
/// [`crate::queue::Queue::wait_for_item_or_stop`]) already decides for itself, on its
/// own, synchronized terms, whether there is more to drain. Pre-empting that decision
/// here — by returning `Continue` the moment `stopped()` is observed true, before `f`
/// even runs once more — can abandon items still sitting in the queue. This variant
/// instead calls `f` unconditionally every iteration and relies entirely on `f`'s own
/// return value (`Halt`/`Abort`) to end the loop.
pub(crate) fn run_draining<F, R>(scope: StopScope, f: F) -> TaskHandle<TaskStatus>
where
    F: FnMut(&StopScope) -> R + Send + 'static,
    R: IntoTaskStatus,
{
    run_loop(scope, None, PrecheckStop::No, f)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PrecheckStop {
    Yes,
    No,
}

fn run_loop<F, R>(scope: StopScope, heartbeat: Option<Duration>, precheck: PrecheckStop, f: F) -> TaskHandle<TaskStatus>
where
    F: FnMut(&StopScope) -> R + Send + 'static,
    R: IntoTaskStatus,
{
    let loop_scope = scope;
    spawn_raw(move || {
        let heartbeat_cv = heartbeat.map(|_| Arc::new(Condvar::new()));
        let hb_mutex = heartbeat.map(|_| Arc::new(Mutex::new(())));
        let _hb_guard = match (heartbeat_cv.as_ref(), hb_mutex.as_ref()) {
            (Some(cv), Some(mutex)) => Some(loop_scope.register_cv(cv.clone(), mutex.clone())),
            _ => None,
        };

        loop {
            if precheck == PrecheckStop::Yes && loop_scope.stopped() {
                return TaskStatus::Continue;
            }

            let status = {
                let _abort_on_unwind = AbortOnUnwind(&loop_scope);
                f(&loop_scope).into_task_status()
            };

            match status {
                TaskStatus::Continue => {}
                TaskStatus::Halt => return TaskStatus::Halt,
                TaskStatus::Abort => {
                    loop_scope.abort();
                    return TaskStatus::Abort;
                }
            }

            if let (Some(heartbeat), Some(cv), Some(mutex)) = (heartbeat, heartbeat_cv.as_ref(), hb_mutex.as_ref()) {
                wait_heartbeat(&loop_scope, cv, mutex.as_ref(), heartbeat);
            }
        }
    })
}

fn wait_heartbeat(scope: &StopScope, cv: &Condvar, mutex: &Mutex<()>, heartbeat: Duration) {
    let deadline = Instant::now() + heartbeat;
    let mut locked = mutex.lock();
    loop {
        if scope.stopped() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let result = cv.wait_for(&mut locked, deadline - now);
        if result.timed_out() {
            return;
        }
        // Spurious wakeup or the real abort notification: loop back and re-check.
    }
}
