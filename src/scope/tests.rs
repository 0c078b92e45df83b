use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[test]
fn abort_is_idempotent() {
    let scope = StopScope::new();
    assert!(!scope.stopped());
    scope.abort();
    assert!(scope.stopped());
    scope.abort();
    scope.abort();
    assert!(scope.stopped());
}

#[test]
fn wait_returns_immediately_after_abort() {
    let scope = StopScope::new();
    scope.abort();
    scope.wait();
    scope.on_stop().wait();
}

#[test]
fn wait_blocks_until_abort() {
    let scope = StopScope::new();
    let scope2 = scope.clone();
    let woke = Arc::new(AtomicUsize::new(0));
    let woke2 = woke.clone();
    let waiter = std::thread::spawn(move || {
        scope2.wait();
        woke2.store(1, Ordering::SeqCst);
    });
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(woke.load(Ordering::SeqCst), 0);
    scope.abort();
    waiter.join().unwrap();
    assert_eq!(woke.load(Ordering::SeqCst), 1);
}

#[test]
fn registered_cv_is_woken_on_abort() {
    let scope = StopScope::new();
    let cv = Arc::new(Condvar::new());
    let mutex = Arc::new(Mutex::new(()));
    let woke = Arc::new(AtomicUsize::new(0));

    let scope2 = scope.clone();
    let cv2 = cv.clone();
    let mutex2 = mutex.clone();
    let woke2 = woke.clone();
    let waiter = std::thread::spawn(move || {
        let _guard = scope2.register_cv(cv2.clone(), mutex2.clone());
        let mut locked = mutex2.lock();
        // Long wait: only an abort notification or a spurious wakeup moves this
        // along before the timeout.
        cv2.wait_for(&mut locked, Duration::from_secs(30));
        woke2.store(1, Ordering::SeqCst);
    });
    std::thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    scope.abort();
    waiter.join().unwrap();
    assert_eq!(woke.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn cv_reference_count_returns_to_zero() {
    let scope = StopScope::new();
    let cv = Arc::new(Condvar::new());
    let mutex = Arc::new(Mutex::new(()));
    let key = Arc::as_ptr(&cv) as usize;
    {
        let _g1 = scope.register_cv(cv.clone(), mutex.clone());
        {
            let _g2 = scope.register_cv(cv.clone(), mutex.clone());
            assert_eq!(scope.inner.cv_refs.lock().get(&key).unwrap().count, 2);
        }
        assert_eq!(scope.inner.cv_refs.lock().get(&key).unwrap().count, 1);
    }
    assert!(scope.inner.cv_refs.lock().get(&key).is_none());
}

#[test]
fn zero_duration_timeout_aborts_immediately() {
    let scope = StopScope::new();
    let handle = scope.set_timeout(Duration::from_secs(0));
    assert!(handle.join().unwrap());
    assert!(scope.stopped());
}

#[test]
fn timeout_races_external_abort() {
    let scope = StopScope::new();
    let handle = scope.set_timeout(Duration::from_millis(50));
    std::thread::sleep(Duration::from_millis(10));
    scope.abort();
    assert!(!handle.join().unwrap());
    assert!(scope.stopped());
}

#[test]
fn two_successive_aborts_then_timeout_returns_false_immediately() {
    let scope = StopScope::new();
    scope.abort();
    scope.abort();
    let start = Instant::now();
    let handle = scope.set_timeout(Duration::from_secs(10));
    assert!(!handle.join().unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));
}
