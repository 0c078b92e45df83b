//! End-to-end scenarios exercising the four core pieces together, composed the way a
//! collaborator outside this crate would: directly against [`Queue`] and
//! [`StopScope`], since [`ManagedQueue`](crate::managed_queue::ManagedQueue) is
//! deliberately restricted to exactly one consumer.

use crate::queue::Queue;
use crate::scope::StopScope;
use crate::task::{self, TaskStatus};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn multiple_consumers_partition_the_pushed_set() {
    crate::testonly::init_test_logger();
    let queue = Arc::new(Queue::<i32>::new());
    let scope = StopScope::new();

    for i in 0..10 {
        queue.push(i);
    }

    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));

    let spawn_consumer = |seen: Arc<Mutex<Vec<i32>>>, queue: Arc<Queue<i32>>, scope: StopScope| {
        task::run(scope, move |scope| match queue.wait_for_item_or_stop(scope) {
            Some(item) => {
                seen.lock().unwrap().push(item);
                TaskStatus::Continue
            }
            None => TaskStatus::Halt,
        })
    };

    let h1 = spawn_consumer(seen_a.clone(), queue.clone(), scope.clone());
    let h2 = spawn_consumer(seen_b.clone(), queue.clone(), scope.clone());

    // Give both consumers a chance to drain everything, then stop them.
    while !queue.empty() {
        std::thread::sleep(Duration::from_millis(5));
    }
    scope.abort();

    assert_eq!(h1.join().unwrap(), TaskStatus::Halt);
    assert_eq!(h2.join().unwrap(), TaskStatus::Halt);

    let a = seen_a.lock().unwrap().clone();
    let b = seen_b.lock().unwrap().clone();
    let union: HashSet<i32> = a.iter().chain(b.iter()).copied().collect();
    assert_eq!(union, (0..10).collect::<HashSet<i32>>());
    assert_eq!(a.len() + b.len(), 10);
}

#[test]
fn push_happens_before_consume_for_the_whole_sequence() {
    crate::testonly::init_test_logger();
    let queue = Arc::new(Queue::<i32>::new());
    let scope = StopScope::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let consumer_queue = queue.clone();
    let consumer_seen = seen.clone();
    let consumer = task::run(scope.clone(), move |scope| match consumer_queue.wait_for_item_or_stop(scope) {
        Some(item) => {
            consumer_seen.lock().unwrap().push(item);
            TaskStatus::Continue
        }
        None => TaskStatus::Halt,
    });

    for i in 1..=5 {
        queue.push(i);
    }
    while !queue.empty() {
        std::thread::sleep(Duration::from_millis(5));
    }
    scope.abort();
    consumer.join().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}
