//! Integration test: multi-queue stress harness
//!
//! Exercises the queue free list, the spin barrier and the thread group
//! without a Vulkan device: queues are plain integers standing in for
//! handles, and workers only touch host memory.
//!
//! Run with: cargo test --test stress_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};

use cts_core::{CtsError, StatusCode, TestStatus};
use cts_vk::stress::{stress_thread_count, MultiQueues, SpinBarrier, ThreadGroup};

#[test]
fn test_free_list_scans_families_in_order() {
    let queues = MultiQueues::new();
    queues.add_family(2, vec![20u32, 21]);
    queues.add_family(0, vec![0u32]);
    assert_eq!(queues.family_count(), 2);
    assert_eq!(queues.queue_count(), 3);
    assert_eq!(queues.family_indices(), vec![0, 2]);

    let first = queues.get_free_queue().expect("first queue");
    let second = queues.get_free_queue().expect("second queue");
    let third = queues.get_free_queue().expect("third queue");
    println!("leased: {:?} {:?} {:?}", first, second, third);

    assert_eq!((first.family_index, first.queue_index, first.slot), (0, 0, 0));
    assert_eq!((second.family_index, second.queue_index, second.slot), (2, 0, 20));
    assert_eq!((third.family_index, third.queue_index, third.slot), (2, 1, 21));
    assert!(queues.get_free_queue().is_none());

    queues.release_queue(2, 1);
    let again = queues.get_free_queue().expect("released queue");
    assert_eq!(again.slot, 21);
}

#[test]
fn test_release_of_unknown_queue_is_ignored() {
    let queues = MultiQueues::new();
    queues.add_family(0, vec![7u32]);
    queues.release_queue(5, 0);
    queues.release_queue(0, 9);
    assert!(queues.get_free_queue().is_some());
    assert!(queues.get_free_queue().is_none());
}

#[test]
fn test_guard_returns_queue_on_drop() {
    let queues = MultiQueues::new();
    queues.add_family(1, vec![11u32]);
    {
        let guard = queues.acquire();
        assert_eq!(guard.slot(), 11);
        assert!(queues.get_free_queue().is_none());
    }
    assert!(queues.get_free_queue().is_some());
}

#[test]
fn test_queues_are_never_shared() {
    let queues = MultiQueues::new();
    queues.add_family(0, vec![0usize, 1]);
    let in_use: Vec<AtomicUsize> = (0..2).map(|_| AtomicUsize::new(0)).collect();
    let violations = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..200 {
                    let guard = queues.acquire();
                    let slot = guard.slot();
                    if in_use[slot].fetch_add(1, Ordering::SeqCst) != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::yield_now();
                    in_use[slot].fetch_sub(1, Ordering::SeqCst);
                }
            });
        }
    });

    println!("violations: {}", violations.load(Ordering::SeqCst));
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(queues.queue_count(), 2);
}

#[test]
fn test_spin_barrier_releases_all_threads() {
    let barrier = SpinBarrier::new(4);
    let before = AtomicUsize::new(0);
    let seen_all = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                before.fetch_add(1, Ordering::SeqCst);
                barrier.sync();
                if before.load(Ordering::SeqCst) == 4 {
                    seen_all.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(seen_all.load(Ordering::SeqCst), 4);
}

#[test]
fn test_spin_barrier_remove_thread_unblocks_waiters() {
    let barrier = SpinBarrier::new(2);
    std::thread::scope(|s| {
        s.spawn(|| barrier.sync());
        s.spawn(|| barrier.remove_thread());
    });
    assert_eq!(barrier.participants(), 1);

    barrier.reset(1);
    barrier.sync();
}

#[test]
fn test_thread_group_all_pass() {
    let counter = AtomicUsize::new(0);
    let mut group = ThreadGroup::new();
    for _ in 0..6 {
        group.add(|barrier: &SpinBarrier| {
            counter.fetch_add(1, Ordering::SeqCst);
            barrier.sync();
            Ok(TestStatus::pass("Passed"))
        });
    }
    assert_eq!(group.len(), 6);

    let status = group.run();
    println!("group: {:?} {}", status.code, status.description);
    assert_eq!(status.code, StatusCode::Pass);
    assert_eq!(status.description, "Pass");
    assert_eq!(counter.load(Ordering::SeqCst), 6);
}

#[test]
fn test_thread_group_merges_failures() {
    let mut group = ThreadGroup::new();
    group.add(|_: &SpinBarrier| Ok(TestStatus::pass("Passed")));
    group.add(|_: &SpinBarrier| Ok(TestStatus::fail("The data don't match")));
    group.add(|_: &SpinBarrier| Err(CtsError::fatal("vkQueueSubmit failed")));
    group.add(|_: &SpinBarrier| -> Result<TestStatus, CtsError> { panic!("worker blew up") });

    let status = group.run();
    println!("group: {:?} {}", status.code, status.description);
    assert_eq!(status.code, StatusCode::Fail);
    assert_eq!(
        status.description,
        "The data don't match; vkQueueSubmit failed; Exception"
    );
}

#[test]
fn test_thread_group_keeps_not_supported() {
    let mut group = ThreadGroup::new();
    group.add(|_: &SpinBarrier| Ok(TestStatus::pass("Passed")));
    group.add(|_: &SpinBarrier| Err(CtsError::not_supported("Queue not found")));

    let status = group.run();
    assert_eq!(status.code, StatusCode::NotSupported);
    assert_eq!(status.description, "Queue not found");
}

#[test]
fn test_stress_thread_count_is_clamped() {
    assert_eq!(stress_thread_count(1), 4);
    assert_eq!(stress_thread_count(12), 12);
    assert_eq!(stress_thread_count(128), 32);
}
