//! Integration test: synchronization helpers
//!
//! Run with: cargo test --test synchronization_test -- --nocapture

use ash::vk;
use cts_modules::synchronization::internally_synchronized::{
    queue_family_matches, verify_result_buffer, BUFFER_ELEMENT_COUNT,
};
use cts_modules::synchronization::smoke::{
    bounded_wait_ok, semaphore_queue_family, status_code, wait_code, SEMAPHORE_QUEUE_COUNT,
};

#[test]
fn test_queue_family_matching() {
    use vk::QueueFlags as Q;
    assert!(queue_family_matches(Q::GRAPHICS | Q::COMPUTE, Q::COMPUTE));
    assert!(queue_family_matches(Q::GRAPHICS | Q::COMPUTE, Q::GRAPHICS));
    assert!(!queue_family_matches(Q::TRANSFER, Q::COMPUTE));

    // Graphics and compute families imply transfer.
    assert!(queue_family_matches(Q::COMPUTE, Q::TRANSFER));
    assert!(queue_family_matches(Q::GRAPHICS, Q::TRANSFER));
    assert!(queue_family_matches(Q::TRANSFER, Q::TRANSFER));
    assert!(!queue_family_matches(Q::SPARSE_BINDING, Q::TRANSFER));
}

#[test]
fn test_result_buffer_verdict() {
    let good: Vec<i32> = (0..BUFFER_ELEMENT_COUNT as i32).collect();
    assert!(verify_result_buffer(&good).is_pass());

    let mut bad = good.clone();
    bad[7] = 0;
    let status = verify_result_buffer(&bad);
    assert_eq!(status.description, "The data don't match");

    assert!(!verify_result_buffer(&good[..4]).is_pass());
}

#[test]
fn test_fence_result_codes() {
    assert_eq!(wait_code(Ok(())), vk::Result::SUCCESS);
    assert_eq!(wait_code(Err(vk::Result::TIMEOUT)), vk::Result::TIMEOUT);

    assert_eq!(status_code(Ok(true)), vk::Result::SUCCESS);
    assert_eq!(status_code(Ok(false)), vk::Result::NOT_READY);
    assert_eq!(
        status_code(Err(vk::Result::ERROR_DEVICE_LOST)),
        vk::Result::ERROR_DEVICE_LOST
    );

    assert!(bounded_wait_ok(vk::Result::SUCCESS));
    assert!(bounded_wait_ok(vk::Result::TIMEOUT));
    assert!(!bounded_wait_ok(vk::Result::NOT_READY));
    assert!(!bounded_wait_ok(vk::Result::ERROR_DEVICE_LOST));
}

fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count,
        ..Default::default()
    }
}

#[test]
fn test_semaphore_queue_family_selection() {
    use vk::QueueFlags as Q;
    assert_eq!(SEMAPHORE_QUEUE_COUNT, 2);

    // A single graphics queue is not enough; compute-only families never qualify.
    let families = [
        family(Q::GRAPHICS | Q::COMPUTE, 1),
        family(Q::COMPUTE, 8),
        family(Q::GRAPHICS | Q::TRANSFER, 2),
        family(Q::GRAPHICS, 16),
    ];
    assert_eq!(semaphore_queue_family(&families), Some(2));
    assert_eq!(semaphore_queue_family(&families[..2]), None);
    assert_eq!(semaphore_queue_family(&[]), None);
}
