//! Integration test: host platform helpers
//!
//! Run with: cargo test --test platform_test -- --nocapture

use cts_common::logging::try_init_logging;
use cts_common::platform::{cpu_count, platform_name, HostClock};

#[test]
fn test_platform_basics() {
    try_init_logging();
    println!("platform: {}, cpus: {}", platform_name(), cpu_count());
    assert!(!platform_name().is_empty());
    assert!(cpu_count() >= 1);
}

#[test]
fn test_logging_init_is_repeatable() {
    try_init_logging();
    try_init_logging();
    tracing::info!("logging initialized twice");
}

#[test]
fn test_host_clocks_advance() {
    for clock in [HostClock::Monotonic, HostClock::MonotonicRaw, HostClock::QueryPerformanceCounter] {
        if !clock.is_available() {
            assert_eq!(clock.now(), None);
            continue;
        }
        let frequency = clock.frequency().expect("available clock has a frequency");
        assert!(frequency > 0);

        let before = clock.now().expect("first reading");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let after = clock.now().expect("second reading");
        println!("{:?}: {} -> {} at {} Hz", clock, before, after, frequency);
        assert!(after > before);
    }
}
