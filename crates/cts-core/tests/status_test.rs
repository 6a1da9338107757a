//! Integration test: TestStatus and ResultCollector
//!
//! Verifies error-to-status mapping and that the collector keeps the
//! worst outcome while gathering every non-pass message, including when
//! results arrive from several threads at once.
//!
//! Run with: cargo test --test status_test -- --nocapture

use std::sync::Arc;

use cts_core::{CtsError, ErrorKind, ResultCollector, StatusCode, TestStatus};

#[test]
fn test_error_kind_mapping() {
    let cases = [
        (CtsError::not_supported("no ext"), ErrorKind::NotSupported, StatusCode::NotSupported),
        (CtsError::VerificationFailed("bad".into()), ErrorKind::VerificationFailed, StatusCode::Fail),
        (CtsError::QualityWarning("slow".into()), ErrorKind::QualityWarning, StatusCode::QualityWarning),
        (CtsError::fatal("boom"), ErrorKind::Fatal, StatusCode::InternalError),
        (
            CtsError::Vulkan { call: "vkCreateBuffer", result: "ERROR_OUT_OF_DEVICE_MEMORY".into() },
            ErrorKind::Fatal,
            StatusCode::InternalError,
        ),
    ];

    for (err, kind, code) in cases {
        assert_eq!(err.kind(), kind);
        let status: TestStatus = err.into();
        println!("{:?}: {}", status.code, status.description);
        assert_eq!(status.code, code);
    }
}

#[test]
fn test_not_supported_keeps_bare_message() {
    let status: TestStatus = CtsError::not_supported("Queue not found").into();
    assert_eq!(status.description, "Queue not found");
}

#[test]
fn test_collector_all_pass() {
    let collector = ResultCollector::new();
    collector.add_result(StatusCode::Pass, "ok");
    collector.add_result(StatusCode::Pass, "ok");
    let result = collector.get_result();
    assert!(result.is_pass());
    assert_eq!(result.description, "Pass");
}

#[test]
fn test_collector_worst_wins() {
    let collector = ResultCollector::new();
    collector.add_result(StatusCode::QualityWarning, "slow");
    collector.fail("The data don't match");
    collector.add_result(StatusCode::Pass, "ok");

    let result = collector.get_result();
    assert_eq!(result.code, StatusCode::Fail);
    assert_eq!(result.description, "slow; The data don't match");
}

#[test]
fn test_collector_check() {
    let collector = ResultCollector::new();
    assert!(collector.check(true, "never recorded"));
    assert!(!collector.check(false, "recorded"));
    assert_eq!(collector.get_result().description, "recorded");
}

#[test]
fn test_collector_from_threads() {
    let collector = Arc::new(ResultCollector::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let collector = Arc::clone(&collector);
            std::thread::spawn(move || {
                if i == 5 {
                    collector.fail(format!("thread {} failed", i));
                } else {
                    collector.add_result(StatusCode::Pass, "Passed");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker panicked");
    }

    let result = collector.get_result();
    assert_eq!(result.code, StatusCode::Fail);
    assert_eq!(result.description, "thread 5 failed");
}
