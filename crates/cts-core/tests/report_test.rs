//! Integration test: RunReport
//!
//! Verifies verdict counting, the failure flag that drives the runner's
//! exit status, and that status codes serialize in snake_case.
//!
//! Run with: cargo test --test report_test -- --nocapture

use cts_core::{RunReport, StatusCode, Summary, TestStatus};

#[test]
fn test_summary_counts_each_verdict() {
    let mut report = RunReport::new("test device");
    report.record("cts.a", TestStatus::pass("Pass"), 1);
    report.record("cts.b", TestStatus::pass("Pass"), 2);
    report.record("cts.c", TestStatus::not_supported("no ext"), 0);
    report.record("cts.d", TestStatus::quality_warning("slow"), 3);

    let summary = report.summary();
    println!("{:?}", summary);
    assert_eq!(
        summary,
        Summary {
            passed: 2,
            failed: 0,
            quality_warnings: 1,
            not_supported: 1,
            internal_errors: 0,
        }
    );
    assert_eq!(summary.total(), 4);
    assert!(!report.has_failures());
}

#[test]
fn test_failures_flag() {
    let mut report = RunReport::new("test device");
    report.record("cts.a", TestStatus::pass("Pass"), 1);
    report.record("cts.b", TestStatus::internal_error("panic: boom"), 1);
    assert!(report.has_failures());
    assert_eq!(report.results[1].status, StatusCode::InternalError);
    assert_eq!(report.results[1].description, "panic: boom");
}

#[test]
fn test_status_code_serializes_snake_case() {
    let mut report = RunReport::new("dev");
    report.record("cts.x", TestStatus::not_supported("n/a"), 0);
    let text = toml::to_string(&report).expect("serialize");
    println!("{}", text);
    assert!(text.contains("not_supported"));
}
