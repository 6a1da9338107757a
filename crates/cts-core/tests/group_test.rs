//! Integration test: test tree and filtering
//!
//! Builds a small nested group, checks path generation, lookup and
//! duplicate detection, and exercises the include/exclude glob filter.
//!
//! Run with: cargo test --test group_test -- --nocapture

use cts_core::group::glob_match;
use cts_core::{TestFilter, TestGroup};

fn sample_tree() -> TestGroup<u32> {
    let mut root = TestGroup::new("cts", "root");
    let mut pipeline = TestGroup::new("pipeline", "");
    let mut timestamp = TestGroup::new("timestamp", "");
    timestamp.add_case("timestamp_only", 1);
    timestamp.add_case("consistent_results", 2);
    pipeline.add_child(timestamp);
    root.add_child(pipeline);

    let mut sync = TestGroup::new("synchronization", "");
    sync.add_case("fences", 3);
    root.add_child(sync);
    root
}

#[test]
fn test_paths_in_declaration_order() {
    let tree = sample_tree();
    let paths: Vec<String> = tree.cases().into_iter().map(|(p, _)| p).collect();
    for p in &paths {
        println!("{}", p);
    }
    assert_eq!(
        paths,
        vec![
            "cts.pipeline.timestamp.timestamp_only",
            "cts.pipeline.timestamp.consistent_results",
            "cts.synchronization.fences",
        ]
    );
    assert_eq!(tree.case_count(), 3);
}

#[test]
fn test_find() {
    let tree = sample_tree();
    assert_eq!(tree.find("cts.synchronization.fences"), Some(&3));
    assert_eq!(tree.find("cts.pipeline.timestamp.consistent_results"), Some(&2));
    assert_eq!(tree.find("cts.pipeline.timestamp"), None);
    assert_eq!(tree.find("cts.synchronization.fences.extra"), None);
    assert_eq!(tree.find("other.synchronization.fences"), None);
}

#[test]
fn test_duplicate_detection() {
    let mut tree = sample_tree();
    assert_eq!(tree.find_duplicate_path(), None);

    let mut sync = TestGroup::new("synchronization", "");
    sync.add_case("fences", 4);
    tree.add_child(sync);
    assert_eq!(
        tree.find_duplicate_path().as_deref(),
        Some("cts.synchronization.fences")
    );
}

#[test]
fn test_glob() {
    assert!(glob_match("*", "cts.a.b"));
    assert!(glob_match("cts.pipeline.*", "cts.pipeline.timestamp.x"));
    assert!(glob_match("*.fences", "cts.synchronization.smoke.fences"));
    assert!(glob_match("cts.*.timestamp.*_only", "cts.pipeline.timestamp.timestamp_only"));
    assert!(!glob_match("cts.api.*", "cts.pipeline.timestamp.x"));
    assert!(!glob_match("fences", "fences2"));
}

#[test]
fn test_filter_include_exclude() {
    let filter = TestFilter::new(
        vec!["cts.pipeline.*".to_string()],
        vec!["*consistent*".to_string()],
    );
    assert!(filter.matches("cts.pipeline.timestamp.timestamp_only"));
    assert!(!filter.matches("cts.pipeline.timestamp.consistent_results"));
    assert!(!filter.matches("cts.synchronization.fences"));

    let everything = TestFilter::default();
    assert!(everything.matches("cts.synchronization.fences"));
}
