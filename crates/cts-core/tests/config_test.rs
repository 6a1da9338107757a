//! Integration test: CtsConfig
//!
//! Parses representative cts.toml snippets and checks defaults.
//!
//! Run with: cargo test --test config_test -- --nocapture

use cts_core::config::{CtsConfig, OutputFormat};
use cts_core::ErrorKind;

#[test]
fn test_empty_config_uses_defaults() {
    let config = CtsConfig::parse("").expect("empty config should parse");
    assert_eq!(config.runner.device_index, 0);
    assert!(!config.runner.validation);
    assert_eq!(config.runner.threads, None);
    assert_eq!(config.output.format, OutputFormat::Pretty);
    assert!(config.filter.include.is_empty());
}

#[test]
fn test_full_config() {
    let text = r#"
[runner]
device_index = 1
validation = true
threads = 8
fail_fast = true

[output]
format = "json"
path = "report.json"

[filter]
include = ["cts.pipeline.*"]
exclude = ["*closedFan2*"]
"#;
    let config = CtsConfig::parse(text).expect("config should parse");
    println!("{:?}", config);
    assert_eq!(config.runner.device_index, 1);
    assert!(config.runner.validation);
    assert_eq!(config.runner.threads, Some(8));
    assert!(config.runner.fail_fast);
    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(config.output.path.as_deref(), Some("report.json"));
    assert_eq!(config.filter.exclude, vec!["*closedFan2*".to_string()]);
}

#[test]
fn test_invalid_config() {
    let err = CtsConfig::parse("[runner]\ndevice_index = \"zero\"\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

#[test]
fn test_missing_file_falls_back() {
    let config = CtsConfig::load_or_default("/nonexistent/cts.toml");
    assert_eq!(config.output.format, OutputFormat::Pretty);
}
