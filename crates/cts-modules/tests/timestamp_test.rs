//! Integration test: timestamp oracles
//!
//! Covers valid-bit checks, monotonic verification, host reset and copy
//! verdicts, the calibrated clock arithmetic and case naming. None of
//! these touch a device.
//!
//! Run with: cargo test --test timestamp_test -- --nocapture

use ash::vk;
use cts_core::{StatusCode, TestStatus};
use cts_modules::pipeline::timestamp::calibrated::{
    abs_diff_with_overflow, deviation_check, device_nanoseconds, domain_subset, host_nanoseconds,
    out_of_range, positive_diff_with_overflow, with_quality,
};
use cts_modules::pipeline::timestamp::{
    check_timestamp_bits, check_valid_bits, require_stage_features, stage_name, timestamp_mask, verify_consistent_results,
    verify_host_reset, verify_reset_before_copy, verify_timestamps, TimestampParams, TimestampValue,
    TransferMethod,
};

fn ts(value: u64) -> TimestampValue {
    TimestampValue {
        value,
        availability: None,
    }
}

#[test]
fn test_valid_bits_bounds() {
    assert!(check_valid_bits(35, 0).is_err());
    assert!(check_valid_bits(36, 0).is_ok());
    assert!(check_valid_bits(64, 0).is_ok());
    let err = check_valid_bits(65, 2).unwrap_err();
    println!("{}", err);
    assert!(err.message().contains("queue index 2"));
}

#[test]
fn test_mask_and_bit_check() {
    assert_eq!(timestamp_mask(36), (1u64 << 36) - 1);
    assert_eq!(timestamp_mask(64), u64::MAX);

    let mask = timestamp_mask(36);
    assert!(check_timestamp_bits(mask, mask).is_ok());
    assert!(check_timestamp_bits(1 << 36, mask).is_err());
}

#[test]
fn test_verify_timestamps() {
    assert!(verify_timestamps(&[ts(10), ts(10), ts(20)]).is_pass());
    assert!(verify_timestamps(&[]).is_pass());

    let status = verify_timestamps(&[ts(20), ts(30), ts(10)]);
    println!("{}", status.description);
    assert_eq!(status.code, StatusCode::Fail);

    let unavailable = [
        ts(1),
        TimestampValue {
            value: 2,
            availability: Some(0),
        },
    ];
    assert_eq!(verify_timestamps(&unavailable).description, "Timestamp query not available");

    let available = [
        TimestampValue {
            value: 1,
            availability: Some(1),
        },
        TimestampValue {
            value: 2,
            availability: Some(1),
        },
    ];
    assert!(verify_timestamps(&available).is_pass());
}

#[test]
fn test_verify_host_reset() {
    let original = [5u64, 6];
    assert!(verify_host_reset(false, &original, &[[5, 0], [6, 0]], u64::MAX).is_some());
    assert!(verify_host_reset(true, &original, &[[5, 0], [6, 0]], u64::MAX).is_none());

    let modified = verify_host_reset(true, &original, &[[5, 0], [7, 0]], u64::MAX);
    assert_eq!(
        modified.map(|s| s.description),
        Some("QueryPoolResults returned value was modified".to_string())
    );

    let available = verify_host_reset(true, &original, &[[5, 1], [6, 0]], u64::MAX);
    assert_eq!(available.map(|s| s.code), Some(StatusCode::Fail));
}

#[test]
fn test_reset_before_copy_and_consistency() {
    assert!(verify_reset_before_copy(0).is_pass());
    assert!(!verify_reset_before_copy(1).is_pass());

    assert!(verify_consistent_results(5, 5, 5, 5).is_pass());
    // A 32-bit read of a value that does not fit saturates.
    let big = 1u64 << 33;
    assert!(verify_consistent_results(u32::MAX, big, u32::MAX, big).is_pass());
    assert!(!verify_consistent_results(1, 1, 2, 2).is_pass());
    assert!(!verify_consistent_results(0, big + 1, 0, big + 1).is_pass());
}

#[test]
fn test_case_names() {
    use vk::PipelineStageFlags as S;
    let flags = vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT;

    let params = TimestampParams::new(&[S::TOP_OF_PIPE, S::VERTEX_SHADER], true, flags);
    assert_eq!(params.name(), "vertex_shader_stage_in_render_pass");

    let mut params = TimestampParams::new(
        &[S::TOP_OF_PIPE, S::VERTEX_SHADER],
        false,
        flags | vk::QueryResultFlags::WITH_AVAILABILITY,
    );
    params.host_query_reset = true;
    assert_eq!(
        params.name(),
        "vertex_shader_stage_out_of_render_pass_host_query_reset_with_availability_bit"
    );

    let params = TimestampParams::new(&[S::TOP_OF_PIPE, S::TRANSFER], false, flags);
    assert_eq!(
        params.transfer_name(TransferMethod::CopyBuffer),
        "transfer_stage_with_copy_buffer_method"
    );

    assert_eq!(stage_name(S::TOP_OF_PIPE), Some("top_of_pipe_stage"));
    assert_eq!(stage_name(S::BOTTOM_OF_PIPE), None);
}

#[test]
fn test_clock_arithmetic_with_wrap() {
    let mask = 0xff;
    assert_eq!(abs_diff_with_overflow(7, 7, mask), 0);
    assert_eq!(abs_diff_with_overflow(10, 20, mask), 10);
    assert_eq!(abs_diff_with_overflow(1, 255, mask), 2);

    assert_eq!(positive_diff_with_overflow(4, 250, mask), 246);
    assert_eq!(positive_diff_with_overflow(250, 4, mask), 10);

    assert!(out_of_range(10, 5, 20));
    assert!(!out_of_range(10, 15, 20));
    // Wrapped range 250..=5
    assert!(!out_of_range(250, 2, 5));
    assert!(out_of_range(250, 100, 5));
}

#[test]
fn test_tick_conversion() {
    assert_eq!(device_nanoseconds(10, 1.0).unwrap(), 10);
    assert_eq!(device_nanoseconds(10, 2.5).unwrap(), 25);
    assert!(device_nanoseconds(u64::from(u32::MAX) + 1, 1.0).is_err());

    assert_eq!(host_nanoseconds(12345, 1_000_000_000), 12345);
    assert_eq!(host_nanoseconds(3_000_000, 1_000_000), 3_000_000_000);
    assert_eq!(host_nanoseconds(1_500_000, 1_000_000), 1_500_000_000);
}

#[test]
fn test_deviation_grading() {
    let mut quality = Vec::new();
    assert!(deviation_check(200_000_000, 2, &mut quality).is_err());

    deviation_check(10_000_000, 2, &mut quality).unwrap();
    assert!(quality.is_empty());
    deviation_check(0, 1, &mut quality).unwrap();
    assert!(quality.is_empty());

    deviation_check(0, 2, &mut quality).unwrap();
    deviation_check(60_000_000, 2, &mut quality).unwrap();
    println!("{:?}", quality);
    assert_eq!(quality.len(), 2);

    let status = with_quality(TestStatus::pass("Pass"), &quality);
    assert_eq!(status.code, StatusCode::QualityWarning);
    assert!(with_quality(TestStatus::pass("Pass"), &[]).is_pass());
    assert_eq!(with_quality(TestStatus::fail("bad"), &quality).code, StatusCode::Fail);
}

#[test]
fn test_domain_subset() {
    use vk::TimeDomainKHR as D;
    let available = [D::CLOCK_MONOTONIC_RAW, D::DEVICE, D::CLOCK_MONOTONIC, D::DEVICE];
    assert_eq!(
        domain_subset(&available, &[D::DEVICE, D::CLOCK_MONOTONIC]),
        vec![D::DEVICE, D::CLOCK_MONOTONIC]
    );
    assert!(domain_subset(&available, &[D::QUERY_PERFORMANCE_COUNTER]).is_empty());
}

#[test]
fn test_stage_feature_requirements() {
    use vk::PipelineStageFlags as S;
    let none = vk::PhysicalDeviceFeatures::default();
    let geometry_only = vk::PhysicalDeviceFeatures {
        geometry_shader: vk::TRUE,
        ..Default::default()
    };
    let both = vk::PhysicalDeviceFeatures {
        geometry_shader: vk::TRUE,
        tessellation_shader: vk::TRUE,
        ..Default::default()
    };

    assert!(require_stage_features(&none, &[S::TOP_OF_PIPE, S::DRAW_INDIRECT]).is_ok());

    let err = require_stage_features(&none, &[S::TOP_OF_PIPE, S::GEOMETRY_SHADER]).unwrap_err();
    println!("{}", err);
    assert_eq!(TestStatus::from(err).code, StatusCode::NotSupported);

    assert!(require_stage_features(&geometry_only, &[S::TOP_OF_PIPE, S::GEOMETRY_SHADER]).is_ok());
    let err = require_stage_features(&geometry_only, &[S::TOP_OF_PIPE, S::TESSELLATION_EVALUATION_SHADER])
        .unwrap_err();
    assert!(err.message().contains("Tessellation"));

    for stage in [S::TESSELLATION_CONTROL_SHADER, S::TESSELLATION_EVALUATION_SHADER, S::GEOMETRY_SHADER] {
        assert!(require_stage_features(&both, &[S::TOP_OF_PIPE, stage]).is_ok());
    }
}
