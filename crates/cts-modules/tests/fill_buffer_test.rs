//! Integration test: fill/update buffer reference model
//!
//! Checks the byte-level model the fill and update cases compare device
//! results against, including the trailing bytes a VK_WHOLE_SIZE fill
//! must leave alone.
//!
//! Run with: cargo test --test fill_buffer_test -- --nocapture

use ash::vk;
use cts_core::{StatusCode, TestStatus};
use cts_modules::api::fill_buffer::{
    case_params, compare_bytes, fill_reference, test_data, update_reference, whole_size_fill_end,
    BufferOp, FillBufferCase, FillBufferParams,
};

#[test]
fn test_data_pattern() {
    let data = test_data();
    assert_eq!(data[0], 0x0101_0101);
    assert_eq!(data[1], 0x0202_0202);
    assert_eq!(data[15], 0x1010_1010);
    // 256 * 0x01010101 wraps
    assert_eq!(data[255], 0x0101_0100);
}

#[test]
fn test_whole_size_end_skips_partial_word() {
    for (size, offset, end) in [(256, 0, 256), (257, 0, 256), (259, 4, 256), (258, 8, 256), (12, 12, 12)] {
        println!("size {} offset {} -> end {}", size, offset, end);
        assert_eq!(whole_size_fill_end(size, offset), end);
    }
}

#[test]
fn test_fill_whole_size_leaves_trailing_bytes() {
    let initial = vec![0xffu8; 14];
    let out = fill_reference(&initial, 4, vk::WHOLE_SIZE, 0x0403_0201);

    assert_eq!(&out[..4], &[0xff; 4]);
    let pattern = 0x0403_0201u32.to_ne_bytes();
    assert_eq!(&out[4..8], &pattern);
    assert_eq!(&out[8..12], &pattern);
    assert_eq!(&out[12..], &[0xff, 0xff]);
}

#[test]
fn test_fill_sized_range() {
    let initial = vec![0u8; 16];
    let out = fill_reference(&initial, 4, 4, 0xaabb_ccdd);
    assert_eq!(&out[..4], &[0; 4]);
    assert_eq!(&out[4..8], &0xaabb_ccddu32.to_ne_bytes());
    assert_eq!(&out[8..], &[0; 8]);
}

#[test]
fn test_update_reference_copies_data() {
    let initial = vec![0xffu8; 8];
    let out = update_reference(&initial, 2, &[1, 2, 3]);
    assert_eq!(out, vec![0xff, 0xff, 1, 2, 3, 0xff, 0xff, 0xff]);
}

#[test]
fn test_compare_bytes_reports_first_mismatch() {
    assert_eq!(compare_bytes(&[1, 2, 3], &[1, 2, 3]), None);
    assert_eq!(compare_bytes(&[1, 2, 3], &[1, 9, 9]), Some(1));
    assert_eq!(compare_bytes(&[1, 2], &[1, 2, 3]), Some(2));
}

#[test]
fn test_expected_bytes_per_operation() {
    let fill = FillBufferParams {
        op: BufferOp::Fill,
        dst_size: 16,
        dst_offset: 4,
        size: 8,
        use_transfer_queue: false,
    };
    let bytes = fill.expected_bytes();
    assert_eq!(&bytes[..4], &[0xff; 4]);
    assert_eq!(&bytes[4..12], &[0x01; 8]);
    assert_eq!(&bytes[12..], &[0xff; 4]);

    let update = FillBufferParams {
        op: BufferOp::Update,
        ..fill
    };
    let bytes = update.expected_bytes();
    assert_eq!(&bytes[4..8], &[0x01; 4]);
    assert_eq!(&bytes[8..12], &[0x02; 4]);
    assert_eq!(&bytes[12..], &[0xff; 4]);
}

#[test]
fn test_whole_size_fill_of_257_bytes() {
    let params = FillBufferParams {
        op: BufferOp::Fill,
        dst_size: 257,
        dst_offset: 0,
        size: vk::WHOLE_SIZE,
        use_transfer_queue: false,
    };
    let bytes = params.expected_bytes();
    assert_eq!(bytes.len(), 257);
    assert!(bytes[..256].iter().all(|&b| b == 0x01));
    assert_eq!(bytes[256], 0xff);
}

#[test]
fn test_update_size_validation() {
    let update = |size| FillBufferParams {
        op: BufferOp::Update,
        dst_size: 2048,
        dst_offset: 0,
        size,
        use_transfer_queue: false,
    };
    assert!(update(4).validate().is_ok());
    assert!(update(1024).validate().is_ok());

    for bad in [6, 1028, 65540] {
        let err = update(bad).validate().unwrap_err();
        println!("{}: {}", bad, err);
        assert_eq!(TestStatus::from(err).code, StatusCode::InternalError);
    }

    // Fills are not bound by the update limits.
    let fill = FillBufferParams {
        op: BufferOp::Fill,
        ..update(6)
    };
    assert!(fill.validate().is_ok());

    // Building a case with bad parameters does not panic.
    let _case = FillBufferCase::new(update(6));
}

#[test]
fn test_table_parameters_are_valid() {
    for use_transfer_queue in [false, true] {
        let cases = case_params(use_transfer_queue);
        assert_eq!(cases.len(), 12 + 8);
        for (name, params) in &cases {
            params
                .validate()
                .unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert_eq!(params.use_transfer_queue, use_transfer_queue);
        }
    }
}
