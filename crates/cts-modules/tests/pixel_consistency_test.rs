//! Integration test: fragment shading rate selection and pixel consistency
//!
//! Run with: cargo test --test pixel_consistency_test -- --nocapture

use ash::vk;
use cts_core::StatusCode;
use cts_modules::fragment_shading_rate::pixel_consistency::{
    clamp_shading_rate, verify_pixel_consistency, SupportedRate,
};

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

fn rates(sizes: &[(u32, u32)]) -> Vec<SupportedRate> {
    sizes
        .iter()
        .map(|&(w, h)| SupportedRate {
            fragment_size: extent(w, h),
            sample_counts: vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
        })
        .collect()
}

#[test]
fn test_clamp_exact_match() {
    let supported = rates(&[(1, 1), (2, 2), (4, 4)]);
    assert_eq!(clamp_shading_rate(extent(2, 2), &supported), vec![extent(2, 2)]);
}

#[test]
fn test_clamp_halves_area() {
    let supported = rates(&[(1, 1), (1, 2), (2, 1), (2, 2)]);
    assert_eq!(clamp_shading_rate(extent(4, 4), &supported), vec![extent(2, 2)]);
    assert_eq!(clamp_shading_rate(extent(2, 4), &supported), vec![extent(2, 2)]);
    // 1x2 is taller than the request.
    assert_eq!(clamp_shading_rate(extent(4, 1), &supported), vec![extent(2, 1)]);
}

#[test]
fn test_clamp_prefers_square_rates() {
    let supported = rates(&[(1, 1), (1, 4), (4, 1), (2, 2)]);
    assert_eq!(clamp_shading_rate(extent(4, 4), &supported), vec![extent(2, 2)]);

    let supported = rates(&[(1, 1), (1, 4), (4, 1)]);
    let clamped = clamp_shading_rate(extent(4, 4), &supported);
    println!("{:?}", clamped);
    assert_eq!(clamped, vec![extent(1, 4), extent(4, 1)]);
}

#[test]
fn test_clamp_ignores_multisample_only_rates() {
    let supported = vec![
        SupportedRate {
            fragment_size: extent(2, 2),
            sample_counts: vk::SampleCountFlags::TYPE_4,
        },
        SupportedRate {
            fragment_size: extent(1, 1),
            sample_counts: vk::SampleCountFlags::TYPE_1,
        },
    ];
    assert_eq!(clamp_shading_rate(extent(2, 2), &supported), vec![extent(1, 1)]);
    assert!(clamp_shading_rate(extent(2, 2), &[]).is_empty());
}

#[test]
fn test_consistent_tiles_pass() {
    let pixels = vec![[3u32, 0u32]; 16];
    assert!(verify_pixel_consistency(&pixels, 4, 4, 0, extent(2, 2), false).is_pass());
    assert!(verify_pixel_consistency(&pixels, 4, 4, 1, extent(2, 2), false).is_pass());
}

#[test]
fn test_inconsistent_tile_fails() {
    let mut pixels = vec![[1u32, 0u32]; 16];
    pixels[10][0] = 2;
    let status = verify_pixel_consistency(&pixels, 4, 4, 0, extent(2, 2), false);
    println!("{}", status.description);
    assert_eq!(status.code, StatusCode::Fail);
}

#[test]
fn test_index_outside_tile_fails() {
    let pixels = vec![[4u32, 0u32]; 16];
    assert!(!verify_pixel_consistency(&pixels, 4, 4, 0, extent(2, 2), false).is_pass());
}

#[test]
fn test_uncovered_pixels_are_skipped() {
    let mut pixels = vec![[0u32, 0u32]; 16];
    pixels[5][0] = u32::MAX;
    assert!(verify_pixel_consistency(&pixels, 4, 4, 0, extent(2, 2), false).is_pass());
}

#[test]
fn test_edge_tiles_need_robustness() {
    // 3x4 at 2x2: column 2 belongs to tiles cut by the edge.
    let mut pixels = vec![[0u32, 0u32]; 12];
    pixels[2][0] = 1;
    pixels[5][0] = 2;
    assert!(verify_pixel_consistency(&pixels, 3, 4, 0, extent(2, 2), false).is_pass());
    assert!(!verify_pixel_consistency(&pixels, 3, 4, 0, extent(2, 2), true).is_pass());

    // Zero is accepted alongside any edge value.
    pixels[5][0] = 0;
    assert!(verify_pixel_consistency(&pixels, 3, 4, 0, extent(2, 2), true).is_pass());
}
