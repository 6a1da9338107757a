//! Integration test: ray watertightness geometry and verdicts
//!
//! Run with: cargo test --test watertightness_test -- --nocapture

use cts_core::StatusCode;
use cts_modules::ray_tracing::watertightness::{
    closed_fan, subdivided_square, verify_closed_fan, verify_subdivided, CaseDef, Layout,
    MISS_SENTINEL,
};

#[test]
fn test_subdivided_square_is_deterministic() {
    let a = subdivided_square(64, 42);
    let b = subdivided_square(64, 42);
    assert_eq!(a.len(), 64 * 3);
    assert_eq!(a, b);

    let c = subdivided_square(64, 43);
    assert_ne!(a, c);
}

#[test]
fn test_subdivided_square_stays_inside_unit_square() {
    let vertices = subdivided_square(256, 7);
    for v in &vertices {
        assert!((0.0..=1.0).contains(&v[0]), "x out of range: {:?}", v);
        assert!((0.0..=1.0).contains(&v[1]), "y out of range: {:?}", v);
        assert!((-1.0..=-0.01).contains(&v[2]), "z out of range: {:?}", v);
    }
    // The two starting triangles are enough for the smallest size.
    assert_eq!(subdivided_square(2, 0).len(), 6);
}

#[test]
fn test_closed_fan_shares_edges() {
    let fan = closed_fan(16);
    assert_eq!(fan.len(), 16);
    for (i, tri) in fan.iter().enumerate() {
        assert_eq!(tri[0], [0.0, 0.0, 0.0]);
        let next = &fan[(i + 1) % fan.len()];
        assert_eq!(tri[2], next[1]);
    }
}

#[test]
fn test_case_defs() {
    let def = CaseDef::subdivided(2, 64);
    assert_eq!((def.width, def.height, def.depth), (256, 256, 1));
    assert_eq!(def.layout, Layout::Subdivided { seed: 5 * 2 + 11 * 64 });
    assert!(!def.is_closed_fan());
    assert_eq!(def.bottom_level_count(), 1);

    let def = CaseDef::closed_fan(16, true);
    assert_eq!((def.width, def.height, def.depth), (5, 4, 16));
    assert!(def.pixel_count() >= def.squares + 2);
    assert_eq!(def.bottom_level_count(), 16);
    assert_eq!(CaseDef::closed_fan(16, false).bottom_level_count(), 1);
}

#[test]
fn test_verify_subdivided() {
    assert!(verify_subdivided(&[1, 1, 1], 3).is_pass());
    // Only the first `squares` values are inspected.
    assert!(verify_subdivided(&[1, 1, 1, 2], 3).is_pass());

    let status = verify_subdivided(&[1, 2, 5], 3);
    println!("{}", status.description);
    assert_eq!(status.description, "failures=2");
}

#[test]
fn test_verify_closed_fan_three_way() {
    assert!(verify_closed_fan(&[0, 1, 0, 1]).is_pass());

    let doubled = verify_closed_fan(&[1, 2, MISS_SENTINEL]);
    assert_eq!(doubled.code, StatusCode::Fail);
    assert_eq!(doubled.description, "failures=1");

    let missed = verify_closed_fan(&[1, MISS_SENTINEL, 0]);
    println!("{}", missed.description);
    assert_eq!(missed.code, StatusCode::QualityWarning);
}
