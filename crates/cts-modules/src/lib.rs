//! Test families and the registry that assembles them into one tree.

pub mod api;
pub mod binding_model;
pub mod fragment_shading_rate;
pub mod pipeline;
pub mod ray_tracing;
pub mod registry;
pub mod synchronization;

pub use registry::{create_test_tree, CaseBox};
