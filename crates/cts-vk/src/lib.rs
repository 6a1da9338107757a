//! Vulkan side of the harness: context and device provisioning, resource
//! builders, command submission and the `TestCase` / `TestInstance` protocol.

pub mod accel;
pub mod case;
pub mod check;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod handles;
pub mod image;
pub mod memory;
pub mod pipeline;
pub mod ray_tracing;
pub mod shader;
pub mod stress;

pub use case::{execute_case, TestCase, TestInstance};
pub use check::VkCheck;
pub use context::{Context, ContextOptions, CustomDevice, DeviceFeatures};
pub use handles::Unique;
pub use memory::{Allocation, BufferWithMemory, ImageWithMemory, MemoryRequirement, SimpleAllocator};
pub use shader::BinaryCollection;
pub use stress::{MultiQueues, SpinBarrier, ThreadGroup};
