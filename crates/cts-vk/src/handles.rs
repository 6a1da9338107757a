use std::sync::Arc;

use ash::vk;

/// A device-level handle type that knows how to destroy itself.
pub trait Destroy: Copy {
    /// # Safety
    /// `self` must have been created from `device` and must not be in use.
    unsafe fn destroy(self, device: &ash::Device);
}

/// Owning wrapper that destroys the handle on drop.
///
/// Holds a reference-counted device so it can outlive the stack frame that
/// created it. The logical device itself must still outlive every `Unique`.
pub struct Unique<T: Destroy> {
    device: Arc<ash::Device>,
    handle: T,
}

impl<T: Destroy> Unique<T> {
    pub fn new(device: &Arc<ash::Device>, handle: T) -> Self {
        Self {
            device: Arc::clone(device),
            handle,
        }
    }

    pub fn get(&self) -> T {
        self.handle
    }
}

impl<T: Destroy> Drop for Unique<T> {
    fn drop(&mut self) {
        // SAFETY: the handle was created from this device and is owned here.
        unsafe { self.handle.destroy(&self.device) };
    }
}

// SAFETY: Vulkan handles are plain integers; external synchronisation is the
// caller's job, as with the raw handles.
unsafe impl<T: Destroy> Send for Unique<T> {}
unsafe impl<T: Destroy> Sync for Unique<T> {}

macro_rules! impl_destroy {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Destroy for $ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    // SAFETY: forwarded from the trait contract.
                    unsafe { device.$method(self, None) };
                }
            }
        )*
    };
}

impl_destroy! {
    vk::ShaderModule => destroy_shader_module,
    vk::Pipeline => destroy_pipeline,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::PipelineCache => destroy_pipeline_cache,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::RenderPass => destroy_render_pass,
    vk::Framebuffer => destroy_framebuffer,
    vk::ImageView => destroy_image_view,
    vk::BufferView => destroy_buffer_view,
    vk::Sampler => destroy_sampler,
    vk::CommandPool => destroy_command_pool,
    vk::Fence => destroy_fence,
    vk::Semaphore => destroy_semaphore,
    vk::QueryPool => destroy_query_pool,
}
