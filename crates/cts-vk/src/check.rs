use ash::vk;
use cts_core::CtsError;

/// Converts a raw `VkResult` into the harness error type, tagging it with
/// the API entry point that produced it.
pub trait VkCheck<T> {
    fn vk_check(self, call: &'static str) -> Result<T, CtsError>;
}

impl<T> VkCheck<T> for Result<T, vk::Result> {
    fn vk_check(self, call: &'static str) -> Result<T, CtsError> {
        self.map_err(|result| vk_error(call, result))
    }
}

pub fn vk_error(call: &'static str, result: vk::Result) -> CtsError {
    CtsError::Vulkan {
        call,
        result: format!("{:?}", result),
    }
}
