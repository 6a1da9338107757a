use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use ash::vk;
use cts_core::CtsError;
use tracing::{debug, info, warn};

use crate::check::VkCheck;
use crate::memory::SimpleAllocator;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions the default device enables whenever they are present.
const OPTIONAL_DEVICE_EXTENSIONS: &[&CStr] = &[
    ash::khr::deferred_host_operations::NAME,
    ash::khr::acceleration_structure::NAME,
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::fragment_shading_rate::NAME,
    ash::ext::calibrated_timestamps::NAME,
    ash::ext::inline_uniform_block::NAME,
    ash::ext::image_robustness::NAME,
];

/// Options controlling how the default [`Context`] is created.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub device_index: usize,
    pub validation: bool,
    /// Worker count override for multi-threaded cases.
    pub stress_threads: Option<usize>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            device_index: 0,
            validation: false,
            stress_threads: None,
        }
    }
}

// ── Feature chain ───────────────────────────────────────────────────────────

/// Supported (and therefore enabled) features of a physical device.
///
/// Every extension struct is stored with `p_next` cleared so it can be
/// copied into a fresh chain at device creation time.
#[derive(Clone, Copy, Default)]
pub struct DeviceFeatures {
    pub core: vk::PhysicalDeviceFeatures,
    pub vulkan12: vk::PhysicalDeviceVulkan12Features<'static>,
    pub inline_uniform_block: Option<vk::PhysicalDeviceInlineUniformBlockFeatures<'static>>,
    pub acceleration_structure: Option<vk::PhysicalDeviceAccelerationStructureFeaturesKHR<'static>>,
    pub ray_tracing_pipeline: Option<vk::PhysicalDeviceRayTracingPipelineFeaturesKHR<'static>>,
    pub fragment_shading_rate: Option<vk::PhysicalDeviceFragmentShadingRateFeaturesKHR<'static>>,
}

impl DeviceFeatures {
    pub fn host_query_reset(&self) -> bool {
        self.vulkan12.host_query_reset == vk::TRUE
    }

    pub fn timeline_semaphore(&self) -> bool {
        self.vulkan12.timeline_semaphore == vk::TRUE
    }

    pub fn buffer_device_address(&self) -> bool {
        self.vulkan12.buffer_device_address == vk::TRUE
    }

    pub fn inline_uniform_block(&self) -> bool {
        self.inline_uniform_block
            .is_some_and(|f| f.inline_uniform_block == vk::TRUE)
    }

    pub fn acceleration_structure(&self) -> bool {
        self.acceleration_structure
            .is_some_and(|f| f.acceleration_structure == vk::TRUE)
    }

    pub fn ray_tracing_pipeline(&self) -> bool {
        self.ray_tracing_pipeline
            .is_some_and(|f| f.ray_tracing_pipeline == vk::TRUE)
    }

    pub fn pipeline_fragment_shading_rate(&self) -> bool {
        self.fragment_shading_rate
            .is_some_and(|f| f.pipeline_fragment_shading_rate == vk::TRUE)
    }

    fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        has_ext: impl Fn(&CStr) -> bool,
        api_version: u32,
    ) -> Self {
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut iub = vk::PhysicalDeviceInlineUniformBlockFeatures::default();
        let mut accel = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
        let mut rt = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
        let mut fsr = vk::PhysicalDeviceFragmentShadingRateFeaturesKHR::default();

        let want_iub = api_version >= vk::API_VERSION_1_3
            || has_ext(ash::ext::inline_uniform_block::NAME);
        let want_accel = has_ext(ash::khr::acceleration_structure::NAME);
        let want_rt = has_ext(ash::khr::ray_tracing_pipeline::NAME);
        let want_fsr = has_ext(ash::khr::fragment_shading_rate::NAME);

        let core = {
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan12);
            if want_iub {
                features2 = features2.push_next(&mut iub);
            }
            if want_accel {
                features2 = features2.push_next(&mut accel);
            }
            if want_rt {
                features2 = features2.push_next(&mut rt);
            }
            if want_fsr {
                features2 = features2.push_next(&mut fsr);
            }
            unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
            features2.features
        };

        vulkan12.p_next = std::ptr::null_mut();
        iub.p_next = std::ptr::null_mut();
        accel.p_next = std::ptr::null_mut();
        rt.p_next = std::ptr::null_mut();
        fsr.p_next = std::ptr::null_mut();

        Self {
            core,
            vulkan12,
            inline_uniform_block: want_iub.then_some(iub),
            acceleration_structure: want_accel.then_some(accel),
            ray_tracing_pipeline: want_rt.then_some(rt),
            fragment_shading_rate: want_fsr.then_some(fsr),
        }
    }
}

/// One queue family and how many queues to create from it.
#[derive(Debug, Clone, Copy)]
pub struct QueueRequest {
    pub family_index: u32,
    pub count: u32,
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    requests: &[QueueRequest],
    extensions: &[CString],
    features: &DeviceFeatures,
) -> Result<ash::Device, CtsError> {
    let priorities: Vec<Vec<f32>> = requests
        .iter()
        .map(|r| vec![1.0f32; r.count as usize])
        .collect();
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = requests
        .iter()
        .zip(&priorities)
        .map(|(r, p)| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(r.family_index)
                .queue_priorities(p)
        })
        .collect();

    let ext_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

    let mut vulkan12 = features.vulkan12;
    let mut iub = features.inline_uniform_block;
    let mut accel = features.acceleration_structure;
    let mut rt = features.ray_tracing_pipeline;
    let mut fsr = features.fragment_shading_rate;

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features.core)
        .push_next(&mut vulkan12);
    if let Some(f) = iub.as_mut() {
        features2 = features2.push_next(f);
    }
    if let Some(f) = accel.as_mut() {
        features2 = features2.push_next(f);
    }
    if let Some(f) = rt.as_mut() {
        features2 = features2.push_next(f);
    }
    if let Some(f) = fsr.as_mut() {
        features2 = features2.push_next(f);
    }

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&ext_ptrs)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .vk_check("vkCreateDevice")?;
    debug!(
        "logical device created with {} queue families, {} extensions",
        requests.len(),
        extensions.len()
    );
    Ok(device)
}

// ── Context ─────────────────────────────────────────────────────────────────

/// Default test context: instance, chosen physical device, and a logical
/// device with one universal queue and every supported known feature enabled.
pub struct Context {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    universal_queue: vk::Queue,
    universal_queue_family: u32,
    api_version: u32,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    features: DeviceFeatures,
    instance_extensions: Vec<CString>,
    device_extensions: Vec<CString>,
    enabled_device_extensions: Vec<CString>,
    allocator: SimpleAllocator,
    stress_threads: Option<usize>,
}

// SAFETY: Vulkan handles are valid across threads with proper external synchronization
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Context {
    pub fn new(options: &ContextOptions) -> Result<Self, CtsError> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| CtsError::fatal(format!("failed to load Vulkan loader: {}", e)))?;
        info!("Vulkan entry loaded successfully");

        let instance_extensions: Vec<CString> =
            unsafe { entry.enumerate_instance_extension_properties(None) }
                .vk_check("vkEnumerateInstanceExtensionProperties")?
                .iter()
                .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }.to_owned())
                .collect();

        let mut layers: Vec<*const c_char> = Vec::new();
        if options.validation {
            let available = unsafe { entry.enumerate_instance_layer_properties() }
                .vk_check("vkEnumerateInstanceLayerProperties")?;
            let found = available.iter().any(|l| {
                (unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }) == VALIDATION_LAYER
            });
            if found {
                layers.push(VALIDATION_LAYER.as_ptr());
                info!("validation layer enabled");
            } else {
                warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
            }
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"cts-runner")
            .application_version(1)
            .engine_name(c"cts")
            .engine_version(1)
            .api_version(vk::make_api_version(0, 1, 3, 0));
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .vk_check("vkCreateInstance")?;

        match Self::with_instance(entry, instance, options, instance_extensions) {
            Ok(ctx) => Ok(ctx),
            Err((instance, e)) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    fn with_instance(
        entry: ash::Entry,
        instance: ash::Instance,
        options: &ContextOptions,
        instance_extensions: Vec<CString>,
    ) -> Result<Self, (ash::Instance, CtsError)> {
        macro_rules! bail {
            ($e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(err) => return Err((instance, err)),
                }
            };
        }

        let physical_devices = bail!(unsafe { instance.enumerate_physical_devices() }
            .vk_check("vkEnumeratePhysicalDevices"));
        let physical_device = bail!(physical_devices
            .get(options.device_index)
            .copied()
            .ok_or_else(|| CtsError::fatal(format!(
                "no physical device at index {} ({} present)",
                options.device_index,
                physical_devices.len()
            ))));

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();
        let api_version = properties.api_version;
        info!(
            "testing {} (Vulkan {}.{}.{}, {:?})",
            name,
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version),
            properties.device_type
        );

        if api_version < vk::API_VERSION_1_2 {
            return Err((instance, CtsError::fatal("a Vulkan 1.2 device is required")));
        }

        let device_extensions: Vec<CString> = bail!(unsafe {
            instance.enumerate_device_extension_properties(physical_device)
        }
        .vk_check("vkEnumerateDeviceExtensionProperties"))
        .iter()
        .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }.to_owned())
        .collect();

        let has_ext = |name: &CStr| device_extensions.iter().any(|e| e.as_c_str() == name);
        let enabled_device_extensions: Vec<CString> = OPTIONAL_DEVICE_EXTENSIONS
            .iter()
            .filter(|name| has_ext(*name))
            // Promoted to core in 1.3; enabling the EXT alongside is redundant.
            .filter(|name| {
                **name != ash::ext::inline_uniform_block::NAME
                    || api_version < vk::API_VERSION_1_3
            })
            .map(|name| (*name).to_owned())
            .collect();
        let features = DeviceFeatures::query(&instance, physical_device, has_ext, api_version);

        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let universal_queue_family = bail!(families
            .iter()
            .position(|f| f
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))
            .map(|i| i as u32)
            .ok_or_else(|| CtsError::fatal("no universal (graphics + compute) queue family")));

        let device = bail!(create_logical_device(
            &instance,
            physical_device,
            &[QueueRequest {
                family_index: universal_queue_family,
                count: 1,
            }],
            &enabled_device_extensions,
            &features,
        ));
        let device = Arc::new(device);
        let universal_queue = unsafe { device.get_device_queue(universal_queue_family, 0) };
        let allocator = SimpleAllocator::new(&device, memory_properties);

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            universal_queue,
            universal_queue_family,
            api_version,
            properties,
            memory_properties,
            features,
            instance_extensions,
            device_extensions,
            enabled_device_extensions,
            allocator,
            stress_threads: options.stress_threads,
        })
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn universal_queue(&self) -> vk::Queue {
        self.universal_queue
    }

    pub fn universal_queue_family_index(&self) -> u32 {
        self.universal_queue_family
    }

    pub fn allocator(&self) -> &SimpleAllocator {
        &self.allocator
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn features(&self) -> &DeviceFeatures {
        &self.features
    }

    pub fn stress_threads(&self) -> Option<usize> {
        self.stress_threads
    }

    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn enabled_device_extensions(&self) -> &[CString] {
        &self.enabled_device_extensions
    }

    pub fn is_instance_extension_supported(&self, name: &CStr) -> bool {
        self.instance_extensions.iter().any(|e| e.as_c_str() == name)
    }

    pub fn is_device_extension_supported(&self, name: &CStr) -> bool {
        self.device_extensions.iter().any(|e| e.as_c_str() == name)
    }

    /// `NotSupported` unless the default device has `name` enabled.
    pub fn require_device_extension(&self, name: &CStr) -> Result<(), CtsError> {
        if self.enabled_device_extensions.iter().any(|e| e.as_c_str() == name) {
            Ok(())
        } else {
            Err(CtsError::not_supported(format!(
                "{} is not supported",
                name.to_string_lossy()
            )))
        }
    }

    pub fn queue_family_properties(&self) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(self.physical_device)
        }
    }

    /// First family whose flags contain `required` and share nothing with `excluded`.
    pub fn find_queue_family(
        &self,
        required: vk::QueueFlags,
        excluded: vk::QueueFlags,
    ) -> Option<u32> {
        self.queue_family_properties()
            .iter()
            .position(|f| f.queue_flags.contains(required) && !f.queue_flags.intersects(excluded))
            .map(|i| i as u32)
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// `None` when the format/usage combination is not supported at all.
    pub fn image_format_properties(
        &self,
        format: vk::Format,
        ty: vk::ImageType,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> Option<vk::ImageFormatProperties> {
        unsafe {
            self.instance.get_physical_device_image_format_properties(
                self.physical_device,
                format,
                ty,
                tiling,
                usage,
                vk::ImageCreateFlags::empty(),
            )
        }
        .ok()
    }

    /// Start describing a device that differs from the default one.
    pub fn custom_device(&self) -> CustomDeviceBuilder<'_> {
        CustomDeviceBuilder {
            ctx: self,
            queues: Vec::new(),
            extensions: self.enabled_device_extensions.clone(),
            features: self.features,
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        debug!("context destroyed");
    }
}

// ── Custom devices ──────────────────────────────────────────────────────────

/// Builder for a device that replicates the default device's extensions and
/// features but with a test-specific queue layout or extra extensions.
pub struct CustomDeviceBuilder<'c> {
    ctx: &'c Context,
    queues: Vec<QueueRequest>,
    extensions: Vec<CString>,
    features: DeviceFeatures,
}

impl CustomDeviceBuilder<'_> {
    pub fn queue_family(mut self, family_index: u32, count: u32) -> Self {
        self.queues.push(QueueRequest {
            family_index,
            count,
        });
        self
    }

    /// Every queue of every family whose flags intersect `flags`.
    pub fn all_queues_with(mut self, flags: vk::QueueFlags) -> Self {
        for (i, family) in self.ctx.queue_family_properties().iter().enumerate() {
            if family.queue_flags.intersects(flags) && family.queue_count > 0 {
                self.queues.push(QueueRequest {
                    family_index: i as u32,
                    count: family.queue_count,
                });
            }
        }
        self
    }

    /// Enable an additional extension; `NotSupported` if the device lacks it.
    pub fn extension(mut self, name: &CStr) -> Result<Self, CtsError> {
        if !self.ctx.is_device_extension_supported(name) {
            return Err(CtsError::not_supported(format!(
                "{} is not supported",
                name.to_string_lossy()
            )));
        }
        if !self.extensions.iter().any(|e| e.as_c_str() == name) {
            self.extensions.push(name.to_owned());
        }
        Ok(self)
    }

    pub fn features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn build(self) -> Result<CustomDevice, CtsError> {
        if self.queues.is_empty() {
            return Err(CtsError::fatal("custom device requested without queues"));
        }
        let device = create_logical_device(
            &self.ctx.instance,
            self.ctx.physical_device,
            &self.queues,
            &self.extensions,
            &self.features,
        )?;
        let device = Arc::new(device);

        let mut queues = Vec::new();
        for req in &self.queues {
            for index in 0..req.count {
                queues.push(QueueInfo {
                    family_index: req.family_index,
                    index,
                    queue: unsafe { device.get_device_queue(req.family_index, index) },
                });
            }
        }
        let allocator = SimpleAllocator::new(&device, self.ctx.memory_properties);
        info!("custom device created with {} queue(s)", queues.len());

        Ok(CustomDevice {
            device,
            queues,
            allocator,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueInfo {
    pub family_index: u32,
    pub index: u32,
    pub queue: vk::Queue,
}

/// A test-owned logical device. Everything created from it must be dropped
/// first, so owners declare it as their last field.
pub struct CustomDevice {
    device: Arc<ash::Device>,
    queues: Vec<QueueInfo>,
    allocator: SimpleAllocator,
}

// SAFETY: Vulkan handles are valid across threads with proper external synchronization
unsafe impl Send for CustomDevice {}
unsafe impl Sync for CustomDevice {}

impl CustomDevice {
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn allocator(&self) -> &SimpleAllocator {
        &self.allocator
    }

    pub fn queues(&self) -> &[QueueInfo] {
        &self.queues
    }

    /// The first created queue.
    pub fn queue(&self) -> Option<QueueInfo> {
        self.queues.first().copied()
    }
}

impl Drop for CustomDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        debug!("custom device destroyed");
    }
}
