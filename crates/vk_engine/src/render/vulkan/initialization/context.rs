//! Vulkan context management
//!
//! Instance (with optional validation), surface, physical device selection and
//! the logical device. `VulkanContext` declares its fields so they drop device
//! first, then surface, then instance.

use super::device_selection::{find_queue_families, missing_extensions, vk_name_to_string, QueueFamilyIndices};
use super::surface::Surface;
use super::window::{Window, WindowError};
use crate::render::vulkan::state::SwapchainSupport;
use crate::assets::AssetError;
use crate::config::RendererConfig;
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use ash::{Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use thiserror::Error;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No memory type matches the allowed bits and requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// No format in the candidate list supports the requested features
    #[error("No supported format among {0:?}")]
    NoSupportedFormat(Vec<vk::Format>),

    /// Image layout pair without a barrier table entry
    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Mesh lookup past the end of a model
    #[error("Mesh index {index} out of range ({count} meshes)")]
    MeshIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of meshes
        count: usize,
    },

    /// Model id not known to the renderer
    #[error("Model index {index} out of range ({count} models)")]
    ModelIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of models
        count: usize,
    },

    /// Texture id not present in the texture table
    #[error("Texture index {index} out of range ({count} textures)")]
    TextureIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of textures
        count: usize,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Window system failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Asset loading failure
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

fn to_cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|_| VulkanError::InitializationFailed(format!("interior nul in '{}'", value)))
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    instance: Instance,
    entry: Entry,
}

impl VulkanInstance {
    /// Create the instance, attaching the validation layer and debug
    /// messenger when requested and available
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {}", e)))?;

        let mut enable_validation = config.validation_enabled();
        if enable_validation && !Self::validation_layer_available(&entry)? {
            log::warn!("{} requested but not installed; continuing without validation", VALIDATION_LAYER);
            enable_validation = false;
        }

        let mut required = window.required_instance_extensions()?;
        if enable_validation {
            required.push(DebugUtils::name().to_string_lossy().into_owned());
        }

        let available: Vec<String> = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| vk_name_to_string(&ext.extension_name))
            .collect();
        let missing = missing_extensions(&required, &available);
        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Missing instance extensions: {}",
                missing.join(", ")
            )));
        }

        let app_name = to_cstring(&config.application_name)?;
        let engine_name = to_cstring("vk_engine")?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names = required.iter().map(|name| to_cstring(name)).collect::<VulkanResult<Vec<_>>>()?;
        let extension_ptrs: Vec<*const std::os::raw::c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let layer_names = if enable_validation { vec![to_cstring(VALIDATION_LAYER)?] } else { Vec::new() };
        let layer_ptrs: Vec<*const std::os::raw::c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let mut messenger_info = debug_messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if enable_validation {
            // Also covers vkCreateInstance / vkDestroyInstance themselves.
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let debug_messenger = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger_info = debug_messenger_create_info();
            match unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) } {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    log::warn!("Failed to attach debug messenger: {:?}", e);
                    None
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance (validation {})",
            if debug_messenger.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            debug_messenger,
            instance,
            entry,
        })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?;
        Ok(layers.iter().any(|layer| vk_name_to_string(&layer.layer_name) == VALIDATION_LAYER))
    }

    /// Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance handle
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Whether validation messages are being routed to the log
    pub fn validation_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Routes validation layer output into `log`
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Selected physical device and what it offers
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Graphics and present family indices, both set
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Pick the first device that can render and present to `surface`
    pub fn select_suitable_device(instance: &Instance, surface: &Surface) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;
        if devices.is_empty() {
            return Err(VulkanError::InitializationFailed("No Vulkan-capable GPU found".to_string()));
        }

        for device in devices {
            if let Some(info) = Self::evaluate_device(instance, device, surface)? {
                log::info!(
                    "Selected GPU: {} ({:?})",
                    vk_name_to_string(&info.properties.device_name),
                    info.properties.device_type
                );
                return Ok(info);
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(instance: &Instance, device: vk::PhysicalDevice, surface: &Surface) -> VulkanResult<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = vk_name_to_string(&properties.device_name);
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_families = find_queue_families(&families, |index| match surface.supports_present(device, index) {
            Ok(supported) => supported,
            Err(e) => {
                log::warn!("Present support query failed on {} family {}: {}", name, index, e);
                false
            }
        });
        if !queue_families.is_complete() {
            log::debug!("Skipping {}: missing graphics or present queue family", name);
            return Ok(None);
        }

        let available: Vec<String> = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| vk_name_to_string(&ext.extension_name))
            .collect();
        let required = required_device_extensions();
        let missing = missing_extensions(&required, &available);
        if !missing.is_empty() {
            log::debug!("Skipping {}: missing extensions {}", name, missing.join(", "));
            return Ok(None);
        }

        if !SwapchainSupport::query(surface, device)?.is_adequate() {
            log::debug!("Skipping {}: no surface formats or present modes", name);
            return Ok(None);
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Some(Self {
            device,
            properties,
            features,
            memory_properties,
            queue_families,
        }))
    }
}

fn required_device_extensions() -> Vec<String> {
    vec![SwapchainLoader::name().to_string_lossy().into_owned()]
}

/// Log a failed idle wait during teardown. Returns whether it failed.
pub(crate) fn log_idle_failure<E: std::fmt::Display>(result: Result<(), E>, during: &str) -> bool {
    match result {
        Ok(()) => false,
        Err(e) => {
            log::error!("Failed to wait for device idle during {}: {}", during, e);
            true
        }
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Vulkan logical device handle
    pub device: Device,
}

impl LogicalDevice {
    /// Create the logical device with one queue per distinct family
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let (graphics_family, present_family) = physical
            .queue_families
            .pair()
            .ok_or_else(|| VulkanError::InitializationFailed("Incomplete queue families".to_string()))?;

        let unique_families: HashSet<u32> = [graphics_family, present_family].into_iter().collect();
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names = [SwapchainLoader::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical.features.sampler_anisotropy == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical.device, &create_info, None) }.map_err(VulkanError::Api)?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!(
            "Created logical device (graphics family {}, present family {})",
            graphics_family,
            present_family
        );

        Ok(Self {
            swapchain_loader,
            graphics_queue,
            present_queue,
            device,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            log_idle_failure(self.device.device_wait_idle(), "logical device teardown");
            self.device.destroy_device(None);
        }
    }
}

/// Owns instance, surface and device. Built once by the renderer and passed
/// by reference to everything that needs device access.
pub struct VulkanContext {
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    surface: Surface,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Run the initialization chain: instance, surface, physical device,
    /// logical device
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, config)?;
        let surface = Surface::new(instance.entry(), instance.instance(), window)?;
        let physical_device = PhysicalDeviceInfo::select_suitable_device(instance.instance(), &surface)?;
        let device = LogicalDevice::new(instance.instance(), &physical_device)?;

        Ok(Self {
            physical_device,
            device,
            surface,
            instance,
        })
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        self.instance.instance()
    }

    /// Whether the debug messenger is attached
    pub fn validation_enabled(&self) -> bool {
        self.instance.validation_enabled()
    }

    /// Presentation surface
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Graphics and present family indices
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> VulkanResult<u32> {
        self.physical_device
            .queue_families
            .graphics
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics family".to_string()))
    }

    /// Memory heaps and types of the selected device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Format features supported for optimal tiling
    pub fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance()
                .get_physical_device_format_properties(self.physical_device.device, format)
                .optimal_tiling_features
        }
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device().device_wait_idle() }.map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_failure_is_reported() {
        assert!(!log_idle_failure(Ok::<(), vk::Result>(()), "test"));
        assert!(log_idle_failure(Err(vk::Result::ERROR_DEVICE_LOST), "test"));
        assert!(log_idle_failure(Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)), "test"));
    }
}
