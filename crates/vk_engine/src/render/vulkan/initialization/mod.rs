//! Device and surface setup

pub mod context;
pub mod device_selection;
pub mod surface;
pub mod window;

pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use device_selection::{find_queue_families, QueueFamilyIndices};
pub use surface::Surface;
pub use window::{Window, WindowError, WindowResult};
