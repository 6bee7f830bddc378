//! Vulkan backend
//!
//! `initialization` brings up the window, instance, surface and device;
//! `resources` owns buffers, images, textures and descriptors; `state` holds
//! the swapchain and per-frame synchronization; `rendering` builds the render
//! pass and pipelines and records commands. `renderer` drives all of it.

pub mod initialization;
pub mod renderer;
pub mod rendering;
pub mod resources;
pub mod state;

pub use initialization::{
    QueueFamilyIndices, Surface, VulkanContext, VulkanError, VulkanInstance, VulkanResult, Window, WindowError,
    WindowResult,
};
pub use renderer::{PushModel, UboViewProjection, VulkanRenderer};

/// Frames that may be in flight on the GPU at once
pub const MAX_FRAME_DRAWS: usize = 3;
