//! # vk_engine
//!
//! A small Vulkan renderer built on `ash` and `glfw`.
//!
//! - Instance, surface and device setup with optional validation layers
//! - Swapchain negotiation and recreation on resize
//! - A two-subpass render pass: scene geometry into color + depth, then a
//!   composition pass reading both as input attachments
//! - glTF models with per-material diffuse textures
//! - Up to [`render::MAX_FRAME_DRAWS`] frames in flight
//!
//! ```rust,no_run
//! use vk_engine::config::RendererConfig;
//! use vk_engine::render::vulkan::{VulkanRenderer, Window};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = VulkanRenderer::new(&window, config.clone())?;
//!     renderer.create_model(&config.scene.model_path)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw(&window)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

/// Commonly used items
pub mod prelude {
    pub use crate::config::{Config, RendererConfig};
    pub use crate::foundation::math::{Mat4, Vec3};
    pub use crate::render::vulkan::{VulkanError, VulkanRenderer, VulkanResult, Window};
    pub use crate::render::{Mesh, Model, Vertex, MAX_FRAME_DRAWS};
}
