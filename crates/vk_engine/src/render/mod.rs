//! Rendering: scene-side types and the Vulkan backend

pub mod draw_list;
pub mod mesh;
pub mod model;
pub mod vulkan;

pub use draw_list::{DrawItem, ModelList};
pub use mesh::{Drawable, Mesh, MeshInfo, Vertex};
pub use model::Model;
pub use vulkan::{VulkanRenderer, MAX_FRAME_DRAWS};
