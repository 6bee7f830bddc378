//! GPU resources: buffers, images, textures, descriptors and transfers

pub mod buffer;
pub mod descriptor_set;
pub mod image;
pub mod texture;
pub mod transfer;

pub use buffer::{find_memory_type, GpuBuffer};
pub use descriptor_set::{DescriptorLayouts, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use image::{GpuImage, ImageDesc};
pub use texture::{Texture, TextureTable};
pub use transfer::{layout_transition, LayoutTransition, TransferContext};
