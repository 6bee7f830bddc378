//! GPU meshes
//!
//! A `Mesh` owns a device-local vertex buffer and an optional index buffer,
//! both filled once through a staging upload. Everything the frame loop needs
//! besides the buffers lives in `MeshInfo`, which is plain data.

use crate::foundation::math::Mat4;
use crate::render::vulkan::resources::{GpuBuffer, TransferContext};
use crate::render::vulkan::VulkanResult;
use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Vertex layout shared with the scene vertex shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position (location 0)
    pub position: [f32; 3],
    /// Vertex color (location 1)
    pub color: [f32; 3],
    /// Texture coordinate (location 2)
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a vertex
    pub fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }
}

/// Draw parameters of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInfo {
    vertex_count: u32,
    index_count: u32,
    transform: Mat4,
    texture_id: Option<usize>,
}

impl MeshInfo {
    /// Untextured mesh with an identity transform
    pub fn new(vertex_count: u32, index_count: u32) -> Self {
        Self {
            vertex_count,
            index_count,
            transform: Mat4::identity(),
            texture_id: None,
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices, 0 for non-indexed meshes
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Transform relative to the owning model
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Replace the transform
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Texture table id, `None` for the default texture
    pub fn texture_id(&self) -> Option<usize> {
        self.texture_id
    }

    /// Replace the texture id
    pub fn set_texture_id(&mut self, texture_id: Option<usize>) {
        self.texture_id = texture_id;
    }
}

/// Anything the frame loop can draw
pub trait Drawable {
    /// Counts, transform and texture
    fn info(&self) -> &MeshInfo;

    /// Mutable access to the draw parameters
    fn info_mut(&mut self) -> &mut MeshInfo;

    /// Vertex buffer bound at binding 0
    fn vertex_buffer(&self) -> vk::Buffer;

    /// Index buffer, if the mesh is indexed
    fn index_buffer(&self) -> Option<vk::Buffer>;
}

/// Mesh whose buffers live on the GPU
pub struct Mesh {
    info: MeshInfo,
    vertex_buffer: GpuBuffer,
    index_buffer: Option<GpuBuffer>,
}

impl Mesh {
    /// Upload `vertices` and `indices`. An empty index slice produces a
    /// non-indexed mesh.
    pub fn new(transfer: &TransferContext, vertices: &[Vertex], indices: &[u32]) -> VulkanResult<Self> {
        let vertex_buffer = transfer.upload_buffer(vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer = if indices.is_empty() {
            None
        } else {
            Some(transfer.upload_buffer(indices, vk::BufferUsageFlags::INDEX_BUFFER)?)
        };

        log::debug!("Created mesh: {} vertices, {} indices", vertices.len(), indices.len());

        Ok(Self {
            info: MeshInfo::new(vertices.len() as u32, indices.len() as u32),
            vertex_buffer,
            index_buffer,
        })
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        self.info.vertex_count
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.info.index_count
    }
}

impl Drawable for Mesh {
    fn info(&self) -> &MeshInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut MeshInfo {
        &mut self.info
    }

    fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    fn index_buffer(&self) -> Option<vk::Buffer> {
        self.index_buffer.as_ref().map(GpuBuffer::handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        let vertex = Vertex::new([1.0, 2.0, 3.0], [0.5, 0.5, 0.5], [0.25, 0.75]);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.5, 0.5, 0.5, 0.25, 0.75]);
    }

    #[test]
    fn test_counts_survive_transform_updates() {
        let mut info = MeshInfo::new(24, 36);
        info.set_transform(Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)));
        info.set_transform(Mat4::new_scaling(2.0));
        assert_eq!(info.vertex_count(), 24);
        assert_eq!(info.index_count(), 36);
        assert_eq!(info.transform(), &Mat4::new_scaling(2.0));
    }

    #[test]
    fn test_new_info_defaults() {
        let info = MeshInfo::new(3, 0);
        assert_eq!(info.texture_id(), None);
        assert_eq!(info.transform(), &Mat4::identity());
    }
}
