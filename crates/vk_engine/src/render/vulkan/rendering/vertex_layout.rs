//! Vertex input state for the scene pipeline

use crate::render::mesh::Vertex;
use ash::vk;
use std::mem::{offset_of, size_of};

/// Binding 0 advances per vertex with the stride of `Vertex`
pub fn binding_description() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Position, color and texture coordinate at locations 0, 1 and 2
pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 1,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, color) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 2,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(Vertex, tex_coord) as u32,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_and_offsets() {
        assert_eq!(binding_description().stride, 32);
        let offsets: Vec<u32> = attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn test_locations_are_sequential() {
        let locations: Vec<u32> = attribute_descriptions().iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }
}
