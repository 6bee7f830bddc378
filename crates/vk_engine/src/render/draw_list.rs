//! Models known to the renderer and the draws they produce each frame

use crate::foundation::math::Mat4;
use crate::render::mesh::{Drawable, Mesh};
use crate::render::model::Model;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::vk;

/// One draw call of the scene subpass
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    /// Vertex buffer at binding 0
    pub vertex_buffer: vk::Buffer,
    /// Index buffer for indexed draws
    pub index_buffer: Option<vk::Buffer>,
    /// Vertices to draw when not indexed
    pub vertex_count: u32,
    /// Indices to draw when indexed
    pub index_count: u32,
    /// Model root transform times mesh transform
    pub model_matrix: Mat4,
    /// Texture table id, `None` for the default texture
    pub texture_id: Option<usize>,
}

/// Models addressed by the id returned from `add`
pub struct ModelList<M = Mesh> {
    models: Vec<Model<M>>,
}

impl<M> Default for ModelList<M> {
    fn default() -> Self {
        Self { models: Vec::new() }
    }
}

impl<M: Drawable> ModelList<M> {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a model, returning its id
    pub fn add(&mut self, model: Model<M>) -> usize {
        self.models.push(model);
        self.models.len() - 1
    }

    /// Replace the root transform of model `id`
    pub fn update_model(&mut self, id: usize, transform: Mat4) -> VulkanResult<()> {
        let count = self.models.len();
        let model = self
            .models
            .get_mut(id)
            .ok_or(VulkanError::ModelIndexOutOfRange { index: id, count })?;
        model.set_transform(transform);
        Ok(())
    }

    /// Model by id
    pub fn get(&self, id: usize) -> VulkanResult<&Model<M>> {
        self.models.get(id).ok_or(VulkanError::ModelIndexOutOfRange {
            index: id,
            count: self.models.len(),
        })
    }

    /// Number of models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// No models loaded
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Every mesh of every model, in order
    pub fn draws(&self) -> Vec<DrawItem> {
        self.models
            .iter()
            .flat_map(|model| {
                let root = *model.transform();
                model.meshes().iter().map(move |mesh| {
                    let info = mesh.info();
                    DrawItem {
                        vertex_buffer: mesh.vertex_buffer(),
                        index_buffer: mesh.index_buffer(),
                        vertex_count: info.vertex_count(),
                        index_count: info.index_count(),
                        model_matrix: root * info.transform(),
                        texture_id: info.texture_id(),
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{MaterialData, MeshData, SceneData, SceneNode};
    use crate::foundation::math::{rotation_y, Vec3};
    use crate::render::mesh::{MeshInfo, Vertex};
    use crate::render::model::resolve_material_textures;
    use ash::vk::Handle;

    struct FakeMesh {
        info: MeshInfo,
        buffer: vk::Buffer,
    }

    impl Drawable for FakeMesh {
        fn info(&self) -> &MeshInfo {
            &self.info
        }
        fn info_mut(&mut self) -> &mut MeshInfo {
            &mut self.info
        }
        fn vertex_buffer(&self) -> vk::Buffer {
            self.buffer
        }
        fn index_buffer(&self) -> Option<vk::Buffer> {
            (self.info.index_count() > 0).then_some(self.buffer)
        }
    }

    fn triangle(material: usize) -> MeshData {
        MeshData {
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
            material: Some(material),
        }
    }

    fn two_mesh_model() -> Model<FakeMesh> {
        let scene = SceneData {
            nodes: vec![SceneNode::new(vec![0, 1], vec![])],
            roots: vec![0],
            meshes: vec![triangle(0), triangle(1)],
            materials: vec![
                MaterialData {
                    name: Some("a".to_string()),
                    diffuse_texture: Some("a.png".to_string()),
                },
                MaterialData {
                    name: Some("b".to_string()),
                    diffuse_texture: Some("b.png".to_string()),
                },
            ],
        };
        let mut next_texture = 0;
        let textures = resolve_material_textures(&scene.materials, |_| {
            next_texture += 1;
            Ok(next_texture - 1)
        })
        .unwrap();

        let mut next_buffer = 1u64;
        Model::from_scene(&scene, &textures, |data| {
            next_buffer += 1;
            Ok(FakeMesh {
                info: MeshInfo::new(data.vertices.len() as u32, data.indices.len() as u32),
                buffer: vk::Buffer::from_raw(next_buffer),
            })
        })
        .unwrap()
    }

    #[test]
    fn test_draws_carry_last_update() {
        let mut models = ModelList::new();
        let id = models.add(two_mesh_model());

        models.update_model(id, rotation_y(0.3)).unwrap();
        let last = rotation_y(1.2) * Mat4::new_translation(&Vec3::new(0.0, -1.0, 0.0));
        models.update_model(id, last).unwrap();

        let draws = models.draws();
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|draw| draw.model_matrix == last));
        assert_eq!(draws[0].texture_id, Some(0));
        assert_eq!(draws[1].texture_id, Some(1));
        assert_ne!(draws[0].vertex_buffer, draws[1].vertex_buffer);
        assert!(draws.iter().all(|draw| draw.index_buffer.is_some() && draw.index_count == 3));
    }

    #[test]
    fn test_mesh_transform_is_applied_after_root() {
        let mut model = two_mesh_model();
        model.set_transform(Mat4::new_scaling(2.0));
        let mut models = ModelList::new();
        let id = models.add(model);
        assert_eq!(models.get(id).unwrap().mesh_count(), 2);

        let draws = models.draws();
        assert_eq!(draws[0].model_matrix, Mat4::new_scaling(2.0));
    }

    #[test]
    fn test_unknown_model_id() {
        let mut models: ModelList<FakeMesh> = ModelList::new();
        assert!(models.is_empty());
        assert!(matches!(
            models.update_model(0, Mat4::identity()),
            Err(VulkanError::ModelIndexOutOfRange { index: 0, count: 0 })
        ));
    }
}
