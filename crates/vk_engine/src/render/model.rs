//! Models: meshes flattened out of a scene graph plus a root transform

use crate::assets::{AssetError, MaterialData, MeshData, SceneData};
use crate::foundation::math::Mat4;
use crate::render::mesh::{Drawable, Mesh};
use crate::render::vulkan::{VulkanError, VulkanResult};
use std::collections::HashMap;

/// A scene mesh reached through the node graph
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    /// Index into `SceneData::meshes`
    pub mesh: usize,
    /// Product of the node transforms from the root down
    pub transform: Mat4,
}

/// Walk the node graph depth-first, pre-order: a node's own meshes first,
/// then its children in order. The graph must be acyclic.
pub fn flatten_scene(scene: &SceneData) -> Result<Vec<MeshInstance>, AssetError> {
    let mut instances = Vec::new();
    let mut stack: Vec<(usize, Mat4)> = scene.roots.iter().rev().map(|&root| (root, Mat4::identity())).collect();

    while let Some((node_index, parent)) = stack.pop() {
        let node = scene
            .nodes
            .get(node_index)
            .ok_or_else(|| AssetError::InvalidData(format!("node index {} out of range", node_index)))?;
        let transform = parent * node.transform;

        for &mesh in &node.meshes {
            if mesh >= scene.meshes.len() {
                return Err(AssetError::InvalidData(format!("mesh index {} out of range", mesh)));
            }
            instances.push(MeshInstance { mesh, transform });
        }
        stack.extend(node.children.iter().rev().map(|&child| (child, transform)));
    }

    Ok(instances)
}

/// Resolve each material's diffuse texture to a texture id, loading every
/// distinct file name once
pub fn resolve_material_textures<F>(materials: &[MaterialData], mut load: F) -> VulkanResult<Vec<Option<usize>>>
where
    F: FnMut(&str) -> VulkanResult<usize>,
{
    let mut loaded: HashMap<&str, usize> = HashMap::new();
    let mut resolved = Vec::with_capacity(materials.len());

    for material in materials {
        let id = match material.diffuse_texture.as_deref() {
            None => None,
            Some(file_name) => match loaded.get(file_name) {
                Some(&id) => Some(id),
                None => {
                    let id = load(file_name)?;
                    loaded.insert(file_name, id);
                    Some(id)
                }
            },
        };
        resolved.push(id);
    }

    Ok(resolved)
}

/// Ordered meshes and a root transform
pub struct Model<M = Mesh> {
    meshes: Vec<M>,
    transform: Mat4,
}

impl<M: Drawable> Model<M> {
    /// Model over `meshes`; a model must have at least one mesh
    pub fn new(meshes: Vec<M>) -> VulkanResult<Self> {
        if meshes.is_empty() {
            return Err(AssetError::InvalidData("model has no meshes".to_string()).into());
        }
        Ok(Self {
            meshes,
            transform: Mat4::identity(),
        })
    }

    /// Build one mesh per scene mesh instance. `make_mesh` receives the
    /// geometry and the texture id resolved for its material; the node
    /// transform is applied afterwards.
    pub fn from_scene<F>(scene: &SceneData, material_textures: &[Option<usize>], mut make_mesh: F) -> VulkanResult<Self>
    where
        F: FnMut(&MeshData) -> VulkanResult<M>,
    {
        let instances = flatten_scene(scene)?;
        let mut meshes = Vec::with_capacity(instances.len());

        for instance in instances {
            let data = &scene.meshes[instance.mesh];
            let texture_id = data
                .material
                .and_then(|material| material_textures.get(material).copied().flatten());

            let mut mesh = make_mesh(data)?;
            let info = mesh.info_mut();
            info.set_transform(instance.transform);
            info.set_texture_id(texture_id);
            meshes.push(mesh);
        }

        Self::new(meshes)
    }

    /// Number of meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Mesh by index
    pub fn get_mesh(&self, index: usize) -> VulkanResult<&M> {
        self.meshes.get(index).ok_or(VulkanError::MeshIndexOutOfRange {
            index,
            count: self.meshes.len(),
        })
    }

    /// All meshes in draw order
    pub fn meshes(&self) -> &[M] {
        &self.meshes
    }

    /// Root transform
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Replace the root transform
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SceneNode;
    use crate::foundation::math::Vec3;
    use crate::render::mesh::MeshInfo;
    use ash::vk;

    struct FakeMesh {
        info: MeshInfo,
    }

    impl Drawable for FakeMesh {
        fn info(&self) -> &MeshInfo {
            &self.info
        }
        fn info_mut(&mut self) -> &mut MeshInfo {
            &mut self.info
        }
        fn vertex_buffer(&self) -> vk::Buffer {
            vk::Buffer::null()
        }
        fn index_buffer(&self) -> Option<vk::Buffer> {
            None
        }
    }

    fn mesh_with(vertices: usize, material: Option<usize>) -> MeshData {
        MeshData {
            vertices: vec![Default::default(); vertices],
            indices: Vec::new(),
            material,
        }
    }

    fn fake(data: &MeshData) -> VulkanResult<FakeMesh> {
        Ok(FakeMesh {
            info: MeshInfo::new(data.vertices.len() as u32, data.indices.len() as u32),
        })
    }

    fn translation(x: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(x, 0.0, 0.0))
    }

    // root(0) -> [a(1) -> [c(3)], b(2)], meshes on every node
    fn tree() -> SceneData {
        SceneData {
            nodes: vec![
                SceneNode::new(vec![0], vec![1, 2]).with_transform(translation(1.0)),
                SceneNode::new(vec![1], vec![3]).with_transform(translation(2.0)),
                SceneNode::new(vec![2], vec![]),
                SceneNode::new(vec![3], vec![]).with_transform(translation(4.0)),
            ],
            roots: vec![0],
            meshes: (1..=4).map(|n| mesh_with(n, None)).collect(),
            materials: Vec::new(),
        }
    }

    #[test]
    fn test_flatten_is_preorder() {
        let order: Vec<usize> = flatten_scene(&tree()).unwrap().iter().map(|i| i.mesh).collect();
        assert_eq!(order, vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_flatten_accumulates_transforms() {
        let instances = flatten_scene(&tree()).unwrap();
        assert_eq!(instances[0].transform, translation(1.0));
        assert_eq!(instances[1].transform, translation(3.0));
        assert_eq!(instances[2].transform, translation(7.0));
        assert_eq!(instances[3].transform, translation(1.0));
    }

    #[test]
    fn test_flatten_rejects_dangling_child() {
        let mut scene = tree();
        scene.nodes[2].children.push(9);
        assert!(matches!(flatten_scene(&scene), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_duplicate_textures_load_once() {
        let materials = vec![
            MaterialData {
                name: None,
                diffuse_texture: Some("brick.png".to_string()),
            },
            MaterialData::default(),
            MaterialData {
                name: None,
                diffuse_texture: Some("brick.png".to_string()),
            },
            MaterialData {
                name: None,
                diffuse_texture: Some("wood.png".to_string()),
            },
        ];
        let mut loads = Vec::new();
        let ids = resolve_material_textures(&materials, |name| {
            loads.push(name.to_string());
            Ok(loads.len() - 1)
        })
        .unwrap();

        assert_eq!(ids, vec![Some(0), None, Some(0), Some(1)]);
        assert_eq!(loads, vec!["brick.png", "wood.png"]);
    }

    #[test]
    fn test_texture_load_failure_propagates() {
        let materials = vec![MaterialData {
            name: None,
            diffuse_texture: Some("missing.png".to_string()),
        }];
        let result = resolve_material_textures(&materials, |name| {
            Err(AssetError::NotFound(name.to_string()).into())
        });
        assert!(matches!(result, Err(VulkanError::Asset(AssetError::NotFound(_)))));
    }

    #[test]
    fn test_from_scene_assigns_textures_and_transforms() {
        let mut scene = tree();
        scene.meshes[1].material = Some(0);
        let model = Model::from_scene(&scene, &[Some(5)], fake).unwrap();

        assert_eq!(model.mesh_count(), 4);
        let second = model.get_mesh(1).unwrap().info();
        assert_eq!(second.texture_id(), Some(5));
        assert_eq!(second.vertex_count(), 2);
        assert_eq!(second.transform(), &translation(3.0));
        assert_eq!(model.get_mesh(0).unwrap().info().texture_id(), None);
    }

    #[test]
    fn test_empty_scene_is_an_error() {
        let scene = SceneData::default();
        assert!(Model::from_scene(&scene, &[], fake).is_err());
    }

    #[test]
    fn test_mesh_index_out_of_range() {
        let model = Model::from_scene(&tree(), &[], fake).unwrap();
        assert!(matches!(
            model.get_mesh(4),
            Err(VulkanError::MeshIndexOutOfRange { index: 4, count: 4 })
        ));
    }
}
