//! glTF scene extraction
//!
//! Flattens a glTF document into index-linked nodes, drawable primitives and
//! materials. Each glTF primitive becomes one `MeshData`; a node refers to the
//! primitives of its glTF mesh by index.

use crate::assets::AssetError;
use crate::foundation::math::Mat4;
use crate::render::mesh::Vertex;
use std::ops::Range;
use std::path::Path;

const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];
const DEFAULT_UV: [f32; 2] = [0.0, 0.0];

/// CPU-side geometry of one drawable surface
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Interleaved vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices; empty means non-indexed drawing
    pub indices: Vec<u32>,
    /// Index into `SceneData::materials`
    pub material: Option<usize>,
}

/// Material information the renderer cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialData {
    /// Material name, when the file provides one
    pub name: Option<String>,
    /// File name of the base color texture
    pub diffuse_texture: Option<String>,
}

/// One node of the scene hierarchy
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Indices into `SceneData::meshes`
    pub meshes: Vec<usize>,
    /// Indices into `SceneData::nodes`
    pub children: Vec<usize>,
    /// Local transform relative to the parent
    pub transform: Mat4,
}

impl SceneNode {
    /// Node with an identity transform
    pub fn new(meshes: Vec<usize>, children: Vec<usize>) -> Self {
        Self {
            meshes,
            children,
            transform: Mat4::identity(),
        }
    }

    /// Replace the local transform
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// A loaded scene, independent of the file format
#[derive(Debug, Clone, Default)]
pub struct SceneData {
    /// All nodes
    pub nodes: Vec<SceneNode>,
    /// Root nodes in draw order
    pub roots: Vec<usize>,
    /// All drawable primitives
    pub meshes: Vec<MeshData>,
    /// All materials
    pub materials: Vec<MaterialData>,
}

impl SceneData {
    /// Load a `.gltf` or `.glb` file, importing its buffers but not its images
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let gltf::Gltf { document, blob } = gltf::Gltf::open(path)?;
        let buffers = gltf::import_buffers(&document, path.parent(), blob)?;
        let scene = Self::from_gltf(&document, &buffers)?;

        log::debug!(
            "Parsed {:?}: {} nodes, {} primitives, {} materials",
            path,
            scene.nodes.len(),
            scene.meshes.len(),
            scene.materials.len()
        );
        Ok(scene)
    }

    /// Extract scene data from an already parsed document
    pub fn from_gltf(document: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Result<Self, AssetError> {
        let mut meshes = Vec::new();
        let mut primitive_ranges: Vec<Range<usize>> = Vec::new();

        for mesh in document.meshes() {
            let start = meshes.len();
            for primitive in mesh.primitives() {
                meshes.push(read_primitive(&primitive, buffers)?);
            }
            primitive_ranges.push(start..meshes.len());
        }

        let nodes = document
            .nodes()
            .map(|node| SceneNode {
                meshes: node
                    .mesh()
                    .and_then(|mesh| primitive_ranges.get(mesh.index()).cloned())
                    .map(Iterator::collect)
                    .unwrap_or_default(),
                children: node.children().map(|child| child.index()).collect(),
                transform: Mat4::from(node.transform().matrix()),
            })
            .collect::<Vec<_>>();

        let roots = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().map(|node| node.index()).collect(),
            None => parentless_nodes(&nodes),
        };

        let materials = document
            .materials()
            .map(|material| MaterialData {
                name: material.name().map(str::to_string),
                diffuse_texture: material
                    .pbr_metallic_roughness()
                    .base_color_texture()
                    .and_then(|info| match info.texture().source().source() {
                        gltf::image::Source::Uri { uri, .. } => texture_file_name(uri),
                        gltf::image::Source::View { .. } => {
                            log::warn!("Embedded texture images are not supported; using the default texture");
                            None
                        }
                    }),
            })
            .collect();

        Ok(Self {
            nodes,
            roots,
            meshes,
            materials,
        })
    }
}

fn read_primitive(primitive: &gltf::Primitive<'_>, buffers: &[gltf::buffer::Data]) -> Result<MeshData, AssetError> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        return Err(AssetError::UnsupportedFormat(format!(
            "primitive mode {:?}, only triangle lists are supported",
            primitive.mode()
        )));
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| AssetError::InvalidData("primitive without POSITION attribute".to_string()))?
        .collect();
    let count = positions.len();

    let colors: Vec<[f32; 3]> = reader
        .read_colors(0)
        .map_or_else(|| vec![DEFAULT_COLOR; count], |colors| colors.into_rgb_f32().collect());
    let tex_coords: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map_or_else(|| vec![DEFAULT_UV; count], |uvs| uvs.into_f32().collect());

    if colors.len() != count || tex_coords.len() != count {
        return Err(AssetError::InvalidData("vertex attribute counts differ".to_string()));
    }

    let vertices = positions
        .into_iter()
        .zip(colors)
        .zip(tex_coords)
        .map(|((position, color), tex_coord)| Vertex::new(position, color, tex_coord))
        .collect();

    let indices: Vec<u32> = reader
        .read_indices()
        .map(|indices| indices.into_u32().collect())
        .unwrap_or_default();

    if let Some(&bad) = indices.iter().find(|&&index| index as usize >= count) {
        return Err(AssetError::InvalidData(format!("index {} out of range for {} vertices", bad, count)));
    }

    Ok(MeshData {
        vertices,
        indices,
        material: primitive.material().index(),
    })
}

fn parentless_nodes(nodes: &[SceneNode]) -> Vec<usize> {
    let mut has_parent = vec![false; nodes.len()];
    for child in nodes.iter().flat_map(|node| node.children.iter()) {
        if let Some(flag) = has_parent.get_mut(*child) {
            *flag = true;
        }
    }
    (0..nodes.len()).filter(|&index| !has_parent[index]).collect()
}

/// Last path segment of a texture URI, accepting both `/` and `\`
/// separators. Returns `None` for an empty name or an inline `data:` URI.
pub fn texture_file_name(uri: &str) -> Option<String> {
    if uri.starts_with("data:") {
        return None;
    }
    uri.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "nodes": [0] } ],
        "nodes": [
            { "children": [1], "translation": [1.0, 0.0, 0.0] },
            { "mesh": 0 }
        ],
        "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 } ] } ],
        "materials": [ { "name": "brick", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } } ],
        "textures": [ { "source": 0 } ],
        "images": [ { "uri": "textures/brick.png" } ],
        "buffers": [ {
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        } ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    #[test]
    fn test_texture_file_name_separators() {
        assert_eq!(texture_file_name("textures/brick.png").as_deref(), Some("brick.png"));
        assert_eq!(texture_file_name("C:\\art\\wood.jpg").as_deref(), Some("wood.jpg"));
        assert_eq!(texture_file_name("mixed/dir\\stone.png").as_deref(), Some("stone.png"));
        assert_eq!(texture_file_name("plain.png").as_deref(), Some("plain.png"));
        assert_eq!(texture_file_name("trailing/"), None);
        assert_eq!(texture_file_name(""), None);
        assert_eq!(texture_file_name("data:image/png;base64,AAAA"), None);
    }

    #[test]
    fn test_parentless_nodes_are_roots() {
        let nodes = vec![
            SceneNode::new(vec![], vec![2]),
            SceneNode::new(vec![], vec![]),
            SceneNode::new(vec![], vec![]),
        ];
        assert_eq!(parentless_nodes(&nodes), vec![0, 1]);
    }

    #[test]
    fn test_load_triangle_scene() {
        let path = std::env::temp_dir().join(format!("vk_engine_triangle_{}.gltf", std::process::id()));
        std::fs::write(&path, TRIANGLE_GLTF).unwrap();
        let scene = SceneData::load(&path);
        let _ = std::fs::remove_file(&path);
        let scene = scene.unwrap();

        assert_eq!(scene.roots, vec![0]);
        assert_eq!(scene.nodes[0].children, vec![1]);
        assert_eq!(scene.nodes[1].meshes, vec![0]);
        assert_relative_eq!(scene.nodes[0].transform[(0, 3)], 1.0);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.material, Some(0));
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[1].color, DEFAULT_COLOR);
        assert_eq!(mesh.vertices[1].tex_coord, DEFAULT_UV);

        assert_eq!(scene.materials[0].name.as_deref(), Some("brick"));
        assert_eq!(scene.materials[0].diffuse_texture.as_deref(), Some("brick.png"));
    }

    #[test]
    fn test_missing_scene_file() {
        assert!(matches!(SceneData::load("nope.gltf"), Err(AssetError::NotFound(_))));
    }
}
