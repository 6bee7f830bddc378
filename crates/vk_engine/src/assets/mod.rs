//! Asset loading adapters
//!
//! Thin wrappers over the `image` and `gltf` crates plus SPIR-V reading. They
//! only turn files into plain CPU-side data; nothing here touches the GPU.

pub mod image_loader;
pub mod scene_loader;
pub mod shader_loader;

pub use image_loader::ImageData;
pub use scene_loader::{texture_file_name, MaterialData, MeshData, SceneData, SceneNode};
pub use shader_loader::{parse_spirv, read_spirv};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Unsupported asset format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// glTF parsing or buffer import failed
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
