//! Configuration system
//!
//! Renderer, window, shader and scene settings. Every struct has a `Default`
//! and `#[serde(default)]`, so a config file only needs the fields it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match extension_of(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension_of(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Window creation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Viewer".to_string(),
            width: 1366,
            height: 768,
        }
    }
}

/// SPIR-V file locations for the two pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Directory holding the compiled shaders
    pub directory: PathBuf,
    /// Scene pass vertex shader
    pub scene_vertex: String,
    /// Scene pass fragment shader
    pub scene_fragment: String,
    /// Composition pass vertex shader
    pub composition_vertex: String,
    /// Composition pass fragment shader
    pub composition_fragment: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("target/shaders"),
            scene_vertex: "scene.vert.spv".to_string(),
            scene_fragment: "scene.frag.spv".to_string(),
            composition_vertex: "composition.vert.spv".to_string(),
            composition_fragment: "composition.frag.spv".to_string(),
        }
    }
}

impl ShaderConfig {
    /// Full path of a shader file in the configured directory
    pub fn path(&self, file: &str) -> PathBuf {
        self.directory.join(file)
    }

    /// Point `directory` at the first candidate that contains the scene
    /// vertex shader, so the viewer runs from the workspace root or a crate dir
    pub fn with_path_resolution(mut self) -> Self {
        let candidates = [
            self.directory.clone(),
            PathBuf::from("target/shaders"),
            PathBuf::from("../target/shaders"),
            PathBuf::from("shaders"),
        ];

        if let Some(dir) = candidates.into_iter().find(|dir| dir.join(&self.scene_vertex).exists()) {
            self.directory = dir;
        }
        self
    }

    /// Check that every configured shader file exists
    pub fn validate(&self) -> Result<(), String> {
        for file in [
            &self.scene_vertex,
            &self.scene_fragment,
            &self.composition_vertex,
            &self.composition_fragment,
        ] {
            let path = self.path(file);
            if !path.exists() {
                return Err(format!("Shader not found: {}", path.display()));
            }
        }
        Ok(())
    }
}

/// Scene content and camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// glTF file to load at startup
    pub model_path: PathBuf,
    /// Directory searched for texture images named by materials
    pub texture_dir: PathBuf,
    /// Capacity of the texture table, including the default white texture
    pub max_textures: u32,
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Near clip plane
    pub near_plane: f32,
    /// Far clip plane
    pub far_plane: f32,
    /// Camera position
    pub camera_eye: [f32; 3],
    /// Point the camera looks at
    pub camera_target: [f32; 3],
    /// Spin speed of the demo model in radians per second
    pub spin_speed: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("resources/models/scene.gltf"),
            texture_dir: PathBuf::from("resources/textures"),
            max_textures: 32,
            fov_y_degrees: 45.0,
            near_plane: 0.1,
            far_plane: 100.0,
            camera_eye: [0.0, 0.0, 20.0],
            camera_target: [0.0, 0.0, -2.0],
            spin_speed: 0.5,
        }
    }
}

/// Top-level renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name passed to instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Window settings
    pub window: WindowConfig,
    /// Shader settings
    pub shaders: ShaderConfig,
    /// Scene settings
    pub scene: SceneConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Viewer".to_string(),
            application_version: (1, 0, 0),
            enable_validation: None,
            window: WindowConfig::default(),
            shaders: ShaderConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Create a configuration with defaults and the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Set the scene file to load
    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.scene.model_path = path.into();
        self
    }

    /// Force validation layers on or off
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Whether validation should be enabled, falling back to debug builds
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "demo"

            [scene]
            model_path = "models/box.gltf"
            max_textures = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "demo");
        assert_eq!(config.scene.model_path, PathBuf::from("models/box.gltf"));
        assert_eq!(config.scene.max_textures, 8);
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.shaders, ShaderConfig::default());
    }

    #[test]
    fn test_validation_override() {
        let config = RendererConfig::default().with_validation(false);
        assert!(!config.validation_enabled());
        let config = RendererConfig::default();
        assert_eq!(config.validation_enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = std::env::temp_dir().join(format!("vk_engine_config_{}.ron", std::process::id()));
        let config = RendererConfig::new("ron test").with_model("a/b.gltf");
        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = RendererConfig::default().save_to_file("config.json").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_shader_paths() {
        let shaders = ShaderConfig::default();
        assert_eq!(shaders.path("x.spv"), PathBuf::from("target/shaders/x.spv"));
    }
}
