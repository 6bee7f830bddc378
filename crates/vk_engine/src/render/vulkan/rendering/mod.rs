//! Render pass, pipelines and command recording

pub mod capabilities;
pub mod commands;
pub mod render_pass;
pub mod shader;
pub mod vertex_layout;

pub use capabilities::{PipelineConfig, RenderCapabilities};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use render_pass::{AttachmentFormats, RenderPass};
pub use shader::{GraphicsPipeline, PipelineDesc, PipelineLayout, ShaderModule};
