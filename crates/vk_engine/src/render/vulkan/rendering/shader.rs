//! Shader modules and graphics pipelines
//!
//! Both pipelines share one fixed-function setup: triangle lists, dynamic
//! viewport and scissor, no blending. They differ in vertex input, depth
//! state, layout and the subpass they run in.

use super::vertex_layout;
use super::render_pass::{COMPOSITION_SUBPASS, SCENE_SUBPASS};
use crate::assets::read_spirv;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};
use std::ffi::CStr;
use std::path::Path;

const ENTRY_POINT: &CStr = c"main";

/// SPIR-V shader module with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V words
    pub fn from_words(device: &Device, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Load a compiled SPIR-V file
    pub fn from_file(device: &Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let words = read_spirv(path)?;
        log::debug!("Loaded shader {:?} ({} words)", path, words.len());
        Self::from_words(device, &words)
    }

    /// Module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

/// Pipeline layout with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a layout from set layouts and push constant ranges
    pub fn new(
        device: &Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            device: device.clone(),
            layout,
        })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline_layout(self.layout, None) };
    }
}

/// Push constant range carrying one `T` to the vertex stage
pub fn vertex_push_constant<T>() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: std::mem::size_of::<T>() as u32,
    }
}

/// Per-pipeline state that is not shared
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc {
    /// Subpass index within the render pass
    pub subpass: u32,
    /// Read `Vertex` data from binding 0
    pub vertex_input: bool,
    /// Depth test and write
    pub depth_test: bool,
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
}

impl PipelineDesc {
    /// Scene geometry into the color and depth attachments
    pub fn scene() -> Self {
        Self {
            subpass: SCENE_SUBPASS,
            vertex_input: true,
            depth_test: true,
            cull_mode: vk::CullModeFlags::BACK,
        }
    }

    /// Fullscreen triangle reading the input attachments
    pub fn composition() -> Self {
        Self {
            subpass: COMPOSITION_SUBPASS,
            vertex_input: false,
            depth_test: false,
            cull_mode: vk::CullModeFlags::NONE,
        }
    }
}

/// Graphics pipeline that owns its layout
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
}

impl GraphicsPipeline {
    /// Build a pipeline for `render_pass`
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        layout: PipelineLayout,
        desc: PipelineDesc,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [vertex_layout::binding_description()];
        let attributes = vertex_layout::attribute_descriptions();
        let vertex_input = if desc.vertex_input {
            vk::PipelineVertexInputStateCreateInfo::builder()
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes)
                .build()
        } else {
            vk::PipelineVertexInputStateCreateInfo::default()
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(desc.subpass);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        }
        .map_err(|(_, err)| VulkanError::Api(err))?;

        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            VulkanError::InitializationFailed("driver returned no graphics pipeline".to_string())
        })?;
        log::debug!("Created graphics pipeline for subpass {}", desc.subpass);

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
        })
    }

    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.pipeline, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_range_size() {
        let range = vertex_push_constant::<[[f32; 4]; 4]>();
        assert_eq!(range.size, 64);
        assert_eq!(range.offset, 0);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_pipeline_descs() {
        let scene = PipelineDesc::scene();
        let composition = PipelineDesc::composition();
        assert_eq!(scene.subpass, SCENE_SUBPASS);
        assert!(scene.vertex_input && scene.depth_test);
        assert_eq!(composition.subpass, COMPOSITION_SUBPASS);
        assert!(!composition.vertex_input && !composition.depth_test);
    }
}
