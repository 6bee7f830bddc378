//! Command buffer management
//!
//! `CommandPool` is an RAII pool. `CommandRecorder` wraps one command buffer
//! between begin and end; `ActiveRenderPass` ends its render pass on drop, so
//! a recorded pass can never be left open.

use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool for `queue_family_index`
    pub fn new(device: &Device, queue_family_index: u32, flags: vk::CommandPoolCreateFlags) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device: device.clone(),
            command_pool,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe { self.device.free_command_buffers(self.command_pool, command_buffers) };
    }

    /// Pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// A command buffer in the recording state
pub struct CommandRecorder<'d> {
    device: &'d Device,
    command_buffer: vk::CommandBuffer,
}

impl<'d> CommandRecorder<'d> {
    /// Begin recording into `command_buffer`
    pub fn begin(device: &'d Device, command_buffer: vk::CommandBuffer, flags: vk::CommandBufferUsageFlags) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }.map_err(VulkanError::Api)?;
        Ok(Self { device, command_buffer })
    }

    /// Raw handle, for commands the recorder does not wrap
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Begin a render pass with inline subpass contents
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> ActiveRenderPass<'_, 'd> {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        ActiveRenderPass { recorder: self }
    }

    /// Record an image memory barrier
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Finish recording
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(VulkanError::Api)?;
        Ok(self.command_buffer)
    }
}

/// Render pass scope; the pass ends when this is dropped
pub struct ActiveRenderPass<'r, 'd> {
    recorder: &'r mut CommandRecorder<'d>,
}

impl ActiveRenderPass<'_, '_> {
    fn device(&self) -> &Device {
        self.recorder.device
    }

    fn cmd(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer
    }

    /// Move on to the next subpass
    pub fn next_subpass(&mut self) {
        unsafe { self.device().cmd_next_subpass(self.cmd(), vk::SubpassContents::INLINE) };
    }

    /// Set viewport 0
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe { self.device().cmd_set_viewport(self.cmd(), 0, &[viewport]) };
    }

    /// Set scissor 0
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe { self.device().cmd_set_scissor(self.cmd(), 0, &[scissor]) };
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.cmd(), vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind descriptor sets starting at set 0
    pub fn bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.cmd(),
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
    }

    /// Bind one vertex buffer at binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe { self.device().cmd_bind_vertex_buffers(self.cmd(), 0, &[buffer], &[0]) };
    }

    /// Bind a `u32` index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.cmd(), buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Push constants at offset 0
    pub fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        unsafe { self.device().cmd_push_constants(self.cmd(), layout, stages, 0, data) };
    }

    /// Non-indexed draw of one instance
    pub fn draw(&mut self, vertex_count: u32) {
        unsafe { self.device().cmd_draw(self.cmd(), vertex_count, 1, 0, 0) };
    }

    /// Indexed draw of one instance
    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe { self.device().cmd_draw_indexed(self.cmd(), index_count, 1, 0, 0, 0) };
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe { self.device().cmd_end_render_pass(self.cmd()) };
    }
}
