//! One-shot transfer submissions
//!
//! Every operation here records a single command buffer, submits it and waits
//! for the queue to go idle before returning. Meant for load-time uploads.

use super::buffer::GpuBuffer;
use crate::render::vulkan::rendering::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use ash::{vk, Device};

/// Stage and access masks for one image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout the image is in
    pub old: vk::ImageLayout,
    /// Layout the image moves to
    pub new: vk::ImageLayout,
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

const LAYOUT_TRANSITIONS: [LayoutTransition; 2] = [
    LayoutTransition {
        old: vk::ImageLayout::UNDEFINED,
        new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    },
    LayoutTransition {
        old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::SHADER_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
    },
];

/// Look up the barrier parameters for `old -> new`
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<LayoutTransition> {
    LAYOUT_TRANSITIONS
        .iter()
        .find(|t| t.old == old && t.new == new)
        .copied()
        .ok_or(VulkanError::UnsupportedLayoutTransition { old, new })
}

/// Device, queue and transient pool used for load-time uploads
pub struct TransferContext {
    pool: CommandPool,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: Device,
}

impl TransferContext {
    /// Use the graphics queue, which always supports transfers
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.device().clone();
        let pool = CommandPool::new(&device, context.graphics_family()?, vk::CommandPoolCreateFlags::TRANSIENT)?;
        Ok(Self {
            pool,
            queue: context.graphics_queue(),
            memory_properties: *context.memory_properties(),
            device,
        })
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Memory properties of the physical device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Create a buffer on this device
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<GpuBuffer> {
        GpuBuffer::new(&self.device, &self.memory_properties, size, usage, properties)
    }

    /// Allocate, record, submit, wait, free
    pub fn one_time_submit<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder<'_>),
    {
        let command_buffers = self.pool.allocate_command_buffers(1)?;
        let result = self.record_and_submit(command_buffers[0], record);
        self.pool.free_command_buffers(&command_buffers);
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder<'_>),
    {
        let mut recorder = CommandRecorder::begin(&self.device, command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder);
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device.queue_wait_idle(self.queue).map_err(VulkanError::Api)
        }
    }

    /// Copy `size` bytes from the start of `src` to the start of `dst`
    pub fn copy_buffer(&self, src: &GpuBuffer, dst: &GpuBuffer, size: vk::DeviceSize) -> VulkanResult<()> {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.one_time_submit(|recorder| unsafe {
            self.device
                .cmd_copy_buffer(recorder.handle(), src.handle(), dst.handle(), &[region]);
        })
    }

    /// Copy tightly packed pixels from `src` into a color image in
    /// `TRANSFER_DST_OPTIMAL`
    pub fn copy_buffer_to_image(&self, src: &GpuBuffer, image: vk::Image, width: u32, height: u32) -> VulkanResult<()> {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 })
            .build();

        self.one_time_submit(|recorder| unsafe {
            self.device.cmd_copy_buffer_to_image(
                recorder.handle(),
                src.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })
    }

    /// Move a color image between layouts listed in the transition table
    pub fn transition_image_layout(&self, image: vk::Image, old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<()> {
        let transition = layout_transition(old, new)?;
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access)
            .build();

        self.one_time_submit(|recorder| {
            recorder.pipeline_barrier(transition.src_stage, transition.dst_stage, barrier);
        })
    }

    /// Upload `data` into a new device-local buffer through a host-visible
    /// staging buffer. The staging buffer is dropped before returning.
    pub fn upload_buffer<T: bytemuck::Pod>(&self, data: &[T], usage: vk::BufferUsageFlags) -> VulkanResult<GpuBuffer> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot upload an empty buffer".to_string(),
            });
        }

        let staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write(data)?;

        let buffer = self.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.copy_buffer(&staging, &buffer, size)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transition() {
        let t = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_shader_read_transition() {
        let t = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unlisted_pair_is_rejected() {
        let result = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(matches!(
            result,
            Err(VulkanError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
        ));
        assert!(layout_transition(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        )
        .is_err());
    }
}
