//! Framebuffers and the per-image attachments they reference

use crate::render::vulkan::resources::{GpuImage, ImageDesc};
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over `attachments` in render pass order
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device: device.clone(),
            framebuffer,
        })
    }

    /// Framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_framebuffer(self.framebuffer, None) };
    }
}

/// Usage of the intermediate color attachment
pub const COLOR_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw(),
);

/// Usage of the depth attachment
pub const DEPTH_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT.as_raw() | vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw(),
);

/// Image descriptions for one swapchain image's color and depth attachments
pub fn attachment_descs(extent: vk::Extent2D, color_format: vk::Format, depth_format: vk::Format) -> (ImageDesc, ImageDesc) {
    let color = ImageDesc {
        width: extent.width,
        height: extent.height,
        format: color_format,
        usage: COLOR_USAGE,
        aspect: vk::ImageAspectFlags::COLOR,
    };
    // Input attachment views may only expose the depth aspect.
    let depth = ImageDesc {
        width: extent.width,
        height: extent.height,
        format: depth_format,
        usage: DEPTH_USAGE,
        aspect: vk::ImageAspectFlags::DEPTH,
    };
    (color, depth)
}

/// Color and depth attachment owned by one swapchain image
pub struct FrameAttachments {
    /// Intermediate color target of the scene subpass
    pub color: GpuImage,
    /// Depth target of the scene subpass
    pub depth: GpuImage,
}

impl FrameAttachments {
    /// Create both attachments at `extent`
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let (color_desc, depth_desc) = attachment_descs(extent, color_format, depth_format);
        Ok(Self {
            color: GpuImage::new(device, memory_properties, color_desc)?,
            depth: GpuImage::new(device, memory_properties, depth_desc)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachments_are_readable_as_inputs() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let (color, depth) = attachment_descs(extent, vk::Format::R8G8B8A8_UNORM, vk::Format::D32_SFLOAT);
        assert!(color.usage.contains(vk::ImageUsageFlags::INPUT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(depth.usage.contains(vk::ImageUsageFlags::INPUT_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!((color.width, color.height), (800, 600));
    }
}
