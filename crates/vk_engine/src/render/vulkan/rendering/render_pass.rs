//! Two-subpass render pass
//!
//! Attachment 0 is the swapchain image, 1 the intermediate color target and
//! 2 the depth buffer. Subpass 0 draws the scene into 1 and 2; subpass 1 reads
//! both as input attachments and writes the final image into 0.

use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Attachment index of the swapchain image
pub const SWAPCHAIN_ATTACHMENT: u32 = 0;
/// Attachment index of the intermediate color target
pub const COLOR_ATTACHMENT: u32 = 1;
/// Attachment index of the depth buffer
pub const DEPTH_ATTACHMENT: u32 = 2;

/// Subpass that draws the scene
pub const SCENE_SUBPASS: u32 = 0;
/// Subpass that composes the final image
pub const COMPOSITION_SUBPASS: u32 = 1;

/// Formats of the three attachments
#[derive(Debug, Clone, Copy)]
pub struct AttachmentFormats {
    /// Swapchain image format
    pub swapchain: vk::Format,
    /// Intermediate color format
    pub color: vk::Format,
    /// Depth format
    pub depth: vk::Format,
    /// The depth format has a stencil aspect
    pub depth_stencil: bool,
}

fn attachment(format: vk::Format, store_op: vk::AttachmentStoreOp, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(store_op)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
        .build()
}

/// Descriptions in attachment index order
pub fn attachment_descriptions(formats: AttachmentFormats) -> [vk::AttachmentDescription; 3] {
    let mut depth = attachment(
        formats.depth,
        vk::AttachmentStoreOp::DONT_CARE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );
    // Stencil is cleared along with depth.
    if formats.depth_stencil {
        depth.stencil_load_op = vk::AttachmentLoadOp::CLEAR;
    }
    [
        attachment(formats.swapchain, vk::AttachmentStoreOp::STORE, vk::ImageLayout::PRESENT_SRC_KHR),
        attachment(formats.color, vk::AttachmentStoreOp::DONT_CARE, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        depth,
    ]
}

/// External -> scene -> composition -> external
pub fn subpass_dependencies() -> [vk::SubpassDependency; 3] {
    [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(SCENE_SUBPASS)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(SCENE_SUBPASS)
            .dst_subpass(COMPOSITION_SUBPASS)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(COMPOSITION_SUBPASS)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .build(),
    ]
}

/// Layout the composition subpass reads its input attachments in
pub const INPUT_ATTACHMENT_LAYOUT: vk::ImageLayout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Build the scene + composition render pass
    pub fn new(device: &Device, formats: AttachmentFormats) -> VulkanResult<Self> {
        let attachments = attachment_descriptions(formats);

        let scene_color = [vk::AttachmentReference {
            attachment: COLOR_ATTACHMENT,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let scene_depth = vk::AttachmentReference {
            attachment: DEPTH_ATTACHMENT,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let composition_color = [vk::AttachmentReference {
            attachment: SWAPCHAIN_ATTACHMENT,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let composition_inputs = [
            vk::AttachmentReference {
                attachment: COLOR_ATTACHMENT,
                layout: INPUT_ATTACHMENT_LAYOUT,
            },
            vk::AttachmentReference {
                attachment: DEPTH_ATTACHMENT,
                layout: INPUT_ATTACHMENT_LAYOUT,
            },
        ];

        let subpasses = [
            vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&scene_color)
                .depth_stencil_attachment(&scene_depth)
                .build(),
            vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&composition_color)
                .input_attachments(&composition_inputs)
                .build(),
        ];
        let dependencies = subpass_dependencies();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None) }.map_err(VulkanError::Api)?;
        log::debug!("Created render pass for {:?}", formats);

        Ok(Self {
            device: device.clone(),
            render_pass,
        })
    }

    /// Render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.destroy_render_pass(self.render_pass, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_layouts() {
        let formats = AttachmentFormats {
            swapchain: vk::Format::B8G8R8A8_UNORM,
            color: vk::Format::R8G8B8A8_UNORM,
            depth: vk::Format::D32_SFLOAT,
            depth_stencil: false,
        };
        let attachments = attachment_descriptions(formats);
        let swapchain = &attachments[SWAPCHAIN_ATTACHMENT as usize];
        assert_eq!(swapchain.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(swapchain.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(swapchain.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachments[COLOR_ATTACHMENT as usize].format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(attachments[DEPTH_ATTACHMENT as usize].format, vk::Format::D32_SFLOAT);
        assert!(attachments.iter().all(|a| a.initial_layout == vk::ImageLayout::UNDEFINED));
        assert_eq!(attachments[DEPTH_ATTACHMENT as usize].stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_stencil_cleared_with_stencil_format() {
        let formats = AttachmentFormats {
            swapchain: vk::Format::B8G8R8A8_UNORM,
            color: vk::Format::R8G8B8A8_UNORM,
            depth: vk::Format::D24_UNORM_S8_UINT,
            depth_stencil: true,
        };
        let attachments = attachment_descriptions(formats);
        assert_eq!(attachments[DEPTH_ATTACHMENT as usize].stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments[COLOR_ATTACHMENT as usize].stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_dependency_chain() {
        let deps = subpass_dependencies();
        let chain: Vec<(u32, u32)> = deps.iter().map(|d| (d.src_subpass, d.dst_subpass)).collect();
        assert_eq!(
            chain,
            vec![
                (vk::SUBPASS_EXTERNAL, SCENE_SUBPASS),
                (SCENE_SUBPASS, COMPOSITION_SUBPASS),
                (COMPOSITION_SUBPASS, vk::SUBPASS_EXTERNAL),
            ]
        );
        assert!(deps[1].dst_access_mask.contains(vk::AccessFlags::INPUT_ATTACHMENT_READ));
    }
}
