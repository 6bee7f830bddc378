//! Capability negotiation
//!
//! Resolved once at startup from device features and format queries, then
//! handed to everything that builds pipelines or attachments.

use super::render_pass::AttachmentFormats;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use ash::vk;
use bitflags::bitflags;

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Format of the intermediate color attachment when supported
pub const INTERMEDIATE_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

bitflags! {
    /// Optional features the renderer adapts to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderCapabilities: u32 {
        /// Anisotropic texture filtering
        const SAMPLER_ANISOTROPY = 1 << 0;
        /// The chosen depth format carries a stencil aspect
        const DEPTH_STENCIL = 1 << 1;
    }
}

/// First candidate whose optimal-tiling features contain `required`
pub fn choose_supported_format<F>(candidates: &[vk::Format], required: vk::FormatFeatureFlags, features_of: F) -> VulkanResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatFeatureFlags,
{
    candidates
        .iter()
        .copied()
        .find(|&format| features_of(format).contains(required))
        .ok_or_else(|| VulkanError::NoSupportedFormat(candidates.to_vec()))
}

/// Whether a depth format also has a stencil aspect
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(format, vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT)
}

/// Formats and features the pipelines are built against
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Intermediate color attachment format
    pub color_format: vk::Format,
    /// Depth attachment format
    pub depth_format: vk::Format,
    /// Optional features in use
    pub capabilities: RenderCapabilities,
    /// Device limit for sampler anisotropy
    pub anisotropy_limit: f32,
}

impl PipelineConfig {
    /// Query the device behind `context`
    pub fn negotiate(context: &VulkanContext, swapchain_format: vk::Format) -> VulkanResult<Self> {
        let physical = context.physical_device();
        let anisotropy = (physical.features.sampler_anisotropy == vk::TRUE)
            .then_some(physical.properties.limits.max_sampler_anisotropy);

        let config = Self::from_queries(swapchain_format, anisotropy, |format| context.optimal_tiling_features(format))?;

        log::info!(
            "Pipeline config: color {:?}, depth {:?}, capabilities {:?}",
            config.color_format,
            config.depth_format,
            config.capabilities
        );
        Ok(config)
    }

    /// Resolve formats and capabilities from plain query results
    pub fn from_queries<F>(swapchain_format: vk::Format, max_anisotropy: Option<f32>, features_of: F) -> VulkanResult<Self>
    where
        F: Fn(vk::Format) -> vk::FormatFeatureFlags,
    {
        let color_format = choose_supported_format(
            &[INTERMEDIATE_COLOR_FORMAT, swapchain_format],
            vk::FormatFeatureFlags::COLOR_ATTACHMENT,
            &features_of,
        )?;
        let depth_format = choose_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            &features_of,
        )?;

        let mut capabilities = RenderCapabilities::empty();
        capabilities.set(RenderCapabilities::SAMPLER_ANISOTROPY, max_anisotropy.is_some());
        capabilities.set(RenderCapabilities::DEPTH_STENCIL, has_stencil_component(depth_format));

        Ok(Self {
            color_format,
            depth_format,
            capabilities,
            anisotropy_limit: max_anisotropy.unwrap_or(1.0),
        })
    }

    /// Anisotropy for texture samplers, `None` when the device lacks it
    pub fn sampler_anisotropy(&self) -> Option<f32> {
        self.capabilities
            .contains(RenderCapabilities::SAMPLER_ANISOTROPY)
            .then_some(self.anisotropy_limit)
    }

    /// Render pass formats for a swapchain of `swapchain_format`
    pub fn attachment_formats(&self, swapchain_format: vk::Format) -> AttachmentFormats {
        AttachmentFormats {
            swapchain: swapchain_format,
            color: self.color_format,
            depth: self.depth_format,
            depth_stencil: self.capabilities.contains(RenderCapabilities::DEPTH_STENCIL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(supported: &'static [vk::Format], features: vk::FormatFeatureFlags) -> impl Fn(vk::Format) -> vk::FormatFeatureFlags {
        move |format| {
            if supported.contains(&format) {
                features
            } else {
                vk::FormatFeatureFlags::empty()
            }
        }
    }

    #[test]
    fn test_first_supported_depth_format() {
        let query = only(&[vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT], vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT);
        let format = choose_supported_format(&DEPTH_FORMAT_CANDIDATES, vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT, query).unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_no_supported_format() {
        let query = only(&[], vk::FormatFeatureFlags::empty());
        let result = choose_supported_format(&DEPTH_FORMAT_CANDIDATES, vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT, query);
        assert!(matches!(result, Err(VulkanError::NoSupportedFormat(ref list)) if list.len() == 3));
    }

    #[test]
    fn test_pipeline_config_from_queries() {
        let features = |format: vk::Format| match format {
            vk::Format::B8G8R8A8_UNORM => vk::FormatFeatureFlags::COLOR_ATTACHMENT,
            vk::Format::D32_SFLOAT_S8_UINT => vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            _ => vk::FormatFeatureFlags::empty(),
        };
        let config = PipelineConfig::from_queries(vk::Format::B8G8R8A8_UNORM, Some(16.0), features).unwrap();
        assert_eq!(config.color_format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(config.depth_format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(
            config.capabilities,
            RenderCapabilities::SAMPLER_ANISOTROPY | RenderCapabilities::DEPTH_STENCIL
        );
        assert_eq!(config.sampler_anisotropy(), Some(16.0));
        assert!(config.attachment_formats(vk::Format::B8G8R8A8_UNORM).depth_stencil);
    }

    #[test]
    fn test_depth_only_format_skips_stencil() {
        let features = |format: vk::Format| match format {
            vk::Format::D32_SFLOAT => vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            _ => vk::FormatFeatureFlags::COLOR_ATTACHMENT,
        };
        let config = PipelineConfig::from_queries(vk::Format::B8G8R8A8_UNORM, None, features).unwrap();
        assert!(!config.capabilities.contains(RenderCapabilities::DEPTH_STENCIL));
        let formats = config.attachment_formats(vk::Format::B8G8R8A8_UNORM);
        assert!(!formats.depth_stencil);
        assert_eq!(formats.depth, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_intermediate_prefers_rgba8() {
        let features = |_format: vk::Format| vk::FormatFeatureFlags::COLOR_ATTACHMENT | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        let config = PipelineConfig::from_queries(vk::Format::B8G8R8A8_UNORM, None, features).unwrap();
        assert_eq!(config.color_format, INTERMEDIATE_COLOR_FORMAT);
        assert!(!config.capabilities.contains(RenderCapabilities::SAMPLER_ANISOTROPY));
        assert_eq!(config.sampler_anisotropy(), None);
    }
}
