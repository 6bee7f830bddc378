//! Vulkan swapchain management
//!
//! The `choose_*` functions are the whole negotiation policy and take plain
//! query results, so they run without a device. `Swapchain` is the RAII owner
//! of one swapchain generation and its image views.

use super::super::resources::image::create_image_view;
use crate::render::vulkan::initialization::{QueueFamilyIndices, Surface};
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

/// Formats preferred for the swapchain, in order
pub const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// Surface capabilities, formats and present modes of one device/surface pair
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Surface capabilities
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query the surface for `physical_device`
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> VulkanResult<Self> {
        Ok(Self {
            capabilities: surface.capabilities(physical_device)?,
            formats: surface.formats(physical_device)?,
            present_modes: surface.present_modes(physical_device)?,
        })
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Pick the surface format. A single `UNDEFINED` entry means the surface
/// accepts anything.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    let preferred = vk::SurfaceFormatKHR {
        format: PREFERRED_FORMATS[0],
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    match formats {
        [] => Err(VulkanError::InitializationFailed("Surface reports no formats".to_string())),
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        _ => Ok(formats
            .iter()
            .find(|f| PREFERRED_FORMATS.contains(&f.format) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
            .unwrap_or(formats[0])),
    }
}

/// `MAILBOX` when listed, otherwise `FIFO`, which is always available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's fixed extent, or the framebuffer size clamped to the
/// supported range when the surface follows the window
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Sharing mode and the family list to pass with it
pub fn choose_sharing(families: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match families.pair() {
        Some((graphics, present)) if graphics != present => (vk::SharingMode::CONCURRENT, vec![graphics, present]),
        _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
}

/// Everything negotiated for one swapchain generation
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    /// Surface format
    pub surface_format: vk::SurfaceFormatKHR,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Requested image count
    pub image_count: u32,
    /// Transform to pass through
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    /// Same format, color space, present mode, extent and image count
    pub fn matches(&self, other: &Self) -> bool {
        self.surface_format.format == other.surface_format.format
            && self.surface_format.color_space == other.surface_format.color_space
            && self.present_mode == other.present_mode
            && self.extent.width == other.extent.width
            && self.extent.height == other.extent.height
            && self.image_count == other.image_count
    }

    /// Apply the negotiation policy to a support query
    pub fn negotiate(support: &SwapchainSupport, framebuffer_size: (u32, u32)) -> VulkanResult<Self> {
        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, framebuffer_size),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// A swapchain image and its view
#[derive(Debug, Clone, Copy)]
pub struct SwapchainImage {
    /// Image owned by the swapchain
    pub image: vk::Image,
    /// View owned by `Swapchain`
    pub view: vk::ImageView,
}

/// Swapchain wrapper with RAII cleanup of the views and the swapchain
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<SwapchainImage>,
    settings: SwapchainSettings,
}

impl Swapchain {
    /// Query support fresh, negotiate settings and create the swapchain
    pub fn new(context: &VulkanContext, framebuffer_size: (u32, u32)) -> VulkanResult<Self> {
        let support = SwapchainSupport::query(context.surface(), context.physical_device().device)?;
        let settings = SwapchainSettings::negotiate(&support, framebuffer_size)?;
        let (sharing_mode, family_indices) = choose_sharing(context.queue_families());

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface().handle())
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = context.swapchain_loader().clone();
        let device = context.device().clone();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(VulkanError::Api)?;

        // From here on Drop cleans up whatever has been created.
        let mut this = Self {
            device,
            loader,
            swapchain,
            images: Vec::new(),
            settings,
        };

        let images = unsafe { this.loader.get_swapchain_images(this.swapchain) }.map_err(VulkanError::Api)?;
        for image in images {
            let view = create_image_view(
                &this.device,
                image,
                settings.surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            this.images.push(SwapchainImage { image, view });
        }

        log::info!(
            "Created swapchain: {} images, {:?}/{:?}, {:?}, {}x{}",
            this.images.len(),
            settings.surface_format.format,
            settings.surface_format.color_space,
            settings.present_mode,
            settings.extent.width,
            settings.extent.height
        );

        Ok(this)
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Swapchain extension loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Images and views in swapchain order
    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    /// Number of images actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Negotiated settings
    pub fn settings(&self) -> &SwapchainSettings {
        &self.settings
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for image in &self.images {
                self.device.destroy_image_view(image.view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_undefined_sentinel_gives_preferred_format() {
        let formats = [surface_format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_preferred_format_found_anywhere_in_list() {
        let formats = [
            surface_format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_any_order() {
        use vk::PresentModeKHR as P;
        assert_eq!(choose_present_mode(&[P::FIFO, P::IMMEDIATE, P::MAILBOX]), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::MAILBOX, P::FIFO]), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::IMMEDIATE, P::FIFO_RELAXED]), P::FIFO);
        assert_eq!(choose_present_mode(&[]), P::FIFO);
    }

    #[test]
    fn test_fixed_extent_returned_as_is() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, (1920, 1080));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_sentinel_extent_clamps_framebuffer() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (1000, 800));
        let extent = choose_extent(&caps, (1920, 50));
        assert_eq!((extent.width, extent.height), (1000, 100));
        let extent = choose_extent(&caps, (640, 480));
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn test_image_count() {
        let mut caps = capabilities((1, 1), (1, 1), (1, 1));
        caps.min_image_count = 2;
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_sharing_mode() {
        let same = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        assert_eq!(choose_sharing(same), (vk::SharingMode::EXCLUSIVE, vec![]));

        let split = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };
        assert_eq!(choose_sharing(split), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }

    #[test]
    fn test_negotiate_is_idempotent() {
        let support = SwapchainSupport {
            capabilities: capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096)),
            formats: vec![
                surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let first = SwapchainSettings::negotiate(&support, (1280, 720)).unwrap();
        let second = SwapchainSettings::negotiate(&support, (1280, 720)).unwrap();
        assert!(first.matches(&second));
        assert_eq!(first.surface_format.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((first.extent.width, first.extent.height), (1280, 720));
        assert!(support.is_adequate());
    }

    #[test]
    fn test_support_without_formats_or_modes_is_inadequate() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096));
        let no_formats = SwapchainSupport {
            capabilities: caps,
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let no_modes = SwapchainSupport {
            capabilities: caps,
            formats: vec![surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: Vec::new(),
        };
        assert!(!no_formats.is_adequate());
        assert!(!no_modes.is_adequate());
    }
}
