//! Texture table
//!
//! Textures are uploaded once through a staging buffer and each gets its own
//! descriptor set. Slot `None` is a built-in 1x1 white texture so untextured
//! meshes go through the same pipeline.

use super::buffer::GpuBuffer;
use super::descriptor_set::{texture_layout, DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
use super::image::{GpuImage, ImageDesc};
use super::transfer::TransferContext;
use crate::assets::ImageData;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};
use std::path::Path;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear, repeating sampler; anisotropic when `max_anisotropy` is set
    pub fn new(device: &Device, max_anisotropy: Option<f32>) -> VulkanResult<Self> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy.is_some())
            .max_anisotropy(max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe { device.create_sampler(&sampler_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            device: device.clone(),
            sampler,
        })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

/// Uploaded texture and the descriptor set that samples it
pub struct Texture {
    image: GpuImage,
    descriptor_set: vk::DescriptorSet,
}

impl Texture {
    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Descriptor set for set 1 of the scene pipeline
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

/// All textures known to the renderer
pub struct TextureTable {
    textures: Vec<Texture>,
    default_texture: Texture,
    pool: DescriptorPool,
    sampler: Sampler,
    layout: DescriptorSetLayout,
    capacity: usize,
}

impl TextureTable {
    /// Create the table with room for `capacity` descriptor sets, one of
    /// which goes to the default white texture
    pub fn new(transfer: &TransferContext, capacity: u32, max_anisotropy: Option<f32>) -> VulkanResult<Self> {
        if capacity < 1 {
            return Err(VulkanError::InvalidOperation {
                reason: "texture table needs room for the default texture".to_string(),
            });
        }
        let device = transfer.device();
        let layout = texture_layout().build(device)?;
        let pool = DescriptorPool::for_layout(device, &layout, capacity)?;
        let sampler = Sampler::new(device, max_anisotropy)?;

        let default_texture = create_texture(transfer, &ImageData::solid_color(1, 1, WHITE), &pool, &layout, &sampler)?;

        Ok(Self {
            textures: Vec::new(),
            default_texture,
            pool,
            sampler,
            layout,
            capacity: capacity as usize - 1,
        })
    }

    /// Upload decoded pixels, returning the new texture id
    pub fn add(&mut self, transfer: &TransferContext, image: &ImageData) -> VulkanResult<usize> {
        if self.textures.len() >= self.capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!("texture table is full ({} textures)", self.capacity),
            });
        }

        let texture = create_texture(transfer, image, &self.pool, &self.layout, &self.sampler)?;
        self.textures.push(texture);
        Ok(self.textures.len() - 1)
    }

    /// Decode and upload an image file
    pub fn load_file(&mut self, transfer: &TransferContext, path: &Path) -> VulkanResult<usize> {
        let image = ImageData::from_file(path)?;
        let id = self.add(transfer, &image)?;
        log::debug!("Loaded texture {} from {:?} ({}x{})", id, path, image.width, image.height);
        Ok(id)
    }

    /// Descriptor set for a texture id; `None` selects the default texture
    pub fn descriptor_set(&self, id: Option<usize>) -> VulkanResult<vk::DescriptorSet> {
        match id {
            None => Ok(self.default_texture.descriptor_set()),
            Some(index) => self
                .textures
                .get(index)
                .map(Texture::descriptor_set)
                .ok_or(VulkanError::TextureIndexOutOfRange {
                    index,
                    count: self.textures.len(),
                }),
        }
    }

    /// Texture by id
    pub fn get(&self, id: usize) -> Option<&Texture> {
        self.textures.get(id)
    }

    /// Number of loaded textures, not counting the default
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// No textures loaded besides the default
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Layout of the per-texture descriptor sets
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }
}

fn create_texture(
    transfer: &TransferContext,
    image: &ImageData,
    pool: &DescriptorPool,
    layout: &DescriptorSetLayout,
    sampler: &Sampler,
) -> VulkanResult<Texture> {
    let gpu_image = upload_image(transfer, image)?;
    let descriptor_set = pool
        .allocate(layout.handle(), 1)?
        .into_iter()
        .next()
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor allocation returned no set".to_string(),
        })?;

    DescriptorSetWriter::new()
        .write_sampled_image(descriptor_set, 0, gpu_image.view(), sampler.handle())
        .update(transfer.device());

    Ok(Texture {
        image: gpu_image,
        descriptor_set,
    })
}

fn upload_image(transfer: &TransferContext, image: &ImageData) -> VulkanResult<GpuImage> {
    let expected = image.width as usize * image.height as usize * 4;
    if image.width == 0 || image.height == 0 || image.data.len() != expected {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "image data is {} bytes, expected {} for {}x{} RGBA",
                image.data.len(),
                expected,
                image.width,
                image.height
            ),
        });
    }

    let staging: GpuBuffer = transfer.create_buffer(
        image.data.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    staging.write(image.data.as_slice())?;

    let gpu_image = GpuImage::new(
        transfer.device(),
        transfer.memory_properties(),
        ImageDesc {
            width: image.width,
            height: image.height,
            format: TEXTURE_FORMAT,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        },
    )?;

    transfer.transition_image_layout(
        gpu_image.handle(),
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    transfer.copy_buffer_to_image(&staging, gpu_image.handle(), image.width, image.height)?;
    transfer.transition_image_layout(
        gpu_image.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    Ok(gpu_image)
}
