//! Descriptor set layouts, pools and writes

use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Descriptor set layout builder
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, descriptor_type: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Add an input attachment binding (fragment stage only)
    pub fn add_input_attachment(self, binding: u32) -> Self {
        self.add(binding, vk::DescriptorType::INPUT_ATTACHMENT, vk::ShaderStageFlags::FRAGMENT)
    }

    /// Pool sizes needed to allocate `sets` sets of this layout
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        pool_sizes_for(&self.bindings, sets)
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

fn pool_sizes_for(bindings: &[vk::DescriptorSetLayoutBinding], sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding.descriptor_count * sets;
        match sizes.iter_mut().find(|size| size.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            }),
        }
    }
    sizes
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Pool sizes needed to allocate `sets` sets of this layout
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        pool_sizes_for(&self.bindings, sets)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool dedicated to one layout
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Pool with room for `max_sets` sets of `layout`
    pub fn for_layout(device: &Device, layout: &DescriptorSetLayout, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = layout.pool_sizes(max_sets);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    /// Allocate `count` sets of `layout`
    pub fn allocate(&self, layout: vk::DescriptorSetLayout, count: usize) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingWrite {
    Buffer(vk::DescriptorSet, u32, vk::DescriptorBufferInfo),
    Image(vk::DescriptorSet, u32, vk::DescriptorType, vk::DescriptorImageInfo),
}

/// Batches descriptor writes and applies them in one update call
#[derive(Default)]
pub struct DescriptorSetWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a uniform buffer binding at the whole of `buffer`
    pub fn write_uniform_buffer(mut self, set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        let info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        self.writes.push(PendingWrite::Buffer(set, binding, info));
        self
    }

    /// Write a combined image sampler in `SHADER_READ_ONLY_OPTIMAL`
    pub fn write_sampled_image(mut self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView, sampler: vk::Sampler) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        self.writes.push(PendingWrite::Image(set, binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, info));
        self
    }

    /// Write an input attachment in the layout the subpass reads it with
    pub fn write_input_attachment(mut self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView, layout: vk::ImageLayout) -> Self {
        let info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: layout,
        };
        self.writes.push(PendingWrite::Image(set, binding, vk::DescriptorType::INPUT_ATTACHMENT, info));
        self
    }

    /// Apply all pending writes
    pub fn update(self, device: &Device) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|write| match write {
                PendingWrite::Buffer(set, binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build(),
                PendingWrite::Image(set, binding, ty, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .image_info(std::slice::from_ref(info))
                    .build(),
            })
            .collect();

        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }
}

/// Per-image layouts the renderer binds. The texture layout belongs to the
/// texture table.
pub struct DescriptorLayouts {
    /// Set 0 of the scene pipeline: view/projection UBO
    pub view_projection: DescriptorSetLayout,
    /// Set 0 of the composition pipeline: color and depth input attachments
    pub input_attachments: DescriptorSetLayout,
}

impl DescriptorLayouts {
    /// Build both layouts
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            view_projection: view_projection_layout().build(device)?,
            input_attachments: input_attachment_layout().build(device)?,
        })
    }
}

/// UBO for the vertex stage at binding 0
pub fn view_projection_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
}

/// Combined image sampler for the fragment stage at binding 0
pub fn texture_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
}

/// Color input at binding 0, depth input at binding 1
pub fn input_attachment_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_input_attachment(0).add_input_attachment(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_attachment_pool_sizes() {
        let sizes = input_attachment_layout().pool_sizes(3);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::INPUT_ATTACHMENT);
        assert_eq!(sizes[0].descriptor_count, 6);
    }

    #[test]
    fn test_layout_bindings() {
        let ubo = view_projection_layout();
        assert_eq!(ubo.bindings[0].binding, 0);
        assert_eq!(ubo.bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);

        let texture = texture_layout();
        assert_eq!(texture.bindings[0].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(texture.pool_sizes(32)[0].descriptor_count, 32);

        let inputs = input_attachment_layout();
        let bindings: Vec<u32> = inputs.bindings.iter().map(|b| b.binding).collect();
        assert_eq!(bindings, vec![0, 1]);
        assert!(inputs.bindings.iter().all(|b| b.stage_flags == vk::ShaderStageFlags::FRAGMENT));
    }
}
