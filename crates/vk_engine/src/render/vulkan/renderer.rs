//! Frame orchestration
//!
//! `VulkanRenderer` owns the device context, the load-time resources (texture
//! table, models) and one `PresentationState` holding everything that depends
//! on the current swapchain. Recreating the swapchain replaces the whole
//! presentation state; the device and instance are never touched.

use super::initialization::context::log_idle_failure;
use super::initialization::{VulkanContext, VulkanError, VulkanResult, Window};
use super::rendering::render_pass::INPUT_ATTACHMENT_LAYOUT;
use super::rendering::shader::vertex_push_constant;
use super::rendering::{
    CommandPool, CommandRecorder, GraphicsPipeline, PipelineConfig, PipelineDesc, PipelineLayout,
    RenderPass, ShaderModule,
};
use super::resources::{DescriptorLayouts, DescriptorPool, DescriptorSetWriter, GpuBuffer, TextureTable, TransferContext};
use super::state::swapchain::choose_surface_format;
use super::state::{
    FrameAttachments, FrameSync, FrameTracker, Framebuffer, ImageOwners, Swapchain, SwapchainSettings, SwapchainSupport,
};
use super::MAX_FRAME_DRAWS;
use crate::assets::SceneData;
use crate::config::{RendererConfig, SceneConfig, ShaderConfig};
use crate::foundation::math::{deg_to_rad, look_at, perspective, to_gpu, GpuMat4, Mat4, Vec3};
use crate::render::draw_list::{DrawItem, ModelList};
use crate::render::mesh::Mesh;
use crate::render::model::{resolve_material_textures, Model};
use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// Per-image camera uniform, set 0 binding 0 of the scene pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UboViewProjection {
    /// Projection matrix
    pub projection: GpuMat4,
    /// View matrix
    pub view: GpuMat4,
}

/// Per-draw push constant of the scene pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushModel {
    /// Model matrix
    pub model: GpuMat4,
}

/// Perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// World-to-view transform
    pub view: Mat4,
}

impl Camera {
    /// Camera described by the scene settings
    pub fn from_config(scene: &SceneConfig) -> Self {
        Self {
            fov_y: deg_to_rad(scene.fov_y_degrees),
            near: scene.near_plane,
            far: scene.far_plane,
            view: look_at(Vec3::from(scene.camera_eye), Vec3::from(scene.camera_target), Vec3::y()),
        }
    }

    /// Uniform data for a target of `extent`
    pub fn uniform(&self, extent: vk::Extent2D) -> UboViewProjection {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        UboViewProjection {
            projection: to_gpu(&perspective(self.fov_y, aspect, self.near, self.far)),
            view: to_gpu(&self.view),
        }
    }
}

/// Command buffers freed back to their pool on drop
struct ImageCommandBuffers {
    device: Device,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl ImageCommandBuffers {
    fn allocate(device: &Device, pool: &CommandPool, count: usize) -> VulkanResult<Self> {
        Ok(Self {
            device: device.clone(),
            pool: pool.handle(),
            buffers: pool.allocate_command_buffers(count as u32)?,
        })
    }
}

impl Drop for ImageCommandBuffers {
    fn drop(&mut self) {
        unsafe { self.device.free_command_buffers(self.pool, &self.buffers) };
    }
}

/// Everything sized to or formatted for one swapchain generation.
///
/// Field order is destruction order: framebuffers, attachment images, the
/// input attachment pool, pipelines, render pass, per-image uniforms and
/// command buffers, then the swapchain with its views.
struct PresentationState {
    framebuffers: Vec<Framebuffer>,
    #[allow(dead_code)]
    attachments: Vec<FrameAttachments>,
    #[allow(dead_code)]
    input_pool: DescriptorPool,
    input_sets: Vec<vk::DescriptorSet>,
    composition_pipeline: GraphicsPipeline,
    scene_pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    #[allow(dead_code)]
    uniform_pool: DescriptorPool,
    uniform_sets: Vec<vk::DescriptorSet>,
    uniform_buffers: Vec<GpuBuffer>,
    command_buffers: ImageCommandBuffers,
    swapchain: Swapchain,
}

struct PresentationParams<'a> {
    context: &'a VulkanContext,
    layouts: &'a DescriptorLayouts,
    texture_layout: vk::DescriptorSetLayout,
    pipeline_config: &'a PipelineConfig,
    shaders: &'a ShaderConfig,
    command_pool: &'a CommandPool,
}

impl PresentationState {
    fn new(params: &PresentationParams<'_>, framebuffer_size: (u32, u32)) -> VulkanResult<Self> {
        let context = params.context;
        let device = context.device();
        let memory_properties = context.memory_properties();
        let config = params.pipeline_config;

        let swapchain = Swapchain::new(context, framebuffer_size)?;
        let image_count = swapchain.image_count();
        let extent = swapchain.extent();

        let command_buffers = ImageCommandBuffers::allocate(device, params.command_pool, image_count)?;

        let uniform_buffers = (0..image_count)
            .map(|_| {
                GpuBuffer::new(
                    device,
                    memory_properties,
                    std::mem::size_of::<UboViewProjection>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        let uniform_pool = DescriptorPool::for_layout(device, &params.layouts.view_projection, image_count as u32)?;
        let uniform_sets = uniform_pool.allocate(params.layouts.view_projection.handle(), image_count)?;
        uniform_sets
            .iter()
            .zip(&uniform_buffers)
            .fold(DescriptorSetWriter::new(), |writer, (&set, buffer)| {
                writer.write_uniform_buffer(set, 0, buffer.handle(), buffer.size())
            })
            .update(device);

        let render_pass = RenderPass::new(device, config.attachment_formats(swapchain.format()))?;

        let (scene_pipeline, composition_pipeline) = Self::create_pipelines(params, render_pass.handle())?;

        let attachments = (0..image_count)
            .map(|_| FrameAttachments::new(device, memory_properties, extent, config.color_format, config.depth_format))
            .collect::<VulkanResult<Vec<_>>>()?;

        let input_pool = DescriptorPool::for_layout(device, &params.layouts.input_attachments, image_count as u32)?;
        let input_sets = input_pool.allocate(params.layouts.input_attachments.handle(), image_count)?;
        input_sets
            .iter()
            .zip(&attachments)
            .fold(DescriptorSetWriter::new(), |writer, (&set, frame)| {
                writer
                    .write_input_attachment(set, 0, frame.color.view(), INPUT_ATTACHMENT_LAYOUT)
                    .write_input_attachment(set, 1, frame.depth.view(), INPUT_ATTACHMENT_LAYOUT)
            })
            .update(device);

        let framebuffers = swapchain
            .images()
            .iter()
            .zip(&attachments)
            .map(|(image, frame)| {
                Framebuffer::new(
                    device,
                    render_pass.handle(),
                    &[image.view, frame.color.view(), frame.depth.view()],
                    extent,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created presentation state for {} images", image_count);

        Ok(Self {
            framebuffers,
            attachments,
            input_pool,
            input_sets,
            composition_pipeline,
            scene_pipeline,
            render_pass,
            uniform_pool,
            uniform_sets,
            uniform_buffers,
            command_buffers,
            swapchain,
        })
    }

    fn create_pipelines(
        params: &PresentationParams<'_>,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<(GraphicsPipeline, GraphicsPipeline)> {
        let device = params.context.device();
        let shaders = params.shaders;

        let scene_layout = PipelineLayout::new(
            device,
            &[params.layouts.view_projection.handle(), params.texture_layout],
            &[vertex_push_constant::<PushModel>()],
        )?;
        let scene = GraphicsPipeline::new(
            device,
            render_pass,
            &ShaderModule::from_file(device, shaders.path(&shaders.scene_vertex))?,
            &ShaderModule::from_file(device, shaders.path(&shaders.scene_fragment))?,
            scene_layout,
            PipelineDesc::scene(),
        )?;

        let composition_layout = PipelineLayout::new(device, &[params.layouts.input_attachments.handle()], &[])?;
        let composition = GraphicsPipeline::new(
            device,
            render_pass,
            &ShaderModule::from_file(device, shaders.path(&shaders.composition_vertex))?,
            &ShaderModule::from_file(device, shaders.path(&shaders.composition_fragment))?,
            composition_layout,
            PipelineDesc::composition(),
        )?;

        Ok((scene, composition))
    }

    fn record(
        &self,
        device: &Device,
        image_index: usize,
        draws: &[DrawItem],
        texture_sets: &[vk::DescriptorSet],
    ) -> VulkanResult<vk::CommandBuffer> {
        let extent = self.swapchain.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.6, 0.65, 0.4, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let command_buffer = self.command_buffers.buffers[image_index];
        let mut recorder = CommandRecorder::begin(device, command_buffer, vk::CommandBufferUsageFlags::empty())?;
        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                self.framebuffers[image_index].handle(),
                render_area,
                &clear_values,
            );
            pass.set_viewport(vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            pass.set_scissor(render_area);

            let scene_layout = self.scene_pipeline.layout();
            pass.bind_pipeline(self.scene_pipeline.handle());
            for (draw, &texture_set) in draws.iter().zip(texture_sets) {
                pass.bind_vertex_buffer(draw.vertex_buffer);
                let push = PushModel {
                    model: to_gpu(&draw.model_matrix),
                };
                pass.push_constants(scene_layout, vk::ShaderStageFlags::VERTEX, bytemuck::bytes_of(&push));
                pass.bind_descriptor_sets(scene_layout, &[self.uniform_sets[image_index], texture_set]);
                match draw.index_buffer {
                    Some(index_buffer) => {
                        pass.bind_index_buffer(index_buffer);
                        pass.draw_indexed(draw.index_count);
                    }
                    None => pass.draw(draw.vertex_count),
                }
            }

            pass.next_subpass();
            pass.bind_pipeline(self.composition_pipeline.handle());
            pass.bind_descriptor_sets(self.composition_pipeline.layout(), &[self.input_sets[image_index]]);
            pass.draw(3);
        }
        recorder.end()
    }
}

/// Drop whatever `slot` holds, then build its replacement. Returns what
/// `keep` extracted from the old value. On error the slot stays empty.
fn replace_state<T, K, E>(
    slot: &mut Option<T>,
    keep: impl FnOnce(&T) -> K,
    build: impl FnOnce() -> Result<T, E>,
) -> Result<Option<K>, E> {
    let kept = slot.take().map(|old| keep(&old));
    *slot = Some(build()?);
    Ok(kept)
}

/// Renderer: device, resources and the frame loop
pub struct VulkanRenderer {
    presentation: Option<PresentationState>,
    frame_sync: Vec<FrameSync>,
    models: ModelList<Mesh>,
    textures: TextureTable,
    layouts: DescriptorLayouts,
    command_pool: CommandPool,
    transfer: TransferContext,
    tracker: FrameTracker,
    image_owners: ImageOwners,
    pipeline_config: PipelineConfig,
    camera: Camera,
    config: RendererConfig,
    framebuffer_resized: bool,
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Bring up the device and build the first swapchain
    pub fn new(window: &Window, config: RendererConfig) -> VulkanResult<Self> {
        config.shaders.validate().map_err(VulkanError::InitializationFailed)?;

        let context = VulkanContext::new(window, &config)?;
        let support = SwapchainSupport::query(context.surface(), context.physical_device().device)?;
        let swapchain_format = choose_surface_format(&support.formats)?.format;
        let pipeline_config = PipelineConfig::negotiate(&context, swapchain_format)?;

        let device = context.device();
        let transfer = TransferContext::new(&context)?;
        let command_pool = CommandPool::new(
            device,
            context.graphics_family()?,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let layouts = DescriptorLayouts::new(device)?;
        let textures = TextureTable::new(&transfer, config.scene.max_textures, pipeline_config.sampler_anisotropy())?;
        let frame_sync = FrameSync::create_slots(device, MAX_FRAME_DRAWS)?;

        let mut renderer = Self {
            presentation: None,
            frame_sync,
            models: ModelList::new(),
            textures,
            layouts,
            command_pool,
            transfer,
            tracker: FrameTracker::new(MAX_FRAME_DRAWS),
            image_owners: ImageOwners::default(),
            pipeline_config,
            camera: Camera::from_config(&config.scene),
            config,
            framebuffer_resized: false,
            context,
        };
        renderer.recreate_swapchain(window.framebuffer_size())?;

        log::info!("Renderer initialized with {} frames in flight", MAX_FRAME_DRAWS);
        Ok(renderer)
    }

    /// Load a glTF scene as one model, returning its id
    pub fn create_model(&mut self, path: impl AsRef<Path>) -> VulkanResult<usize> {
        let path = path.as_ref();
        let scene = SceneData::load(path)?;

        let transfer = &self.transfer;
        let textures = &mut self.textures;
        let texture_dir = &self.config.scene.texture_dir;
        let material_textures = resolve_material_textures(&scene.materials, |file_name| {
            textures.load_file(transfer, &texture_dir.join(file_name))
        })?;

        let model = Model::from_scene(&scene, &material_textures, |data| {
            Mesh::new(transfer, &data.vertices, &data.indices)
        })?;
        let mesh_count = model.mesh_count();
        let id = self.models.add(model);

        log::info!(
            "Loaded model {} from {:?}: {} meshes, {} textures",
            id,
            path,
            mesh_count,
            self.textures.len()
        );
        Ok(id)
    }

    /// Replace the root transform of a model
    pub fn update_model(&mut self, id: usize, transform: Mat4) -> VulkanResult<()> {
        self.models.update_model(id, transform)
    }

    /// Loaded models
    pub fn models(&self) -> &ModelList<Mesh> {
        &self.models
    }

    /// Move the camera
    pub fn set_camera(&mut self, eye: Vec3, target: Vec3) {
        self.camera.view = look_at(eye, target, Vec3::y());
    }

    /// Negotiated pipeline configuration
    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline_config
    }

    /// Settings of the current swapchain, if one exists
    pub fn swapchain_settings(&self) -> Option<&SwapchainSettings> {
        self.presentation.as_ref().map(|state| state.swapchain.settings())
    }

    /// Flag the swapchain for recreation after the next present
    pub fn notify_resized(&mut self) {
        self.framebuffer_resized = true;
    }

    /// Render and present one frame
    pub fn draw(&mut self, window: &Window) -> VulkanResult<()> {
        if self.presentation.is_none() && !self.recreate_swapchain(window.framebuffer_size())? {
            return Ok(());
        }

        let slot = self.tracker.current();
        let sync = &self.frame_sync[slot];
        sync.in_flight.wait(u64::MAX)?;
        self.tracker.retire_current();

        let Some(presentation) = self.presentation.as_ref() else {
            return Ok(());
        };

        let acquired = unsafe {
            presentation.swapchain.loader().acquire_next_image(
                presentation.swapchain.handle(),
                u64::MAX,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire");
                self.recreate_swapchain(window.framebuffer_size())?;
                return Ok(());
            }
            Err(result) => return Err(VulkanError::Api(result)),
        };
        let image = image_index as usize;

        // The image's command buffer and uniform buffer may still belong to another slot's submission.
        if let Some(owner) = self.image_owners.claim(image, slot)? {
            if self.tracker.is_in_flight(owner) {
                self.frame_sync[owner].in_flight.wait(u64::MAX)?;
                self.tracker.retire(owner);
            }
        }

        presentation.uniform_buffers[image].write(&[self.camera.uniform(presentation.swapchain.extent())])?;

        let draws = self.models.draws();
        let texture_sets = draws
            .iter()
            .map(|draw| self.textures.descriptor_set(draw.texture_id))
            .collect::<VulkanResult<Vec<_>>>()?;
        let device = self.context.device();
        let command_buffer = presentation.record(device, image, &draws, &texture_sets)?;

        sync.in_flight.reset()?;
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe { device.queue_submit(self.context.graphics_queue(), &[submit_info], sync.in_flight.handle()) }
            .map_err(VulkanError::Api)?;
        self.tracker.mark_submitted()?;

        let swapchains = [presentation.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            presentation
                .swapchain
                .loader()
                .queue_present(self.context.present_queue(), &present_info)
        };
        let stale = match presented {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(result) => return Err(VulkanError::Api(result)),
        };

        self.tracker.advance();

        if stale || self.framebuffer_resized {
            self.recreate_swapchain(window.framebuffer_size())?;
        }
        Ok(())
    }

    /// Rebuild everything that depends on the swapchain. Returns `false` and
    /// keeps the resize pending while the framebuffer has a zero dimension.
    pub fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> VulkanResult<bool> {
        if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            self.framebuffer_resized = true;
            return Ok(false);
        }

        self.context.wait_idle()?;

        let params = PresentationParams {
            context: &self.context,
            layouts: &self.layouts,
            texture_layout: self.textures.layout(),
            pipeline_config: &self.pipeline_config,
            shaders: &self.config.shaders,
            command_pool: &self.command_pool,
        };
        let previous = replace_state(
            &mut self.presentation,
            |state| *state.swapchain.settings(),
            || PresentationState::new(&params, framebuffer_size),
        )?;
        let Some(state) = self.presentation.as_ref() else {
            return Ok(false);
        };

        match previous {
            Some(old) if old.matches(state.swapchain.settings()) => log::debug!("Swapchain recreated unchanged"),
            Some(_) => log::info!("Swapchain recreated at {:?}", state.swapchain.extent()),
            None => {}
        }

        self.image_owners.reset(state.swapchain.image_count());
        self.framebuffer_resized = false;
        Ok(true)
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log_idle_failure(self.context.wait_idle(), "renderer shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_gpu_struct_sizes() {
        assert_eq!(std::mem::size_of::<UboViewProjection>(), 128);
        assert_eq!(std::mem::size_of::<PushModel>(), 64);
    }

    #[test]
    fn test_camera_aspect_follows_extent() {
        let camera = Camera::from_config(&SceneConfig::default());
        let wide = camera.uniform(vk::Extent2D { width: 1600, height: 800 });
        let square = camera.uniform(vk::Extent2D { width: 800, height: 800 });
        // column 0, row 0 holds f / aspect
        assert_relative_eq!(wide.projection[0][0] * 2.0, square.projection[0][0], epsilon = 1e-6);
        assert_eq!(wide.view, square.view);
    }

    struct Generation {
        id: u32,
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Drop for Generation {
        fn drop(&mut self) {
            self.events.borrow_mut().push(format!("drop {}", self.id));
        }
    }

    fn generation(id: u32, events: &Rc<RefCell<Vec<String>>>) -> Result<Generation, VulkanError> {
        events.borrow_mut().push(format!("build {}", id));
        Ok(Generation {
            id,
            events: Rc::clone(events),
        })
    }

    #[test]
    fn test_old_state_dropped_before_new_built() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut slot = None;

        let first = replace_state(&mut slot, |g: &Generation| g.id, || generation(1, &events)).unwrap();
        assert_eq!(first, None);
        let second = replace_state(&mut slot, |g: &Generation| g.id, || generation(2, &events)).unwrap();
        assert_eq!(second, Some(1));

        assert_eq!(*events.borrow(), vec!["build 1", "drop 1", "build 2"]);
        assert_eq!(slot.as_ref().map(|g| g.id), Some(2));
    }

    #[test]
    fn test_failed_rebuild_leaves_slot_empty() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut slot = Some(generation(1, &events).unwrap());

        let result = replace_state(&mut slot, |g: &Generation| g.id, || {
            Err(VulkanError::InitializationFailed("no surface".to_string()))
        });

        assert!(result.is_err());
        assert!(slot.is_none());
        assert_eq!(*events.borrow(), vec!["build 1", "drop 1"]);
    }

    #[test]
    fn test_camera_handles_zero_height() {
        let camera = Camera::from_config(&SceneConfig::default());
        let ubo = camera.uniform(vk::Extent2D { width: 800, height: 0 });
        assert!(ubo.projection[0][0].is_finite());
    }
}
