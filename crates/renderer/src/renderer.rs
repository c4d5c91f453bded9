//! Renderer orchestration.
//!
//! [`Renderer`] wires the whole engine together: instance, surface, device,
//! swapchain, immutable geometry and texture uploads, pipeline, and the F
//! frame slots, then drives the per-frame protocol from a single thread.
//!
//! # Resource Destruction Order
//!
//! Destruction order is enforced with `ManuallyDrop` after a full
//! device-idle barrier: per-frame slots and pipeline state first, then the
//! immutable resources, then swapchain, device, surface, and instance last.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use glam::{Vec2, Vec3};
use tracing::{debug, error, info};

use spinquad_core::Timer;
use spinquad_platform::{Surface, Window};
use spinquad_rhi::buffer::{Buffer, BufferUsage};
use spinquad_rhi::command::CommandPool;
use spinquad_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, combined_image_sampler_binding, uniform_buffer_binding,
};
use spinquad_rhi::device::Device;
use spinquad_rhi::image::TextureImage;
use spinquad_rhi::instance::Instance;
use spinquad_rhi::physical_device::select_physical_device;
use spinquad_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use spinquad_rhi::sampler::Sampler;
use spinquad_rhi::shader::{Shader, ShaderStage};
use spinquad_rhi::swapchain::{Swapchain, SwapchainPreferences};
use spinquad_rhi::transfer::StagedUploader;
use spinquad_rhi::vertex::QuadVertex;
use spinquad_rhi::{RhiError, RhiResult};

use crate::config::RendererConfig;
use crate::frame::{FrameSlot, create_frame_slots};
use crate::pacing::{AcquireAction, AcquireOutcome, FramePacing, SurfaceGate};
use crate::ubo::TransformsUbo;

/// The quad: four corners, one color each.
const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex::new(Vec2::new(-0.5, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    QuadVertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 1.0, 0.0)),
    QuadVertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
    QuadVertex::new(Vec2::new(-0.5, 0.5), Vec3::new(1.0, 1.0, 1.0)),
];

/// Two counter-clockwise triangles over the four corners.
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// A decoded texture handed to the renderer: packed row-major RGBA8.
///
/// Decoding is the caller's concern; the renderer only sees bytes and
/// dimensions.
pub struct TexturePixels<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 4` bytes of RGBA data.
    pub rgba: &'a [u8],
}

/// Renderer owning every GPU resource and the frame loop.
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    swapchain: ManuallyDrop<Swapchain>,

    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline: ManuallyDrop<Pipeline>,

    // Immutable after upload; read-shared by every slot, untouched by
    // swapchain recreation
    vertex_buffer: ManuallyDrop<Buffer>,
    index_buffer: ManuallyDrop<Buffer>,
    texture: ManuallyDrop<TextureImage>,
    sampler: ManuallyDrop<Sampler>,

    command_pool: ManuallyDrop<CommandPool>,
    frame_slots: Vec<FrameSlot>,
    pacing: FramePacing,

    timer: Timer,
    config: RendererConfig,
    width: u32,
    height: u32,
}

impl Renderer {
    /// Creates the renderer and uploads all immutable resources.
    ///
    /// # Errors
    ///
    /// Any creation failure here is unrecoverable and propagates to the
    /// caller, which terminates with a nonzero exit code.
    pub fn new(
        window: &Window,
        config: RendererConfig,
        texture_pixels: TexturePixels<'_>,
    ) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing renderer ({}x{})", width, height);

        let display_handle = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("no display handle: {e}")))?;
        let instance = Instance::new(config.enable_validation, display_handle.as_raw())?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let preferences = SwapchainPreferences {
            surface_format: config.preferred_surface_format,
            present_mode: config.preferred_present_mode,
        };
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            preferences,
            width,
            height,
        )?;

        // One-shot synchronous uploads of the immutable resources; the
        // uploader and its transient pool die at the end of this scope
        let (vertex_buffer, index_buffer, texture) = {
            let uploader = StagedUploader::new(device.clone())?;
            let vertex_buffer =
                uploader.upload_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&QUAD_VERTICES))?;
            let index_buffer =
                uploader.upload_buffer(BufferUsage::Index, bytemuck::cast_slice(&QUAD_INDICES))?;
            let texture = uploader.upload_texture(
                texture_pixels.width,
                texture_pixels.height,
                texture_pixels.rgba,
            )?;
            (vertex_buffer, index_buffer, texture)
        };

        let sampler = Sampler::linear_repeat(device.clone())?;

        let bindings = [
            uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX),
            combined_image_sampler_binding(1, vk::ShaderStageFlags::FRAGMENT),
        ];
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let frame_count = config.frames_in_flight as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(frame_count),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(frame_count),
        ];
        let descriptor_pool = DescriptorPool::new(device.clone(), frame_count, &pool_sizes)?;

        let graphics_family = device.queue_families().graphics_family.ok_or_else(|| {
            RhiError::InvalidHandle("graphics queue family not resolved".to_string())
        })?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let frame_slots = create_frame_slots(
            &device,
            &command_pool,
            &descriptor_pool,
            &descriptor_set_layout,
            &texture,
            &sampler,
            config.frames_in_flight,
        )?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;
        let pipeline =
            Self::create_pipeline(device.clone(), &config, &pipeline_layout, swapchain.format())?;

        let pacing = FramePacing::new(config.frames_in_flight);

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            config.frames_in_flight
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            swapchain: ManuallyDrop::new(swapchain),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            index_buffer: ManuallyDrop::new(index_buffer),
            texture: ManuallyDrop::new(texture),
            sampler: ManuallyDrop::new(sampler),
            command_pool: ManuallyDrop::new(command_pool),
            frame_slots,
            pacing,
            timer: Timer::new(),
            config,
            width,
            height,
        })
    }

    /// Builds the quad pipeline against the given color format.
    fn create_pipeline(
        device: Arc<Device>,
        config: &RendererConfig,
        pipeline_layout: &PipelineLayout,
        color_format: vk::Format,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.vertex_shader_path,
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.fragment_shader_path,
            ShaderStage::Fragment,
            "main",
        )?;

        GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(QuadVertex::binding_description())
            .vertex_attributes(&QuadVertex::attribute_descriptions())
            .color_attachment_format(color_format)
            .build(device, pipeline_layout)
    }

    /// Notifies the renderer that the drawable area changed.
    ///
    /// Zero dimensions are recorded too: they park the frame loop until the
    /// window reports a usable size again. The actual swapchain rebuild
    /// happens inside the next [`Renderer::render_frame`] call.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        debug!(
            "Resize: {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        if width > 0 && height > 0 {
            self.pacing.note_surface_changed();
        }
    }

    /// Renders one frame, following the per-iteration protocol.
    ///
    /// # Errors
    ///
    /// Transient surface states (out-of-date, suboptimal, zero-area) are
    /// handled internally via recreation and never surface as errors; any
    /// error returned here is unrecoverable.
    pub fn render_frame(&mut self) -> RhiResult<()> {
        match self.pacing.gate(self.width, self.height) {
            SurfaceGate::Wait => return Ok(()),
            SurfaceGate::RecreateFirst => self.recreate_swapchain()?,
            SurfaceGate::Proceed => {}
        }

        let frame_index = self.pacing.current_frame();

        // Backpressure: the CPU is never more than F submissions ahead
        self.frame_slots[frame_index].in_flight().wait(u64::MAX)?;

        let acquire_semaphore = self.frame_slots[frame_index].image_available().handle();
        let outcome = match self.swapchain.acquire_next_image(acquire_semaphore) {
            Ok((image_index, suboptimal)) => AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            },
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::OutOfDate,
            Err(e) => return Err(RhiError::VulkanError(e)),
        };

        let image_index = match self.pacing.on_acquire(outcome) {
            AcquireAction::Draw { image_index } => image_index,
            AcquireAction::SkipAndRecreate => {
                debug!("Swapchain out of date during acquire, skipping frame");
                self.recreate_swapchain()?;
                return Ok(());
            }
        };

        // A submission is now guaranteed; resetting earlier and then failing
        // to submit would deadlock the next wait on this fence
        self.frame_slots[frame_index].in_flight().reset()?;

        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        let ubo = TransformsUbo::spinning(self.timer.elapsed_secs(), aspect);
        self.frame_slots[frame_index].write_uniform(&ubo)?;

        self.record_commands(frame_index, image_index)?;

        let slot = &self.frame_slots[frame_index];
        let wait_semaphores = [slot.image_available().handle()];
        // Earlier pipeline stages may run before the image is available;
        // only color output waits
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished().handle()];
        let command_buffers = [slot.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                slot.in_flight().handle(),
            )?;
        }

        let present_result = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            slot.render_finished().handle(),
        );

        let present_needs_recreate = match present_result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => true,
            Err(e) => return Err(RhiError::VulkanError(e)),
        };

        if self.pacing.after_present(present_needs_recreate) {
            self.recreate_swapchain()?;
        }

        Ok(())
    }

    /// Re-records the slot's command buffer from scratch for `image_index`.
    fn record_commands(&self, frame_index: usize, image_index: u32) -> RhiResult<()> {
        let slot = &self.frame_slots[frame_index];
        let cmd = slot.command_buffer();
        let extent = self.swapchain.extent();

        cmd.reset()?;
        cmd.begin()?;

        let color_image = self.swapchain.image(image_index as usize);
        self.record_image_transition(
            slot,
            color_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.image_view(image_index as usize))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.config.clear_color,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        cmd.begin_rendering(&rendering_info);

        // Dynamic state follows the current extent
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        cmd.set_viewport(&viewport);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        cmd.set_scissor(&scissor);

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &[slot.descriptor_set()],
            &[],
        );
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT16);
        cmd.draw_indexed(QUAD_INDICES.len() as u32, 1, 0, 0, 0);

        cmd.end_rendering();

        self.record_image_transition(
            slot,
            color_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        cmd.end()?;
        Ok(())
    }

    /// Records a layout transition on the slot's command buffer.
    fn record_image_transition(
        &self,
        slot: &FrameSlot,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::AccessFlags::empty(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::AccessFlags::empty(),
            ),
            _ => (
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            ),
        };

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        slot.command_buffer()
            .pipeline_barrier(src_stage, dst_stage, &[barrier]);
    }

    /// Tears down and rebuilds the swapchain generation.
    ///
    /// Pipeline, buffers, texture, and frame slots are untouched; only the
    /// chain, its views, and (when the color format changed) the pipeline
    /// are replaced. The device-idle barrier inside
    /// [`Swapchain::recreate`] guarantees no in-flight submission still
    /// references an image of the old generation.
    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        self.swapchain.recreate(
            &self.instance,
            self.surface.handle(),
            self.width,
            self.height,
        )?;

        if self.pipeline.color_format() != self.swapchain.format() {
            info!(
                "Swapchain format changed to {:?}, rebuilding pipeline",
                self.swapchain.format()
            );
            let new_pipeline = Self::create_pipeline(
                Arc::clone(&self.device),
                &self.config,
                &self.pipeline_layout,
                self.swapchain.format(),
            )?;
            unsafe {
                ManuallyDrop::drop(&mut self.pipeline);
            }
            self.pipeline = ManuallyDrop::new(new_pipeline);
        }

        self.pacing.mark_recreated();
        Ok(())
    }

    /// Returns the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Whole-system barrier: nothing may still be in flight when the
        // first resource goes away
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during drop: {:?}", e);
        }

        // Frame slots (fences, semaphores, command buffers, uniform buffers)
        self.frame_slots.clear();

        unsafe {
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.sampler);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.index_buffer);
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.swapchain);
            // The device holds the allocator; it must outlive every
            // allocation above and die before the instance
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_geometry_shape() {
        assert_eq!(QUAD_VERTICES.len(), 4);
        assert_eq!(QUAD_INDICES.len(), 6);
        // Every index addresses a real vertex
        assert!(QUAD_INDICES
            .iter()
            .all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn test_quad_indices_form_two_triangles_sharing_a_diagonal() {
        let first = &QUAD_INDICES[0..3];
        let second = &QUAD_INDICES[3..6];
        // The diagonal 0-2 is shared
        assert!(first.contains(&0) && first.contains(&2));
        assert!(second.contains(&0) && second.contains(&2));
    }

    #[test]
    fn test_quad_vertex_bytes_match_stride() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 4 * std::mem::size_of::<QuadVertex>());
    }
}
