//! Per-frame slots.
//!
//! Each of the F concurrently outstanding frames owns one command buffer,
//! one image-available semaphore, one render-finished semaphore, one
//! in-flight fence (created signaled so the first F frames never block), a
//! persistently mapped uniform buffer, and a descriptor set pointing at that
//! buffer plus the shared texture.
//!
//! Slots are created once at startup and destroyed once at shutdown; they
//! are never recreated on resize. At most one slot's command buffer is being
//! recorded or replayed at any instant relative to its own fence.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight fence (CPU waits for the slot's previous use)
//! 2. Acquire swapchain image (signals image_available)
//! 3. Reset the fence, re-record the command buffer
//! 4. Submit: wait image_available at color output,
//!    signal render_finished and the fence
//! 5. Present (waits on render_finished)
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use spinquad_rhi::RhiResult;
use spinquad_rhi::buffer::{Buffer, BufferUsage};
use spinquad_rhi::command::{CommandBuffer, CommandPool};
use spinquad_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, update_descriptor_sets};
use spinquad_rhi::device::Device;
use spinquad_rhi::image::TextureImage;
use spinquad_rhi::sampler::Sampler;
use spinquad_rhi::sync::{Fence, Semaphore};

use crate::ubo::TransformsUbo;

/// Resources exclusively owned by one frame slot.
pub struct FrameSlot {
    /// Command buffer re-recorded from scratch each time the slot is used.
    command_buffer: CommandBuffer,
    /// Signaled when the acquired swapchain image is ready.
    image_available: Semaphore,
    /// Signaled when this slot's rendering is complete.
    render_finished: Semaphore,
    /// Sole authority for "this slot's prior submission has completed".
    in_flight: Fence,
    /// Persistently mapped uniform buffer, rewritten every frame.
    uniform_buffer: Buffer,
    /// Descriptor set binding the uniform buffer and the shared texture.
    descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        descriptor_set: vk::DescriptorSet,
        texture: &TextureImage,
        sampler: &Sampler,
    ) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), command_pool)?;
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled at creation so the first wait falls straight through
        let in_flight = Fence::new(device.clone(), true)?;

        let uniform_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            TransformsUbo::SIZE as vk::DeviceSize,
        )?;

        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(uniform_buffer.handle())
            .offset(0)
            .range(TransformsUbo::SIZE as vk::DeviceSize);
        let image_info = vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(texture.view())
            .sampler(sampler.handle());

        let buffer_infos = [buffer_info];
        let image_infos = [image_info];

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos),
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_infos),
        ];
        update_descriptor_sets(&device, &writes);

        Ok(Self {
            command_buffer,
            image_available,
            render_finished,
            in_flight,
            uniform_buffer,
            descriptor_set,
        })
    }

    /// Returns the slot's command buffer.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Returns the image-available semaphore.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Returns the render-finished semaphore.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Returns the in-flight fence.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    /// Returns the slot's descriptor set.
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Copies the transform block into the slot's mapped uniform buffer.
    pub fn write_uniform(&self, ubo: &TransformsUbo) -> RhiResult<()> {
        self.uniform_buffer.write_bytes(0, bytemuck::bytes_of(ubo))
    }
}

/// Creates `count` frame slots with their descriptor sets.
pub fn create_frame_slots(
    device: &Arc<Device>,
    command_pool: &CommandPool,
    descriptor_pool: &DescriptorPool,
    descriptor_set_layout: &DescriptorSetLayout,
    texture: &TextureImage,
    sampler: &Sampler,
    count: usize,
) -> RhiResult<Vec<FrameSlot>> {
    let layouts: Vec<_> = (0..count)
        .map(|_| descriptor_set_layout.handle())
        .collect();
    let descriptor_sets = descriptor_pool.allocate(&layouts)?;

    let mut slots = Vec::with_capacity(count);
    for (i, &descriptor_set) in descriptor_sets.iter().enumerate() {
        let slot = FrameSlot::new(
            device.clone(),
            command_pool,
            descriptor_set,
            texture,
            sampler,
        )?;
        debug!("Created frame slot {}", i);
        slots.push(slot);
    }

    info!("Created {} frame slots", count);
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
    }
}
