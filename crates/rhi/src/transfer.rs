//! Staged host-to-device transfers.
//!
//! One-shot copies through a temporary host-visible staging buffer, for
//! destinations that live in memory the CPU cannot address. Each upload
//! records a one-time command buffer, submits it on the graphics queue, and
//! blocks until the queue is idle before releasing the staging buffer.
//!
//! Intentionally synchronous and not frame-pipelined: uploads run only
//! during initialization, never on the per-frame hot path, so the cost is
//! amortized once.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::TextureImage;

/// Synchronous uploader for immutable device-local resources.
pub struct StagedUploader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Transient pool for one-shot transfer command buffers.
    pool: CommandPool,
}

impl StagedUploader {
    /// Creates an uploader recording on the graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if the transient command pool cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics_family.ok_or_else(|| {
            RhiError::TransferError("graphics queue family not resolved".to_string())
        })?;
        let pool = CommandPool::new_transient(device.clone(), graphics_family)?;
        Ok(Self { device, pool })
    }

    /// Uploads `data` into a new device-local buffer with the given usage.
    ///
    /// # Errors
    ///
    /// A zero-length source is a contract violation and is rejected, as is a
    /// destination usage that is not device-local (uniform and staging
    /// buffers are written directly through their mapping, never staged).
    pub fn upload_buffer(&self, usage: BufferUsage, data: &[u8]) -> RhiResult<Buffer> {
        validate_buffer_upload(usage, data.len())?;

        let size = data.len() as vk::DeviceSize;

        let staging = Buffer::new(self.device.clone(), BufferUsage::Staging, size)?;
        staging.write_bytes(0, data)?;

        let destination = Buffer::new(self.device.clone(), usage, size)?;

        self.submit_one_time(|cmd| {
            let region = vk::BufferCopy::default().size(size);
            cmd.copy_buffer(staging.handle(), destination.handle(), &[region]);
        })?;

        info!(
            "Uploaded {} bytes into device-local {} buffer",
            size,
            usage.name()
        );

        // staging dropped here, after the queue went idle
        Ok(destination)
    }

    /// Uploads packed row-major RGBA8 pixels into a new sampled texture.
    ///
    /// The image is transitioned UNDEFINED -> TRANSFER_DST for the copy and
    /// TRANSFER_DST -> SHADER_READ_ONLY afterwards, so the returned texture
    /// is immediately bindable.
    ///
    /// # Errors
    ///
    /// Rejects an empty source, a zero-area extent, and a byte length that
    /// does not match `width * height * 4`.
    pub fn upload_texture(&self, width: u32, height: u32, rgba: &[u8]) -> RhiResult<TextureImage> {
        validate_texture_upload(width, height, rgba.len())?;

        let staging = Buffer::new(
            self.device.clone(),
            BufferUsage::Staging,
            rgba.len() as vk::DeviceSize,
        )?;
        staging.write_bytes(0, rgba)?;

        let texture = TextureImage::new(self.device.clone(), width, height)?;

        self.submit_one_time(|cmd| {
            transition_image_layout(
                cmd,
                texture.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(
                staging.handle(),
                texture.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            transition_image_layout(
                cmd,
                texture.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        info!("Uploaded {}x{} RGBA8 texture", width, height);

        Ok(texture)
    }

    /// Records, submits, and synchronously completes a one-shot command
    /// buffer on the graphics queue.
    fn submit_one_time(&self, record: impl FnOnce(&CommandBuffer)) -> RhiResult<()> {
        let cmd = CommandBuffer::new(self.device.clone(), &self.pool)?;

        cmd.begin_one_time()?;
        record(&cmd);
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                vk::Fence::null(),
            )?;
            self.device
                .handle()
                .queue_wait_idle(self.device.graphics_queue())?;
        }

        self.pool.free(&command_buffers);
        debug!("One-time transfer submission completed");
        Ok(())
    }
}

/// Checks the buffer-upload contract before any GPU work is recorded.
///
/// A zero-length source is a configuration bug, not a runtime condition,
/// and host-visible destinations are written through their mapping instead
/// of being staged.
fn validate_buffer_upload(usage: BufferUsage, len: usize) -> RhiResult<()> {
    if len == 0 {
        return Err(RhiError::TransferError(
            "zero-length staged upload".to_string(),
        ));
    }
    if usage.is_host_visible() {
        return Err(RhiError::TransferError(format!(
            "{} buffers are host-visible and must not be staged",
            usage.name()
        )));
    }
    Ok(())
}

/// Checks the texture-upload contract before any GPU work is recorded.
fn validate_texture_upload(width: u32, height: u32, len: usize) -> RhiResult<()> {
    if len == 0 {
        return Err(RhiError::TransferError(
            "zero-length staged upload".to_string(),
        ));
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(RhiError::TransferError(format!(
            "texture byte length {} does not match {}x{} RGBA8 ({} bytes)",
            len, width, height, expected
        )));
    }
    Ok(())
}

/// Records a layout transition for the transfer path.
fn transition_image_layout(
    cmd: &CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
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

    cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_buffer_upload_is_rejected() {
        assert!(matches!(
            validate_buffer_upload(BufferUsage::Vertex, 0),
            Err(RhiError::TransferError(_))
        ));
        assert!(matches!(
            validate_buffer_upload(BufferUsage::Index, 0),
            Err(RhiError::TransferError(_))
        ));
    }

    #[test]
    fn test_host_visible_destinations_are_rejected() {
        assert!(matches!(
            validate_buffer_upload(BufferUsage::Uniform, 64),
            Err(RhiError::TransferError(_))
        ));
        assert!(matches!(
            validate_buffer_upload(BufferUsage::Staging, 64),
            Err(RhiError::TransferError(_))
        ));
    }

    #[test]
    fn test_device_local_uploads_pass_validation() {
        assert!(validate_buffer_upload(BufferUsage::Vertex, 80).is_ok());
        assert!(validate_buffer_upload(BufferUsage::Index, 12).is_ok());
    }

    #[test]
    fn test_texture_upload_byte_length_contract() {
        // 4x3 RGBA8 is exactly 48 bytes
        assert!(validate_texture_upload(4, 3, 48).is_ok());
        assert!(matches!(
            validate_texture_upload(4, 3, 47),
            Err(RhiError::TransferError(_))
        ));
        assert!(matches!(
            validate_texture_upload(4, 3, 0),
            Err(RhiError::TransferError(_))
        ));
    }
}
