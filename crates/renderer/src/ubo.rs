//! Uniform buffer object definitions.
//!
//! The structure must match the shader uniform block layout exactly; it is
//! raw byte-copied into each frame slot's mapped uniform buffer every frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Per-frame transform block: model, view, projection.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TransformsUbo {
    /// Model matrix (object to world space).
    pub model: Mat4,
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix (view to clip space).
    pub proj: Mat4,
}

impl TransformsUbo {
    /// Size of the block in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Rotation speed of the quad in degrees per second.
    const DEGREES_PER_SECOND: f32 = 90.0;

    /// Builds the transform block for a given wall-clock time.
    ///
    /// The model rotates about the Z axis proportionally to elapsed seconds;
    /// view and projection are fixed apart from the aspect ratio. The
    /// projection's Y axis is flipped for Vulkan clip space, where Y points
    /// down.
    pub fn spinning(elapsed_secs: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z(elapsed_secs * Self::DEGREES_PER_SECOND.to_radians());

        let view = Mat4::look_at_rh(Vec3::new(2.0, 2.0, 2.0), Vec3::ZERO, Vec3::Z);

        let mut proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_ubo_size_and_alignment() {
        // 3 x Mat4 = 192 bytes, 16-byte aligned for the GPU
        assert_eq!(TransformsUbo::SIZE, 192);
        assert_eq!(std::mem::align_of::<TransformsUbo>(), 16);
    }

    #[test]
    fn test_model_is_identity_at_time_zero() {
        let ubo = TransformsUbo::spinning(0.0, 4.0 / 3.0);
        assert_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn test_model_rotates_quarter_turn_per_second() {
        let ubo = TransformsUbo::spinning(1.0, 1.0);
        // After one second the X axis should map onto Y
        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 0.0);
        assert!((rotated.x - 0.0).abs() < 1e-5);
        assert!((rotated.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_projection_y_axis_is_flipped() {
        let ubo = TransformsUbo::spinning(0.0, 16.0 / 9.0);
        let unflipped = Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 10.0);
        assert_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
    }

    #[test]
    fn test_ubo_byte_cast() {
        let ubo = TransformsUbo::spinning(0.5, 1.5);
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), TransformsUbo::SIZE);
    }
}
