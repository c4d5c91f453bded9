//! Renderer configuration.
//!
//! One immutable value passed into [`crate::Renderer::new`]; there is no
//! global mutable configuration anywhere in the engine.

use std::path::PathBuf;

use ash::vk;

/// Immutable renderer configuration.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Window title.
    pub window_title: String,
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Enable the Khronos validation layer when available.
    pub enable_validation: bool,
    /// Preferred swapchain (format, color space) pair.
    pub preferred_surface_format: vk::SurfaceFormatKHR,
    /// Preferred present mode; FIFO is the fallback when unsupported.
    pub preferred_present_mode: vk::PresentModeKHR,
    /// Number of frames computed concurrently with the display engine.
    pub frames_in_flight: usize,
    /// Clear color for the single color attachment.
    pub clear_color: [f32; 4],
    /// Path to the compiled vertex shader blob.
    pub vertex_shader_path: PathBuf,
    /// Path to the compiled fragment shader blob.
    pub fragment_shader_path: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window_title: "Spinquad".to_string(),
            window_width: 800,
            window_height: 600,
            enable_validation: cfg!(debug_assertions),
            preferred_surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader_path: PathBuf::from("shaders/spirv/quad.vert.spv"),
            fragment_shader_path: PathBuf::from("shaders/spirv/quad.frag.spv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frames_in_flight_is_sane() {
        let config = RendererConfig::default();
        assert!(config.frames_in_flight >= 1);
        assert!(config.frames_in_flight <= 4);
    }

    #[test]
    fn test_default_window_is_non_degenerate() {
        let config = RendererConfig::default();
        assert!(config.window_width > 0);
        assert!(config.window_height > 0);
    }
}
