//! Window and surface management for the quad renderer.
//!
//! Wraps winit window creation and Vulkan surface creation. The renderer
//! only ever sees the RAII [`Surface`] wrapper and the drawable size.

mod window;

pub use window::{Surface, Window};
