//! Frame-paced rendering of a rotating textured quad.
//!
//! This crate owns the per-frame protocol: keeping a fixed number of frames
//! in flight against the swapchain, sequencing GPU work with fences and
//! semaphores, and rebuilding swapchain-dependent state when the surface
//! changes.

pub mod config;
pub mod frame;
pub mod pacing;
pub mod renderer;
pub mod ubo;

pub use config::RendererConfig;
pub use renderer::{Renderer, TexturePixels};
