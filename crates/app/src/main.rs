//! Spinquad - Main Entry Point
//!
//! Drives the window event loop and the frame-paced quad renderer.

use anyhow::Result;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use spinquad_platform::Window;
use spinquad_renderer::{Renderer, RendererConfig, TexturePixels};

/// Default texture file; a generated checkerboard stands in when missing.
const TEXTURE_PATH: &str = "textures/texture.png";

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let config = RendererConfig::default();

        let window = match Window::new(
            event_loop,
            config.window_width,
            config.window_height,
            &config.window_title,
        ) {
            Ok(window) => window,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("window creation"));
                return;
            }
        };

        let (width, height, rgba) = load_texture_pixels();
        let pixels = TexturePixels {
            width,
            height,
            rgba: &rgba,
        };

        match Renderer::new(&window, config, pixels) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                self.fail(
                    event_loop,
                    anyhow::Error::new(e).context("renderer creation"),
                );
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.renderer {
                    if let Err(e) = renderer.render_frame() {
                        self.fail(event_loop, anyhow::Error::new(e).context("render frame"));
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

/// Decodes the texture file into packed RGBA8, or generates a checkerboard
/// when the file is absent. The renderer only ever sees raw pixels.
fn load_texture_pixels() -> (u32, u32, Vec<u8>) {
    match image::open(TEXTURE_PATH) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            info!("Loaded texture {TEXTURE_PATH} ({width}x{height})");
            (width, height, rgba.into_raw())
        }
        Err(e) => {
            warn!("Could not open {TEXTURE_PATH} ({e}), using generated checkerboard");
            checkerboard(256, 32)
        }
    }
}

/// Generates a two-tone checkerboard texture.
fn checkerboard(size: u32, cell: u32) -> (u32, u32, Vec<u8>) {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let even = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if even { 230 } else { 60 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    (size, size, pixels)
}

fn main() -> Result<()> {
    spinquad_core::init_logging();
    info!("Starting Spinquad");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    // A fatal setup or runtime error terminates with a nonzero exit code
    if let Some(err) = app.fatal.take() {
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_dimensions_and_alpha() {
        let (width, height, pixels) = checkerboard(64, 8);
        assert_eq!((width, height), (64, 64));
        assert_eq!(pixels.len(), 64 * 64 * 4);
        // Fully opaque everywhere
        assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_checkerboard_alternates_cells() {
        let (_, _, pixels) = checkerboard(16, 8);
        let first = pixels[0];
        // 8 pixels to the right lands in the neighboring cell
        let neighbor = pixels[(8 * 4) as usize];
        assert_ne!(first, neighbor);
    }
}
