//! Cadence demo - main entry point.
//!
//! Drives the double-buffered frame core: two rotating quads with depth
//! testing, a per-frame occlusion query read back one cycle late, and a
//! small translucent overlay marker exercising the per-slot overlay
//! buffers.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use cadence_core::Timer;
use cadence_platform::Window;
use cadence_renderer::Renderer;
use cadence_renderer::overlay::{OverlayDrawCmd, OverlayFrame};
use cadence_rhi::vertex::OverlayVertex;

/// Initial window size, matching the demo family.
const WINDOW_WIDTH: u32 = 960;
const WINDOW_HEIGHT: u32 = 540;

/// How often to log the occlusion readback, in frames.
const SAMPLE_LOG_INTERVAL: u64 = 120;

/// Overlay marker geometry: one translucent panel in the top-left corner.
struct OverlayMarker {
    vertices: [OverlayVertex; 4],
    indices: [u16; 6],
    commands: [OverlayDrawCmd; 1],
}

impl OverlayMarker {
    fn new() -> Self {
        // Packed RGBA8 (little-endian R,G,B,A): dark panel at half alpha.
        let color = u32::from_le_bytes([16, 16, 16, 192]);

        let (x0, y0, x1, y1) = (16.0, 16.0, 176.0, 56.0);
        let vertices = [
            OverlayVertex::new([x0, y0], [0.0, 0.0], color),
            OverlayVertex::new([x1, y0], [1.0, 0.0], color),
            OverlayVertex::new([x1, y1], [1.0, 1.0], color),
            OverlayVertex::new([x0, y1], [0.0, 1.0], color),
        ];
        let indices = [0, 1, 2, 2, 3, 0];
        let commands = [OverlayDrawCmd {
            clip_rect: [x0, y0, x1, y1],
            index_count: 6,
            index_offset: 0,
            vertex_offset: 0,
        }];

        Self {
            vertices,
            indices,
            commands,
        }
    }

    fn frame(&self) -> OverlayFrame<'_> {
        OverlayFrame {
            vertices: &self.vertices,
            indices: &self.indices,
            commands: &self.commands,
        }
    }
}

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    marker: OverlayMarker,
    timer: Timer,
    frame_counter: u64,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            marker: OverlayMarker::new(),
            timer: Timer::new(),
            frame_counter: 0,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, "Cadence") {
                Ok(window) => match Renderer::new(&window) {
                    Ok(renderer) => {
                        info!("Initialization complete, entering main loop");
                        self.renderer = Some(renderer);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        // Setup failure is unrecoverable; RAII has already
                        // unwound whatever was created.
                        error!("Failed to create renderer: {:?}", e);
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
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
                    if let Err(e) = renderer.resize(size.width, size.height) {
                        error!("Resize failed: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.renderer {
                    let overlay = self.marker.frame();
                    if let Err(e) = renderer.render_frame(Some(&overlay)) {
                        // Steady-state failure is fatal: no partial-frame
                        // recovery exists, so stop the loop.
                        error!("Render error, exiting: {:?}", e);
                        event_loop.exit();
                        return;
                    }

                    self.frame_counter += 1;
                    if self.frame_counter % SAMPLE_LOG_INTERVAL == 0 {
                        let elapsed = self.timer.tick().as_secs_f64();
                        let fps = SAMPLE_LOG_INTERVAL as f64 / elapsed.max(f64::EPSILON);
                        if let Some(samples) = renderer.occlusion_samples() {
                            info!(
                                "frame {}: {:.1} fps, previous cycle drew {} samples",
                                self.frame_counter, fps, samples
                            );
                        } else {
                            info!("frame {}: {:.1} fps", self.frame_counter, fps);
                        }
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

fn main() -> Result<()> {
    cadence_core::init_logging();
    info!("Starting cadence");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
