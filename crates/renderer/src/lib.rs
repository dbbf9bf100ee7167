//! The double-buffered frame-execution core.
//!
//! This crate drives the render loop shared by the demo family:
//! - Per-slot resource duplication ([`frame`])
//! - The submit / fence / present protocol ([`renderer`])
//! - The stop-the-world resize procedure ([`renderer`])
//! - The occlusion-query round trip with one-cycle readback lag
//!   ([`occlusion`])

pub mod content;
pub mod depth_buffer;
pub mod frame;
pub mod occlusion;
pub mod overlay;
pub mod renderer;
pub mod ubo;

pub use renderer::Renderer;

/// Number of frame slots the pipeline cycles through.
///
/// Two slots let the CPU record one frame while the GPU executes the
/// other. The wait-on-previous-use-of-same-index reasoning holds for any
/// value >= 2.
pub const FRAME_COUNT: u32 = 2;
