//! Platform layer for the frame-execution demos.
//!
//! This crate provides the window-system collaborators the frame core
//! treats as external:
//! - Window management via winit
//! - Vulkan surface creation
//! - Delivery of the resize signal (the window system's width/height
//!   events reach the core through the application loop)

mod window;

pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
