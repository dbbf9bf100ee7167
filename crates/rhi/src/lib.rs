//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It covers the capability set the frame-execution core is built on:
//! - Instance and device creation
//! - Swapchain management (acquire / present / recreate)
//! - Command buffer recording
//! - Buffer management, including CPU-readable readback heaps
//! - Occlusion query pools
//! - Synchronization primitives (fences and semaphores)
//! - Pipeline and shader module creation

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod query;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
