//! The frame scheduler and resize coordinator.
//!
//! [`Renderer`] is the single owned context for the render session: it
//! holds the device, the swapchain (presenter), the frame-slot set, the
//! demo content, and the overlay, and drives the per-frame protocol:
//!
//! 1. Acquire the slot index from the swapchain.
//! 2. Gate on the slot's fence (non-blocking fast path first) — only then
//!    may the CPU touch the slot's command buffer or constant region.
//! 3. Harvest the previous slot's occlusion result (one cycle behind).
//! 4. Write this frame's transforms into the slot's constant region.
//! 5. Record: barrier to color-write, reset the query pool, render with
//!    the query open, resolve the query after the render scope closes,
//!    barrier back to present.
//! 6. Submit, signaling the slot's fence.
//! 7. Wait that fence (fast path first) before any further CPU mutation.
//! 8. Present.
//!
//! Resize is stop-the-world: mark not-ready, drain the graphics queue and
//! then the whole device, rebuild the swapchain images/views and every
//! slot's depth buffer, recompute viewport and scissor, mark ready.
//! Correctness over latency; resize is rare and user-driven.
//!
//! Teardown runs the same drain once more before any resource is freed.
//! Fields are declared in destruction order so scoped ownership handles
//! the rest.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace};

use cadence_platform::{Surface, Window};
use cadence_rhi::descriptor::{DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout};
use cadence_rhi::device::Device;
use cadence_rhi::instance::Instance;
use cadence_rhi::physical_device::select_physical_device;
use cadence_rhi::swapchain::Swapchain;
use cadence_rhi::{RhiError, RhiResult};

use crate::FRAME_COUNT;
use crate::content::{DRAW_REGION_COUNT, DemoScene};
use crate::depth_buffer::DEFAULT_DEPTH_FORMAT;
use crate::frame::{FrameSlot, FrameSlots};
use crate::occlusion::OcclusionTracker;
use crate::overlay::{OverlayFrame, OverlayRenderer};
use crate::ubo::{TransformBlock, round_up_stride};

/// Maximum time to wait on a slot fence before declaring the frame lost.
///
/// The GPU finishing a frame is a matter of milliseconds; five seconds of
/// silence means the device hung or was lost, and the error path is
/// better than blocking forever.
pub const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

/// Multisample count of the presentation targets.
///
/// The resize guard rejects extents smaller than this.
const SAMPLE_COUNT: u32 = 1;

/// Checks whether an extent is too small to resize to.
///
/// Extents below the active sample count would produce invalid targets;
/// such resize events are a documented no-op, not an error.
fn is_degenerate_extent(width: u32, height: u32, sample_count: u32) -> bool {
    width < sample_count || height < sample_count
}

/// Builds the full-extent viewport with the standard 0..1 depth range.
fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Builds the full-extent scissor rectangle.
fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// The render session context: device, presenter, slots, and content.
///
/// Fields drop in declaration order, which is the required destruction
/// order; [`Renderer::drop`] only contributes the final idle wait.
pub struct Renderer {
    // Per-slot resources and content (allocator-backed, dropped first)
    slots: FrameSlots,
    overlay: OverlayRenderer,
    scene: DemoScene,
    descriptor_pool: DescriptorPool,
    descriptor_set_layout: DescriptorSetLayout,
    // Presentation chain
    swapchain: Swapchain,
    surface: Surface,
    // Device and instance (dropped last)
    device: Arc<Device>,
    instance: Instance,

    // Bookkeeping
    occlusion: OcclusionTracker,
    /// Ring index choosing which slot's semaphore the next acquire uses.
    acquire_ring: usize,
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
    constant_stride: u64,
    /// False while initialization or a resize is in progress; the
    /// scheduler refuses to issue frames until it is set again.
    prepared: bool,
    width: u32,
    height: u32,
}

impl Renderer {
    /// Creates the render session for the given window.
    ///
    /// Allocates the full slot set (one per swapchain image), the demo
    /// content, and the overlay. Any failure aborts initialization; RAII
    /// unwinds whatever was already created.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource creation fails.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing renderer ({}x{})", width, height);

        let enable_validation = cfg!(debug_assertions);
        let instance = Instance::new(enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            width,
            height,
            FRAME_COUNT,
        )?;
        let slot_count = swapchain.image_count() as usize;
        let extent = swapchain.extent();

        // Per-draw constant sub-regions sit at the device alignment.
        let constant_stride = round_up_stride(
            TransformBlock::SIZE as u64,
            device.uniform_offset_alignment(),
        );

        let transform_binding =
            DescriptorBindingBuilder::uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX);
        let descriptor_set_layout =
            DescriptorSetLayout::new(device.clone(), &[transform_binding])?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .descriptor_count(slot_count as u32)];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), slot_count as u32, &pool_sizes)?;

        let layouts: Vec<_> = (0..slot_count)
            .map(|_| descriptor_set_layout.handle())
            .collect();
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;

        let mut slot_vec = Vec::with_capacity(slot_count);
        for (i, &descriptor_set) in descriptor_sets.iter().enumerate() {
            let slot = FrameSlot::new(
                device.clone(),
                extent,
                constant_stride,
                DRAW_REGION_COUNT,
                TransformBlock::SIZE as u64,
                descriptor_set,
            )?;
            debug!("Created frame slot {}", i);
            slot_vec.push(slot);
        }
        let slots = FrameSlots::new(slot_vec);

        let scene = DemoScene::new(
            device.clone(),
            &descriptor_set_layout,
            swapchain.format(),
            DEFAULT_DEPTH_FORMAT,
            extent.width,
            extent.height,
        )?;

        let overlay = OverlayRenderer::new(
            device.clone(),
            swapchain.format(),
            DEFAULT_DEPTH_FORMAT,
            slot_count,
        )?;

        let occlusion = OcclusionTracker::new(slot_count);
        let viewport = full_viewport(extent);
        let scissor = full_scissor(extent);

        info!(
            "Renderer initialized: {} frame slots, {}x{}, constant stride {} bytes",
            slot_count, extent.width, extent.height, constant_stride
        );

        Ok(Self {
            slots,
            overlay,
            scene,
            descriptor_pool,
            descriptor_set_layout,
            swapchain,
            surface,
            device,
            instance,
            occlusion,
            acquire_ring: 0,
            viewport,
            scissor,
            constant_stride,
            prepared: true,
            width: extent.width,
            height: extent.height,
        })
    }

    /// Renders one frame.
    ///
    /// `overlay_frame` is appended to the slot's command buffer inside the
    /// render scope; pass `None` to skip the overlay.
    ///
    /// A no-op while the pipeline is not ready (mid-resize). Out-of-date
    /// or suboptimal presentation triggers the rebuild path rather than an
    /// error; everything else propagates — there is no partial-frame
    /// recovery, a failed frame is abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error on submit/present failure, fence timeout, or
    /// device loss.
    pub fn render_frame(&mut self, overlay_frame: Option<&OverlayFrame<'_>>) -> RhiResult<()> {
        if !self.prepared {
            return Ok(());
        }

        // The acquire semaphore comes from a ring advanced once per frame;
        // the slot it belongs to was fence-waited N frames ago, so the
        // semaphore is no longer in use.
        let acquire_semaphore = self
            .slots
            .slot(self.acquire_ring)
            .acquire_semaphore()
            .handle();

        let (image_index, acquire_suboptimal) =
            match self.swapchain.acquire_next_image(acquire_semaphore) {
                Ok(result) => result,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    debug!("Swapchain out of date during acquire, rebuilding");
                    self.rebuild_presentation()?;
                    return Ok(());
                }
                Err(vk::Result::ERROR_DEVICE_LOST) => return Err(RhiError::DeviceLost),
                Err(e) => return Err(RhiError::VulkanError(e)),
            };

        self.acquire_ring = (self.acquire_ring + 1) % self.slots.count();

        // The acquired index selects the frame slot for this whole
        // iteration; presentation order keeps it stable and cyclic.
        let slot_index = image_index as usize;

        // Gate on the slot's previous submission before any CPU access.
        {
            let fence = self.slots.slot(slot_index).fence();
            if !fence.is_signaled() {
                fence.wait(FENCE_TIMEOUT_NS)?;
            }
            fence.reset()?;
        }

        // The previous slot's query resolved under a fence this loop has
        // already waited on; its readback buffer is safe to map now.
        if let Some(prev) = self.occlusion.poll_previous(slot_index) {
            let samples = self.slots.slot(prev).query_readback().read_u64(0)?;
            self.occlusion.mark_read(prev, samples);
            trace!("Occlusion samples from previous cycle: {}", samples);
        }

        // CPU-authored state for this frame.
        self.scene.advance();
        self.scene.write_constants(
            self.slots.slot(slot_index).constant_buffer(),
            self.constant_stride,
        )?;

        self.occlusion.begin_recording(slot_index);
        self.record_commands(slot_index, overlay_frame)?;

        // Submit, signaling the slot's fence.
        let slot = self.slots.slot(slot_index);
        let wait_semaphores = [acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished_semaphore().handle()];
        let command_buffers = [slot.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.fence().handle())?;
        }

        // Wait for this submission before any further CPU mutation of the
        // slot. The fast path skips the syscall when the GPU already
        // finished. This wait is also what makes the slot's query resolve
        // materially complete.
        if !slot.fence().is_signaled() {
            slot.fence().wait(FENCE_TIMEOUT_NS)?;
        }
        self.occlusion.mark_resolved(slot_index);

        let present_result = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            slot.render_finished_semaphore().handle(),
        );

        let needs_rebuild = match present_result {
            Ok(suboptimal) => suboptimal || acquire_suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => true,
            Err(vk::Result::ERROR_DEVICE_LOST) => return Err(RhiError::DeviceLost),
            Err(e) => return Err(RhiError::VulkanError(e)),
        };

        if needs_rebuild {
            debug!("Presentation suboptimal, rebuilding swapchain");
            self.rebuild_presentation()?;
        }

        Ok(())
    }

    /// Records the slot's command buffer for this frame.
    fn record_commands(
        &self,
        slot_index: usize,
        overlay_frame: Option<&OverlayFrame<'_>>,
    ) -> RhiResult<()> {
        let slot = self.slots.slot(slot_index);
        let cmd = slot.command_buffer();

        cmd.reset()?;
        cmd.begin()?;

        // Presentation image to color-write; prior contents are cleared,
        // so the undefined source layout discards them for free.
        let color_image = self.swapchain.image(slot_index);
        cmd.transition_image(
            color_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageAspectFlags::COLOR,
        );
        cmd.transition_image(
            slot.depth().image(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageAspectFlags::DEPTH,
        );

        // Queries reset on the GPU timeline, outside the render scope.
        cmd.reset_query_pool(slot.query_pool(), 0, 1);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.image_view(slot_index))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.25, 0.25, 0.25, 1.0],
                },
            });

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(slot.depth().image_view())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(full_scissor(self.swapchain.extent()))
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);

        cmd.set_viewport(self.viewport);
        cmd.set_scissor(self.scissor);

        // The occlusion query brackets the scene's draws.
        cmd.begin_query(slot.query_pool(), 0);
        self.scene
            .record(cmd, slot.descriptor_set(), self.constant_stride);
        cmd.end_query(slot.query_pool(), 0);

        // The overlay shares the slot index and the open render scope.
        if let Some(frame) = overlay_frame {
            self.overlay.record(
                slot_index,
                cmd,
                frame,
                self.width as f32,
                self.height as f32,
            )?;
        }

        cmd.end_rendering();

        // Resolve after the render scope has closed (attachment state must
        // not be active) and before the command buffer ends.
        cmd.copy_query_pool_results(slot.query_pool(), 0, 1, slot.query_readback().handle(), 0);

        cmd.transition_image(
            color_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageAspectFlags::COLOR,
        );

        cmd.end()?;

        Ok(())
    }

    /// Handles an external width/height-changed signal.
    ///
    /// Ignored while the pipeline is not ready and for degenerate extents
    /// (either dimension below the sample count). Otherwise stops the
    /// world: drains all GPU work, rebuilds the presentation resources at
    /// the new size, and re-arms the scheduler. Repeating the same extent
    /// rebuilds into an identical resource set.
    ///
    /// # Errors
    ///
    /// Returns an error if the drain or any rebuild step fails.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if !self.prepared {
            debug!("Resize ignored: pipeline not ready");
            return Ok(());
        }

        if is_degenerate_extent(width, height, SAMPLE_COUNT) {
            debug!("Resize ignored: degenerate extent {}x{}", width, height);
            return Ok(());
        }

        info!("Resizing to {}x{}", width, height);

        self.prepared = false;
        self.width = width;
        self.height = height;

        self.rebuild_presentation()?;

        self.prepared = true;
        Ok(())
    }

    /// Drains all GPU work and rebuilds the per-slot presentation
    /// resources.
    ///
    /// Full quiescence first: the graphics queue, then the whole device.
    /// This is strictly stronger than the per-slot fence waits and
    /// guarantees nothing references the resources being destroyed. The
    /// swapchain rebuilds its images/views; each slot's depth buffer is
    /// recreated at the new extent; viewport and scissor are recomputed.
    fn rebuild_presentation(&mut self) -> RhiResult<()> {
        self.device.wait_queue_idle()?;
        self.device.wait_idle()?;

        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.width, self.height)?;

        // The slot set is sized once at startup; a surface that changes
        // its image count mid-session would desynchronize slot and image
        // indexing.
        if self.swapchain.image_count() as usize != self.slots.count() {
            return Err(RhiError::SwapchainError(format!(
                "Swapchain image count changed from {} to {}",
                self.slots.count(),
                self.swapchain.image_count()
            )));
        }

        let extent = self.swapchain.extent();
        for slot in self.slots.iter_mut() {
            slot.rebuild_depth(self.device.clone(), extent)?;
        }

        self.viewport = full_viewport(extent);
        self.scissor = full_scissor(extent);
        self.width = extent.width;
        self.height = extent.height;
        self.acquire_ring = 0;

        debug!(
            "Presentation rebuilt: {}x{}, {} slots",
            extent.width, extent.height,
            self.slots.count()
        );

        Ok(())
    }

    /// Returns the most recent occlusion sample count, one cycle behind
    /// the frame that produced it.
    #[inline]
    pub fn occlusion_samples(&self) -> Option<u64> {
        self.occlusion.last_samples()
    }

    /// Returns the current presentation extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the current rotation angle of the demo content.
    #[inline]
    pub fn rotation_angle(&self) -> f32 {
        self.scene.angle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Process exit follows the same quiescence rule as resize: queue
        // idle, then device idle, before anything is freed. The fields
        // themselves drop in declaration order.
        if let Err(e) = self.device.wait_queue_idle() {
            error!("Queue idle wait failed during teardown: {:?}", e);
        }
        if let Err(e) = self.device.wait_idle() {
            error!("Device idle wait failed during teardown: {:?}", e);
        }
        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_extent_guard() {
        assert!(is_degenerate_extent(0, 540, 1));
        assert!(is_degenerate_extent(960, 0, 1));
        assert!(!is_degenerate_extent(1, 1, 1));
        assert!(!is_degenerate_extent(960, 540, 1));

        // With multisampling the guard tightens.
        assert!(is_degenerate_extent(3, 540, 4));
        assert!(!is_degenerate_extent(4, 4, 4));
    }

    #[test]
    fn test_full_viewport_matches_extent() {
        let viewport = full_viewport(vk::Extent2D {
            width: 960,
            height: 540,
        });
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 0.0);
        assert_eq!(viewport.width, 960.0);
        assert_eq!(viewport.height, 540.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_full_scissor_matches_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_viewport_recompute_is_idempotent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let a = full_viewport(extent);
        let b = full_viewport(extent);
        assert_eq!(a.width, b.width);
        assert_eq!(a.height, b.height);
        assert_eq!(full_scissor(extent).extent, full_scissor(extent).extent);
    }
}
