//! Per-slot frame resources.
//!
//! A [`FrameSlot`] is one of the N parallel sets of resources that let the
//! CPU record a frame while the GPU executes the previous one. Everything
//! the CPU mutates per frame lives here, gated by the slot's fence:
//!
//! - the command pool/buffer, reset and re-recorded each use
//! - the persistently mapped constant region (per-draw transform
//!   sub-regions at the device alignment stride)
//! - the occlusion query pool and its CPU-readable readback buffer
//! - the acquire / render-finished semaphores and the in-flight fence
//!
//! The presentation image and view are *not* owned here: they belong to
//! the swapchain and are looked up by the same slot index.
//!
//! [`FrameSlots`] holds the whole set behind a cyclic-index accessor, so a
//! single index selects every per-slot resource at once and no parallel
//! array can fall out of sync.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use cadence_rhi::buffer::{Buffer, BufferUsage};
use cadence_rhi::command::{CommandBuffer, CommandPool};
use cadence_rhi::descriptor::update_descriptor_sets;
use cadence_rhi::device::Device;
use cadence_rhi::query::QueryPool;
use cadence_rhi::sync::{Fence, Semaphore};
use cadence_rhi::{RhiError, RhiResult};

use crate::depth_buffer::DepthBuffer;

/// One frame slot's worth of GPU resources.
pub struct FrameSlot {
    command_pool: CommandPool,
    command_buffer: CommandBuffer,
    constant_buffer: Buffer,
    depth: DepthBuffer,
    query_pool: QueryPool,
    query_readback: Buffer,
    acquire_semaphore: Semaphore,
    render_finished_semaphore: Semaphore,
    in_flight_fence: Fence,
    descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    /// Creates the resources for one slot.
    ///
    /// The constant buffer holds `region_count` sub-regions of
    /// `region_size` bytes each, placed at `constant_stride` intervals,
    /// and stays mapped for its whole lifetime. The descriptor set is
    /// pointed at the first region with a dynamic-offset binding; draws
    /// select their region by offset. The fence starts signaled so the
    /// slot's first use does not block.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails; already-created
    /// resources unwind automatically.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        constant_stride: u64,
        region_count: u64,
        region_size: u64,
        descriptor_set: vk::DescriptorSet,
    ) -> RhiResult<Self> {
        if region_size > constant_stride {
            return Err(RhiError::InvalidHandle(format!(
                "Constant region of {} bytes does not fit the {}-byte stride",
                region_size, constant_stride
            )));
        }

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;

        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;

        let constant_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            constant_stride * region_count,
        )?;

        let depth = DepthBuffer::with_default_format(device.clone(), extent.width, extent.height)?;

        let query_pool = QueryPool::new_occlusion(device.clone(), 1)?;
        let query_readback = Buffer::new(
            device.clone(),
            BufferUsage::Readback,
            std::mem::size_of::<u64>() as u64,
        )?;

        let acquire_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device.clone(), true)?;

        // Point the dynamic-offset binding at the first constant region.
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(constant_buffer.handle())
            .offset(0)
            .range(region_size);
        let buffer_infos = [buffer_info];

        let write = vk::WriteDescriptorSet::default()
            .dst_set(descriptor_set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&buffer_infos);
        update_descriptor_sets(&device, &[write]);

        Ok(Self {
            command_pool,
            command_buffer,
            constant_buffer,
            depth,
            query_pool,
            query_readback,
            acquire_semaphore,
            render_finished_semaphore,
            in_flight_fence,
            descriptor_set,
        })
    }

    /// Returns the slot's command buffer.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Returns the slot's command pool.
    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Returns the slot's mapped constant buffer.
    #[inline]
    pub fn constant_buffer(&self) -> &Buffer {
        &self.constant_buffer
    }

    /// Returns the slot's depth buffer.
    #[inline]
    pub fn depth(&self) -> &DepthBuffer {
        &self.depth
    }

    /// Returns the slot's occlusion query pool.
    #[inline]
    pub fn query_pool(&self) -> &QueryPool {
        &self.query_pool
    }

    /// Returns the slot's query readback buffer.
    #[inline]
    pub fn query_readback(&self) -> &Buffer {
        &self.query_readback
    }

    /// Returns the semaphore used when acquiring a presentation image.
    #[inline]
    pub fn acquire_semaphore(&self) -> &Semaphore {
        &self.acquire_semaphore
    }

    /// Returns the semaphore signaled when this slot's rendering finishes.
    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    /// Returns the slot's in-flight fence.
    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    /// Returns the slot's descriptor set.
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Rebuilds the slot's depth buffer at a new extent.
    ///
    /// Only valid once the resize coordinator has drained all GPU work;
    /// the old buffer is dropped in place.
    pub fn rebuild_depth(&mut self, device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<()> {
        self.depth = DepthBuffer::with_default_format(device, extent.width, extent.height)?;
        Ok(())
    }
}

/// The fixed set of frame slots, addressed by cyclic index.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    /// Wraps the allocated slots.
    ///
    /// # Panics
    ///
    /// Panics if `slots` is empty.
    pub fn new(slots: Vec<FrameSlot>) -> Self {
        assert!(!slots.is_empty(), "frame pipeline needs at least one slot");
        debug!("Frame slot set created ({} slots)", slots.len());
        Self { slots }
    }

    /// Returns the number of slots.
    #[inline]
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the slot at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Returns the slot at `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        &mut self.slots[index]
    }

    /// Returns the cyclically previous index.
    #[inline]
    pub fn previous_index(&self, index: usize) -> usize {
        previous_slot_index(index, self.slots.len())
    }

    /// Iterates over all slots mutably (resize rebuild, teardown).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot> {
        self.slots.iter_mut()
    }
}

/// Computes the cyclically previous slot index.
#[inline]
pub fn previous_slot_index(index: usize, count: usize) -> usize {
    (index + count - 1) % count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_slot_index_double_buffered() {
        assert_eq!(previous_slot_index(0, 2), 1);
        assert_eq!(previous_slot_index(1, 2), 0);
    }

    #[test]
    fn test_previous_slot_index_generalizes() {
        assert_eq!(previous_slot_index(0, 3), 2);
        assert_eq!(previous_slot_index(1, 3), 0);
        assert_eq!(previous_slot_index(2, 3), 1);
        assert_eq!(previous_slot_index(0, 4), 3);
    }

    #[test]
    fn test_cycle_visits_every_slot_before_reuse() {
        // Walking forward N steps from any index returns to it, and the
        // previous-index accessor inverts a forward step.
        for count in 2..5usize {
            for start in 0..count {
                let mut index = start;
                for _ in 0..count {
                    let next = (index + 1) % count;
                    assert_eq!(previous_slot_index(next, count), index);
                    index = next;
                }
                assert_eq!(index, start);
            }
        }
    }
}
