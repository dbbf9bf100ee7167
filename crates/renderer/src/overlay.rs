//! Debug-overlay renderer.
//!
//! The overlay consumes the same per-slot double-buffering discipline as
//! the main scene: it keeps its own parallel set of dynamic vertex /
//! index / constant buffers keyed by the slot index the scheduler hands
//! it, and appends its draws to the currently open command buffer before
//! the frame's render scope closes.
//!
//! What the overlay *draws* is the caller's business — an
//! [`OverlayFrame`] is just pre-built geometry plus clipped draw
//! commands, the shape an immediate-mode GUI emits each frame. A frame
//! whose geometry exceeds the fixed buffer capacity is rejected (the
//! draw is skipped for this frame), never grown mid-frame.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{info, warn};

use cadence_rhi::buffer::{Buffer, BufferUsage};
use cadence_rhi::command::CommandBuffer;
use cadence_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, update_descriptor_sets,
};
use cadence_rhi::device::Device;
use cadence_rhi::pipeline::{
    ColorBlendAttachment, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use cadence_rhi::shader::{Shader, ShaderStage};
use cadence_rhi::vertex::OverlayVertex;
use cadence_rhi::RhiResult;

/// Maximum number of primitives one overlay frame may carry.
pub const MAX_OVERLAY_PRIMITIVES: usize = 4096;

/// Vertex capacity of each slot's vertex buffer.
pub const MAX_OVERLAY_VERTICES: usize = MAX_OVERLAY_PRIMITIVES * 4;

/// Index capacity of each slot's index buffer.
pub const MAX_OVERLAY_INDICES: usize = MAX_OVERLAY_PRIMITIVES * 6;

/// One clipped draw range into an overlay frame's geometry.
#[derive(Clone, Copy, Debug)]
pub struct OverlayDrawCmd {
    /// Clip rectangle as (min x, min y, max x, max y) in pixels.
    pub clip_rect: [f32; 4],
    /// Number of indices to draw.
    pub index_count: u32,
    /// First index within the frame's index data.
    pub index_offset: u32,
    /// Vertex offset added to each index.
    pub vertex_offset: i32,
}

/// One frame of overlay geometry, built by the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayFrame<'a> {
    /// Vertex data for every draw command.
    pub vertices: &'a [OverlayVertex],
    /// 16-bit index data for every draw command.
    pub indices: &'a [u16],
    /// Draw commands, issued in order.
    pub commands: &'a [OverlayDrawCmd],
}

/// Checks whether a frame's geometry fits the fixed per-slot buffers.
pub fn frame_fits(vertex_count: usize, index_count: usize) -> bool {
    vertex_count <= MAX_OVERLAY_VERTICES && index_count <= MAX_OVERLAY_INDICES
}

/// Builds the overlay's pixel-space orthographic projection.
///
/// Maps (0,0) at the top-left and (width,height) at the bottom-right of
/// the display onto clip space.
pub fn overlay_projection(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width, height, 0.0, 0.0, 1.0)
}

/// Clamps a draw command's clip rectangle to a valid scissor.
///
/// Negative origins clamp to zero and degenerate sizes to one pixel, the
/// way the immediate-mode draw lists expect.
pub fn clamp_clip_rect(clip: [f32; 4]) -> vk::Rect2D {
    let x = (clip[0] as i32).max(0);
    let y = (clip[1] as i32).max(0);
    let w = ((clip[2] - clip[0]) as i32).max(1);
    let h = ((clip[3] - clip[1]) as i32).max(1);

    vk::Rect2D {
        offset: vk::Offset2D { x, y },
        extent: vk::Extent2D {
            width: w as u32,
            height: h as u32,
        },
    }
}

/// Per-slot dynamic buffers for the overlay.
struct OverlaySlot {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    constant_buffer: Buffer,
    descriptor_set: vk::DescriptorSet,
}

/// Renders caller-supplied overlay geometry with per-slot buffer reuse.
pub struct OverlayRenderer {
    slots: Vec<OverlaySlot>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    _descriptor_pool: DescriptorPool,
    _descriptor_set_layout: DescriptorSetLayout,
}

impl OverlayRenderer {
    /// Creates the overlay pipeline and one buffer set per frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
        slot_count: usize,
    ) -> RhiResult<Self> {
        let projection_binding =
            DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        let descriptor_set_layout =
            DescriptorSetLayout::new(device.clone(), &[projection_binding])?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(slot_count as u32)];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), slot_count as u32, &pool_sizes)?;

        let layouts: Vec<_> = (0..slot_count)
            .map(|_| descriptor_set_layout.handle())
            .collect();
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;

        let mut slots = Vec::with_capacity(slot_count);
        for &descriptor_set in &descriptor_sets {
            let vertex_buffer = Buffer::new(
                device.clone(),
                BufferUsage::Vertex,
                (MAX_OVERLAY_VERTICES * std::mem::size_of::<OverlayVertex>()) as u64,
            )?;
            let index_buffer = Buffer::new(
                device.clone(),
                BufferUsage::Index,
                (MAX_OVERLAY_INDICES * std::mem::size_of::<u16>()) as u64,
            )?;
            let constant_buffer = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                std::mem::size_of::<Mat4>() as u64,
            )?;

            let buffer_info = vk::DescriptorBufferInfo::default()
                .buffer(constant_buffer.handle())
                .offset(0)
                .range(std::mem::size_of::<Mat4>() as u64);
            let buffer_infos = [buffer_info];

            let write = vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos);
            update_descriptor_sets(&device, &[write]);

            slots.push(OverlaySlot {
                vertex_buffer,
                index_buffer,
                constant_buffer,
                descriptor_set,
            });
        }

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/overlay.vert.spv"),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/overlay.frag.spv"),
            ShaderStage::Fragment,
            "main",
        )?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;

        // Alpha-blended, no depth interaction; the depth format still has
        // to match the render scope the overlay is recorded inside.
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(OverlayVertex::binding_description())
            .vertex_attributes(&OverlayVertex::attribute_descriptions())
            .color_attachment_format(color_format)
            .depth_attachment_format(depth_format)
            .color_blend_attachment(ColorBlendAttachment::alpha_blend())
            .cull_mode(CullMode::None)
            .build(device, &pipeline_layout)?;

        info!("Overlay renderer created ({} slots)", slot_count);

        Ok(Self {
            slots,
            pipeline,
            pipeline_layout,
            _descriptor_pool: descriptor_pool,
            _descriptor_set_layout: descriptor_set_layout,
        })
    }

    /// Uploads a frame's geometry into the slot's buffers and records its
    /// draws into the open command buffer.
    ///
    /// Returns `Ok(false)` without recording anything when the frame is
    /// empty, the display is degenerate, or the geometry exceeds the
    /// per-slot capacity.
    ///
    /// The slot's buffers are safe to overwrite because the scheduler has
    /// already passed the slot's fence gate for this index.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer upload fails.
    pub fn record(
        &self,
        slot_index: usize,
        cmd: &CommandBuffer,
        frame: &OverlayFrame<'_>,
        display_width: f32,
        display_height: f32,
    ) -> RhiResult<bool> {
        if frame.commands.is_empty() || display_width < 1.0 || display_height < 1.0 {
            return Ok(false);
        }

        if !frame_fits(frame.vertices.len(), frame.indices.len()) {
            warn!(
                "Overlay frame rejected: {} vertices / {} indices exceed capacity",
                frame.vertices.len(),
                frame.indices.len()
            );
            return Ok(false);
        }

        let slot = &self.slots[slot_index];

        slot.vertex_buffer
            .write_data(0, bytemuck::cast_slice(frame.vertices))?;
        slot.index_buffer
            .write_data(0, bytemuck::cast_slice(frame.indices))?;

        let projection = overlay_projection(display_width, display_height);
        slot.constant_buffer
            .write_data(0, bytemuck::bytes_of(&projection))?;

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &[slot.descriptor_set],
            &[],
        );
        cmd.bind_vertex_buffers(0, &[slot.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(slot.index_buffer.handle(), 0, vk::IndexType::UINT16);

        for draw in frame.commands {
            cmd.set_scissor(clamp_clip_rect(draw.clip_rect));
            cmd.draw_indexed(draw.index_count, 1, draw.index_offset, draw.vertex_offset, 0);
        }

        Ok(true)
    }

    /// Returns the number of per-slot buffer sets.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_frame_fits_capacity() {
        assert!(frame_fits(0, 0));
        assert!(frame_fits(MAX_OVERLAY_VERTICES, MAX_OVERLAY_INDICES));
        assert!(!frame_fits(MAX_OVERLAY_VERTICES + 1, 0));
        assert!(!frame_fits(0, MAX_OVERLAY_INDICES + 1));
    }

    #[test]
    fn test_clamp_clip_rect_clamps_origin() {
        let rect = clamp_clip_rect([-5.0, -3.0, 100.0, 50.0]);
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.offset.y, 0);
        // Size is still measured from the unclamped corners.
        assert_eq!(rect.extent.width, 105);
        assert_eq!(rect.extent.height, 53);
    }

    #[test]
    fn test_clamp_clip_rect_degenerate_size() {
        let rect = clamp_clip_rect([10.0, 10.0, 10.0, 10.0]);
        assert_eq!(rect.extent.width, 1);
        assert_eq!(rect.extent.height, 1);
    }

    #[test]
    fn test_overlay_projection_maps_corners() {
        let proj = overlay_projection(960.0, 540.0);

        let top_left = proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((top_left.x + 1.0).abs() < 1e-6);
        assert!((top_left.y - 1.0).abs() < 1e-6);

        let bottom_right = proj * Vec4::new(960.0, 540.0, 0.0, 1.0);
        assert!((bottom_right.x - 1.0).abs() < 1e-6);
        assert!((bottom_right.y + 1.0).abs() < 1e-6);
    }
}
