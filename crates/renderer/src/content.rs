//! Demo scene content.
//!
//! The content collaborator: two rotating quads drawn with per-draw
//! transform blocks. The frame core only hands it a slot's constant
//! region to fill and an open command buffer to record into; it knows
//! nothing about slots beyond the stride of the region it writes.
//!
//! The front quad spins about Y slightly toward the camera, the back quad
//! about X at double speed, so depth testing between the two is visible.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::info;

use cadence_rhi::buffer::{Buffer, BufferUsage};
use cadence_rhi::command::CommandBuffer;
use cadence_rhi::descriptor::DescriptorSetLayout;
use cadence_rhi::device::Device;
use cadence_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use cadence_rhi::shader::{Shader, ShaderStage};
use cadence_rhi::vertex::MeshVertex;
use cadence_rhi::RhiResult;

use crate::ubo::TransformBlock;

/// Rotation advance per frame, in radians.
pub const ROTATION_STEP: f32 = 0.025;

/// Number of per-draw constant sub-regions a slot carries.
pub const DRAW_REGION_COUNT: u64 = 2;

/// Index count of the quad (two triangles).
const QUAD_INDEX_COUNT: u32 = 6;

/// World transform of the front quad at the given rotation angle.
pub fn front_world(angle: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 0.0, 0.25)) * Mat4::from_rotation_y(angle)
}

/// World transform of the back quad at the given rotation angle.
pub fn back_world(angle: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, 0.5, 1.0)) * Mat4::from_rotation_x(angle * 2.0)
}

/// The demo scene: static quad geometry, its pipeline, and the camera.
pub struct DemoScene {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    view: Mat4,
    proj: Mat4,
    angle: f32,
}

impl DemoScene {
    /// Creates the scene geometry, pipeline, and camera matrices.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation, shader loading, or pipeline
    /// creation fails.
    pub fn new(
        device: Arc<Device>,
        set_layout: &DescriptorSetLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        // A unit quad with one color per corner.
        let vertices = [
            MeshVertex::new(Vec3::new(1.0, -1.0, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
            MeshVertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
            MeshVertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec4::new(0.0, 0.0, 1.0, 1.0)),
            MeshVertex::new(Vec3::new(1.0, 1.0, 0.0), Vec4::new(1.0, 0.0, 1.0, 1.0)),
        ];
        let indices: [u32; QUAD_INDEX_COUNT as usize] = [0, 1, 2, 2, 0, 3];

        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(&indices),
        )?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/scene.vert.spv"),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/scene.frag.spv"),
            ShaderStage::Fragment,
            "main",
        )?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()])?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(MeshVertex::binding_description())
            .vertex_attributes(&MeshVertex::attribute_descriptions())
            .color_attachment_format(color_format)
            .depth_attachment_format(depth_format)
            .depth_test_enable(true)
            .depth_write_enable(true)
            .cull_mode(CullMode::None)
            .build(device, &pipeline_layout)?;

        let eye = Vec3::new(0.0, 0.0, -5.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let aspect = width as f32 / height as f32;
        let proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 1000.0);

        info!("Demo scene created ({} vertices, {} indices)", 4, indices.len());

        Ok(Self {
            vertex_buffer,
            index_buffer,
            pipeline,
            pipeline_layout,
            view,
            proj,
            angle: 0.0,
        })
    }

    /// Advances the rotation by one frame step.
    pub fn advance(&mut self) {
        self.angle += ROTATION_STEP;
    }

    /// Returns the current rotation angle in radians.
    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Writes both per-draw transform blocks into a slot's constant
    /// region.
    ///
    /// Safe only once the slot's fence gate has passed; the caller (the
    /// scheduler) guarantees the GPU is no longer reading this region.
    ///
    /// # Errors
    ///
    /// Returns an error if a write exceeds the region.
    pub fn write_constants(&self, constants: &Buffer, stride: u64) -> RhiResult<()> {
        let front = TransformBlock::new(front_world(self.angle), self.view, self.proj);
        constants.write_data(0, bytemuck::bytes_of(&front))?;

        let back = TransformBlock::new(back_world(self.angle), self.view, self.proj);
        constants.write_data(stride, bytemuck::bytes_of(&back))?;

        Ok(())
    }

    /// Records the scene's draws into the open command buffer.
    ///
    /// Both quads share the geometry and pipeline; each selects its
    /// transform sub-region by dynamic offset.
    pub fn record(&self, cmd: &CommandBuffer, descriptor_set: vk::DescriptorSet, stride: u64) {
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);

        // Front quad
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &[descriptor_set],
            &[0],
        );
        cmd.draw_indexed(QUAD_INDEX_COUNT, 1, 0, 0, 0);

        // Back quad
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &[descriptor_set],
            &[stride as u32],
        );
        cmd.draw_indexed(QUAD_INDEX_COUNT, 1, 0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_world_composition() {
        // Rotation applies before the translation toward the camera.
        let angle = 0.25;
        let expected =
            Mat4::from_translation(Vec3::new(0.0, 0.0, 0.25)) * Mat4::from_rotation_y(angle);
        assert_eq!(front_world(angle), expected);
    }

    #[test]
    fn test_back_world_spins_at_double_rate() {
        let angle = 0.1;
        let expected =
            Mat4::from_scale(Vec3::new(1.0, 0.5, 1.0)) * Mat4::from_rotation_x(0.2);
        assert!(back_world(angle).abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_ten_frames_reach_quarter_radian() {
        // Ten steps of 0.025 rad land the front quad at the 0.25 rad pose.
        let mut angle = 0.0f32;
        for _ in 0..10 {
            angle += ROTATION_STEP;
        }

        let expected =
            Mat4::from_translation(Vec3::new(0.0, 0.0, 0.25)) * Mat4::from_rotation_y(0.25);
        assert!(front_world(angle).abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_zero_angle_is_pure_translation() {
        let world = front_world(0.0);
        assert!(world.abs_diff_eq(
            Mat4::from_translation(Vec3::new(0.0, 0.0, 0.25)),
            1e-6
        ));
    }
}
