//! Vertex formats.
//!
//! Two formats cover the whole demo family:
//! - [`MeshVertex`] - position + color, used by the rotating-quad content
//! - [`OverlayVertex`] - 2D position + UV + packed color, the debug
//!   overlay's dynamic geometry format
//!
//! Each format provides its Vulkan binding and attribute descriptions; the
//! layouts must match the corresponding shader inputs exactly. Fields are
//! plain float arrays so the structs stay tightly packed (glam's SIMD
//! vector types carry 16-byte alignment).

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Vertex for the demo scene geometry: position and vertex color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MeshVertex {
    /// Position in object space.
    pub position: [f32; 3],
    /// Vertex color (RGBA).
    pub color: [f32; 4],
}

impl MeshVertex {
    /// Creates a new vertex.
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
        }
    }

    /// Returns the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Returns the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            // location 0: position
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0),
            // location 1: color
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32A32_SFLOAT)
                .offset(12),
        ]
    }
}

/// Vertex for the debug overlay's dynamic geometry.
///
/// Matches the immediate-mode draw-list layout: 2D screen position, UV,
/// and a packed RGBA8 color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct OverlayVertex {
    /// Screen-space position in pixels.
    pub position: [f32; 2],
    /// Texture coordinates.
    pub uv: [f32; 2],
    /// Packed RGBA8 color.
    pub color: u32,
}

impl OverlayVertex {
    /// Creates a new overlay vertex.
    pub fn new(position: [f32; 2], uv: [f32; 2], color: u32) -> Self {
        Self {
            position,
            uv,
            color,
        }
    }

    /// Returns the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Returns the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            // location 0: position
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(0),
            // location 1: uv
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(8),
            // location 2: packed color
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(2)
                .format(vk::Format::R8G8B8A8_UNORM)
                .offset(16),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_vertex_layout() {
        // [f32; 3] (12) + [f32; 4] (16) = 28 bytes, tightly packed
        assert_eq!(std::mem::size_of::<MeshVertex>(), 28);

        let binding = MeshVertex::binding_description();
        assert_eq!(binding.stride, 28);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attrs = MeshVertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
    }

    #[test]
    fn test_overlay_vertex_layout() {
        // 2 f32 (8) + 2 f32 (8) + u32 (4) = 20 bytes
        assert_eq!(std::mem::size_of::<OverlayVertex>(), 20);

        let attrs = OverlayVertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(attrs[2].offset, 16);
        assert_eq!(attrs[2].format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_mesh_vertex_pod_cast() {
        let quad = [
            MeshVertex::new(Vec3::new(1.0, -1.0, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
            MeshVertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&quad);
        assert_eq!(bytes.len(), 2 * std::mem::size_of::<MeshVertex>());
    }
}
