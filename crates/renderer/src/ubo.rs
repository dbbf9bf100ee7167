//! Constant-buffer block definitions for the demo shaders.
//!
//! These structures must match the shader uniform block layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and
//! implement `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-draw transform block.
///
/// One instance per draw lives in each frame slot's constant region, at a
/// device-aligned stride.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TransformBlock {
    /// World matrix (object to world space).
    pub world: Mat4,
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix (view to clip space).
    pub proj: Mat4,
}

impl TransformBlock {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a new transform block.
    pub fn new(world: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self { world, view, proj }
    }
}

/// Rounds `size` up to the next multiple of `alignment`.
///
/// Used to place per-draw sub-regions at the device-reported uniform
/// buffer offset alignment. An alignment of zero leaves the size
/// unchanged.
pub fn round_up_stride(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_block_size() {
        // 3 Mat4 = 192 bytes
        assert_eq!(TransformBlock::SIZE, 192);
    }

    #[test]
    fn test_transform_block_alignment() {
        // Mat4 requires 16-byte alignment
        assert_eq!(std::mem::align_of::<TransformBlock>(), 16);
    }

    #[test]
    fn test_transform_block_pod() {
        let block = TransformBlock::default();
        let bytes: &[u8] = bytemuck::bytes_of(&block);
        assert_eq!(bytes.len(), TransformBlock::SIZE);
    }

    #[test]
    fn test_round_up_stride() {
        assert_eq!(round_up_stride(192, 256), 256);
        assert_eq!(round_up_stride(192, 64), 192);
        assert_eq!(round_up_stride(1, 64), 64);
        assert_eq!(round_up_stride(256, 256), 256);
        assert_eq!(round_up_stride(192, 0), 192);
    }
}
