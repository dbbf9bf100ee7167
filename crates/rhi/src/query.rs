//! GPU query pools.
//!
//! This module wraps VkQueryPool for the occlusion queries the frame
//! pipeline issues once per frame. Each frame slot owns its own pool so a
//! query can be reset and re-issued while the other slot's query is still
//! in flight on the GPU.
//!
//! Resolving a query is itself a GPU operation
//! ([`crate::command::CommandBuffer::copy_query_pool_results`]); a result
//! only becomes CPU-readable after the fence of the submission that carried
//! the resolve has signaled. The renderer layer turns that into the
//! one-cycle readback lag.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan query pool wrapper.
pub struct QueryPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan query pool handle.
    pool: vk::QueryPool,
    /// Number of queries in the pool.
    query_count: u32,
}

impl QueryPool {
    /// Creates a new occlusion query pool.
    ///
    /// Queries start in an undefined state; each must be reset on the GPU
    /// timeline before its first begin.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `query_count` - Number of queries the pool holds
    ///
    /// # Errors
    ///
    /// Returns an error if query pool creation fails.
    pub fn new_occlusion(device: Arc<Device>, query_count: u32) -> RhiResult<Self> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::OCCLUSION)
            .query_count(query_count);

        let pool = unsafe { device.handle().create_query_pool(&create_info, None)? };

        debug!("Created occlusion query pool ({} queries)", query_count);

        Ok(Self {
            device,
            pool,
            query_count,
        })
    }

    /// Returns the Vulkan query pool handle.
    #[inline]
    pub fn handle(&self) -> vk::QueryPool {
        self.pool
    }

    /// Returns the number of queries in the pool.
    #[inline]
    pub fn query_count(&self) -> u32 {
        self.query_count
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_query_pool(self.pool, None);
        }
        debug!("Destroyed query pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pool_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueryPool>();
    }
}
