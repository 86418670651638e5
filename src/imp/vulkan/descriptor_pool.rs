// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Descriptor pools shared by every bind group of a device.
//!
//! Bind groups are created and dropped from any thread, so the pool list sits behind a mutex.
//! When every pool is full another one is created; pools are only destroyed with the device.

use super::driver::Driver;
use super::native::DescriptorPoolSize;
use crate::error::Error;
use ash::vk;
use std::sync::{Arc, Mutex};

/// Descriptors of each type reserved per set in a pool.
const DESCRIPTORS_PER_SET: u32 = 8;

#[derive(Debug)]
struct PoolEntry {
    handle: vk::DescriptorPool,
    allocated: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DescriptorAllocation {
    pub(crate) pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
}

#[derive(Debug)]
pub(crate) struct DescriptorPools {
    driver: Arc<dyn Driver>,
    sets_per_pool: u32,
    pools: Mutex<Vec<PoolEntry>>,
}

impl DescriptorPools {
    pub(crate) fn new(driver: Arc<dyn Driver>, sets_per_pool: u32) -> Self {
        DescriptorPools {
            driver,
            sets_per_pool: sets_per_pool.max(1),
            pools: Mutex::new(Vec::new()),
        }
    }

    /// The default sizes, raised to fit `wanted` for layouts with large arrays.
    fn pool_sizes(&self, wanted: &[DescriptorPoolSize]) -> Vec<DescriptorPoolSize> {
        let default = self.sets_per_pool.saturating_mul(DESCRIPTORS_PER_SET);
        let mut sizes: Vec<DescriptorPoolSize> = [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::SAMPLER,
        ]
        .into_iter()
        .map(|ty| DescriptorPoolSize {
            ty,
            descriptor_count: default,
        })
        .collect();
        for want in wanted {
            match sizes.iter_mut().find(|s| s.ty == want.ty) {
                Some(size) => size.descriptor_count = size.descriptor_count.max(want.descriptor_count),
                None => sizes.push(*want),
            }
        }
        sizes
    }

    /// Allocates a set of `layout`, whose per-type descriptor counts are `sizes`.
    pub(crate) fn allocate(
        &self,
        layout: vk::DescriptorSetLayout,
        sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorAllocation, Error> {
        let mut pools = self.pools.lock().unwrap();
        for entry in pools.iter_mut().filter(|e| e.allocated < self.sets_per_pool) {
            match self.driver.allocate_descriptor_set(entry.handle, layout) {
                Ok(set) => {
                    entry.allocated += 1;
                    return Ok(DescriptorAllocation {
                        pool: entry.handle,
                        set,
                    });
                }
                // out of descriptors rather than sets; try the next pool
                Err(Error::DescriptorPoolExhausted) => continue,
                Err(e) => return Err(e),
            }
        }
        let handle = self
            .driver
            .create_descriptor_pool(self.sets_per_pool, &self.pool_sizes(sizes))?;
        let set = match self.driver.allocate_descriptor_set(handle, layout) {
            Ok(set) => set,
            Err(e) => {
                // a pool that cannot hold even one set is never kept
                self.driver.destroy_descriptor_pool(handle);
                logwise::error_sync!(
                    "vulkan descriptor set does not fit a fresh pool: {error}",
                    error = logwise::privacy::LogIt(&e)
                );
                return Err(e);
            }
        };
        logwise::info_sync!(
            "vulkan descriptor pool {index} created ({sets} sets)",
            index = pools.len(),
            sets = self.sets_per_pool
        );
        pools.push(PoolEntry { handle, allocated: 1 });
        Ok(DescriptorAllocation { pool: handle, set })
    }

    pub(crate) fn free(&self, allocation: DescriptorAllocation) {
        let mut pools = self.pools.lock().unwrap();
        self.driver.free_descriptor_set(allocation.pool, allocation.set);
        if let Some(entry) = pools.iter_mut().find(|e| e.handle == allocation.pool) {
            entry.allocated -= 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn pool_count(&self) -> usize {
        self.pools.lock().unwrap().len()
    }
}

impl Drop for DescriptorPools {
    fn drop(&mut self) {
        for entry in self.pools.get_mut().unwrap_or_else(|e| e.into_inner()).drain(..) {
            self.driver.destroy_descriptor_pool(entry.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::vulkan::driver::{DriverCall, NullDriver};
    use crate::imp::vulkan::native::SetLayoutBinding;
    use ash::vk::Handle;

    fn layout(driver: &NullDriver, ty: vk::DescriptorType, count: u32) -> (vk::DescriptorSetLayout, Vec<DescriptorPoolSize>) {
        let bindings = [SetLayoutBinding {
            binding: 0,
            descriptor_type: ty,
            descriptor_count: count,
            stage_flags: vk::ShaderStageFlags::ALL,
            immutable_samplers: Vec::new(),
        }];
        let handle = driver.create_descriptor_set_layout(&bindings).unwrap();
        (
            handle,
            vec![DescriptorPoolSize {
                ty,
                descriptor_count: count,
            }],
        )
    }

    #[test]
    fn grows_when_full_and_reuses_freed_sets() {
        let pools = DescriptorPools::new(Arc::new(NullDriver::new()), 2);
        let layout = vk::DescriptorSetLayout::from_raw(7);
        let a = pools.allocate(layout, &[]).unwrap();
        let b = pools.allocate(layout, &[]).unwrap();
        assert_eq!(a.pool, b.pool);
        let c = pools.allocate(layout, &[]).unwrap();
        assert_ne!(c.pool, a.pool);
        assert_eq!(pools.pool_count(), 2);
        pools.free(a);
        let d = pools.allocate(layout, &[]).unwrap();
        assert_eq!(d.pool, b.pool);
        assert_eq!(pools.pool_count(), 2);
    }

    #[test]
    fn large_arrays_get_a_pool_sized_for_them() {
        let driver = Arc::new(NullDriver::new());
        let pools = DescriptorPools::new(driver.clone(), 4);
        let (small, small_sizes) = layout(&driver, vk::DescriptorType::SAMPLED_IMAGE, 1);
        let (large, large_sizes) = layout(&driver, vk::DescriptorType::SAMPLED_IMAGE, 4096);
        let first = pools.allocate(small, &small_sizes).unwrap();
        // 4 sets * 8 descriptors cannot hold 4096 images
        let second = pools.allocate(large, &large_sizes).unwrap();
        assert_ne!(first.pool, second.pool);
        assert_eq!(pools.pool_count(), 2);
        let created: Vec<u32> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::CreateDescriptorPool { sizes, .. } => sizes
                    .iter()
                    .find(|s| s.ty == vk::DescriptorType::SAMPLED_IMAGE)
                    .map(|s| s.descriptor_count),
                _ => None,
            })
            .collect();
        assert_eq!(created, vec![32, 4096]);
    }

    #[test]
    fn a_pool_that_cannot_fit_the_set_is_not_kept() {
        let driver = Arc::new(NullDriver::new());
        let pools = DescriptorPools::new(driver.clone(), 1);
        let (layout, _) = layout(&driver, vk::DescriptorType::STORAGE_BUFFER, 64);
        // sizes that understate the layout leave the fresh pool too small
        for _ in 0..3 {
            assert_eq!(pools.allocate(layout, &[]), Err(Error::DescriptorPoolExhausted));
        }
        assert_eq!(pools.pool_count(), 0);
        let destroyed = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::DestroyDescriptorPool(_)))
            .count();
        assert_eq!(destroyed, 3);
    }
}
