// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Sub-allocated descriptor heaps.
//!
//! A device creates one heap per descriptor type up front and carves contiguous ranges out of it.
//! Allocations are RAII: dropping a [`HeapAllocation`] returns its range.

use super::driver::Driver;
use super::native::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle, HeapHandle, HeapInfo};
use crate::config::Dx12Config;
use crate::error::{reject, Error};
use crate::range_allocator::RangeAllocator;
use std::fmt::{Debug, Formatter};
use std::ops::Range;
use std::sync::{Arc, Mutex};

pub(crate) struct DescriptorHeap {
    ty: DescriptorHeapType,
    info: HeapInfo,
    capacity: u32,
    allocator: Mutex<RangeAllocator>,
    driver: Arc<dyn Driver>,
}

impl Debug for DescriptorHeap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("ty", &self.ty)
            .field("info", &self.info)
            .field("capacity", &self.capacity)
            .field("free", &self.allocator.lock().unwrap().free_space())
            .finish()
    }
}

impl DescriptorHeap {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        ty: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<Arc<Self>, Error> {
        let info = driver.create_descriptor_heap(ty, capacity, shader_visible)?;
        Ok(Arc::new(DescriptorHeap {
            ty,
            info,
            capacity,
            allocator: Mutex::new(RangeAllocator::new(capacity as u64)),
            driver,
        }))
    }

    pub(crate) fn ty(&self) -> DescriptorHeapType {
        self.ty
    }

    pub(crate) fn info(&self) -> &HeapInfo {
        &self.info
    }

    pub(crate) fn free_descriptors(&self) -> u32 {
        self.allocator.lock().unwrap().free_space() as u32
    }

    /// Reserves `count` contiguous descriptors.
    pub(crate) fn allocate(self: &Arc<Self>, count: u32) -> Result<HeapAllocation, Error> {
        let range = self.allocator.lock().unwrap().allocate(count as u64, 1);
        let Some(range) = range else {
            return Err(reject(Error::DescriptorHeapExhausted {
                requested: count,
                capacity: self.capacity,
            }));
        };
        Ok(HeapAllocation {
            heap: self.clone(),
            range: range.start as u32..range.end as u32,
        })
    }
}

impl Drop for DescriptorHeap {
    fn drop(&mut self) {
        self.driver.destroy_descriptor_heap(self.info.handle);
    }
}

/// A contiguous run of descriptors in a [`DescriptorHeap`].
pub(crate) struct HeapAllocation {
    heap: Arc<DescriptorHeap>,
    range: Range<u32>,
}

impl Debug for HeapAllocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapAllocation")
            .field("ty", &self.heap.ty)
            .field("range", &self.range)
            .finish()
    }
}

impl HeapAllocation {
    pub(crate) fn len(&self) -> u32 {
        self.range.end - self.range.start
    }

    pub(crate) fn heap_type(&self) -> DescriptorHeapType {
        self.heap.ty
    }

    pub(crate) fn cpu(&self, index: u32) -> CpuDescriptorHandle {
        debug_assert!(index < self.len());
        self.heap
            .info
            .cpu_start
            .offset(self.range.start + index, self.heap.info.increment)
    }

    /// `None` for allocations in CPU-only heaps.
    pub(crate) fn gpu(&self, index: u32) -> Option<GpuDescriptorHandle> {
        debug_assert!(index < self.len());
        self.heap
            .info
            .gpu_start
            .map(|start| start.offset(self.range.start + index, self.heap.info.increment))
    }
}

impl Drop for HeapAllocation {
    fn drop(&mut self) {
        let range = self.range.start as u64..self.range.end as u64;
        self.heap.allocator.lock().unwrap().free(range);
    }
}

/**
The heaps of one device.

Views are created in the CPU-only staging heaps and copied into ranges of the shader-visible heaps
when a bind group's update ends.  Render-target and depth-stencil views live in their own
CPU-only heaps.
*/
#[derive(Debug)]
pub(crate) struct DeviceHeaps {
    pub(crate) shader_resources: Arc<DescriptorHeap>,
    pub(crate) shader_samplers: Arc<DescriptorHeap>,
    pub(crate) staging_resources: Arc<DescriptorHeap>,
    pub(crate) staging_samplers: Arc<DescriptorHeap>,
    pub(crate) rtv: Arc<DescriptorHeap>,
    pub(crate) dsv: Arc<DescriptorHeap>,
}

impl DeviceHeaps {
    pub(crate) fn new(driver: &Arc<dyn Driver>, config: &Dx12Config) -> Result<Self, Error> {
        let heap = |ty, capacity, shader_visible| DescriptorHeap::new(driver.clone(), ty, capacity, shader_visible);
        Ok(DeviceHeaps {
            shader_resources: heap(DescriptorHeapType::CbvSrvUav, config.cbv_srv_uav_heap_size, true)?,
            shader_samplers: heap(DescriptorHeapType::Sampler, config.sampler_heap_size, true)?,
            staging_resources: heap(DescriptorHeapType::CbvSrvUav, config.staging_heap_size, false)?,
            staging_samplers: heap(DescriptorHeapType::Sampler, config.staging_heap_size, false)?,
            rtv: heap(DescriptorHeapType::Rtv, config.staging_heap_size, false)?,
            dsv: heap(DescriptorHeapType::Dsv, config.staging_heap_size, false)?,
        })
    }

    /// The heaps `SetDescriptorHeaps` binds.
    pub(crate) fn shader_visible(&self) -> Vec<HeapHandle> {
        vec![self.shader_resources.info().handle, self.shader_samplers.info().handle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::dx12::driver::NullDriver;

    #[test]
    fn handles_advance_by_increment() {
        let heap = DescriptorHeap::new(Arc::new(NullDriver::new()), DescriptorHeapType::CbvSrvUav, 16, true).unwrap();
        let a = heap.allocate(4).unwrap();
        let b = heap.allocate(2).unwrap();
        let increment = heap.info().increment;
        assert_eq!(a.cpu(1).0, a.cpu(0).0 + increment as u64);
        assert_eq!(b.cpu(0), a.cpu(0).offset(4, increment));
        assert_eq!(b.gpu(0), a.gpu(0).map(|g| g.offset(4, increment)));
    }

    #[test]
    fn exhaustion_is_an_error_and_drop_frees() {
        let heap = DescriptorHeap::new(Arc::new(NullDriver::new()), DescriptorHeapType::Sampler, 4, false).unwrap();
        let all = heap.allocate(4).unwrap();
        assert!(all.gpu(0).is_none());
        assert_eq!(
            heap.allocate(1).unwrap_err(),
            Error::DescriptorHeapExhausted {
                requested: 1,
                capacity: 4
            }
        );
        drop(all);
        assert_eq!(heap.free_descriptors(), 4);
        assert!(heap.allocate(3).is_ok());
    }
}
