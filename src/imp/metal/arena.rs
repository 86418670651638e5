// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The argument-buffer arena.
//!
//! One shared-storage `MTLBuffer` per device; every bind group's argument buffer is a 256-byte
//! aligned range of it.  Dropping an [`ArgumentAllocation`] returns its range.

use super::driver::Driver;
use super::native::{ARGUMENT_BUFFER_ALIGNMENT, BufferHandle};
use crate::error::{reject, Error};
use crate::range_allocator::RangeAllocator;
use std::fmt::{Debug, Formatter};
use std::ops::Range;
use std::sync::{Arc, Mutex};

pub(crate) struct ArgumentArena {
    buffer: BufferHandle,
    allocator: Mutex<RangeAllocator>,
    driver: Arc<dyn Driver>,
}

impl Debug for ArgumentArena {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let allocator = self.allocator.lock().unwrap();
        f.debug_struct("ArgumentArena")
            .field("buffer", &self.buffer)
            .field("capacity", &allocator.capacity())
            .field("free", &allocator.free_space())
            .finish()
    }
}

impl ArgumentArena {
    pub(crate) fn new(driver: Arc<dyn Driver>, length: u64) -> Result<Arc<Self>, Error> {
        let buffer = driver.new_argument_arena(length)?;
        Ok(Arc::new(ArgumentArena {
            buffer,
            allocator: Mutex::new(RangeAllocator::new(length)),
            driver,
        }))
    }

    pub(crate) fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub(crate) fn free_bytes(&self) -> u64 {
        self.allocator.lock().unwrap().free_space()
    }

    pub(crate) fn allocate(self: &Arc<Self>, length: u64) -> Result<ArgumentAllocation, Error> {
        let mut allocator = self.allocator.lock().unwrap();
        let Some(range) = allocator.allocate(length, ARGUMENT_BUFFER_ALIGNMENT) else {
            return Err(reject(Error::ArgumentArenaExhausted {
                requested: length,
                free: allocator.free_space(),
            }));
        };
        Ok(ArgumentAllocation {
            arena: self.clone(),
            range,
        })
    }
}

impl Drop for ArgumentArena {
    fn drop(&mut self) {
        self.driver.release_buffer(self.buffer);
    }
}

/// One bind group's argument buffer.
pub(crate) struct ArgumentAllocation {
    arena: Arc<ArgumentArena>,
    range: Range<u64>,
}

impl Debug for ArgumentAllocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentAllocation").field("range", &self.range).finish()
    }
}

impl ArgumentAllocation {
    pub(crate) fn buffer(&self) -> BufferHandle {
        self.arena.buffer
    }

    pub(crate) fn offset(&self) -> u64 {
        self.range.start
    }
}

impl Drop for ArgumentAllocation {
    fn drop(&mut self) {
        self.arena.allocator.lock().unwrap().free(self.range.clone());
    }
}
