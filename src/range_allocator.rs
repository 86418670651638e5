// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! First-fit range allocator.
//!
//! Hands out aligned sub-ranges of a fixed-size space: descriptor slots in a D3D12 heap, byte
//! ranges in a Metal argument-buffer arena.  Freed ranges coalesce with their neighbours.

use std::ops::Range;

#[derive(Debug)]
pub(crate) struct RangeAllocator {
    capacity: u64,
    /// Free ranges sorted by start, never adjacent.
    free: Vec<Range<u64>>,
}

impl RangeAllocator {
    pub(crate) fn new(capacity: u64) -> Self {
        RangeAllocator {
            capacity,
            free: if capacity > 0 { vec![0..capacity] } else { Vec::new() },
        }
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn free_space(&self) -> u64 {
        self.free.iter().map(|r| r.end - r.start).sum()
    }

    /// Allocates `len` units starting at a multiple of `align`.
    pub(crate) fn allocate(&mut self, len: u64, align: u64) -> Option<Range<u64>> {
        if len == 0 {
            return None;
        }
        let align = align.max(1);
        for i in 0..self.free.len() {
            let candidate = self.free[i].clone();
            let start = candidate.start.next_multiple_of(align);
            let Some(end) = start.checked_add(len) else { continue };
            if end > candidate.end {
                continue;
            }
            // split the free range around [start, end)
            let mut replacement = Vec::with_capacity(2);
            if candidate.start < start {
                replacement.push(candidate.start..start);
            }
            if end < candidate.end {
                replacement.push(end..candidate.end);
            }
            self.free.splice(i..i + 1, replacement);
            return Some(start..end);
        }
        None
    }

    pub(crate) fn free(&mut self, range: Range<u64>) {
        debug_assert!(range.end <= self.capacity);
        let at = self.free.partition_point(|r| r.start < range.start);
        debug_assert!(at == 0 || self.free[at - 1].end <= range.start, "double free");
        self.free.insert(at, range);
        // coalesce with the following range, then the preceding one
        if at + 1 < self.free.len() && self.free[at].end == self.free[at + 1].start {
            let next = self.free.remove(at + 1);
            self.free[at].end = next.end;
        }
        if at > 0 && self.free[at - 1].end == self.free[at].start {
            let current = self.free.remove(at);
            self.free[at - 1].end = current.end;
        }
    }
}
