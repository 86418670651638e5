// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Abstract resource usage states and queue classes.

bitflags::bitflags! {
    /**
    How a resource is being used by the GPU.

    A resource may be in several read-only usages at once (e.g. `SHADER_RESOURCE | COPY_SRC`).
    The empty set is [`ResourceUsage::UNDEFINED`]: contents are not preserved.
    */
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 2;
        const INDEX_BUFFER = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
        const RENDER_TARGET = 1 << 5;
        const DEPTH_WRITE = 1 << 6;
        const DEPTH_READ = 1 << 7;
        const SHADER_RESOURCE = 1 << 8;
        const PRESENT = 1 << 9;
        const INDIRECT_ARGUMENT = 1 << 10;
        const ACCELERATION_STRUCTURE_READ = 1 << 11;
        const ACCELERATION_STRUCTURE_WRITE = 1 << 12;
        /// Accessible by anything; the D3D12 common state and Vulkan's general layout.
        const COMMON = 1 << 13;
    }
}

impl ResourceUsage {
    pub const UNDEFINED: ResourceUsage = ResourceUsage::empty();

    const WRITES: ResourceUsage = ResourceUsage::COPY_DST
        .union(ResourceUsage::UNORDERED_ACCESS)
        .union(ResourceUsage::RENDER_TARGET)
        .union(ResourceUsage::DEPTH_WRITE)
        .union(ResourceUsage::ACCELERATION_STRUCTURE_WRITE)
        .union(ResourceUsage::COMMON);

    /// Usages only a copy (blit) encoder or the presentation engine can satisfy.
    pub const TRANSFER_ONLY: ResourceUsage = ResourceUsage::COPY_SRC
        .union(ResourceUsage::COPY_DST)
        .union(ResourceUsage::PRESENT);

    /// Usages that exist only in graphics pipelines.
    pub const GRAPHICS_ONLY: ResourceUsage = ResourceUsage::RENDER_TARGET
        .union(ResourceUsage::DEPTH_WRITE)
        .union(ResourceUsage::DEPTH_READ)
        .union(ResourceUsage::INDEX_BUFFER);

    pub const fn is_undefined(self) -> bool {
        self.is_empty()
    }

    pub const fn is_write(self) -> bool {
        self.intersects(Self::WRITES)
    }

    /// Both sides contain `UNORDERED_ACCESS`: a read-after-write hazard between shader writes.
    pub const fn is_uav_to_uav(before: ResourceUsage, after: ResourceUsage) -> bool {
        before.contains(ResourceUsage::UNORDERED_ACCESS) && after.contains(ResourceUsage::UNORDERED_ACCESS)
    }
}

impl std::fmt::Display for ResourceUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("UNDEFINED")
        } else {
            bitflags::parser::to_writer(self, f)
        }
    }
}

/// The class of queue a command list is recorded for and submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    Graphics,
    Compute,
    Copy,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Copy];

    pub const fn index(self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Copy => 2,
        }
    }
}
