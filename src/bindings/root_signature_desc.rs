// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The reflection-side description a layout is built from.
//!
//! A [`RootSignatureDesc`] is produced by whatever reflects the compiled shaders.  It is treated
//! as untrusted input: every backend validates it through
//! [`ValidatedLayout`](crate::bindings::layout::ValidatedLayout) before building anything.

use crate::bindings::slot::{ResourceBindingSlot, ShaderStages};
use crate::resources::SamplerDesc;

/// A block of inline root constants (Vulkan push constants, D3D12 32-bit root constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootConstantRange {
    /// Register `b<binding>` in the root-constant space.
    pub binding: u32,
    /// Byte offset within the push-constant block.
    pub offset: u32,
    /// Size in bytes, a multiple of 4.
    pub size: u32,
    pub stages: ShaderStages,
}

impl RootConstantRange {
    pub fn new(binding: u32, offset: u32, size: u32) -> Self {
        RootConstantRange {
            binding,
            offset,
            size,
            stages: ShaderStages::all(),
        }
    }
    pub fn with_stages(mut self, stages: ShaderStages) -> Self {
        self.stages = stages;
        self
    }
    pub fn dwords(&self) -> u32 {
        self.size / 4
    }
}

/// A sampler baked into the layout instead of bound through a bind group.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSamplerDesc {
    pub binding: u32,
    pub space: u32,
    pub stages: ShaderStages,
    pub sampler: SamplerDesc,
}

/**
Ordered resource bindings, root constants and static samplers for one pipeline.

```
use rhi::bindings::root_signature_desc::{RootSignatureDesc, RootConstantRange};
use rhi::bindings::slot::{ResourceBindingSlot, ResourceType};
let desc = RootSignatureDesc::new()
    .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0))
    .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 1))
    .root_constant(RootConstantRange::new(0, 0, 16));
assert_eq!(desc.slots.len(), 2);
```
*/
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootSignatureDesc {
    pub slots: Vec<ResourceBindingSlot>,
    pub root_constants: Vec<RootConstantRange>,
    pub static_samplers: Vec<StaticSamplerDesc>,
}

impl RootSignatureDesc {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn slot(mut self, slot: ResourceBindingSlot) -> Self {
        self.slots.push(slot);
        self
    }
    pub fn root_constant(mut self, range: RootConstantRange) -> Self {
        self.root_constants.push(range);
        self
    }
    pub fn static_sampler(mut self, binding: u32, space: u32, sampler: SamplerDesc) -> Self {
        self.static_samplers.push(StaticSamplerDesc {
            binding,
            space,
            stages: ShaderStages::all(),
            sampler,
        });
        self
    }
}
