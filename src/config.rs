// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Immutable configuration shared by layouts, bind groups and command lists.
//!
//! A single [`RhiConfig`] is handed to a device when it is created, and every object the device
//! creates keeps an `Arc` to it.  There is no global accessor.

use crate::bindings::slot::ResourceType;

/// Per-type binding shifts applied when HLSL-style registers are flattened into Vulkan's single
/// binding namespace.
///
/// The same shifts must be used by the shader compiler (`-fvk-{b,t,u,s}-shift`) and by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingShift {
    pub constant_buffer: u32,
    pub shader_resource: u32,
    pub unordered_access: u32,
    pub sampler: u32,
}

impl BindingShift {
    pub const fn for_type(&self, ty: ResourceType) -> u32 {
        match ty {
            ResourceType::ConstantBuffer => self.constant_buffer,
            ResourceType::ShaderResource => self.shader_resource,
            ResourceType::UnorderedAccess => self.unordered_access,
            ResourceType::Sampler => self.sampler,
        }
    }
}

impl Default for BindingShift {
    fn default() -> Self {
        BindingShift {
            constant_buffer: 0,
            shader_resource: 1000,
            unordered_access: 2000,
            sampler: 3000,
        }
    }
}

/// Optional pipeline features reported by the device.
///
/// Barrier translation only derives stage bits for features present here; deriving a geometry or
/// tessellation stage on a device without the feature is a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceCapabilities {
    pub geometry_shader: bool,
    pub tessellation: bool,
    pub ray_tracing: bool,
    pub mesh_shader: bool,
}

impl DeviceCapabilities {
    /// Every optional feature enabled.
    pub const fn all() -> Self {
        DeviceCapabilities {
            geometry_shader: true,
            tessellation: true,
            ray_tracing: true,
            mesh_shader: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dx12Config {
    /// Descriptors in the shader-visible CBV/SRV/UAV heap.
    pub cbv_srv_uav_heap_size: u32,
    /// Descriptors in the shader-visible sampler heap (D3D12 caps this at 2048).
    pub sampler_heap_size: u32,
    /// Descriptors in each CPU-only staging heap.
    pub staging_heap_size: u32,
    /// Lower a space holding a single constant buffer to an inline root CBV.
    pub inline_root_descriptors: bool,
}

impl Default for Dx12Config {
    fn default() -> Self {
        Dx12Config {
            cbv_srv_uav_heap_size: 65536,
            sampler_heap_size: 2048,
            staging_heap_size: 16384,
            inline_root_descriptors: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetalConfig {
    /// Buffer index of the argument buffer for register space 0; space `n` uses `base + n`.
    pub argument_buffer_base_index: u32,
    /// Buffer index root constants are pushed to with `set*Bytes`.
    pub root_constant_buffer_index: u32,
    /// Size of the shared argument-buffer arena.
    pub argument_arena_bytes: u64,
}

impl Default for MetalConfig {
    fn default() -> Self {
        MetalConfig {
            argument_buffer_base_index: 16,
            root_constant_buffer_index: 15,
            argument_arena_bytes: 1 << 20,
        }
    }
}

/**
Configuration passed into every device, layout and bind group.

```
use rhi::config::{RhiConfig, DeviceCapabilities};
let config = RhiConfig::default()
    .with_root_constant_space(100)
    .with_capabilities(DeviceCapabilities::all());
assert_eq!(config.root_constant_space, 100);
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhiConfig {
    /// Register space reserved for root constants.  Must never be used by a resource slot.
    pub root_constant_space: u32,
    pub binding_shift: BindingShift,
    pub capabilities: DeviceCapabilities,
    /// Highest number of register spaces (bind groups) a layout may use.
    pub max_bind_groups: u32,
    pub max_root_constant_bytes: u32,
    /// Descriptor sets per Vulkan descriptor pool.
    pub descriptor_pool_sets: u32,
    pub dx12: Dx12Config,
    pub metal: MetalConfig,
    /// Log every submitted command stream.
    pub dump_commands: bool,
}

impl Default for RhiConfig {
    fn default() -> Self {
        RhiConfig {
            root_constant_space: 999,
            binding_shift: BindingShift::default(),
            capabilities: DeviceCapabilities::default(),
            max_bind_groups: 8,
            max_root_constant_bytes: 128,
            descriptor_pool_sets: 256,
            dx12: Dx12Config::default(),
            metal: MetalConfig::default(),
            dump_commands: std::env::var("RHI_DUMP_COMMANDS")
                .map(|e| e == "1")
                .unwrap_or(false),
        }
    }
}

impl RhiConfig {
    pub fn with_root_constant_space(mut self, space: u32) -> Self {
        self.root_constant_space = space;
        self
    }
    pub fn with_binding_shift(mut self, shift: BindingShift) -> Self {
        self.binding_shift = shift;
        self
    }
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
    pub fn with_max_bind_groups(mut self, max: u32) -> Self {
        self.max_bind_groups = max;
        self
    }
    pub fn with_descriptor_pool_sets(mut self, sets: u32) -> Self {
        self.descriptor_pool_sets = sets;
        self
    }
    pub fn with_dx12(mut self, dx12: Dx12Config) -> Self {
        self.dx12 = dx12;
        self
    }
    pub fn with_metal(mut self, metal: MetalConfig) -> Self {
        self.metal = metal;
        self
    }
    pub fn with_dump_commands(mut self, dump: bool) -> Self {
        self.dump_commands = dump;
        self
    }
}
