// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The binding slot model.
//!
//! A [`ResourceBindingSlot`] names one resource binding the way HLSL does: a register class, a
//! register number and a register space.  Slots are pure data and carry no backend state.

/// The register class of a binding.
///
/// Corresponds to the HLSL `b`, `t`, `u` and `s` registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    Sampler,
}

impl ResourceType {
    pub const fn register_letter(self) -> char {
        match self {
            ResourceType::ConstantBuffer => 'b',
            ResourceType::ShaderResource => 't',
            ResourceType::UnorderedAccess => 'u',
            ResourceType::Sampler => 's',
        }
    }
}

/// Whether a shader-resource or unordered-access slot views a buffer or a texture.
///
/// HLSL distinguishes `StructuredBuffer` from `Texture2D` by declaration rather than by register,
/// but Vulkan and Metal need to know which one they are laying out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingDimension {
    Buffer,
    Texture,
}

bitflags::bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const HULL = 1 << 1;
        const DOMAIN = 1 << 2;
        const GEOMETRY = 1 << 3;
        const PIXEL = 1 << 4;
        const COMPUTE = 1 << 5;
        const AMPLIFICATION = 1 << 6;
        const MESH = 1 << 7;

        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::HULL.bits() | Self::DOMAIN.bits()
            | Self::GEOMETRY.bits() | Self::PIXEL.bits();
    }
}

/// The identity of a slot within a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    pub ty: ResourceType,
    pub binding: u32,
    pub space: u32,
}

/**
One resource binding declared by a shader.

```
use rhi::bindings::slot::{ResourceBindingSlot, ResourceType, ShaderStages};
let slot = ResourceBindingSlot::new(ResourceType::ShaderResource, 3, 1)
    .with_array_size(4)
    .with_stages(ShaderStages::PIXEL);
assert_eq!(slot.id().binding, 3);
```
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceBindingSlot {
    pub ty: ResourceType,
    pub binding: u32,
    pub space: u32,
    pub array_size: u32,
    pub stages: ShaderStages,
    pub dimension: BindingDimension,
}

impl ResourceBindingSlot {
    /// A single-element slot visible to every stage.
    ///
    /// Constant buffers default to [`BindingDimension::Buffer`], everything else to
    /// [`BindingDimension::Texture`].
    pub fn new(ty: ResourceType, binding: u32, space: u32) -> Self {
        let dimension = match ty {
            ResourceType::ConstantBuffer => BindingDimension::Buffer,
            _ => BindingDimension::Texture,
        };
        ResourceBindingSlot {
            ty,
            binding,
            space,
            array_size: 1,
            stages: ShaderStages::all(),
            dimension,
        }
    }

    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    pub fn with_stages(mut self, stages: ShaderStages) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_dimension(mut self, dimension: BindingDimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn id(&self) -> SlotId {
        SlotId {
            ty: self.ty,
            binding: self.binding,
            space: self.space,
        }
    }

    /// Bindings `binding..binding + array_size`, the registers this slot occupies.
    pub fn register_range(&self) -> std::ops::Range<u32> {
        self.binding..self.binding.saturating_add(self.array_size)
    }
}

impl std::fmt::Display for ResourceBindingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} space{}",
            self.ty.register_letter(),
            self.binding,
            self.space
        )?;
        if self.array_size > 1 {
            write!(f, "[{}]", self.array_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dimension_follows_type() {
        let cb = ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0);
        assert_eq!(cb.dimension, BindingDimension::Buffer);
        let srv = ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0);
        assert_eq!(srv.dimension, BindingDimension::Texture);
    }

    #[test]
    fn display() {
        let slot = ResourceBindingSlot::new(ResourceType::UnorderedAccess, 2, 1).with_array_size(3);
        assert_eq!(slot.to_string(), "u2 space1[3]");
        assert_eq!(slot.register_range(), 2..5);
    }
}
