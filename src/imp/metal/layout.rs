// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Argument-buffer layouts.

Register space `n` becomes one tier 2 argument buffer bound at buffer index
`argument_buffer_base_index + n`.  Within it, argument ids are dense: slots are taken in
(type, binding) order and each occupies `array_size` consecutive ids.  Static samplers never reach
an argument buffer; they are handed to the shader compiler as `constexpr` samplers.

Root constants share a single `set*Bytes` block at `root_constant_buffer_index`, laid out by the
offsets of their ranges.
*/

use super::native::{
    ARGUMENT_ENTRY_BYTES, ArgumentDescriptor, BindingAccess, ConstantSampler, DataType, MAX_BUFFER_ARGUMENTS,
    TextureType,
};
use crate::bindings::layout::{SpaceLayout, ValidatedLayout};
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::slot::{BindingDimension, ResourceBindingSlot, ResourceType};
use crate::config::{MetalConfig, RhiConfig};
use crate::error::{reject, Error};
use std::sync::Arc;

pub fn data_type(slot: &ResourceBindingSlot) -> DataType {
    match (slot.ty, slot.dimension) {
        (ResourceType::Sampler, _) => DataType::Sampler,
        (ResourceType::ConstantBuffer, _) => DataType::Pointer,
        (_, BindingDimension::Buffer) => DataType::Pointer,
        (_, BindingDimension::Texture) => DataType::Texture,
    }
}

pub fn access(ty: ResourceType) -> BindingAccess {
    match ty {
        ResourceType::UnorderedAccess => BindingAccess::ReadWrite,
        ResourceType::ConstantBuffer | ResourceType::ShaderResource | ResourceType::Sampler => BindingAccess::ReadOnly,
    }
}

/// One slot's place in an argument buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentSlot {
    pub ty: ResourceType,
    pub binding: u32,
    pub descriptor: ArgumentDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBufferLayout {
    pub space: u32,
    /// Buffer argument table index the argument buffer is bound at.
    pub buffer_index: u32,
    pub arguments: Vec<ArgumentSlot>,
    pub encoded_length: u64,
}

impl ArgumentBufferLayout {
    pub fn argument(&self, ty: ResourceType, binding: u32) -> Option<&ArgumentSlot> {
        self.arguments.iter().find(|a| a.ty == ty && a.binding == binding)
    }

    pub fn descriptors(&self) -> Vec<ArgumentDescriptor> {
        self.arguments.iter().map(|a| a.descriptor).collect()
    }
}

pub(crate) fn argument_buffer_layout(space: &SpaceLayout, config: &MetalConfig) -> Result<ArgumentBufferLayout, Error> {
    let buffer_index = config.argument_buffer_base_index + space.space;
    if buffer_index >= MAX_BUFFER_ARGUMENTS {
        return Err(reject(Error::ArgumentBufferIndexOutOfRange {
            space: space.space,
            index: buffer_index,
            limit: MAX_BUFFER_ARGUMENTS,
        }));
    }
    if buffer_index == config.root_constant_buffer_index {
        return Err(reject(Error::BufferIndexCollision { index: buffer_index }));
    }
    let mut next_id = 0;
    let mut arguments = Vec::with_capacity(space.slots.len());
    for slot in &space.slots {
        let data_type = data_type(slot);
        arguments.push(ArgumentSlot {
            ty: slot.ty,
            binding: slot.binding,
            descriptor: ArgumentDescriptor {
                index: next_id,
                data_type,
                access: access(slot.ty),
                array_length: slot.array_size,
                texture_type: (data_type == DataType::Texture).then_some(TextureType::D2),
            },
        });
        next_id += slot.array_size;
    }
    Ok(ArgumentBufferLayout {
        space: space.space,
        buffer_index,
        arguments,
        encoded_length: next_id as u64 * ARGUMENT_ENTRY_BYTES,
    })
}

#[derive(Debug)]
pub(crate) struct RootSignatureInner {
    pub(crate) layout: Arc<ValidatedLayout>,
    pub(crate) config: Arc<RhiConfig>,
    argument_buffers: Vec<ArgumentBufferLayout>,
    constant_samplers: Vec<ConstantSampler>,
}

impl RootSignatureInner {
    pub(crate) fn argument_buffer(&self, space: u32) -> Option<&ArgumentBufferLayout> {
        self.argument_buffers.iter().find(|a| a.space == space)
    }
}

/// Argument-buffer layouts for every register space.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct RootSignature {
    pub(crate) inner: Arc<RootSignatureInner>,
}

impl RootSignature {
    pub(crate) fn build(config: Arc<RhiConfig>, desc: &RootSignatureDesc) -> Result<Self, Error> {
        let layout = Arc::new(ValidatedLayout::new(desc, &config)?);
        if config.metal.root_constant_buffer_index >= MAX_BUFFER_ARGUMENTS {
            return Err(reject(Error::ArgumentBufferIndexOutOfRange {
                space: layout.root_constant_space(),
                index: config.metal.root_constant_buffer_index,
                limit: MAX_BUFFER_ARGUMENTS,
            }));
        }
        let argument_buffers = layout
            .spaces()
            .map(|space| argument_buffer_layout(space, &config.metal))
            .collect::<Result<Vec<_>, Error>>()?;
        let constant_samplers = layout
            .spaces()
            .flat_map(|space| space.static_samplers.iter())
            .map(|s| ConstantSampler {
                binding: s.binding,
                space: s.space,
                sampler: s.sampler.clone(),
            })
            .collect::<Vec<_>>();
        logwise::info_sync!(
            "metal root signature: {buffers} argument buffers, {samplers} constexpr samplers, {bytes} root constant bytes",
            buffers = argument_buffers.len(),
            samplers = constant_samplers.len(),
            bytes = layout.root_constant_bytes()
        );
        Ok(RootSignature {
            inner: Arc::new(RootSignatureInner {
                layout,
                config,
                argument_buffers,
                constant_samplers,
            }),
        })
    }

    pub fn layout(&self) -> &ValidatedLayout {
        &self.inner.layout
    }

    /// Argument-buffer layouts, sorted by register space.
    pub fn argument_buffers(&self) -> &[ArgumentBufferLayout] {
        &self.inner.argument_buffers
    }

    pub fn argument_buffer(&self, space: u32) -> Option<&ArgumentBufferLayout> {
        self.inner.argument_buffer(space)
    }

    /// Samplers the shader declares `constexpr`.
    pub fn constant_samplers(&self) -> &[ConstantSampler] {
        &self.inner.constant_samplers
    }

    pub fn root_constant_buffer_index(&self) -> u32 {
        self.inner.config.metal.root_constant_buffer_index
    }

    /// Size of the combined root-constant block.
    pub fn root_constant_bytes(&self) -> u32 {
        self.inner.layout.root_constant_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::root_signature_desc::RootConstantRange;
    use crate::resources::SamplerDesc;

    fn build(desc: &RootSignatureDesc) -> Result<RootSignature, Error> {
        RootSignature::build(Arc::new(RhiConfig::default()), desc)
    }

    #[test]
    fn ids_are_dense_in_type_then_binding_order() {
        let desc = RootSignatureDesc::new()
            .slot(ResourceBindingSlot::new(ResourceType::Sampler, 0, 0))
            .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 4, 0).with_array_size(3))
            .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 7, 0))
            .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 1, 0));
        let root = build(&desc).unwrap();
        let buffer = root.argument_buffer(0).unwrap();
        let ids: Vec<(ResourceType, u32, u32)> = buffer
            .arguments
            .iter()
            .map(|a| (a.ty, a.binding, a.descriptor.index))
            .collect();
        assert_eq!(
            ids,
            vec![
                (ResourceType::ConstantBuffer, 7, 0),
                (ResourceType::ShaderResource, 1, 1),
                (ResourceType::ShaderResource, 4, 2),
                (ResourceType::Sampler, 0, 5),
            ]
        );
        assert_eq!(buffer.encoded_length, 6 * ARGUMENT_ENTRY_BYTES);
        assert_eq!(buffer.buffer_index, 16);
    }

    #[test]
    fn descriptor_types_and_access() {
        let desc = RootSignatureDesc::new()
            .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 1))
            .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 1).with_dimension(BindingDimension::Buffer))
            .slot(ResourceBindingSlot::new(ResourceType::UnorderedAccess, 0, 1))
            .slot(ResourceBindingSlot::new(ResourceType::Sampler, 0, 1));
        let root = build(&desc).unwrap();
        let buffer = root.argument_buffer(1).unwrap();
        assert_eq!(buffer.buffer_index, 17);
        let summary: Vec<(DataType, BindingAccess, Option<TextureType>)> = buffer
            .descriptors()
            .iter()
            .map(|d| (d.data_type, d.access, d.texture_type))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DataType::Pointer, BindingAccess::ReadOnly, None),
                (DataType::Pointer, BindingAccess::ReadOnly, None),
                (DataType::Texture, BindingAccess::ReadWrite, Some(TextureType::D2)),
                (DataType::Sampler, BindingAccess::ReadOnly, None),
            ]
        );
    }

    #[test]
    fn static_samplers_become_constexpr() {
        let desc = RootSignatureDesc::new()
            .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0))
            .static_sampler(2, 0, SamplerDesc::default());
        let root = build(&desc).unwrap();
        assert_eq!(root.argument_buffer(0).unwrap().arguments.len(), 1);
        assert_eq!(root.constant_samplers().len(), 1);
        assert_eq!(root.constant_samplers()[0].binding, 2);
    }

    #[test]
    fn root_constants_form_one_block() {
        let desc = RootSignatureDesc::new()
            .root_constant(RootConstantRange::new(0, 0, 16))
            .root_constant(RootConstantRange::new(1, 16, 8));
        let root = build(&desc).unwrap();
        assert!(root.argument_buffers().is_empty());
        assert_eq!(root.root_constant_bytes(), 24);
        assert_eq!(root.root_constant_buffer_index(), 15);
    }

    #[test]
    fn buffer_index_limits() {
        let config = RhiConfig {
            metal: MetalConfig {
                argument_buffer_base_index: 28,
                ..MetalConfig::default()
            },
            ..RhiConfig::default()
        };
        let desc = RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 3));
        let err = RootSignature::build(Arc::new(config), &desc).unwrap_err();
        assert_eq!(
            err,
            Error::ArgumentBufferIndexOutOfRange {
                space: 3,
                index: 31,
                limit: 31
            }
        );

        let desc = RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 1));
        let config = RhiConfig {
            metal: MetalConfig {
                argument_buffer_base_index: 14,
                ..MetalConfig::default()
            },
            ..RhiConfig::default()
        };
        let err = RootSignature::build(Arc::new(config), &desc).unwrap_err();
        assert_eq!(err, Error::BufferIndexCollision { index: 15 });
    }
}
