// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Descriptor-set and pipeline layouts.

Set `n` describes register space `n`.  Spaces below the highest used one that have no slots get
an empty set layout, since Vulkan set indices are positional.  Each slot lands at
`binding + shift(type)`; the shifts keep `b0`, `t0`, `u0` and `s0` apart in the single binding
namespace a set has.  The same [`shifted_binding`] is used when bind groups write descriptors.
*/

use super::driver::Driver;
use super::native::{DescriptorPoolSize, PushConstantRange, SetLayoutBinding};
use crate::bindings::layout::{SpaceLayout, ValidatedLayout};
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::slot::{BindingDimension, ResourceBindingSlot, ResourceType, ShaderStages};
use crate::config::{BindingShift, RhiConfig};
use crate::error::{reject, Error};
use ash::vk;
use std::sync::Arc;

/// The Vulkan binding index of HLSL register `binding` of type `ty`, if it fits a `u32`.
pub fn shifted_binding(shift: &BindingShift, ty: ResourceType, binding: u32) -> Option<u32> {
    binding.checked_add(shift.for_type(ty))
}

/// The Vulkan bindings `first..end` taken by `array_size` elements at register `binding`.
pub(crate) fn binding_range(
    shift: &BindingShift,
    ty: ResourceType,
    binding: u32,
    space: u32,
    array_size: u32,
) -> Result<(u32, u32), Error> {
    shifted_binding(shift, ty, binding)
        .and_then(|first| first.checked_add(array_size).map(|end| (first, end)))
        .ok_or_else(|| {
            reject(Error::ShiftedBindingOverflow {
                ty,
                binding,
                space,
                array_size,
            })
        })
}

pub fn descriptor_type(slot: &ResourceBindingSlot) -> vk::DescriptorType {
    match (slot.ty, slot.dimension) {
        (ResourceType::ConstantBuffer, _) => vk::DescriptorType::UNIFORM_BUFFER,
        (ResourceType::ShaderResource, BindingDimension::Texture) => vk::DescriptorType::SAMPLED_IMAGE,
        (ResourceType::UnorderedAccess, BindingDimension::Texture) => vk::DescriptorType::STORAGE_IMAGE,
        (ResourceType::ShaderResource | ResourceType::UnorderedAccess, BindingDimension::Buffer) => {
            vk::DescriptorType::STORAGE_BUFFER
        }
        (ResourceType::Sampler, _) => vk::DescriptorType::SAMPLER,
    }
}

pub fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    for (stage, flag) in [
        (ShaderStages::VERTEX, vk::ShaderStageFlags::VERTEX),
        (ShaderStages::HULL, vk::ShaderStageFlags::TESSELLATION_CONTROL),
        (ShaderStages::DOMAIN, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
        (ShaderStages::GEOMETRY, vk::ShaderStageFlags::GEOMETRY),
        (ShaderStages::PIXEL, vk::ShaderStageFlags::FRAGMENT),
        (ShaderStages::COMPUTE, vk::ShaderStageFlags::COMPUTE),
        (ShaderStages::AMPLIFICATION, vk::ShaderStageFlags::TASK_EXT),
        (ShaderStages::MESH, vk::ShaderStageFlags::MESH_EXT),
    ] {
        if stages.contains(stage) {
            flags |= flag;
        }
    }
    flags
}

/**
Builds the bindings of one set, sorted by binding index.

Static samplers are included as `SAMPLER` bindings without their immutable sampler handles,
which only exist once the driver has created them.
*/
pub(crate) fn set_bindings(space: &SpaceLayout, shift: &BindingShift) -> Result<Vec<SetLayoutBinding>, Error> {
    // (first, end, type, register) of every occupied binding range
    let mut occupied: Vec<(u32, u32, ResourceType, u32)> = Vec::new();
    let mut bindings = Vec::new();
    for slot in &space.slots {
        let (first, end) = binding_range(shift, slot.ty, slot.binding, space.space, slot.array_size)?;
        occupied.push((first, end, slot.ty, slot.binding));
        bindings.push(SetLayoutBinding {
            binding: first,
            descriptor_type: descriptor_type(slot),
            descriptor_count: slot.array_size,
            stage_flags: shader_stages(slot.stages),
            immutable_samplers: Vec::new(),
        });
    }
    for sampler in &space.static_samplers {
        let (first, end) = binding_range(shift, ResourceType::Sampler, sampler.binding, space.space, 1)?;
        occupied.push((first, end, ResourceType::Sampler, sampler.binding));
        bindings.push(SetLayoutBinding {
            binding: first,
            descriptor_type: vk::DescriptorType::SAMPLER,
            descriptor_count: 1,
            stage_flags: shader_stages(sampler.stages),
            immutable_samplers: Vec::new(),
        });
    }
    occupied.sort();
    for pair in occupied.windows(2) {
        let (_, previous_end, _, _) = pair[0];
        let (first, end, ty, binding) = pair[1];
        if first < previous_end {
            return Err(reject(Error::ShiftedBindingCollision {
                ty,
                binding,
                space: space.space,
                first,
                end,
            }));
        }
    }
    bindings.sort_by_key(|b| b.binding);
    Ok(bindings)
}

/// One descriptor-set layout of a root signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLayout {
    pub set: u32,
    pub handle: vk::DescriptorSetLayout,
    pub bindings: Vec<SetLayoutBinding>,
}

impl SetLayout {
    /// Descriptors one set of this layout takes from a pool, per descriptor type.
    pub fn pool_sizes(&self) -> Vec<DescriptorPoolSize> {
        let mut sizes: Vec<DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count = size.descriptor_count.saturating_add(binding.descriptor_count),
                None => sizes.push(DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: binding.descriptor_count,
                }),
            }
        }
        sizes
    }
}

/// A push-constant range and the root-constant register it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PushConstantBinding {
    pub(crate) binding: u32,
    pub(crate) range: PushConstantRange,
}

#[derive(Debug)]
pub(crate) struct RootSignatureInner {
    pub(crate) layout: Arc<ValidatedLayout>,
    pub(crate) config: Arc<RhiConfig>,
    set_layouts: Vec<SetLayout>,
    pipeline_layout: vk::PipelineLayout,
    push_constants: Vec<PushConstantBinding>,
    immutable_samplers: Vec<vk::Sampler>,
    driver: Arc<dyn Driver>,
}

impl RootSignatureInner {
    pub(crate) fn set_layout(&self, space: u32) -> Option<&SetLayout> {
        self.layout.space(space)?;
        self.set_layouts.get(space as usize)
    }

    pub(crate) fn push_constant(&self, binding: u32) -> Option<&PushConstantBinding> {
        self.push_constants.iter().find(|p| p.binding == binding)
    }
}

impl Drop for RootSignatureInner {
    fn drop(&mut self) {
        if self.pipeline_layout != vk::PipelineLayout::null() {
            self.driver.destroy_pipeline_layout(self.pipeline_layout);
        }
        for set_layout in &self.set_layouts {
            self.driver.destroy_descriptor_set_layout(set_layout.handle);
        }
        for sampler in &self.immutable_samplers {
            self.driver.destroy_sampler(*sampler);
        }
    }
}

/// A pipeline layout with its descriptor-set layouts.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct RootSignature {
    pub(crate) inner: Arc<RootSignatureInner>,
}

impl RootSignature {
    pub(crate) fn build(driver: Arc<dyn Driver>, config: Arc<RhiConfig>, desc: &RootSignatureDesc) -> Result<Self, Error> {
        let layout = Arc::new(ValidatedLayout::new(desc, &config)?);
        let mut per_set = Vec::new();
        if let Some(max_space) = layout.max_space() {
            for set in 0..=max_space {
                per_set.push(match layout.space(set) {
                    Some(space) => set_bindings(space, &config.binding_shift)?,
                    None => Vec::new(),
                });
            }
        }
        let push_constants = layout
            .root_constants()
            .iter()
            .map(|rc| PushConstantBinding {
                binding: rc.binding,
                range: PushConstantRange {
                    stage_flags: shader_stages(rc.stages),
                    offset: rc.offset,
                    size: rc.size,
                },
            })
            .collect();
        // every native object is owned by `inner` as soon as it exists, so an error part way
        // through releases what was created
        let mut inner = RootSignatureInner {
            layout: layout.clone(),
            config: config.clone(),
            set_layouts: Vec::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            push_constants,
            immutable_samplers: Vec::new(),
            driver: driver.clone(),
        };
        for (set, mut bindings) in per_set.into_iter().enumerate() {
            if let Some(space) = layout.space(set as u32) {
                for sampler in &space.static_samplers {
                    let handle = driver.create_sampler(&sampler.sampler)?;
                    inner.immutable_samplers.push(handle);
                    let shifted = shifted_binding(&config.binding_shift, ResourceType::Sampler, sampler.binding);
                    if let Some(binding) = bindings.iter_mut().find(|b| Some(b.binding) == shifted) {
                        binding.immutable_samplers = vec![handle];
                    }
                }
            }
            let handle = driver.create_descriptor_set_layout(&bindings)?;
            inner.set_layouts.push(SetLayout {
                set: set as u32,
                handle,
                bindings,
            });
        }
        let handles: Vec<vk::DescriptorSetLayout> = inner.set_layouts.iter().map(|s| s.handle).collect();
        let ranges: Vec<PushConstantRange> = inner.push_constants.iter().map(|p| p.range).collect();
        inner.pipeline_layout = driver.create_pipeline_layout(&handles, &ranges)?;
        logwise::info_sync!(
            "vulkan root signature: {sets} sets, {ranges} push constant ranges",
            sets = handles.len(),
            ranges = ranges.len()
        );
        Ok(RootSignature { inner: Arc::new(inner) })
    }

    pub fn layout(&self) -> &ValidatedLayout {
        &self.inner.layout
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.inner.pipeline_layout
    }

    /// Every set layout, indexed by set number.
    pub fn set_layouts(&self) -> &[SetLayout] {
        &self.inner.set_layouts
    }

    /// The set layout for a register space that has slots.
    pub fn set_layout(&self, space: u32) -> Option<&SetLayout> {
        self.inner.set_layout(space)
    }

    pub fn push_constant_ranges(&self) -> Vec<PushConstantRange> {
        self.inner.push_constants.iter().map(|p| p.range).collect()
    }

    pub fn shifted_binding(&self, ty: ResourceType, binding: u32) -> Option<u32> {
        shifted_binding(&self.inner.config.binding_shift, ty, binding)
    }
}
