// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Backend-independent validation of a [`RootSignatureDesc`].

Every backend builds its native layout from a [`ValidatedLayout`] rather than from the raw
description, so the rules here hold for all three:

* array sizes are at least 1;
* no slot or static sampler lives in the reserved root-constant space;
* register spaces stay below `max_bind_groups`;
* slot identities (and the register ranges arrays occupy) are unique within a space;
* root-constant ranges are non-empty, DWORD aligned, non-overlapping, and fit the configured limit.

Slots are regrouped by register space and sorted by `(type, binding)`, which makes every native
layout built from them independent of the order reflection produced the slots in.
*/

use crate::bindings::root_signature_desc::{RootConstantRange, RootSignatureDesc, StaticSamplerDesc};
use crate::bindings::slot::{ResourceBindingSlot, ResourceType};
use crate::config::RhiConfig;
use crate::error::{reject, Error};
use std::collections::BTreeMap;

/// The slots and static samplers of one register space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceLayout {
    pub space: u32,
    /// Sorted by `(ty, binding)`.
    pub slots: Vec<ResourceBindingSlot>,
    /// Sorted by binding.
    pub static_samplers: Vec<StaticSamplerDesc>,
}

impl SpaceLayout {
    pub fn slot(&self, ty: ResourceType, binding: u32) -> Option<&ResourceBindingSlot> {
        self.slots
            .iter()
            .find(|s| s.ty == ty && s.binding == binding)
    }

    /// Total descriptors (array elements) of the given types.
    pub fn descriptor_count(&self, filter: impl Fn(ResourceType) -> bool) -> u32 {
        self.slots
            .iter()
            .filter(|s| filter(s.ty))
            .map(|s| s.array_size)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLayout {
    spaces: BTreeMap<u32, SpaceLayout>,
    root_constants: Vec<RootConstantRange>,
    root_constant_space: u32,
}

impl ValidatedLayout {
    pub fn new(desc: &RootSignatureDesc, config: &RhiConfig) -> Result<Self, Error> {
        let root_space = config.root_constant_space;
        let mut spaces: BTreeMap<u32, SpaceLayout> = BTreeMap::new();

        let check_space = |space: u32| -> Result<(), Error> {
            if space == root_space {
                return Err(reject(Error::ReservedSpaceCollision { space }));
            }
            if space >= config.max_bind_groups {
                return Err(reject(Error::TooManyBindGroups {
                    space,
                    limit: config.max_bind_groups,
                }));
            }
            Ok(())
        };

        for slot in &desc.slots {
            if slot.array_size == 0 {
                return Err(reject(Error::InvalidArraySize {
                    ty: slot.ty,
                    binding: slot.binding,
                    space: slot.space,
                }));
            }
            check_space(slot.space)?;
            let entry = spaces.entry(slot.space).or_insert_with(|| SpaceLayout {
                space: slot.space,
                slots: Vec::new(),
                static_samplers: Vec::new(),
            });
            let range = slot.register_range();
            let collides = entry.slots.iter().any(|other| {
                let other_range = other.register_range();
                other.ty == slot.ty && range.start < other_range.end && other_range.start < range.end
            });
            if collides {
                return Err(reject(Error::DuplicateSlot {
                    ty: slot.ty,
                    binding: slot.binding,
                    space: slot.space,
                }));
            }
            entry.slots.push(slot.clone());
        }

        for sampler in &desc.static_samplers {
            check_space(sampler.space)?;
            let entry = spaces.entry(sampler.space).or_insert_with(|| SpaceLayout {
                space: sampler.space,
                slots: Vec::new(),
                static_samplers: Vec::new(),
            });
            let taken_by_slot = entry
                .slots
                .iter()
                .any(|s| s.ty == ResourceType::Sampler && s.register_range().contains(&sampler.binding));
            let taken_by_static = entry.static_samplers.iter().any(|s| s.binding == sampler.binding);
            if taken_by_slot || taken_by_static {
                return Err(reject(Error::DuplicateSlot {
                    ty: ResourceType::Sampler,
                    binding: sampler.binding,
                    space: sampler.space,
                }));
            }
            entry.static_samplers.push(sampler.clone());
        }

        for space in spaces.values_mut() {
            space.slots.sort_by_key(|s| (s.ty, s.binding));
            space.static_samplers.sort_by_key(|s| s.binding);
        }

        let mut root_constants: Vec<RootConstantRange> = Vec::with_capacity(desc.root_constants.len());
        for range in &desc.root_constants {
            let invalid = |reason: &'static str| {
                reject(Error::InvalidRootConstantRange {
                    binding: range.binding,
                    offset: range.offset,
                    size: range.size,
                    reason,
                })
            };
            if range.size == 0 {
                return Err(invalid("size is zero"));
            }
            if range.size % 4 != 0 || range.offset % 4 != 0 {
                return Err(invalid("offset and size must be multiples of 4"));
            }
            if range.offset + range.size > config.max_root_constant_bytes {
                return Err(invalid("exceeds the root constant byte limit"));
            }
            if root_constants.iter().any(|r| r.binding == range.binding) {
                return Err(reject(Error::DuplicateRootConstant {
                    binding: range.binding,
                }));
            }
            let overlaps = root_constants
                .iter()
                .any(|r| range.offset < r.offset + r.size && r.offset < range.offset + range.size);
            if overlaps {
                return Err(invalid("overlaps another range"));
            }
            root_constants.push(*range);
        }
        root_constants.sort_by_key(|r| r.binding);

        Ok(ValidatedLayout {
            spaces,
            root_constants,
            root_constant_space: root_space,
        })
    }

    /// Register spaces in ascending order.
    pub fn spaces(&self) -> impl Iterator<Item = &SpaceLayout> {
        self.spaces.values()
    }

    pub fn space(&self, space: u32) -> Option<&SpaceLayout> {
        self.spaces.get(&space)
    }

    /// Highest register space in use, if any.
    pub fn max_space(&self) -> Option<u32> {
        self.spaces.keys().next_back().copied()
    }

    pub fn slot(&self, ty: ResourceType, binding: u32, space: u32) -> Option<&ResourceBindingSlot> {
        self.spaces.get(&space)?.slot(ty, binding)
    }

    /// Sorted by binding.
    pub fn root_constants(&self) -> &[RootConstantRange] {
        &self.root_constants
    }

    pub fn root_constant(&self, binding: u32) -> Option<&RootConstantRange> {
        self.root_constants.iter().find(|r| r.binding == binding)
    }

    /// Size of the push-constant block covering every range.
    pub fn root_constant_bytes(&self) -> u32 {
        self.root_constants
            .iter()
            .map(|r| r.offset + r.size)
            .max()
            .unwrap_or(0)
    }

    pub fn root_constant_space(&self) -> u32 {
        self.root_constant_space
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::slot::ResourceBindingSlot;
    use crate::resources::SamplerDesc;

    fn slot(ty: ResourceType, binding: u32, space: u32) -> ResourceBindingSlot {
        ResourceBindingSlot::new(ty, binding, space)
    }

    #[test]
    fn groups_and_sorts_by_space() {
        let desc = RootSignatureDesc::new()
            .slot(slot(ResourceType::Sampler, 0, 1))
            .slot(slot(ResourceType::ShaderResource, 2, 0))
            .slot(slot(ResourceType::ConstantBuffer, 0, 0))
            .slot(slot(ResourceType::ShaderResource, 0, 1));
        let layout = ValidatedLayout::new(&desc, &RhiConfig::default()).unwrap();
        let spaces: Vec<u32> = layout.spaces().map(|s| s.space).collect();
        assert_eq!(spaces, vec![0, 1]);
        let space0: Vec<ResourceType> = layout.space(0).unwrap().slots.iter().map(|s| s.ty).collect();
        assert_eq!(space0, vec![ResourceType::ConstantBuffer, ResourceType::ShaderResource]);
        let space1: Vec<ResourceType> = layout.space(1).unwrap().slots.iter().map(|s| s.ty).collect();
        assert_eq!(space1, vec![ResourceType::ShaderResource, ResourceType::Sampler]);
    }

    #[test]
    fn rejects_duplicate_identity() {
        let desc = RootSignatureDesc::new()
            .slot(slot(ResourceType::ShaderResource, 1, 0))
            .slot(slot(ResourceType::ShaderResource, 1, 0));
        assert_eq!(
            ValidatedLayout::new(&desc, &RhiConfig::default()),
            Err(Error::DuplicateSlot {
                ty: ResourceType::ShaderResource,
                binding: 1,
                space: 0
            })
        );
    }

    #[test]
    fn same_binding_different_type_is_fine() {
        let desc = RootSignatureDesc::new()
            .slot(slot(ResourceType::ShaderResource, 0, 0))
            .slot(slot(ResourceType::UnorderedAccess, 0, 0))
            .slot(slot(ResourceType::ConstantBuffer, 0, 0));
        assert!(ValidatedLayout::new(&desc, &RhiConfig::default()).is_ok());
    }

    #[test]
    fn rejects_overlapping_arrays() {
        let desc = RootSignatureDesc::new()
            .slot(slot(ResourceType::ShaderResource, 0, 0).with_array_size(4))
            .slot(slot(ResourceType::ShaderResource, 3, 0));
        assert!(matches!(
            ValidatedLayout::new(&desc, &RhiConfig::default()),
            Err(Error::DuplicateSlot { binding: 3, .. })
        ));
    }

    #[test]
    fn rejects_zero_array_size() {
        let desc = RootSignatureDesc::new().slot(slot(ResourceType::ShaderResource, 0, 0).with_array_size(0));
        assert!(matches!(
            ValidatedLayout::new(&desc, &RhiConfig::default()),
            Err(Error::InvalidArraySize { .. })
        ));
    }

    #[test]
    fn rejects_reserved_space() {
        let config = RhiConfig::default().with_root_constant_space(3);
        let desc = RootSignatureDesc::new().slot(slot(ResourceType::ConstantBuffer, 0, 3));
        assert_eq!(
            ValidatedLayout::new(&desc, &config),
            Err(Error::ReservedSpaceCollision { space: 3 })
        );
    }

    #[test]
    fn rejects_too_many_spaces() {
        let config = RhiConfig::default().with_max_bind_groups(2);
        let desc = RootSignatureDesc::new().slot(slot(ResourceType::ConstantBuffer, 0, 2));
        assert_eq!(
            ValidatedLayout::new(&desc, &config),
            Err(Error::TooManyBindGroups { space: 2, limit: 2 })
        );
    }

    #[test]
    fn root_constant_rules() {
        let config = RhiConfig::default();
        let bad_align = RootSignatureDesc::new().root_constant(RootConstantRange::new(0, 2, 8));
        assert!(matches!(
            ValidatedLayout::new(&bad_align, &config),
            Err(Error::InvalidRootConstantRange { .. })
        ));
        let too_big = RootSignatureDesc::new().root_constant(RootConstantRange::new(0, 0, 256));
        assert!(matches!(
            ValidatedLayout::new(&too_big, &config),
            Err(Error::InvalidRootConstantRange { .. })
        ));
        let dup = RootSignatureDesc::new()
            .root_constant(RootConstantRange::new(0, 0, 8))
            .root_constant(RootConstantRange::new(0, 8, 8));
        assert_eq!(
            ValidatedLayout::new(&dup, &config),
            Err(Error::DuplicateRootConstant { binding: 0 })
        );
        let ok = RootSignatureDesc::new()
            .root_constant(RootConstantRange::new(1, 16, 16))
            .root_constant(RootConstantRange::new(0, 0, 16));
        let layout = ValidatedLayout::new(&ok, &config).unwrap();
        assert_eq!(layout.root_constant_bytes(), 32);
        assert_eq!(layout.root_constants()[0].binding, 0);
    }

    #[test]
    fn static_sampler_cannot_shadow_slot() {
        let desc = RootSignatureDesc::new()
            .slot(slot(ResourceType::Sampler, 0, 0))
            .static_sampler(0, 0, SamplerDesc::default());
        assert!(matches!(
            ValidatedLayout::new(&desc, &RhiConfig::default()),
            Err(Error::DuplicateSlot {
                ty: ResourceType::Sampler,
                ..
            })
        ));
    }
}
