// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Building a root signature twice from equivalent descriptions yields the same native layout,
//! regardless of the order reflection reported the slots in.
#![cfg(any(feature = "backend_vulkan", feature = "backend_dx12", feature = "backend_metal"))]

use rhi::bindings::layout::ValidatedLayout;
use rhi::bindings::root_signature_desc::{RootConstantRange, RootSignatureDesc};
use rhi::bindings::slot::{BindingDimension, ResourceBindingSlot, ResourceType, ShaderStages};
use rhi::config::RhiConfig;
use rhi::error::Error;

fn slots() -> Vec<ResourceBindingSlot> {
    vec![
        ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0).with_stages(ShaderStages::VERTEX),
        ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 1),
        ResourceBindingSlot::new(ResourceType::ShaderResource, 1, 1).with_array_size(4),
        ResourceBindingSlot::new(ResourceType::UnorderedAccess, 0, 1).with_dimension(BindingDimension::Buffer),
        ResourceBindingSlot::new(ResourceType::Sampler, 0, 1).with_stages(ShaderStages::PIXEL),
        ResourceBindingSlot::new(ResourceType::ConstantBuffer, 2, 2),
    ]
}

fn desc(reverse: bool) -> RootSignatureDesc {
    let mut slots = slots();
    if reverse {
        slots.reverse();
    }
    let mut desc = RootSignatureDesc::new();
    for slot in slots {
        desc = desc.slot(slot);
    }
    let mut ranges = vec![RootConstantRange::new(0, 0, 16), RootConstantRange::new(1, 16, 8)];
    if reverse {
        ranges.reverse();
    }
    for range in ranges {
        desc = desc.root_constant(range);
    }
    desc
}

#[test]
fn validated_layout_ignores_declaration_order() {
    let config = RhiConfig::default();
    let a = ValidatedLayout::new(&desc(false), &config).unwrap();
    let b = ValidatedLayout::new(&desc(true), &config).unwrap();
    assert_eq!(a, b);
    let spaces: Vec<u32> = a.spaces().map(|s| s.space).collect();
    assert_eq!(spaces, vec![0, 1, 2]);
}

#[test]
fn reserved_space_is_rejected() {
    let config = RhiConfig::default().with_root_constant_space(3);
    let desc = RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 3));
    assert_eq!(
        ValidatedLayout::new(&desc, &config),
        Err(Error::ReservedSpaceCollision { space: 3 })
    );
}

#[test]
fn overlapping_arrays_are_duplicates() {
    let desc = RootSignatureDesc::new()
        .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0).with_array_size(4))
        .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 3, 0));
    assert_eq!(
        ValidatedLayout::new(&desc, &RhiConfig::default()),
        Err(Error::DuplicateSlot {
            ty: ResourceType::ShaderResource,
            binding: 3,
            space: 0
        })
    );
}

#[cfg(feature = "backend_vulkan")]
mod vulkan {
    use super::desc;
    use rhi::Device as _;
    use rhi::bindings::slot::ResourceType;
    use rhi::config::RhiConfig;
    use rhi::vulkan::{Device, SetLayoutBinding};

    fn bindings(device: &Device, reverse: bool) -> Vec<(u32, Vec<SetLayoutBinding>)> {
        let root = device.create_root_signature(&desc(reverse)).unwrap();
        root.set_layouts()
            .iter()
            .map(|layout| (layout.set, layout.bindings.clone()))
            .collect()
    }

    #[test]
    fn set_layouts_are_stable() {
        let device = Device::null(RhiConfig::default());
        assert_eq!(bindings(&device, false), bindings(&device, true));
    }

    #[test]
    fn push_constants_and_shifts_are_stable() {
        let device = Device::null(RhiConfig::default());
        let a = device.create_root_signature(&desc(false)).unwrap();
        let b = device.create_root_signature(&desc(true)).unwrap();
        assert_eq!(a.push_constant_ranges(), b.push_constant_ranges());
        assert_eq!(a.shifted_binding(ResourceType::ShaderResource, 1), Some(1001));
        assert_eq!(a.shifted_binding(ResourceType::UnorderedAccess, 0), Some(2000));
        assert_eq!(a.shifted_binding(ResourceType::Sampler, 0), Some(3000));
        let set1: Vec<u32> = a.set_layout(1).unwrap().bindings.iter().map(|b| b.binding).collect();
        assert_eq!(set1, vec![1000, 1001, 2000, 3000]);
    }
}

#[cfg(feature = "backend_dx12")]
mod dx12 {
    use super::desc;
    use rhi::Device as _;
    use rhi::bindings::layout::ValidatedLayout;
    use rhi::config::RhiConfig;
    use rhi::dx12::{plan, Device};

    #[test]
    fn root_parameters_are_stable() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let a = device.create_root_signature(&desc(false)).unwrap();
        let b = device.create_root_signature(&desc(true)).unwrap();
        assert_eq!(a.parameters(), b.parameters());
        for space in 0..3 {
            assert_eq!(a.space(space), b.space(space));
        }
        assert_eq!(a.root_constant_parameter(0), b.root_constant_parameter(0));
    }

    #[test]
    fn plan_is_a_pure_function_of_the_layout() {
        let config = RhiConfig::default();
        let a = plan(&ValidatedLayout::new(&desc(false), &config).unwrap(), &config.dx12).unwrap();
        let b = plan(&ValidatedLayout::new(&desc(true), &config).unwrap(), &config.dx12).unwrap();
        assert_eq!(a, b);
    }
}

#[cfg(feature = "backend_metal")]
mod metal {
    use super::desc;
    use rhi::Device as _;
    use rhi::config::RhiConfig;
    use rhi::metal::Device;

    #[test]
    fn argument_buffers_are_stable() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let a = device.create_root_signature(&desc(false)).unwrap();
        let b = device.create_root_signature(&desc(true)).unwrap();
        assert_eq!(a.argument_buffers(), b.argument_buffers());
        assert_eq!(a.root_constant_bytes(), b.root_constant_bytes());
        let indices: Vec<u32> = a.argument_buffers().iter().map(|l| l.buffer_index).collect();
        assert_eq!(indices, vec![16, 17, 18]);
    }
}
