// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Bind-group transactions: what `end_update` commits can be queried back, and rejected writes
//! leave earlier bindings alone.
#![cfg(any(feature = "backend_vulkan", feature = "backend_dx12", feature = "backend_metal"))]

use rhi::bindings::root_signature_desc::{RootConstantRange, RootSignatureDesc};
use rhi::bindings::slot::{BindingDimension, ResourceBindingSlot, ResourceType};
use rhi::error::Error;
use rhi::resources::{BufferDesc, BufferUsage, Format, SamplerDesc, TextureDesc, TextureUsage};
use rhi::{Backend, BindGroup, BindingResource, Device, GpuBuffer, GpuSampler, GpuTexture};

fn layout() -> RootSignatureDesc {
    RootSignatureDesc::new()
        .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0))
        .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0).with_array_size(3))
        .slot(ResourceBindingSlot::new(ResourceType::UnorderedAccess, 1, 0).with_dimension(BindingDimension::Buffer))
        .slot(ResourceBindingSlot::new(ResourceType::Sampler, 0, 0))
        .root_constant(RootConstantRange::new(0, 0, 16))
}

fn buffer<B: Backend>(buffer: &B::Buffer) -> BindingResource<'_, B> {
    BindingResource::Buffer(buffer)
}

fn texture<B: Backend>(texture: &B::Texture) -> BindingResource<'_, B> {
    BindingResource::Texture(texture)
}

fn sampler<B: Backend>(sampler: &B::Sampler) -> BindingResource<'_, B> {
    BindingResource::Sampler(sampler)
}

fn sampled<D: Device>(device: &D, name: &str) -> <D::Backend as Backend>::Texture {
    device
        .create_texture(&TextureDesc::new_2d(
            name,
            4,
            4,
            Format::Rgba8Unorm,
            TextureUsage::SHADER_RESOURCE,
        ))
        .unwrap()
}

fn committed_writes_read_back<D: Device>(device: &D) {
    let root = device.create_root_signature(&layout()).unwrap();
    let mut group = device.create_bind_group(&root, 0).unwrap();
    let constants = device
        .create_buffer(&BufferDesc::new("constants", 256, BufferUsage::CONSTANT))
        .unwrap();
    let storage = device
        .create_buffer(&BufferDesc::new("storage", 1024, BufferUsage::UNORDERED_ACCESS).with_stride(16))
        .unwrap();
    let textures: Vec<_> = (0..3).map(|i| sampled(device, &format!("t{i}"))).collect();
    let filter = device.create_sampler(&SamplerDesc::default()).unwrap();

    group.begin_update();
    group.cbv(0, buffer::<D::Backend>(&constants)).unwrap();
    let views: Vec<_> = textures.iter().map(texture::<D::Backend>).collect();
    group.srv_array(0, &views).unwrap();
    group.uav(1, buffer::<D::Backend>(&storage)).unwrap();
    group.sampler(0, sampler::<D::Backend>(&filter)).unwrap();
    assert_eq!(group.bound_resource(ResourceType::ConstantBuffer, 0, 0), None);
    group.end_update().unwrap();

    assert_eq!(group.space(), 0);
    assert_eq!(group.bound_resource(ResourceType::ConstantBuffer, 0, 0), Some(constants.id()));
    for (i, t) in textures.iter().enumerate() {
        assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, i as u32), Some(t.id()));
    }
    assert_eq!(group.bound_resource(ResourceType::UnorderedAccess, 1, 0), Some(storage.id()));
    assert_eq!(group.bound_resource(ResourceType::Sampler, 0, 0), Some(filter.id()));

    let replacement = sampled(device, "replacement");
    group.begin_update();
    group.srv_array_index(0, 1, texture::<D::Backend>(&replacement)).unwrap();
    group.end_update().unwrap();
    assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, 0), Some(textures[0].id()));
    assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, 1), Some(replacement.id()));
    assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, 2), Some(textures[2].id()));
}

fn mismatch_keeps_prior_binding<D: Device>(device: &D) {
    let root = device.create_root_signature(&layout()).unwrap();
    let mut group = device.create_bind_group(&root, 0).unwrap();
    let constants = device
        .create_buffer(&BufferDesc::new("constants", 256, BufferUsage::CONSTANT))
        .unwrap();
    let vertices = device
        .create_buffer(&BufferDesc::new("vertices", 256, BufferUsage::VERTEX))
        .unwrap();
    let image = sampled(device, "image");

    group.begin_update();
    group.cbv(0, buffer::<D::Backend>(&constants)).unwrap();
    group.end_update().unwrap();

    group.begin_update();
    let err = group.cbv(0, texture::<D::Backend>(&image)).unwrap_err();
    assert!(matches!(
        err,
        Error::DescriptorTypeMismatch {
            ty: ResourceType::ConstantBuffer,
            binding: 0,
            ..
        }
    ));
    let err = group.cbv(0, buffer::<D::Backend>(&vertices)).unwrap_err();
    assert!(matches!(err, Error::DescriptorTypeMismatch { .. }));
    let err = group.uav(7, buffer::<D::Backend>(&constants)).unwrap_err();
    assert_eq!(
        err,
        Error::SlotNotFound {
            ty: ResourceType::UnorderedAccess,
            binding: 7,
            space: 0
        }
    );
    group.end_update().unwrap();

    assert_eq!(group.bound_resource(ResourceType::ConstantBuffer, 0, 0), Some(constants.id()));
}

fn array_writes_are_all_or_nothing<D: Device>(device: &D) {
    let root = device.create_root_signature(&layout()).unwrap();
    let mut group = device.create_bind_group(&root, 0).unwrap();
    let good = sampled(device, "good");
    let bad = device
        .create_texture(&TextureDesc::new_2d(
            "attachment only",
            4,
            4,
            Format::Rgba8Unorm,
            TextureUsage::RENDER_TARGET,
        ))
        .unwrap();

    group.begin_update();
    let views = [texture::<D::Backend>(&good), texture::<D::Backend>(&bad)];
    assert!(group.srv_array(0, &views).is_err());
    let too_many = [texture::<D::Backend>(&good); 4];
    assert_eq!(
        group.srv_array(0, &too_many),
        Err(Error::ArrayIndexOutOfRange {
            binding: 0,
            index: 3,
            array_size: 3
        })
    );
    group.end_update().unwrap();

    assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, 0), None);
    assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, 1), None);
}

fn root_constants_are_zero_padded<D: Device>(device: &D) {
    let root = device.create_root_signature(&layout()).unwrap();
    let mut group = device.create_bind_group(&root, 0).unwrap();
    group.set_root_constants(0, &[1, 2, 3, 4]).unwrap();
    let mut expected = vec![0u8; 16];
    expected[..4].copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(group.root_constants(0), Some(expected.as_slice()));

    assert_eq!(
        group.set_root_constants(0, &[0u8; 20]),
        Err(Error::RootConstantOverflow {
            binding: 0,
            len: 20,
            size: 16
        })
    );
    assert_eq!(group.root_constants(0), Some(expected.as_slice()));
    assert_eq!(
        group.set_root_constants(5, &[0u8; 4]),
        Err(Error::UnknownRootConstant { binding: 5 })
    );
}

fn write_outside_update<D: Device>(device: &D) {
    let root = device.create_root_signature(&layout()).unwrap();
    let mut group = device.create_bind_group(&root, 0).unwrap();
    let image = sampled(device, "image");
    let _ = group.srv(0, texture::<D::Backend>(&image));
}

fn unknown_space_is_rejected<D: Device>(device: &D) {
    let root = device.create_root_signature(&layout()).unwrap();
    assert_eq!(
        device.create_bind_group(&root, 4).unwrap_err(),
        Error::UnknownSpace { space: 4 }
    );
}

#[cfg(feature = "backend_vulkan")]
mod vulkan {
    use super::*;
    use rhi::Device as _;
    use rhi::config::RhiConfig;
    use rhi::resources::SubresourceRange;
    use rhi::vulkan::{Device, DriverCall, NullDriver};
    use std::sync::Arc;

    fn device() -> Device {
        Device::null(RhiConfig::default())
    }

    #[test]
    fn committed_writes_read_back() {
        super::committed_writes_read_back(&device());
    }

    #[test]
    fn mismatch_keeps_prior_binding() {
        super::mismatch_keeps_prior_binding(&device());
    }

    #[test]
    fn array_writes_are_all_or_nothing() {
        super::array_writes_are_all_or_nothing(&device());
    }

    #[test]
    fn root_constants_are_zero_padded() {
        super::root_constants_are_zero_padded(&device());
    }

    #[test]
    fn unknown_space_is_rejected() {
        super::unknown_space_is_rejected(&device());
    }

    #[test]
    #[should_panic(expected = "outside begin_update/end_update")]
    fn write_outside_update() {
        super::write_outside_update(&device());
    }

    #[test]
    fn one_update_call_per_transaction() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default());
        let root = device.create_root_signature(&layout()).unwrap();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        let textures: Vec<_> = (0..3).map(|i| sampled(&device, &format!("t{i}"))).collect();
        driver.clear_calls();

        group.begin_update();
        for (i, t) in textures.iter().enumerate() {
            group.srv_array_index(0, i as u32, t).unwrap();
        }
        group.end_update().unwrap();

        let updates = driver.descriptor_updates();
        assert_eq!(updates.len(), 1);
        let elements: Vec<(u32, u32)> = updates[0].iter().map(|w| (w.dst_binding, w.dst_array_element)).collect();
        assert_eq!(elements, vec![(1000, 0), (1000, 1), (1000, 2)]);
    }

    #[test]
    fn empty_transaction_makes_no_driver_call() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default());
        let root = device.create_root_signature(&layout()).unwrap();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        driver.clear_calls();
        group.begin_update();
        group.end_update().unwrap();
        assert!(driver.descriptor_updates().is_empty());
    }

    fn live_views(driver: &NullDriver) -> isize {
        driver
            .calls()
            .iter()
            .map(|c| match c {
                DriverCall::CreateImageView { .. } => 1,
                DriverCall::DestroyImageView(_) => -1,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn rewriting_a_mip_binding_keeps_one_view() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default());
        let root = device.create_root_signature(&layout()).unwrap();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        let mipped = device
            .create_texture(
                &TextureDesc::new_2d("mipped", 8, 8, Format::Rgba8Unorm, TextureUsage::SHADER_RESOURCE)
                    .with_mip_levels(2),
            )
            .unwrap();
        let mip = BindingResource::TextureView {
            texture: &mipped,
            range: SubresourceRange::mip(1),
        };
        driver.clear_calls();

        for _ in 0..5 {
            group.begin_update();
            group.srv_array_index(0, 0, mip).unwrap();
            group.end_update().unwrap();
        }
        assert_eq!(live_views(&driver), 1);

        // restaged within one transaction
        group.begin_update();
        group.srv_array_index(0, 0, mip).unwrap();
        group.srv_array_index(0, 0, mip).unwrap();
        group.end_update().unwrap();
        assert_eq!(live_views(&driver), 1);

        // a whole-texture binding needs no view of its own
        group.begin_update();
        group.srv_array_index(0, 0, &mipped).unwrap();
        group.end_update().unwrap();
        assert_eq!(live_views(&driver), 0);

        group.begin_update();
        group.srv_array_index(0, 2, mip).unwrap();
        group.end_update().unwrap();
        drop(group);
        assert_eq!(live_views(&driver), 0);
    }
}

#[cfg(feature = "backend_dx12")]
mod dx12 {
    use super::*;
    use rhi::Device as _;
    use rhi::config::RhiConfig;
    use rhi::dx12::{Device, NullDriver};
    use std::sync::Arc;

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    #[test]
    fn committed_writes_read_back() {
        super::committed_writes_read_back(&device());
    }

    #[test]
    fn mismatch_keeps_prior_binding() {
        super::mismatch_keeps_prior_binding(&device());
    }

    #[test]
    fn array_writes_are_all_or_nothing() {
        super::array_writes_are_all_or_nothing(&device());
    }

    #[test]
    fn root_constants_are_zero_padded() {
        super::root_constants_are_zero_padded(&device());
    }

    #[test]
    fn unknown_space_is_rejected() {
        super::unknown_space_is_rejected(&device());
    }

    #[test]
    #[should_panic(expected = "outside begin_update/end_update")]
    fn write_outside_update() {
        super::write_outside_update(&device());
    }

    #[test]
    fn descriptors_land_at_their_table_offsets() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default()).unwrap();
        let root = device.create_root_signature(&layout()).unwrap();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        let textures: Vec<_> = (0..3).map(|i| sampled(&device, &format!("t{i}"))).collect();
        driver.clear_calls();

        group.begin_update();
        for (i, t) in textures.iter().enumerate() {
            group.srv_array_index(0, i as u32, t).unwrap();
        }
        group.end_update().unwrap();

        let copies = driver.descriptor_copies();
        assert_eq!(copies.len(), 1);
        let destinations: Vec<_> = copies[0].iter().map(|c| c.dst).collect();
        let expected: Vec<_> = (0..3)
            .map(|i| group.descriptor(ResourceType::ShaderResource, 0, i).unwrap())
            .collect();
        assert_eq!(destinations, expected);
    }
}

#[cfg(feature = "backend_metal")]
mod metal {
    use super::*;
    use rhi::Device as _;
    use rhi::config::RhiConfig;
    use rhi::metal::{ArgumentValue, Device, NullDriver};
    use std::sync::Arc;

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    #[test]
    fn committed_writes_read_back() {
        super::committed_writes_read_back(&device());
    }

    #[test]
    fn mismatch_keeps_prior_binding() {
        super::mismatch_keeps_prior_binding(&device());
    }

    #[test]
    fn array_writes_are_all_or_nothing() {
        super::array_writes_are_all_or_nothing(&device());
    }

    #[test]
    fn root_constants_are_zero_padded() {
        super::root_constants_are_zero_padded(&device());
    }

    #[test]
    fn unknown_space_is_rejected() {
        super::unknown_space_is_rejected(&device());
    }

    #[test]
    #[should_panic(expected = "outside begin_update/end_update")]
    fn write_outside_update() {
        super::write_outside_update(&device());
    }

    #[test]
    fn array_elements_use_consecutive_argument_ids() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default()).unwrap();
        let root = device.create_root_signature(&layout()).unwrap();
        let first = root
            .argument_buffer(0)
            .unwrap()
            .argument(ResourceType::ShaderResource, 0)
            .unwrap()
            .descriptor
            .index;
        let mut group = device.create_bind_group(&root, 0).unwrap();
        let textures: Vec<_> = (0..3).map(|i| sampled(&device, &format!("t{i}"))).collect();
        driver.clear_calls();

        group.begin_update();
        let views: Vec<BindingResource<'_, rhi::Metal>> = textures.iter().map(Into::into).collect();
        group.srv_array(0, &views).unwrap();
        group.end_update().unwrap();

        let encodes = driver.argument_encodes();
        assert_eq!(encodes.len(), 1);
        let written: Vec<(u32, ArgumentValue)> = encodes[0].iter().map(|w| (w.id, w.value)).collect();
        let expected: Vec<(u32, ArgumentValue)> = textures
            .iter()
            .enumerate()
            .map(|(i, t)| (first + i as u32, ArgumentValue::Texture(t.handle())))
            .collect();
        assert_eq!(written, expected);
    }

    #[test]
    fn dropping_a_group_returns_its_arena_bytes() {
        let device = device();
        let root = device.create_root_signature(&layout()).unwrap();
        let free = device.free_argument_bytes();
        let group = device.create_bind_group(&root, 0).unwrap();
        assert!(device.free_argument_bytes() < free);
        drop(group);
        assert_eq!(device.free_argument_bytes(), free);
    }
}
