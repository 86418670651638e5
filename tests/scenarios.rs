// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
End-to-end scenarios, run on every enabled backend.

1. A constant buffer at `b0, space0` and a texture at `t0, space1` land at the native binding
   indices each backend's binding model prescribes, and a dispatch binds both.
2. A draw recorded while a compute encoder is active is fatal and records no draw, both outside
   a rendering scope and inside one.  Inside a scope, graphics state binds are fatal too, and
   rendering comes back only through an explicit switch to the render encoder.
3. A swap-chain image goes Undefined -> RenderTarget -> Present through exactly two barriers and
   can then be presented.
*/
#![cfg(any(feature = "backend_vulkan", feature = "backend_dx12", feature = "backend_metal"))]

use raw_window_handle::{RawDisplayHandle, RawWindowHandle, Win32WindowHandle, WindowsDisplayHandle};
use rhi::bindings::root_signature_desc::RootSignatureDesc;
use rhi::bindings::slot::{ResourceBindingSlot, ResourceType};
use rhi::bindings::usage::{QueueType, ResourceUsage};
use rhi::commands::{ColorAttachment, PipelineBarrierDesc, RenderingDesc, ScissorRect, TextureBarrier};
use rhi::encoder::EncoderKind;
use rhi::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, ShaderBlob};
use rhi::resources::{BufferDesc, BufferUsage, Format, TextureDesc, TextureUsage};
use rhi::sync::{SubmitDesc, SwapChainDesc};
use rhi::{Backend, BindGroup, BindingResource, CommandList, Device, GpuTexture, Queue, SwapChain};
use std::num::NonZeroIsize;
use std::panic::{catch_unwind, AssertUnwindSafe};

type B<D> = <D as Device>::Backend;

fn scenario_layout() -> RootSignatureDesc {
    RootSignatureDesc::new()
        .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0))
        .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 1))
}

fn shader() -> ShaderBlob {
    ShaderBlob::new(vec![0u8; 4], "main")
}

fn window() -> (RawWindowHandle, RawDisplayHandle) {
    let hwnd = NonZeroIsize::new(1).unwrap();
    (
        RawWindowHandle::Win32(Win32WindowHandle::new(hwnd)),
        RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
    )
}

/// Everything scenario 1 creates, kept alive for inspection.
struct Bound<D: Device> {
    root: <B<D> as Backend>::RootSignature,
    constants: <B<D> as Backend>::Buffer,
    image: <B<D> as Backend>::Texture,
    groups: [<B<D> as Backend>::BindGroup; 2],
    list: <B<D> as Backend>::CommandList,
}

fn cbv_and_srv<D: Device>(device: &D) -> Bound<D> {
    let root = device.create_root_signature(&scenario_layout()).unwrap();
    let constants = device
        .create_buffer(&BufferDesc::new("constants", 256, BufferUsage::CONSTANT))
        .unwrap();
    let image = device
        .create_texture(&TextureDesc::new_2d(
            "image",
            4,
            4,
            Format::Rgba8Unorm,
            TextureUsage::SHADER_RESOURCE,
        ))
        .unwrap();
    let mut space0 = device.create_bind_group(&root, 0).unwrap();
    space0.begin_update();
    space0.cbv(0, BindingResource::<B<D>>::Buffer(&constants)).unwrap();
    space0.end_update().unwrap();
    let mut space1 = device.create_bind_group(&root, 1).unwrap();
    space1.begin_update();
    space1.srv(0, BindingResource::<B<D>>::Texture(&image)).unwrap();
    space1.end_update().unwrap();

    let pipeline = device
        .create_compute_pipeline(&root, &ComputePipelineDesc::new("cs", shader()))
        .unwrap();
    let mut list = device.create_command_list(QueueType::Compute).unwrap();
    list.begin();
    list.bind_pipeline(&pipeline);
    list.bind_resource_group(&space0);
    list.bind_resource_group(&space1);
    list.dispatch(1, 1, 1);
    list.end();
    Bound {
        root,
        constants,
        image,
        groups: [space0, space1],
        list,
    }
}

/// Records a dispatch, then a draw with no rendering scope.  Returns the list and whether the
/// draw panicked.
fn draw_during_compute<D: Device>(device: &D) -> (<B<D> as Backend>::CommandList, bool) {
    let root = device.create_root_signature(&RootSignatureDesc::new()).unwrap();
    let compute = device
        .create_compute_pipeline(&root, &ComputePipelineDesc::new("cs", shader()))
        .unwrap();
    let graphics = device
        .create_graphics_pipeline(
            &root,
            &GraphicsPipelineDesc::new("tri", shader(), shader(), Format::Rgba8Unorm),
        )
        .unwrap();
    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    list.bind_pipeline(&compute);
    list.bind_pipeline(&graphics);
    list.dispatch(1, 1, 1);
    assert_eq!(list.active_encoder(), EncoderKind::Compute);
    let panicked = catch_unwind(AssertUnwindSafe(|| list.draw(3, 1, 0, 0))).is_err();
    (list, panicked)
}

/// What happened to the graphics calls made while a dispatch held the encoder inside a scope.
struct InScope<D: Device> {
    list: <B<D> as Backend>::CommandList,
    draw_panicked: bool,
    bind_panicked: bool,
}

/// Opens a rendering scope, dispatches inside it, then tries a draw and a vertex-buffer bind
/// before switching back to rendering explicitly and drawing once.
fn draw_during_compute_in_scope<D: Device>(device: &D) -> InScope<D> {
    let root = device.create_root_signature(&RootSignatureDesc::new()).unwrap();
    let compute = device
        .create_compute_pipeline(&root, &ComputePipelineDesc::new("cs", shader()))
        .unwrap();
    let graphics = device
        .create_graphics_pipeline(
            &root,
            &GraphicsPipelineDesc::new("tri", shader(), shader(), Format::Rgba8Unorm),
        )
        .unwrap();
    let target = device
        .create_texture(&TextureDesc::new_2d(
            "target",
            8,
            8,
            Format::Rgba8Unorm,
            TextureUsage::RENDER_TARGET,
        ))
        .unwrap();
    let vertices = device
        .create_buffer(&BufferDesc::new("vertices", 64, BufferUsage::VERTEX))
        .unwrap();
    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::clear(&target, [0.0; 4])));
    list.bind_pipeline(&compute);
    list.bind_pipeline(&graphics);
    list.dispatch(1, 1, 1);
    assert_eq!(list.active_encoder(), EncoderKind::Compute);
    let draw_panicked = catch_unwind(AssertUnwindSafe(|| list.draw(3, 1, 0, 0))).is_err();
    let bind_panicked = catch_unwind(AssertUnwindSafe(|| list.bind_vertex_buffer(0, &vertices, 0))).is_err();
    assert_eq!(list.active_encoder(), EncoderKind::Compute);
    list.switch_encoder(EncoderKind::Render);
    list.draw(3, 1, 0, 0);
    list.end_rendering();
    list.end();
    InScope {
        list,
        draw_panicked,
        bind_panicked,
    }
}

/// Acquires an image, moves it to RenderTarget and then Present, submits and presents.
fn present_cycle<D: Device>(device: &D) -> <B<D> as Backend>::CommandList {
    let (window, display) = window();
    let mut swap_chain = device
        .create_swap_chain(window, display, &SwapChainDesc::new(64, 64))
        .unwrap();
    let acquired = device.create_semaphore().unwrap();
    let rendered = device.create_semaphore().unwrap();
    swap_chain.acquire_next_image(Some(&acquired)).unwrap();
    let image = swap_chain.current_texture();
    assert_eq!(image.current_usage(), ResourceUsage::UNDEFINED);

    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    list.pipeline_barrier(
        &PipelineBarrierDesc::new().texture(TextureBarrier::new(image, ResourceUsage::RENDER_TARGET)),
    );
    list.pipeline_barrier(&PipelineBarrierDesc::new().texture(TextureBarrier::new(image, ResourceUsage::PRESENT)));
    list.end();
    assert_eq!(image.current_usage(), ResourceUsage::PRESENT);

    let queue = device.queue(QueueType::Graphics);
    queue
        .submit(&SubmitDesc::new().command_list(&list).wait(&acquired).signal(&rendered))
        .unwrap();
    swap_chain.present(queue, &[&rendered]).unwrap();
    list
}

#[cfg(feature = "backend_vulkan")]
mod vulkan {
    use super::*;
    use ash::vk;
    use rhi::config::RhiConfig;
    use rhi::vulkan::{Command, Device, NullDriver};
    use std::sync::Arc;

    #[test]
    fn cbv_and_srv_use_shifted_bindings_per_set() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default());
        let bound = cbv_and_srv(&device);

        let set0 = bound.root.set_layout(0).unwrap();
        assert_eq!(set0.set, 0);
        assert_eq!(set0.bindings[0].binding, 0);
        assert_eq!(set0.bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        let set1 = bound.root.set_layout(1).unwrap();
        assert_eq!(set1.set, 1);
        assert_eq!(set1.bindings[0].binding, 1000);

        let writes: Vec<(u32, u32)> = driver
            .descriptor_updates()
            .into_iter()
            .flatten()
            .map(|w| (w.dst_binding, w.dst_array_element))
            .collect();
        assert_eq!(writes, vec![(0, 0), (1000, 0)]);

        let mut bound_sets: Vec<(u32, Vec<vk::DescriptorSet>)> = bound
            .list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindDescriptorSets { first_set, sets, .. } => Some((*first_set, sets.clone())),
                _ => None,
            })
            .collect();
        bound_sets.sort_by_key(|(first, _)| *first);
        let expected: Vec<vk::DescriptorSet> = bound_sets.iter().flat_map(|(_, sets)| sets.clone()).collect();
        assert_eq!(
            expected,
            vec![
                bound.groups[0].descriptor_set().unwrap(),
                bound.groups[1].descriptor_set().unwrap()
            ]
        );
        assert_eq!(bound.groups[0].bound_resource(ResourceType::ConstantBuffer, 0, 0), Some(rhi::GpuBuffer::id(&bound.constants)));
        assert_eq!(bound.groups[1].bound_resource(ResourceType::ShaderResource, 0, 0), Some(bound.image.id()));
    }

    #[test]
    fn draw_while_compute_is_active_is_fatal() {
        let device = Device::null(RhiConfig::default());
        let (list, panicked) = draw_during_compute(&device);
        assert!(panicked);
        assert!(!list.commands().iter().any(|c| matches!(c, Command::Draw { .. })));
        assert_eq!(list.active_encoder(), EncoderKind::Compute);
    }

    #[test]
    fn graphics_during_compute_inside_a_scope_is_fatal() {
        let device = Device::null(RhiConfig::default());
        let outcome = draw_during_compute_in_scope(&device);
        assert!(outcome.draw_panicked);
        assert!(outcome.bind_panicked);
        let commands = outcome.list.commands();
        assert_eq!(commands.iter().filter(|c| matches!(c, Command::Draw { .. })).count(), 1);
        assert!(!commands.iter().any(|c| matches!(c, Command::BindVertexBuffers { .. })));
        let ops: Vec<vk::AttachmentLoadOp> = commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginRendering(info) => Some(info.color_attachments[0].load_op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![vk::AttachmentLoadOp::CLEAR, vk::AttachmentLoadOp::LOAD]);
        let dispatch = commands.iter().position(|c| matches!(c, Command::Dispatch { .. })).unwrap();
        let draw = commands.iter().position(|c| matches!(c, Command::Draw { .. })).unwrap();
        assert!(dispatch < draw);
    }

    #[test]
    fn swap_chain_image_reaches_present_in_two_barriers() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default());
        let list = present_cycle(&device);
        let layouts: Vec<(vk::ImageLayout, vk::ImageLayout)> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::PipelineBarrier(b) => Some(b),
                _ => None,
            })
            .flat_map(|b| b.image_memory_barriers.iter().map(|i| (i.old_layout, i.new_layout)))
            .collect();
        assert_eq!(
            layouts,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR),
            ]
        );
        assert!(driver
            .calls()
            .iter()
            .any(|c| matches!(c, rhi::vulkan::DriverCall::QueuePresent { wait, .. } if wait.len() == 1)));
    }
}

#[cfg(feature = "backend_dx12")]
mod dx12 {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::dx12::{
        resource_states, Command, DescriptorRange, DescriptorRangeType, Device, ResourceBarrier, ResourceStates,
        RootParameter,
    };

    #[test]
    fn cbv_and_srv_use_root_parameters_and_table_offsets() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let bound = cbv_and_srv(&device);

        let space0 = bound.root.space(0).unwrap();
        let cbv_index = space0.inline_cbv.unwrap();
        assert!(matches!(
            bound.root.parameters()[cbv_index as usize],
            RootParameter::Cbv {
                shader_register: 0,
                register_space: 0,
                ..
            }
        ));
        let space1 = bound.root.space(1).unwrap();
        let table_index = space1.resource_table.unwrap();
        assert_eq!(space1.offsets.get(&(ResourceType::ShaderResource, 0)), Some(&0));
        match &bound.root.parameters()[table_index as usize] {
            RootParameter::DescriptorTable { ranges, .. } => assert_eq!(
                ranges.as_slice(),
                &[DescriptorRange {
                    range_type: DescriptorRangeType::Srv,
                    num_descriptors: 1,
                    base_shader_register: 0,
                    register_space: 1,
                    offset_in_descriptors_from_table_start: 0,
                }]
            ),
            other => panic!("space 1 should be a descriptor table, got {other:?}"),
        }

        assert_eq!(bound.groups[0].root_cbv_address(), Some(bound.constants.gpu_address()));
        let commands = bound.list.commands();
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::SetRootConstantBufferView { index, address, .. }
                if *index == cbv_index && *address == bound.constants.gpu_address()
        )));
        let table = bound.groups[1].resource_table().unwrap();
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::SetRootDescriptorTable { index, base, .. } if *index == table_index && *base == table
        )));
        assert_eq!(bound.groups[1].bound_resource(ResourceType::ShaderResource, 0, 0), Some(bound.image.id()));
    }

    #[test]
    fn draw_while_compute_is_active_is_fatal() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let (list, panicked) = draw_during_compute(&device);
        assert!(panicked);
        assert!(!list.commands().iter().any(|c| matches!(c, Command::DrawInstanced { .. })));
    }

    #[test]
    fn graphics_during_compute_inside_a_scope_is_fatal() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let outcome = draw_during_compute_in_scope(&device);
        assert!(outcome.draw_panicked);
        assert!(outcome.bind_panicked);
        let commands = outcome.list.commands();
        assert_eq!(commands.iter().filter(|c| matches!(c, Command::DrawInstanced { .. })).count(), 1);
        assert_eq!(commands.iter().filter(|c| matches!(c, Command::BeginRenderPass { .. })).count(), 2);
    }

    #[test]
    fn swap_chain_image_reaches_present_in_two_barriers() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let list = present_cycle(&device);
        let transitions: Vec<(ResourceStates, ResourceStates)> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::ResourceBarrier(batch) => Some(batch.clone()),
                _ => None,
            })
            .flatten()
            .map(|b| match b {
                ResourceBarrier::Transition { before, after, .. } => (before, after),
                ResourceBarrier::Uav { .. } => panic!("unexpected UAV barrier"),
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (ResourceStates::COMMON, resource_states(ResourceUsage::RENDER_TARGET)),
                (resource_states(ResourceUsage::RENDER_TARGET), ResourceStates::PRESENT),
            ]
        );
    }
}

#[cfg(feature = "backend_metal")]
mod metal {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::metal::{Command, Device, FunctionStage, LoadAction, NullDriver, Transition};
    use std::sync::Arc;

    #[test]
    fn cbv_and_srv_use_one_argument_buffer_per_space() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default()).unwrap();
        let bound = cbv_and_srv(&device);

        let space0 = bound.root.argument_buffer(0).unwrap();
        assert_eq!(space0.buffer_index, 16);
        assert_eq!(space0.argument(ResourceType::ConstantBuffer, 0).unwrap().descriptor.index, 0);
        let space1 = bound.root.argument_buffer(1).unwrap();
        assert_eq!(space1.buffer_index, 17);
        assert_eq!(space1.argument(ResourceType::ShaderResource, 0).unwrap().descriptor.index, 0);

        let ids: Vec<u32> = driver.argument_encodes().into_iter().flatten().map(|w| w.id).collect();
        assert_eq!(ids, vec![0, 0]);

        for (group, index) in bound.groups.iter().zip([16u32, 17]) {
            let (buffer, offset) = group.argument_buffer().unwrap();
            assert!(bound.list.commands().iter().any(|c| *c
                == Command::SetBuffer {
                    stage: FunctionStage::Compute,
                    index,
                    buffer,
                    offset,
                }));
        }
        assert_eq!(bound.groups[0].bound_resource(ResourceType::ConstantBuffer, 0, 0), Some(rhi::GpuBuffer::id(&bound.constants)));
        assert_eq!(bound.groups[1].bound_resource(ResourceType::ShaderResource, 0, 0), Some(bound.image.id()));
    }

    #[test]
    fn draw_while_compute_is_active_is_fatal() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let (list, panicked) = draw_during_compute(&device);
        assert!(panicked);
        assert!(!list.commands().iter().any(|c| matches!(c, Command::DrawPrimitives { .. })));
        assert_eq!(list.encoders_created(), 1);
    }

    #[test]
    fn graphics_during_compute_inside_a_scope_is_fatal() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let outcome = draw_during_compute_in_scope(&device);
        assert!(outcome.draw_panicked);
        assert!(outcome.bind_panicked);
        let commands = outcome.list.commands();
        assert_eq!(commands.iter().filter(|c| matches!(c, Command::DrawPrimitives { .. })).count(), 1);
        let loads: Vec<LoadAction> = commands
            .iter()
            .filter_map(|c| match c {
                Command::RenderCommandEncoder(desc) => Some(desc.color_attachments[0].load_action),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec![LoadAction::Clear, LoadAction::Load]);
        // render, compute, render
        assert_eq!(outcome.list.encoders_created(), 3);
    }

    #[test]
    fn swap_chain_image_reaches_present_in_two_barriers() {
        let device = Device::null(RhiConfig::default()).unwrap();
        let list = present_cycle(&device);
        let pairs: Vec<(ResourceUsage, ResourceUsage)> =
            list.transitions().iter().map(|t: &Transition| (t.before, t.after)).collect();
        assert_eq!(
            pairs,
            vec![
                (ResourceUsage::UNDEFINED, ResourceUsage::RENDER_TARGET),
                (ResourceUsage::RENDER_TARGET, ResourceUsage::PRESENT),
            ]
        );
    }
}
