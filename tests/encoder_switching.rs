// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The encoder state machine as seen through each backend's command list.
#![cfg(any(feature = "backend_vulkan", feature = "backend_dx12", feature = "backend_metal"))]

use rhi::bindings::root_signature_desc::RootSignatureDesc;
use rhi::bindings::usage::QueueType;
use rhi::commands::{ColorAttachment, RenderingDesc, ScissorRect};
use rhi::encoder::EncoderKind;
use rhi::pipeline::{ComputePipelineDesc, ShaderBlob};
use rhi::resources::{BufferDesc, BufferUsage, Format, TextureDesc, TextureUsage};
use rhi::{Backend, CommandList, Device};

type List<D> = <<D as Device>::Backend as Backend>::CommandList;

fn target<D: Device>(device: &D) -> <D::Backend as Backend>::Texture {
    device
        .create_texture(&TextureDesc::new_2d(
            "target",
            8,
            8,
            Format::Rgba8Unorm,
            TextureUsage::RENDER_TARGET,
        ))
        .unwrap()
}

/// Switches to the render encoder twice inside one scope.
fn repeated_render_switch<D: Device>(device: &D) -> List<D> {
    let texture = target(device);
    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::clear(&texture, [0.0; 4])));
    list.switch_encoder(EncoderKind::Render);
    list.switch_encoder(EncoderKind::Render);
    assert_eq!(list.active_encoder(), EncoderKind::Render);
    list.end_rendering();
    assert_eq!(list.active_encoder(), EncoderKind::None);
    list.end();
    list
}

/// Render, then a copy, then render again within the same scope.
fn interrupted_scope<D: Device>(device: &D) -> List<D> {
    let texture = target(device);
    let src = device
        .create_buffer(&BufferDesc::new("src", 64, BufferUsage::COPY_SRC))
        .unwrap();
    let dst = device
        .create_buffer(&BufferDesc::new("dst", 64, BufferUsage::COPY_DST))
        .unwrap();
    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::clear(&texture, [0.0; 4])));
    list.copy_buffer_region(&dst, 0, &src, 0, 64).unwrap();
    assert_eq!(list.active_encoder(), EncoderKind::Blit);
    list.switch_encoder(EncoderKind::Render);
    list.end_rendering();
    list.end();
    list
}

/// Dispatch, copy, dispatch with one compute pipeline bound once.
fn dispatch_around_copy<D: Device>(device: &D) -> List<D> {
    let root = device.create_root_signature(&RootSignatureDesc::new()).unwrap();
    let pipeline = device
        .create_compute_pipeline(&root, &ComputePipelineDesc::new("cs", ShaderBlob::new(vec![0u8; 4], "main")))
        .unwrap();
    let src = device
        .create_buffer(&BufferDesc::new("src", 64, BufferUsage::COPY_SRC))
        .unwrap();
    let dst = device
        .create_buffer(&BufferDesc::new("dst", 64, BufferUsage::COPY_DST))
        .unwrap();
    let mut list = device.create_command_list(QueueType::Compute).unwrap();
    list.begin();
    list.bind_pipeline(&pipeline);
    list.dispatch(1, 1, 1);
    list.switch_encoder(EncoderKind::Compute);
    assert_eq!(list.active_encoder(), EncoderKind::Compute);
    list.copy_buffer_region(&dst, 0, &src, 0, 64).unwrap();
    list.dispatch(2, 1, 1);
    list.end();
    list
}

fn copy_out_of_range_is_rejected<D: Device>(device: &D) {
    let src = device
        .create_buffer(&BufferDesc::new("src", 64, BufferUsage::COPY_SRC))
        .unwrap();
    let dst = device
        .create_buffer(&BufferDesc::new("dst", 32, BufferUsage::COPY_DST))
        .unwrap();
    let mut list = device.create_command_list(QueueType::Copy).unwrap();
    list.begin();
    assert!(list.copy_buffer_region(&dst, 0, &src, 0, 64).is_err());
    assert_eq!(list.active_encoder(), EncoderKind::None);
    list.end();
}

#[cfg(feature = "backend_vulkan")]
mod vulkan {
    use super::*;
    use ash::vk;
    use rhi::config::RhiConfig;
    use rhi::vulkan::{Command, Device};

    fn device() -> Device {
        Device::null(RhiConfig::default())
    }

    #[test]
    fn switching_to_the_active_encoder_creates_nothing() {
        let list = repeated_render_switch(&device());
        assert_eq!(list.encoders_created(), 1);
        let begins = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginRendering(_)))
            .count();
        assert_eq!(begins, 1);
    }

    #[test]
    fn copy_inside_a_scope_suspends_rendering() {
        let list = interrupted_scope(&device());
        assert_eq!(list.encoders_created(), 3);
        let ops: Vec<vk::AttachmentLoadOp> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BeginRendering(info) => Some(info.color_attachments[0].load_op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![vk::AttachmentLoadOp::CLEAR, vk::AttachmentLoadOp::LOAD]);
        let copy = list
            .commands()
            .iter()
            .position(|c| matches!(c, Command::CopyBuffer { .. }))
            .unwrap();
        assert_eq!(list.commands()[copy - 1], Command::EndRendering);
    }

    #[test]
    fn bindings_survive_encoder_changes() {
        let list = dispatch_around_copy(&device());
        let binds = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BindPipeline { .. }))
            .count();
        assert_eq!(binds, 1);
        let dispatches = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::Dispatch { .. }))
            .count();
        assert_eq!(dispatches, 2);
    }

    #[test]
    fn copy_out_of_range_is_rejected() {
        super::copy_out_of_range_is_rejected(&device());
    }
}

#[cfg(feature = "backend_dx12")]
mod dx12 {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::dx12::{Command, Device};

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    #[test]
    fn switching_to_the_active_encoder_creates_nothing() {
        let list = repeated_render_switch(&device());
        assert_eq!(list.encoders_created(), 1);
        let passes = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginRenderPass { .. }))
            .count();
        assert_eq!(passes, 1);
    }

    #[test]
    fn copy_inside_a_scope_suspends_rendering() {
        let list = interrupted_scope(&device());
        assert_eq!(list.encoders_created(), 3);
        let passes = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BeginRenderPass { .. }))
            .count();
        assert_eq!(passes, 2);
    }

    #[test]
    fn bindings_survive_encoder_changes() {
        let list = dispatch_around_copy(&device());
        let sets = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::SetPipelineState(_)))
            .count();
        assert_eq!(sets, 1);
    }

    #[test]
    fn copy_out_of_range_is_rejected() {
        super::copy_out_of_range_is_rejected(&device());
    }
}

#[cfg(feature = "backend_metal")]
mod metal {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::metal::{Command, Device, LoadAction};

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    fn count(list: &rhi::metal::CommandList, f: impl Fn(&Command) -> bool) -> usize {
        list.commands().iter().filter(|c| f(c)).count()
    }

    #[test]
    fn switching_to_the_active_encoder_creates_nothing() {
        let list = repeated_render_switch(&device());
        assert_eq!(list.encoders_created(), 1);
        assert_eq!(count(&list, |c| matches!(c, Command::RenderCommandEncoder(_))), 1);
        assert_eq!(count(&list, |c| matches!(c, Command::EndEncoding)), 1);
    }

    #[test]
    fn copy_inside_a_scope_suspends_rendering() {
        let list = interrupted_scope(&device());
        assert_eq!(list.encoders_created(), 3);
        let loads: Vec<LoadAction> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::RenderCommandEncoder(desc) => Some(desc.color_attachments[0].load_action),
                _ => None,
            })
            .collect();
        assert_eq!(loads, vec![LoadAction::Clear, LoadAction::Load]);
        assert_eq!(count(&list, |c| matches!(c, Command::BlitCommandEncoder)), 1);
    }

    #[test]
    fn new_encoders_rebind_the_pipeline() {
        let list = dispatch_around_copy(&device());
        assert_eq!(list.encoders_created(), 3);
        assert_eq!(count(&list, |c| matches!(c, Command::ComputeCommandEncoder)), 2);
        assert_eq!(count(&list, |c| matches!(c, Command::SetComputePipelineState(_))), 2);
    }

    #[test]
    fn copy_out_of_range_is_rejected() {
        super::copy_out_of_range_is_rejected(&device());
    }
}
