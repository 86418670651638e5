// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
D3D12 command recording.

The render encoder maps onto a render pass (`BeginRenderPass`/`EndRenderPass`); the other
encoders have no native object.  Root arguments belong to a bind point and survive pipeline
changes as long as the root signature stays the same, so the binding cache only re-issues them
after `SetRootSignature` or a new group.
*/

use super::Dx12;
use super::barrier::BarrierTranslator;
use super::bind_group::{BindGroup, GroupBinding};
use super::native::{
    BeginningAccess, BindPoint, Command, EndingAccess, HeapHandle, IndexBufferView, IndirectKind,
    PipelineStateHandle, RenderPassTarget, ResourceStates, RootSignatureHandle, TextureCopyLocation,
    VertexBufferView, TEXTURE_DATA_PITCH_ALIGNMENT, TEXTURE_DATA_PLACEMENT_ALIGNMENT,
};
use super::resources::{Buffer, Pipeline, Texture};
use crate::backend::{GpuBuffer, GpuTexture};
use crate::bindings::bind_group::BindGroup as _;
use crate::bindings::usage::QueueType;
use crate::commands::{
    self, resolve_footprint, validate_buffer_copy, validate_texture_location, BufferTextureCopy, IndexFormat,
    LoadOp, PipelineBarrierDesc, RenderingDesc, ScissorRect, StoreOp, TextureCopy, TextureLocation, Viewport,
};
use crate::encoder::{BindingCache, EncoderKind, EncoderState};
use crate::error::{fatal, reject, Error};
use crate::pipeline::{PipelineKind, PrimitiveTopology};

/// Bytes of one `D3D12_DISPATCH_ARGUMENTS`.
const DISPATCH_ARGUMENTS_SIZE: u32 = 12;

/// What the binding cache keeps of a bound pipeline.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PipelineBinding {
    handle: PipelineStateHandle,
    root_signature: RootSignatureHandle,
    topology: Option<PrimitiveTopology>,
}

/// A buffer as the input assembler sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferView {
    address: u64,
    size: u64,
    stride: u32,
}

impl BufferView {
    fn of(buffer: &Buffer) -> Self {
        BufferView {
            address: buffer.gpu_address(),
            size: buffer.desc().size,
            stride: buffer.desc().stride,
        }
    }
}

#[derive(Debug)]
struct RenderScope {
    render_targets: Vec<RenderPassTarget>,
    depth_stencil: Option<RenderPassTarget>,
    resumed: bool,
}

#[derive(Debug)]
pub struct CommandList {
    queue: QueueType,
    heaps: Vec<HeapHandle>,
    heaps_set: bool,
    root_signatures: [Option<RootSignatureHandle>; 2],
    commands: Vec<Command>,
    encoder: EncoderState,
    cache: BindingCache<PipelineBinding, GroupBinding, BufferView>,
    scope: Option<RenderScope>,
    recording: bool,
}

fn beginning_access(load: LoadOp, clear: BeginningAccess) -> BeginningAccess {
    match load {
        LoadOp::Load => BeginningAccess::Preserve,
        LoadOp::Clear => clear,
        LoadOp::DontCare => BeginningAccess::Discard,
    }
}

fn ending_access(store: StoreOp) -> EndingAccess {
    match store {
        StoreOp::Store => EndingAccess::Preserve,
        StoreOp::DontCare => EndingAccess::Discard,
    }
}

fn bind_point(kind: PipelineKind) -> BindPoint {
    match kind {
        PipelineKind::Graphics => BindPoint::Graphics,
        PipelineKind::Compute => BindPoint::Compute,
    }
}

fn subresource(location: &TextureLocation<'_, Dx12>) -> TextureCopyLocation {
    TextureCopyLocation::Subresource {
        resource: location.texture.resource(),
        index: location.texture.subresource_index(location.mip, location.layer),
    }
}

fn copy_box(origin: [u32; 3], extent: [u32; 3]) -> [u32; 6] {
    [
        origin[0],
        origin[1],
        origin[2],
        origin[0] + extent[0],
        origin[1] + extent[1],
        origin[2] + extent[2],
    ]
}

impl CommandList {
    pub(crate) fn new(queue: QueueType, heaps: Vec<HeapHandle>) -> Self {
        CommandList {
            queue,
            heaps,
            heaps_set: false,
            root_signatures: [None, None],
            commands: Vec::new(),
            encoder: EncoderState::default(),
            cache: BindingCache::default(),
            scope: None,
            recording: false,
        }
    }

    /// Everything recorded since the last `begin`.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Encoders begun since the last `begin`.
    pub fn encoders_created(&self) -> u32 {
        self.encoder.created()
    }

    fn require_recording(&self, op: &str) {
        if !self.recording {
            fatal!("{op} on a command list that is not recording");
        }
    }

    fn require_queue(&self, op: &str, allowed: &[QueueType]) {
        if !allowed.contains(&self.queue) {
            fatal!("{op} cannot be recorded on the {:?} queue", self.queue);
        }
    }

    fn require_scope(&self, op: &str) {
        if self.scope.is_none() {
            fatal!(
                "{op} needs an open begin_rendering scope, active encoder is {:?}",
                self.encoder.active()
            );
        }
    }

    /// Graphics state and draws: an open scope, and no non-render encoder in the way.
    fn require_render(&self, op: &str) {
        self.require_scope(op);
        self.encoder.require_graphics(op);
    }

    fn switch(&mut self, to: EncoderKind) {
        let Some(switch) = self.encoder.switch_to(to) else {
            return;
        };
        if switch.from == EncoderKind::Render {
            self.commands.push(Command::EndRenderPass);
            if let Some(scope) = &mut self.scope {
                scope.resumed = true;
            }
        }
        if switch.to == EncoderKind::Render {
            let Some(scope) = &self.scope else {
                fatal!("render encoder requested outside a begin_rendering scope");
            };
            let mut render_targets = scope.render_targets.clone();
            let mut depth_stencil = scope.depth_stencil;
            if scope.resumed {
                for target in render_targets.iter_mut().chain(depth_stencil.iter_mut()) {
                    target.beginning = BeginningAccess::Preserve;
                }
            }
            self.commands.push(Command::BeginRenderPass {
                render_targets,
                depth_stencil,
            });
        }
        self.cache.on_encoder_begin(to, false);
    }

    fn flush(&mut self, kind: PipelineKind) {
        let bind_point = bind_point(kind);
        if !self.heaps_set {
            self.commands.push(Command::SetDescriptorHeaps(self.heaps.clone()));
            self.heaps_set = true;
        }
        if let Some(pipeline) = self.cache.take_pipeline(kind) {
            let current = &mut self.root_signatures[kind.index()];
            if *current != Some(pipeline.root_signature) {
                *current = Some(pipeline.root_signature);
                self.commands.push(Command::SetRootSignature {
                    bind_point,
                    root_signature: pipeline.root_signature,
                });
            }
            self.commands.push(Command::SetPipelineState(pipeline.handle));
            if let Some(topology) = pipeline.topology {
                self.commands.push(Command::IaSetPrimitiveTopology(topology));
            }
        }
        for (_, group) in self.cache.take_groups(kind) {
            for (index, values) in group.root_constants {
                self.commands.push(Command::SetRoot32BitConstants {
                    bind_point,
                    index,
                    values,
                    dest_offset: 0,
                });
            }
            for (index, base) in group.tables {
                self.commands
                    .push(Command::SetRootDescriptorTable { bind_point, index, base });
            }
            if let Some((index, address)) = group.root_cbv {
                self.commands.push(Command::SetRootConstantBufferView {
                    bind_point,
                    index,
                    address,
                });
            }
        }
        if kind != PipelineKind::Graphics {
            return;
        }
        if let Some(state) = self.cache.take_render_state() {
            if let Some(viewport) = state.viewport {
                self.commands.push(Command::RsSetViewports(vec![viewport]));
            }
            if let Some(scissor) = state.scissor {
                self.commands.push(Command::RsSetScissorRects(vec![scissor]));
            }
            for (slot, (view, offset)) in state.vertex_buffers {
                self.commands.push(Command::IaSetVertexBuffers {
                    start_slot: slot,
                    views: vec![VertexBufferView {
                        buffer_location: view.address + offset,
                        size_in_bytes: view.size.saturating_sub(offset) as u32,
                        stride_in_bytes: view.stride,
                    }],
                });
            }
            if let Some((view, offset, format)) = state.index_buffer {
                self.commands.push(Command::IaSetIndexBuffer(IndexBufferView {
                    buffer_location: view.address + offset,
                    size_in_bytes: view.size.saturating_sub(offset) as u32,
                    format,
                }));
            }
        }
    }

    fn prepare_draw(&mut self, op: &str, indexed: bool) {
        self.require_recording(op);
        self.require_queue(op, &[QueueType::Graphics]);
        self.require_render(op);
        if self.cache.pipeline(PipelineKind::Graphics).is_none() {
            fatal!("{op} without a bound graphics pipeline");
        }
        if indexed && self.cache.index_buffer().is_none() {
            fatal!("{op} without a bound index buffer");
        }
        self.switch(EncoderKind::Render);
        self.flush(PipelineKind::Graphics);
    }

    fn prepare_dispatch(&mut self, op: &str) {
        self.require_recording(op);
        self.require_queue(op, &[QueueType::Graphics, QueueType::Compute]);
        if self.cache.pipeline(PipelineKind::Compute).is_none() {
            fatal!("{op} without a bound compute pipeline");
        }
        self.switch(EncoderKind::Compute);
        self.flush(PipelineKind::Compute);
    }

    fn indirect(&mut self, kind: IndirectKind, buffer: &Buffer, offset: u64, max_count: u32, stride: u32) {
        self.commands.push(Command::ExecuteIndirect {
            kind,
            max_count,
            stride,
            argument_buffer: buffer.resource(),
            argument_offset: offset,
        });
    }

    fn placed_footprint(&self, copy: &BufferTextureCopy<'_, Dx12>) -> Result<TextureCopyLocation, Error> {
        let footprint = resolve_footprint(copy, TEXTURE_DATA_PITCH_ALIGNMENT, TEXTURE_DATA_PLACEMENT_ALIGNMENT)
            .map_err(reject)?;
        let [width, height, depth] = copy.extent;
        Ok(TextureCopyLocation::PlacedFootprint {
            resource: copy.buffer.resource(),
            offset: copy.buffer_offset,
            format: copy.texture.texture.desc().format,
            width,
            height,
            depth,
            row_pitch: footprint.row_pitch,
        })
    }
}

fn render_target(texture: &Texture, beginning: BeginningAccess, ending: EndingAccess) -> RenderPassTarget {
    let Some(descriptor) = texture.rtv() else {
        fatal!(
            "color attachment '{}' was not created with RENDER_TARGET usage",
            texture.desc().debug_name
        );
    };
    if !texture.current_state().contains(ResourceStates::RENDER_TARGET) {
        logwise::warn_sync!(
            "color attachment {name} is in {state}, not RENDER_TARGET",
            name = logwise::privacy::LogIt(&texture.desc().debug_name),
            state = logwise::privacy::LogIt(&texture.current_state())
        );
    }
    RenderPassTarget {
        resource: texture.id(),
        descriptor,
        beginning,
        ending,
    }
}

fn depth_target(texture: &Texture, beginning: BeginningAccess, ending: EndingAccess) -> RenderPassTarget {
    let Some(descriptor) = texture.dsv() else {
        fatal!(
            "depth attachment '{}' was not created with DEPTH_STENCIL usage",
            texture.desc().debug_name
        );
    };
    RenderPassTarget {
        resource: texture.id(),
        descriptor,
        beginning,
        ending,
    }
}

impl commands::CommandList for CommandList {
    type Backend = Dx12;

    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn begin(&mut self) {
        if self.recording {
            fatal!("begin on a command list that is already recording");
        }
        self.commands.clear();
        self.encoder.reset();
        self.cache.reset();
        self.heaps_set = false;
        self.root_signatures = [None, None];
        self.scope = None;
        self.recording = true;
    }

    fn end(&mut self) {
        self.require_recording("end");
        if self.scope.is_some() {
            fatal!("end with a begin_rendering scope still open");
        }
        self.switch(EncoderKind::None);
        self.recording = false;
        logwise::trace_sync!(
            "dx12 command list closed with {count} commands",
            count = self.commands.len()
        );
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc<'_, Dx12>) {
        self.require_recording("begin_rendering");
        self.require_queue("begin_rendering", &[QueueType::Graphics]);
        if self.scope.is_some() {
            fatal!("begin_rendering inside an open begin_rendering scope");
        }
        let render_targets = desc
            .colors
            .iter()
            .map(|color| {
                render_target(
                    color.texture,
                    beginning_access(color.load, BeginningAccess::ClearColor(color.clear)),
                    ending_access(color.store),
                )
            })
            .collect();
        let depth_stencil = desc.depth.as_ref().map(|depth| {
            let clear = BeginningAccess::ClearDepthStencil {
                depth: depth.clear_depth,
                stencil: depth.clear_stencil as u8,
            };
            depth_target(depth.texture, beginning_access(depth.load, clear), ending_access(depth.store))
        });
        self.switch(EncoderKind::None);
        self.scope = Some(RenderScope {
            render_targets,
            depth_stencil,
            resumed: false,
        });
        self.switch(EncoderKind::Render);
    }

    fn end_rendering(&mut self) {
        self.require_recording("end_rendering");
        if self.scope.is_none() {
            fatal!("end_rendering without begin_rendering");
        }
        if self.encoder.active() == EncoderKind::Render {
            self.switch(EncoderKind::None);
        }
        self.scope = None;
    }

    fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        self.require_recording("bind_pipeline");
        match pipeline.kind() {
            PipelineKind::Graphics => self.require_queue("bind_pipeline (graphics)", &[QueueType::Graphics]),
            PipelineKind::Compute => {
                self.require_queue("bind_pipeline (compute)", &[QueueType::Graphics, QueueType::Compute])
            }
        }
        self.cache.set_pipeline(
            pipeline.kind(),
            PipelineBinding {
                handle: pipeline.handle(),
                root_signature: pipeline.root_signature().handle(),
                topology: pipeline.topology(),
            },
        );
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: &Buffer, offset: u64) {
        self.require_recording("bind_vertex_buffer");
        self.require_render("bind_vertex_buffer");
        self.cache.set_vertex_buffer(slot, BufferView::of(buffer), offset);
    }

    fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64, format: IndexFormat) {
        self.require_recording("bind_index_buffer");
        self.require_render("bind_index_buffer");
        self.cache.set_index_buffer(BufferView::of(buffer), offset, format);
    }

    fn bind_viewport(&mut self, viewport: Viewport) {
        self.require_recording("bind_viewport");
        self.require_render("bind_viewport");
        self.cache.set_viewport(viewport);
    }

    fn bind_scissor_rect(&mut self, rect: ScissorRect) {
        self.require_recording("bind_scissor_rect");
        self.require_render("bind_scissor_rect");
        self.cache.set_scissor(rect);
    }

    fn bind_resource_group(&mut self, group: &BindGroup) {
        self.require_recording("bind_resource_group");
        self.cache.set_group(group.space(), group.snapshot());
    }

    fn pipeline_barrier(&mut self, desc: &PipelineBarrierDesc<'_, Dx12>) {
        self.require_recording("pipeline_barrier");
        let barriers = BarrierTranslator { queue: self.queue }.translate(desc);
        if barriers.is_empty() {
            return;
        }
        // transitions are not allowed inside a render pass
        if self.encoder.active() == EncoderKind::Render {
            self.switch(EncoderKind::None);
        }
        self.commands.push(Command::ResourceBarrier(barriers));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.prepare_draw("draw", false);
        self.commands.push(Command::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex: first_vertex,
            start_instance: first_instance,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.prepare_draw("draw_indexed", true);
        self.commands.push(Command::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index: first_index,
            base_vertex: vertex_offset,
            start_instance: first_instance,
        });
    }

    fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        self.prepare_draw("draw_indirect", false);
        self.indirect(IndirectKind::Draw, buffer, offset, draw_count, stride);
    }

    fn draw_indexed_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        self.prepare_draw("draw_indexed_indirect", true);
        self.indirect(IndirectKind::DrawIndexed, buffer, offset, draw_count, stride);
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.prepare_dispatch("dispatch");
        self.commands.push(Command::Dispatch { x, y, z });
    }

    fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
        self.prepare_dispatch("dispatch_indirect");
        self.indirect(IndirectKind::Dispatch, buffer, offset, 1, DISPATCH_ARGUMENTS_SIZE);
    }

    fn copy_buffer_region(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<(), Error> {
        self.require_recording("copy_buffer_region");
        validate_buffer_copy::<Dx12>(dst, dst_offset, src, src_offset, size).map_err(reject)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyBufferRegion {
            dst: dst.resource(),
            dst_offset,
            src: src.resource(),
            src_offset,
            num_bytes: size,
        });
        Ok(())
    }

    fn copy_texture_region(&mut self, copy: &TextureCopy<'_, Dx12>) -> Result<(), Error> {
        self.require_recording("copy_texture_region");
        validate_texture_location(&copy.src, copy.extent).map_err(reject)?;
        validate_texture_location(&copy.dst, copy.extent).map_err(reject)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyTextureRegion {
            dst: subresource(&copy.dst),
            dst_origin: copy.dst.origin,
            src: subresource(&copy.src),
            src_box: Some(copy_box(copy.src.origin, copy.extent)),
        });
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy<'_, Dx12>) -> Result<(), Error> {
        self.require_recording("copy_buffer_to_texture");
        let src = self.placed_footprint(copy)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyTextureRegion {
            dst: subresource(&copy.texture),
            dst_origin: copy.texture.origin,
            src,
            src_box: None,
        });
        Ok(())
    }

    fn copy_texture_to_buffer(&mut self, copy: &BufferTextureCopy<'_, Dx12>) -> Result<(), Error> {
        self.require_recording("copy_texture_to_buffer");
        let dst = self.placed_footprint(copy)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyTextureRegion {
            dst,
            dst_origin: [0, 0, 0],
            src: subresource(&copy.texture),
            src_box: Some(copy_box(copy.texture.origin, copy.extent)),
        });
        Ok(())
    }

    fn switch_encoder(&mut self, kind: EncoderKind) {
        self.require_recording("switch_encoder");
        if kind == EncoderKind::Render {
            self.require_scope("switch_encoder(Render)");
        }
        self.switch(kind);
    }

    fn active_encoder(&self) -> EncoderKind {
        self.encoder.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Device as _;
    use crate::bindings::root_signature_desc::RootSignatureDesc;
    use crate::bindings::slot::{ResourceBindingSlot, ResourceType};
    use crate::bindings::usage::ResourceUsage;
    use crate::commands::{ColorAttachment, CommandList as _, TextureBarrier};
    use crate::config::RhiConfig;
    use crate::imp::dx12::Device;
    use crate::pipeline::{ComputePipelineDesc, ShaderBlob};
    use crate::resources::{BufferDesc, BufferUsage, Format, TextureDesc, TextureUsage};

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    fn target(device: &Device) -> Texture {
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

    fn render_pass_beginnings(list: &CommandList) -> Vec<BeginningAccess> {
        list.commands()
            .iter()
            .filter_map(|c| match c {
                Command::BeginRenderPass { render_targets, .. } => Some(render_targets[0].beginning),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn render_pass_resumes_with_preserve() {
        let device = device();
        let texture = target(&device);
        let mut list = device.create_command_list(QueueType::Graphics).unwrap();
        list.begin();
        list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::clear(&texture, [1.0; 4])));
        list.switch_encoder(EncoderKind::Blit);
        list.switch_encoder(EncoderKind::Render);
        list.end_rendering();
        list.end();
        assert_eq!(
            render_pass_beginnings(&list),
            vec![BeginningAccess::ClearColor([1.0; 4]), BeginningAccess::Preserve]
        );
        assert_eq!(list.commands().last(), Some(&Command::EndRenderPass));
        assert_eq!(list.encoders_created(), 3);
    }

    #[test]
    fn transition_inside_render_pass_ends_it() {
        let device = device();
        let texture = target(&device);
        let sampled = device
            .create_texture(&TextureDesc::new_2d(
                "sampled",
                8,
                8,
                Format::Rgba8Unorm,
                TextureUsage::SHADER_RESOURCE,
            ))
            .unwrap();
        let mut list = device.create_command_list(QueueType::Graphics).unwrap();
        list.begin();
        list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::load(&texture)));
        list.pipeline_barrier(
            &PipelineBarrierDesc::new().texture(TextureBarrier::new(&sampled, ResourceUsage::SHADER_RESOURCE)),
        );
        assert_eq!(list.active_encoder(), EncoderKind::None);
        let tail: Vec<&Command> = list.commands().iter().rev().take(2).collect();
        assert!(matches!(tail[0], Command::ResourceBarrier(b) if b.len() == 1));
        assert_eq!(tail[1], &Command::EndRenderPass);
        list.end_rendering();
        list.end();
    }

    #[test]
    fn heaps_and_root_signature_are_set_once() {
        let device = device();
        let root = device
            .create_root_signature(
                &RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::UnorderedAccess, 0, 0)),
            )
            .unwrap();
        let pipeline = device
            .create_compute_pipeline(&root, &ComputePipelineDesc::new("cs", ShaderBlob::new(vec![0u8; 4], "main")))
            .unwrap();
        let mut list = device.create_command_list(QueueType::Compute).unwrap();
        list.begin();
        list.bind_pipeline(&pipeline);
        list.dispatch(1, 1, 1);
        list.bind_pipeline(&pipeline);
        list.dispatch(2, 1, 1);
        list.end();
        let count = |f: fn(&Command) -> bool| list.commands().iter().filter(|c| f(c)).count();
        assert_eq!(count(|c| matches!(c, Command::SetDescriptorHeaps(_))), 1);
        assert_eq!(count(|c| matches!(c, Command::SetRootSignature { .. })), 1);
        assert_eq!(count(|c| matches!(c, Command::SetPipelineState(_))), 2);
        assert_eq!(count(|c| matches!(c, Command::Dispatch { .. })), 2);
    }

    #[test]
    fn buffer_to_texture_copy_uses_a_placed_footprint() {
        let device = device();
        let texture = device
            .create_texture(&TextureDesc::new_2d("dst", 64, 4, Format::Rgba8Unorm, TextureUsage::COPY_DST))
            .unwrap();
        let buffer = device
            .create_buffer(&BufferDesc::new("upload", 2048, BufferUsage::COPY_SRC))
            .unwrap();
        let mut list = device.create_command_list(QueueType::Copy).unwrap();
        list.begin();
        let copy = BufferTextureCopy {
            buffer: &buffer,
            buffer_offset: 0,
            row_pitch: 0,
            texture: TextureLocation::new(&texture),
            extent: [64, 4, 1],
        };
        list.copy_buffer_to_texture(&copy).unwrap();
        let misplaced = BufferTextureCopy { buffer_offset: 256, ..copy };
        assert!(matches!(list.copy_buffer_to_texture(&misplaced), Err(Error::InvalidCopy(_))));
        list.end();
        let copies: Vec<&Command> = list
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::CopyTextureRegion { .. }))
            .collect();
        assert_eq!(copies.len(), 1);
        let Command::CopyTextureRegion { src, dst, .. } = copies[0] else {
            unreachable!()
        };
        assert!(matches!(src, TextureCopyLocation::PlacedFootprint { row_pitch: 256, offset: 0, .. }));
        assert_eq!(
            dst,
            &TextureCopyLocation::Subresource {
                resource: texture.resource(),
                index: 0
            }
        );
    }

    #[test]
    #[should_panic(expected = "cannot be recorded on the Compute queue")]
    fn compute_queue_rejects_rendering() {
        let device = device();
        let texture = target(&device);
        let mut list = device.create_command_list(QueueType::Compute).unwrap();
        list.begin();
        list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::load(&texture)));
    }

    #[test]
    #[should_panic(expected = "draw_indexed_indirect on a command list that is not recording")]
    fn indexed_draw_checks_recording_first() {
        let device = device();
        let args = device
            .create_buffer(&BufferDesc::new("args", 64, BufferUsage::INDIRECT))
            .unwrap();
        let mut list = device.create_command_list(QueueType::Graphics).unwrap();
        list.draw_indexed_indirect(&args, 0, 1, 0);
    }

    #[test]
    #[should_panic(expected = "bind_scissor_rect is graphics-only, active encoder is Compute")]
    fn scissor_during_compute_is_fatal() {
        let device = device();
        let texture = target(&device);
        let mut list = device.create_command_list(QueueType::Graphics).unwrap();
        list.begin();
        list.begin_rendering(&RenderingDesc::new(ScissorRect::new(8, 8)).color(ColorAttachment::clear(&texture, [0.0; 4])));
        list.switch_encoder(EncoderKind::Compute);
        list.bind_scissor_rect(ScissorRect::new(4, 4));
    }
}
