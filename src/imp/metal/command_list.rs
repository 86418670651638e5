// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Metal command recording.

Every encoder kind is a native encoder here, and a fresh encoder has nothing bound, so each begin
invalidates the binding cache and the next draw or dispatch re-issues pipeline, argument buffers,
residency and root constants.

A barrier that the active render or compute encoder can order itself becomes a
`memoryBarrierWithScope:`.  Anything else ends the encoder after an `updateFence:` on the list's
fence; the next encoder starts with the matching `waitForFence:`.
*/

use super::Metal;
use super::barrier::{encoder_absorbs, BarrierTranslator, Transition};
use super::bind_group::{BindGroup, GroupBinding};
use super::driver::Driver;
use super::native::{
    BufferHandle, ColorAttachmentDescriptor, Command, DepthAttachmentDescriptor, FenceHandle, FunctionStage, IndexType,
    LoadAction, PipelineHandle, PrimitiveType, RenderPassDescriptor, RenderStages, ResourceUsageFlags, StoreAction,
};
use super::resources::{Buffer, Pipeline};
use crate::backend::GpuTexture;
use crate::bindings::bind_group::BindGroup as _;
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::commands::{
    self, resolve_footprint, validate_buffer_copy, validate_texture_location, BufferTextureCopy, IndexFormat,
    LoadOp, PipelineBarrierDesc, RenderingDesc, ScissorRect, StoreOp, TextureCopy, Viewport,
};
use crate::config::RhiConfig;
use crate::encoder::{BindingCache, EncoderKind, EncoderState};
use crate::error::{fatal, reject, Error};
use crate::pipeline::PipelineKind;
use std::sync::Arc;

/// Bytes of one `MTLDrawPrimitivesIndirectArguments`.
const DRAW_ARGUMENTS_BYTES: u64 = 16;
/// Bytes of one `MTLDrawIndexedPrimitivesIndirectArguments`.
const DRAW_INDEXED_ARGUMENTS_BYTES: u64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PipelineBinding {
    handle: PipelineHandle,
    primitive: PrimitiveType,
    threads_per_threadgroup: [u32; 3],
    root_constant_bytes: u32,
}

#[derive(Debug)]
struct RenderScope {
    desc: RenderPassDescriptor,
    resumed: bool,
}

#[derive(Debug)]
pub struct CommandList {
    queue: QueueType,
    config: Arc<RhiConfig>,
    fence: FenceHandle,
    commands: Vec<Command>,
    transitions: Vec<Transition>,
    encoder: EncoderState,
    cache: BindingCache<PipelineBinding, GroupBinding, BufferHandle>,
    scope: Option<RenderScope>,
    recording: bool,
    /// The next encoder must wait for `fence`.
    pending_wait: bool,
    /// Index of the most recent `EndEncoding`.
    last_end: Option<usize>,
    /// The combined `setBytes` root-constant block, per bind point.
    root_blocks: [Vec<u8>; 2],
    driver: Arc<dyn Driver>,
}

fn load_action(op: LoadOp) -> LoadAction {
    match op {
        LoadOp::Load => LoadAction::Load,
        LoadOp::Clear => LoadAction::Clear,
        LoadOp::DontCare => LoadAction::DontCare,
    }
}

fn store_action(op: StoreOp) -> StoreAction {
    match op {
        StoreOp::Store => StoreAction::Store,
        StoreOp::DontCare => StoreAction::DontCare,
    }
}

fn index_type(format: IndexFormat) -> (IndexType, u64) {
    match format {
        IndexFormat::U16 => (IndexType::UInt16, 2),
        IndexFormat::U32 => (IndexType::UInt32, 4),
    }
}

fn function_stages(kind: PipelineKind, stages: RenderStages) -> Vec<FunctionStage> {
    match kind {
        PipelineKind::Compute => vec![FunctionStage::Compute],
        PipelineKind::Graphics => {
            let mut out = Vec::with_capacity(2);
            if stages.contains(RenderStages::VERTEX) {
                out.push(FunctionStage::Vertex);
            }
            if stages.contains(RenderStages::FRAGMENT) {
                out.push(FunctionStage::Fragment);
            }
            out
        }
    }
}

impl CommandList {
    pub(crate) fn new(config: Arc<RhiConfig>, queue: QueueType, driver: Arc<dyn Driver>) -> Result<Self, Error> {
        let fence = driver.new_fence()?;
        Ok(CommandList {
            queue,
            config,
            fence,
            commands: Vec::new(),
            transitions: Vec::new(),
            encoder: EncoderState::default(),
            cache: BindingCache::default(),
            scope: None,
            recording: false,
            pending_wait: false,
            last_end: None,
            root_blocks: [Vec::new(), Vec::new()],
            driver,
        })
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Usage changes recorded since the last `begin`.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// The `MTLFence` ordering this list's encoders.
    pub fn fence(&self) -> FenceHandle {
        self.fence
    }

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
        if switch.from != EncoderKind::None {
            self.last_end = Some(self.commands.len());
            self.commands.push(Command::EndEncoding);
            if switch.from == EncoderKind::Render {
                if let Some(scope) = &mut self.scope {
                    scope.resumed = true;
                }
            }
        }
        let begin = match switch.to {
            EncoderKind::None => return,
            EncoderKind::Render => {
                let Some(scope) = &self.scope else {
                    fatal!("render encoder requested outside a begin_rendering scope");
                };
                let mut desc = scope.desc.clone();
                if scope.resumed {
                    for color in &mut desc.color_attachments {
                        color.load_action = LoadAction::Load;
                    }
                    if let Some(depth) = &mut desc.depth_attachment {
                        depth.load_action = LoadAction::Load;
                    }
                }
                Command::RenderCommandEncoder(desc)
            }
            EncoderKind::Compute => Command::ComputeCommandEncoder,
            EncoderKind::Blit => Command::BlitCommandEncoder,
            EncoderKind::AccelerationStructure => Command::AccelerationStructureCommandEncoder,
        };
        self.commands.push(begin);
        if std::mem::take(&mut self.pending_wait) {
            self.commands.push(Command::WaitForFence(self.fence));
        }
        self.cache.on_encoder_begin(to, true);
    }

    fn flush(&mut self, kind: PipelineKind) {
        if let Some(pipeline) = self.cache.take_pipeline(kind) {
            self.commands.push(match kind {
                PipelineKind::Graphics => Command::SetRenderPipelineState(pipeline.handle),
                PipelineKind::Compute => Command::SetComputePipelineState(pipeline.handle),
            });
        }
        let Some(root_constant_bytes) = self.cache.pipeline(kind).map(|p| p.root_constant_bytes) else {
            return;
        };
        let block = kind.index();
        self.root_blocks[block].resize(root_constant_bytes as usize, 0);
        let mut root_dirty = false;
        for (_, group) in self.cache.take_groups(kind) {
            let stages = function_stages(kind, group.stages);
            if let Some((index, buffer, offset)) = group.argument_buffer {
                for &stage in &stages {
                    self.commands.push(Command::SetBuffer {
                        stage,
                        index,
                        buffer,
                        offset,
                    });
                }
            }
            let residency_stages = (kind == PipelineKind::Graphics).then_some(group.stages);
            if !group.read.is_empty() {
                self.commands.push(Command::UseResources {
                    resources: group.read,
                    usage: ResourceUsageFlags::READ,
                    stages: residency_stages,
                });
            }
            if !group.read_write.is_empty() {
                self.commands.push(Command::UseResources {
                    resources: group.read_write,
                    usage: ResourceUsageFlags::READ | ResourceUsageFlags::WRITE,
                    stages: residency_stages,
                });
            }
            for (offset, data) in group.root_constants {
                let root_block = &mut self.root_blocks[block];
                let start = (offset as usize).min(root_block.len());
                let end = (start + data.len()).min(root_block.len());
                root_block[start..end].copy_from_slice(&data[..end - start]);
                root_dirty = true;
            }
            if root_dirty && !self.root_blocks[block].is_empty() {
                let index = self.config.metal.root_constant_buffer_index;
                for &stage in &stages {
                    self.commands.push(Command::SetBytes {
                        stage,
                        index,
                        data: self.root_blocks[block].clone(),
                    });
                }
                root_dirty = false;
            }
        }
        if kind != PipelineKind::Graphics {
            return;
        }
        if let Some(state) = self.cache.take_render_state() {
            if let Some(viewport) = state.viewport {
                self.commands.push(Command::SetViewport(viewport));
            }
            if let Some(scissor) = state.scissor {
                self.commands.push(Command::SetScissorRect(scissor));
            }
            let reserved = self
                .config
                .metal
                .root_constant_buffer_index
                .min(self.config.metal.argument_buffer_base_index);
            for (slot, (buffer, offset)) in state.vertex_buffers {
                if slot >= reserved {
                    fatal!("vertex buffer slot {slot} overlaps the reserved buffer indices starting at {reserved}");
                }
                self.commands.push(Command::SetBuffer {
                    stage: FunctionStage::Vertex,
                    index: slot,
                    buffer,
                    offset,
                });
            }
        }
    }

    fn prepare_draw(&mut self, op: &str, indexed: bool) -> PipelineBinding {
        self.require_recording(op);
        self.require_queue(op, &[QueueType::Graphics]);
        self.require_render(op);
        let Some(pipeline) = self.cache.pipeline(PipelineKind::Graphics).cloned() else {
            fatal!("{op} without a bound graphics pipeline");
        };
        if indexed && self.cache.index_buffer().is_none() {
            fatal!("{op} without a bound index buffer");
        }
        self.switch(EncoderKind::Render);
        self.flush(PipelineKind::Graphics);
        pipeline
    }

    fn prepare_dispatch(&mut self, op: &str) -> PipelineBinding {
        self.require_recording(op);
        self.require_queue(op, &[QueueType::Graphics, QueueType::Compute]);
        let Some(pipeline) = self.cache.pipeline(PipelineKind::Compute).cloned() else {
            fatal!("{op} without a bound compute pipeline");
        };
        self.switch(EncoderKind::Compute);
        self.flush(PipelineKind::Compute);
        pipeline
    }

    fn index_buffer(&self, op: &str) -> (BufferHandle, u64, IndexType, u64) {
        let Some(&(buffer, offset, format)) = self.cache.index_buffer() else {
            fatal!("{op} without a bound index buffer");
        };
        let (ty, size) = index_type(format);
        (buffer, offset, ty, size)
    }

    /// Orders everything before the current position against the next encoder.
    fn fence_encoders(&mut self) {
        if self.encoder.active() != EncoderKind::None {
            self.commands.push(Command::UpdateFence(self.fence));
            self.switch(EncoderKind::None);
            self.pending_wait = true;
        } else if !self.pending_wait {
            if let Some(end) = self.last_end {
                self.commands.insert(end, Command::UpdateFence(self.fence));
                self.last_end = Some(end + 1);
                self.pending_wait = true;
            }
        }
    }

    fn blit_copy(&mut self, footprint_for: &BufferTextureCopy<'_, Metal>) -> Result<(u32, u64), Error> {
        let bytes_per_block = footprint_for.texture.texture.desc().format.bytes_per_block();
        let footprint = resolve_footprint(footprint_for, bytes_per_block, bytes_per_block as u64).map_err(reject)?;
        Ok((footprint.row_pitch, footprint.row_pitch as u64 * footprint.rows as u64))
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        self.driver.release_fence(self.fence);
    }
}

impl commands::CommandList for CommandList {
    type Backend = Metal;

    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn begin(&mut self) {
        if self.recording {
            fatal!("begin on a command list that is already recording");
        }
        self.commands.clear();
        self.transitions.clear();
        self.encoder.reset();
        self.cache.reset();
        self.scope = None;
        self.pending_wait = false;
        self.last_end = None;
        for block in &mut self.root_blocks {
            block.clear();
        }
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
            "metal command list closed with {count} commands in {encoders} encoders",
            count = self.commands.len(),
            encoders = self.encoder.created()
        );
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc<'_, Metal>) {
        self.require_recording("begin_rendering");
        self.require_queue("begin_rendering", &[QueueType::Graphics]);
        if self.scope.is_some() {
            fatal!("begin_rendering inside an open begin_rendering scope");
        }
        let color_attachments = desc
            .colors
            .iter()
            .map(|color| {
                if !color.texture.current_usage().contains(ResourceUsage::RENDER_TARGET) {
                    logwise::warn_sync!(
                        "color attachment {name} is in {usage}, not RENDER_TARGET",
                        name = logwise::privacy::LogIt(&color.texture.desc().debug_name),
                        usage = logwise::privacy::LogIt(&color.texture.current_usage())
                    );
                }
                ColorAttachmentDescriptor {
                    resource: color.texture.id(),
                    texture: color.texture.handle(),
                    load_action: load_action(color.load),
                    store_action: store_action(color.store),
                    clear_color: color.clear,
                }
            })
            .collect();
        let depth_attachment = desc.depth.as_ref().map(|depth| DepthAttachmentDescriptor {
            resource: depth.texture.id(),
            texture: depth.texture.handle(),
            load_action: load_action(depth.load),
            store_action: store_action(depth.store),
            clear_depth: depth.clear_depth,
            clear_stencil: depth.clear_stencil,
            has_stencil: depth.texture.desc().format.has_stencil(),
        });
        self.switch(EncoderKind::None);
        self.scope = Some(RenderScope {
            desc: RenderPassDescriptor {
                render_area: desc.area,
                color_attachments,
                depth_attachment,
            },
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
                primitive: pipeline.primitive(),
                threads_per_threadgroup: pipeline.threads_per_threadgroup(),
                root_constant_bytes: pipeline.root_signature().root_constant_bytes(),
            },
        );
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: &Buffer, offset: u64) {
        self.require_recording("bind_vertex_buffer");
        self.require_render("bind_vertex_buffer");
        self.cache.set_vertex_buffer(slot, buffer.handle(), offset);
    }

    fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64, format: IndexFormat) {
        self.require_recording("bind_index_buffer");
        self.require_render("bind_index_buffer");
        self.cache.set_index_buffer(buffer.handle(), offset, format);
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

    fn pipeline_barrier(&mut self, desc: &PipelineBarrierDesc<'_, Metal>) {
        self.require_recording("pipeline_barrier");
        let translator = BarrierTranslator { queue: self.queue };
        let Some(barrier) = translator.translate(desc) else {
            return;
        };
        let active = self.encoder.active();
        if encoder_absorbs(active, barrier.touched) {
            let render = active == EncoderKind::Render;
            self.commands.push(Command::MemoryBarrier {
                scope: barrier.scope,
                after_stages: render.then_some(barrier.after_stages),
                before_stages: render.then_some(barrier.before_stages),
            });
        } else {
            self.fence_encoders();
        }
        self.transitions.extend(barrier.transitions);
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        let pipeline = self.prepare_draw("draw", false);
        self.commands.push(Command::DrawPrimitives {
            primitive: pipeline.primitive,
            vertex_start: first_vertex,
            vertex_count,
            instance_count,
            base_instance: first_instance,
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
        let pipeline = self.prepare_draw("draw_indexed", true);
        let (index_buffer, offset, index_type, index_size) = self.index_buffer("draw_indexed");
        self.commands.push(Command::DrawIndexedPrimitives {
            primitive: pipeline.primitive,
            index_count,
            index_type,
            index_buffer,
            index_buffer_offset: offset + first_index as u64 * index_size,
            instance_count,
            base_vertex: vertex_offset,
            base_instance: first_instance,
        });
    }

    fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        let pipeline = self.prepare_draw("draw_indirect", false);
        let stride = if stride == 0 { DRAW_ARGUMENTS_BYTES } else { stride as u64 };
        for i in 0..draw_count as u64 {
            self.commands.push(Command::DrawPrimitivesIndirect {
                primitive: pipeline.primitive,
                indirect_buffer: buffer.handle(),
                indirect_buffer_offset: offset + i * stride,
            });
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        let pipeline = self.prepare_draw("draw_indexed_indirect", true);
        let (index_buffer, index_offset, index_type, _) = self.index_buffer("draw_indexed_indirect");
        let stride = if stride == 0 {
            DRAW_INDEXED_ARGUMENTS_BYTES
        } else {
            stride as u64
        };
        for i in 0..draw_count as u64 {
            self.commands.push(Command::DrawIndexedPrimitivesIndirect {
                primitive: pipeline.primitive,
                index_type,
                index_buffer,
                index_buffer_offset: index_offset,
                indirect_buffer: buffer.handle(),
                indirect_buffer_offset: offset + i * stride,
            });
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        let pipeline = self.prepare_dispatch("dispatch");
        self.commands.push(Command::DispatchThreadgroups {
            threadgroups: [x, y, z],
            threads_per_threadgroup: pipeline.threads_per_threadgroup,
        });
    }

    fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
        let pipeline = self.prepare_dispatch("dispatch_indirect");
        self.commands.push(Command::DispatchThreadgroupsIndirect {
            indirect_buffer: buffer.handle(),
            indirect_buffer_offset: offset,
            threads_per_threadgroup: pipeline.threads_per_threadgroup,
        });
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
        validate_buffer_copy::<Metal>(dst, dst_offset, src, src_offset, size).map_err(reject)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyBufferToBuffer {
            source: src.handle(),
            source_offset: src_offset,
            destination: dst.handle(),
            destination_offset: dst_offset,
            size,
        });
        Ok(())
    }

    fn copy_texture_region(&mut self, copy: &TextureCopy<'_, Metal>) -> Result<(), Error> {
        self.require_recording("copy_texture_region");
        validate_texture_location(&copy.src, copy.extent).map_err(reject)?;
        validate_texture_location(&copy.dst, copy.extent).map_err(reject)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyTextureToTexture {
            source: copy.src.texture.handle(),
            source_slice: copy.src.layer,
            source_level: copy.src.mip,
            source_origin: copy.src.origin,
            source_size: copy.extent,
            destination: copy.dst.texture.handle(),
            destination_slice: copy.dst.layer,
            destination_level: copy.dst.mip,
            destination_origin: copy.dst.origin,
        });
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy<'_, Metal>) -> Result<(), Error> {
        self.require_recording("copy_buffer_to_texture");
        let (bytes_per_row, bytes_per_image) = self.blit_copy(copy)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyBufferToTexture {
            source: copy.buffer.handle(),
            source_offset: copy.buffer_offset,
            source_bytes_per_row: bytes_per_row,
            source_bytes_per_image: bytes_per_image,
            source_size: copy.extent,
            destination: copy.texture.texture.handle(),
            destination_slice: copy.texture.layer,
            destination_level: copy.texture.mip,
            destination_origin: copy.texture.origin,
        });
        Ok(())
    }

    fn copy_texture_to_buffer(&mut self, copy: &BufferTextureCopy<'_, Metal>) -> Result<(), Error> {
        self.require_recording("copy_texture_to_buffer");
        let (bytes_per_row, bytes_per_image) = self.blit_copy(copy)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyTextureToBuffer {
            source: copy.texture.texture.handle(),
            source_slice: copy.texture.layer,
            source_level: copy.texture.mip,
            source_origin: copy.texture.origin,
            source_size: copy.extent,
            destination: copy.buffer.handle(),
            destination_offset: copy.buffer_offset,
            destination_bytes_per_row: bytes_per_row,
            destination_bytes_per_image: bytes_per_image,
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
