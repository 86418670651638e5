// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Vulkan command recording.

Commands are recorded into a [`Command`] stream that is handed to the driver at submission.
The render encoder is the only one with a native counterpart (a dynamic-rendering instance);
compute, blit and acceleration-structure encoders are bookkeeping only, so switching between them
records nothing.
*/

use super::Vulkan;
use super::barrier::BarrierTranslator;
use super::bind_group::{BindGroup, GroupBinding};
use super::native::{
    BufferCopy, BufferImageCopy, ClearValue, Command, ImageCopy, ImageSubresourceLayers, RenderingAttachment,
    RenderingInfo,
};
use super::resources::{Buffer, Pipeline, Texture};
use crate::backend::{GpuBuffer, GpuTexture};
use crate::bindings::bind_group::BindGroup as _;
use crate::bindings::usage::QueueType;
use crate::commands::{
    self, resolve_footprint, validate_buffer_copy, validate_texture_location, BufferTextureCopy, IndexFormat,
    LoadOp, PipelineBarrierDesc, RenderingDesc, ScissorRect, StoreOp, TextureCopy, TextureLocation, Viewport,
};
use crate::config::RhiConfig;
use crate::encoder::{BindingCache, EncoderKind, EncoderState};
use crate::error::{fatal, reject, Error};
use crate::pipeline::PipelineKind;
use ash::vk;
use std::sync::Arc;

/// What the binding cache keeps of a bound pipeline.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PipelineBinding {
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
}

#[derive(Debug)]
struct RenderScope {
    info: RenderingInfo,
    /// The render encoder was ended inside the scope; attachments must be loaded on resume.
    resumed: bool,
}

#[derive(Debug)]
pub struct CommandList {
    queue: QueueType,
    config: Arc<RhiConfig>,
    families: [u32; 3],
    commands: Vec<Command>,
    encoder: EncoderState,
    cache: BindingCache<PipelineBinding, GroupBinding, vk::Buffer>,
    scope: Option<RenderScope>,
    recording: bool,
}

fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

fn bind_point(kind: PipelineKind) -> vk::PipelineBindPoint {
    match kind {
        PipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

fn subresource_layers(location: &TextureLocation<'_, Vulkan>) -> ImageSubresourceLayers {
    ImageSubresourceLayers {
        aspect_mask: location.texture.aspect(),
        mip_level: location.mip,
        base_array_layer: location.layer,
        layer_count: 1,
    }
}

fn offset(origin: [u32; 3]) -> [i32; 3] {
    origin.map(|o| o as i32)
}

impl CommandList {
    pub(crate) fn new(config: Arc<RhiConfig>, queue: QueueType, families: [u32; 3]) -> Self {
        CommandList {
            queue,
            config,
            families,
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

    /// Encoders begun since the last `begin`, render and non-render alike.
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
            self.commands.push(Command::EndRendering);
            if let Some(scope) = &mut self.scope {
                scope.resumed = true;
            }
        }
        if switch.to == EncoderKind::Render {
            let Some(scope) = &self.scope else {
                fatal!("render encoder requested outside a begin_rendering scope");
            };
            let mut info = scope.info.clone();
            if scope.resumed {
                for attachment in info.color_attachments.iter_mut().chain(info.depth_attachment.iter_mut()) {
                    attachment.load_op = vk::AttachmentLoadOp::LOAD;
                }
            }
            self.commands.push(Command::BeginRendering(info));
        }
        self.cache.on_encoder_begin(to, false);
    }

    /// Issues whatever the binding cache still owes `kind`.
    fn flush(&mut self, kind: PipelineKind) {
        let bind_point = bind_point(kind);
        if let Some(pipeline) = self.cache.take_pipeline(kind) {
            self.commands.push(Command::BindPipeline {
                bind_point,
                pipeline: pipeline.handle,
            });
        }
        let Some(layout) = self.cache.pipeline(kind).map(|p| p.layout) else {
            return;
        };
        for (space, group) in self.cache.take_groups(kind) {
            if let Some(set) = group.set {
                self.commands.push(Command::BindDescriptorSets {
                    bind_point,
                    layout,
                    first_set: space,
                    sets: vec![set],
                });
            }
            for (range, data) in group.push_constants {
                self.commands.push(Command::PushConstants {
                    layout,
                    stage_flags: range.stage_flags,
                    offset: range.offset,
                    data,
                });
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
                self.commands.push(Command::SetScissor(scissor));
            }
            for (slot, (buffer, offset)) in state.vertex_buffers {
                self.commands.push(Command::BindVertexBuffers {
                    first_binding: slot,
                    buffers: vec![buffer],
                    offsets: vec![offset],
                });
            }
            if let Some((buffer, offset, format)) = state.index_buffer {
                self.commands.push(Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type: index_type(format),
                });
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

    fn attachment(
        &self,
        texture: &Texture,
        load: LoadOp,
        store: StoreOp,
        clear_value: ClearValue,
    ) -> RenderingAttachment {
        RenderingAttachment {
            resource: texture.id(),
            image_view: texture.view(),
            image_layout: texture.current_layout(),
            load_op: load_op(load),
            store_op: store_op(store),
            clear_value,
        }
    }

    fn buffer_image_copy(&self, copy: &BufferTextureCopy<'_, Vulkan>) -> Result<BufferImageCopy, Error> {
        let format = copy.texture.texture.desc().format;
        resolve_footprint(copy, 1, format.bytes_per_block() as u64).map_err(reject)?;
        let buffer_row_length = if copy.row_pitch == 0 {
            0
        } else {
            copy.row_pitch / format.bytes_per_block() * format.block_extent().0
        };
        Ok(BufferImageCopy {
            buffer_offset: copy.buffer_offset,
            buffer_row_length,
            buffer_image_height: 0,
            image_subresource: subresource_layers(&copy.texture),
            image_offset: offset(copy.texture.origin),
            image_extent: copy.extent,
        })
    }
}

impl commands::CommandList for CommandList {
    type Backend = Vulkan;

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
            "vulkan command list closed with {count} commands",
            count = self.commands.len()
        );
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc<'_, Vulkan>) {
        self.require_recording("begin_rendering");
        self.require_queue("begin_rendering", &[QueueType::Graphics]);
        if self.scope.is_some() {
            fatal!("begin_rendering inside an open begin_rendering scope");
        }
        let color_attachments: Vec<RenderingAttachment> = desc
            .colors
            .iter()
            .map(|color| {
                if color.texture.current_layout() != vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL {
                    logwise::warn_sync!(
                        "color attachment {name} is in {layout}, not COLOR_ATTACHMENT_OPTIMAL",
                        name = logwise::privacy::LogIt(&color.texture.desc().debug_name),
                        layout = logwise::privacy::LogIt(&color.texture.current_layout())
                    );
                }
                self.attachment(color.texture, color.load, color.store, ClearValue::Color(color.clear))
            })
            .collect();
        let depth_attachment = desc.depth.as_ref().map(|depth| {
            self.attachment(
                depth.texture,
                depth.load,
                depth.store,
                ClearValue::DepthStencil {
                    depth: depth.clear_depth,
                    stencil: depth.clear_stencil,
                },
            )
        });
        // leave any compute/blit encoder before the scope takes over
        self.switch(EncoderKind::None);
        self.scope = Some(RenderScope {
            info: RenderingInfo {
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
                layout: pipeline.root_signature().pipeline_layout(),
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

    fn pipeline_barrier(&mut self, desc: &PipelineBarrierDesc<'_, Vulkan>) {
        self.require_recording("pipeline_barrier");
        let config = self.config.clone();
        let translator = BarrierTranslator {
            queue: self.queue,
            capabilities: &config.capabilities,
            families: self.families,
        };
        let Some(barrier) = translator.translate(desc) else {
            return;
        };
        // barriers are not allowed inside a rendering instance
        if self.encoder.active() == EncoderKind::Render {
            self.switch(EncoderKind::None);
        }
        self.commands.push(Command::PipelineBarrier(barrier));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.prepare_draw("draw", false);
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
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
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        self.prepare_draw("draw_indirect", false);
        self.commands.push(Command::DrawIndirect {
            buffer: buffer.handle(),
            offset,
            draw_count,
            stride,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        self.prepare_draw("draw_indexed_indirect", true);
        self.commands.push(Command::DrawIndexedIndirect {
            buffer: buffer.handle(),
            offset,
            draw_count,
            stride,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.prepare_dispatch("dispatch");
        self.commands.push(Command::Dispatch { x, y, z });
    }

    fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
        self.prepare_dispatch("dispatch_indirect");
        self.commands.push(Command::DispatchIndirect {
            buffer: buffer.handle(),
            offset,
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
        validate_buffer_copy::<Vulkan>(dst, dst_offset, src, src_offset, size).map_err(reject)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyBuffer {
            src_buffer: src.handle(),
            dst_buffer: dst.handle(),
            regions: vec![BufferCopy {
                src_offset,
                dst_offset,
                size,
            }],
        });
        Ok(())
    }

    fn copy_texture_region(&mut self, copy: &TextureCopy<'_, Vulkan>) -> Result<(), Error> {
        self.require_recording("copy_texture_region");
        validate_texture_location(&copy.src, copy.extent).map_err(reject)?;
        validate_texture_location(&copy.dst, copy.extent).map_err(reject)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyImage {
            src_image: copy.src.texture.image(),
            src_image_layout: copy.src.texture.current_layout(),
            dst_image: copy.dst.texture.image(),
            dst_image_layout: copy.dst.texture.current_layout(),
            regions: vec![ImageCopy {
                src_subresource: subresource_layers(&copy.src),
                src_offset: offset(copy.src.origin),
                dst_subresource: subresource_layers(&copy.dst),
                dst_offset: offset(copy.dst.origin),
                extent: copy.extent,
            }],
        });
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy<'_, Vulkan>) -> Result<(), Error> {
        self.require_recording("copy_buffer_to_texture");
        let region = self.buffer_image_copy(copy)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyBufferToImage {
            src_buffer: copy.buffer.handle(),
            dst_image: copy.texture.texture.image(),
            dst_image_layout: copy.texture.texture.current_layout(),
            regions: vec![region],
        });
        Ok(())
    }

    fn copy_texture_to_buffer(&mut self, copy: &BufferTextureCopy<'_, Vulkan>) -> Result<(), Error> {
        self.require_recording("copy_texture_to_buffer");
        let region = self.buffer_image_copy(copy)?;
        self.switch(EncoderKind::Blit);
        self.commands.push(Command::CopyImageToBuffer {
            src_image: copy.texture.texture.image(),
            src_image_layout: copy.texture.texture.current_layout(),
            dst_buffer: copy.buffer.handle(),
            regions: vec![region],
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
