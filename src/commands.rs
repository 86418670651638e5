// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The command-list surface and its argument types.

A command list records work for one queue.  All three backends present the same contract:

* operations run in recorded order;
* bind calls are remembered and re-issued lazily, right before the draw or dispatch that
  consumes them;
* barriers execute between the operations they were recorded between, and are never reordered
  across an encoder switch;
* an operation that cannot run in the current context is a sequencing error, never silently
  dropped.

Graphics operations (`draw*`, `bind_vertex_buffer`, `bind_index_buffer`, `bind_viewport`,
`bind_scissor_rect`) require an open `begin_rendering` scope, and are fatal while a compute or blit
encoder is active.  A dispatch or copy inside a scope ends the render encoder; the caller comes
back with `switch_encoder(EncoderKind::Render)`, which resumes the pass with [`LoadOp::Load`] and
re-applies the encoder-scoped state.  A barrier that has to end the render encoder leaves no
encoder active, and the next graphics operation re-opens the pass the same way.
*/

use crate::backend::{Backend, GpuBuffer, GpuTexture};
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::encoder::EncoderKind;
use crate::error::Error;
use crate::resources::{CopyFootprint, SubresourceRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(width: u32, height: u32) -> Self {
        ScissorRect {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug)]
pub struct ColorAttachment<'a, B: Backend> {
    pub texture: &'a B::Texture,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear: [f32; 4],
}

impl<B: Backend> Clone for ColorAttachment<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for ColorAttachment<'_, B> {}

impl<'a, B: Backend> ColorAttachment<'a, B> {
    pub fn clear(texture: &'a B::Texture, clear: [f32; 4]) -> Self {
        ColorAttachment {
            texture,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear,
        }
    }
    pub fn load(texture: &'a B::Texture) -> Self {
        ColorAttachment {
            texture,
            load: LoadOp::Load,
            store: StoreOp::Store,
            clear: [0.0; 4],
        }
    }
}

#[derive(Debug)]
pub struct DepthAttachment<'a, B: Backend> {
    pub texture: &'a B::Texture,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

impl<B: Backend> Clone for DepthAttachment<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for DepthAttachment<'_, B> {}

/// The attachments of a `begin_rendering` scope.
#[derive(Debug, Clone)]
pub struct RenderingDesc<'a, B: Backend> {
    pub colors: Vec<ColorAttachment<'a, B>>,
    pub depth: Option<DepthAttachment<'a, B>>,
    pub area: ScissorRect,
}

impl<'a, B: Backend> RenderingDesc<'a, B> {
    pub fn new(area: ScissorRect) -> Self {
        RenderingDesc {
            colors: Vec::new(),
            depth: None,
            area,
        }
    }
    pub fn color(mut self, attachment: ColorAttachment<'a, B>) -> Self {
        self.colors.push(attachment);
        self
    }
    pub fn depth(mut self, attachment: DepthAttachment<'a, B>) -> Self {
        self.depth = Some(attachment);
        self
    }
}

/// Moves ownership of a resource between queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueTransfer {
    pub src: QueueType,
    pub dst: QueueType,
}

/// A barrier covering only some mips and layers.
///
/// The tracker records whole-resource state, so a partial barrier states its own source usage
/// and leaves the tracked state alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialBarrier {
    pub range: SubresourceRange,
    pub before: ResourceUsage,
}

#[derive(Debug)]
pub struct TextureBarrier<'a, B: Backend> {
    pub texture: &'a B::Texture,
    pub after: ResourceUsage,
    /// What the caller believes the current state is.  The tracked state is used regardless.
    pub expected_before: Option<ResourceUsage>,
    pub subresource: Option<PartialBarrier>,
    pub queue_transfer: Option<QueueTransfer>,
}

impl<B: Backend> Clone for TextureBarrier<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for TextureBarrier<'_, B> {}

impl<'a, B: Backend> TextureBarrier<'a, B> {
    pub fn new(texture: &'a B::Texture, after: ResourceUsage) -> Self {
        TextureBarrier {
            texture,
            after,
            expected_before: None,
            subresource: None,
            queue_transfer: None,
        }
    }
    pub fn expecting(mut self, before: ResourceUsage) -> Self {
        self.expected_before = Some(before);
        self
    }
    pub fn subresource(mut self, range: SubresourceRange, before: ResourceUsage) -> Self {
        self.subresource = Some(PartialBarrier { range, before });
        self
    }
    pub fn queue_transfer(mut self, src: QueueType, dst: QueueType) -> Self {
        self.queue_transfer = Some(QueueTransfer { src, dst });
        self
    }
}

#[derive(Debug)]
pub struct BufferBarrier<'a, B: Backend> {
    pub buffer: &'a B::Buffer,
    pub after: ResourceUsage,
    pub expected_before: Option<ResourceUsage>,
    pub queue_transfer: Option<QueueTransfer>,
}

impl<B: Backend> Clone for BufferBarrier<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for BufferBarrier<'_, B> {}

impl<'a, B: Backend> BufferBarrier<'a, B> {
    pub fn new(buffer: &'a B::Buffer, after: ResourceUsage) -> Self {
        BufferBarrier {
            buffer,
            after,
            expected_before: None,
            queue_transfer: None,
        }
    }
    pub fn expecting(mut self, before: ResourceUsage) -> Self {
        self.expected_before = Some(before);
        self
    }
    pub fn queue_transfer(mut self, src: QueueType, dst: QueueType) -> Self {
        self.queue_transfer = Some(QueueTransfer { src, dst });
        self
    }
}

/// A barrier on all memory rather than one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryBarrier {
    pub before: ResourceUsage,
    pub after: ResourceUsage,
}

/**
Everything one `pipeline_barrier` call transitions.

All barriers in one description are submitted as a single native barrier command.

```
# #[cfg(feature = "backend_vulkan")] {
use rhi::Device;
use rhi::bindings::usage::ResourceUsage;
use rhi::commands::{PipelineBarrierDesc, TextureBarrier};
use rhi::resources::{Format, TextureDesc, TextureUsage};

let device = rhi::vulkan::Device::null(Default::default());
let texture = device
    .create_texture(&TextureDesc::new_2d("t", 4, 4, Format::Rgba8Unorm, TextureUsage::RENDER_TARGET))
    .unwrap();
let desc = PipelineBarrierDesc::<rhi::Vulkan>::new().texture(TextureBarrier::new(&texture, ResourceUsage::RENDER_TARGET));
assert_eq!(desc.textures.len(), 1);
# }
```
*/
#[derive(Debug, Clone)]
pub struct PipelineBarrierDesc<'a, B: Backend> {
    pub textures: Vec<TextureBarrier<'a, B>>,
    pub buffers: Vec<BufferBarrier<'a, B>>,
    pub memory: Vec<MemoryBarrier>,
}

impl<'a, B: Backend> Default for PipelineBarrierDesc<'a, B> {
    fn default() -> Self {
        PipelineBarrierDesc {
            textures: Vec::new(),
            buffers: Vec::new(),
            memory: Vec::new(),
        }
    }
}

impl<'a, B: Backend> PipelineBarrierDesc<'a, B> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn texture(mut self, barrier: TextureBarrier<'a, B>) -> Self {
        self.textures.push(barrier);
        self
    }
    pub fn buffer(mut self, barrier: BufferBarrier<'a, B>) -> Self {
        self.buffers.push(barrier);
        self
    }
    pub fn memory(mut self, before: ResourceUsage, after: ResourceUsage) -> Self {
        self.memory.push(MemoryBarrier { before, after });
        self
    }
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.buffers.is_empty() && self.memory.is_empty()
    }

    /// Usages named on either side of every barrier, with tracked sources for full barriers.
    pub(crate) fn touched_usages(&self) -> ResourceUsage {
        let mut usage = ResourceUsage::empty();
        for t in &self.textures {
            usage |= t.after;
            usage |= match t.subresource {
                Some(partial) => partial.before,
                None => t.texture.current_usage(),
            };
        }
        for b in &self.buffers {
            usage |= b.after | b.buffer.current_usage();
        }
        for m in &self.memory {
            usage |= m.before | m.after;
        }
        usage
    }
}

/// One texel location in a texture.
#[derive(Debug)]
pub struct TextureLocation<'a, B: Backend> {
    pub texture: &'a B::Texture,
    pub mip: u32,
    pub layer: u32,
    pub origin: [u32; 3],
}

impl<B: Backend> Clone for TextureLocation<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for TextureLocation<'_, B> {}

impl<'a, B: Backend> TextureLocation<'a, B> {
    pub fn new(texture: &'a B::Texture) -> Self {
        TextureLocation {
            texture,
            mip: 0,
            layer: 0,
            origin: [0; 3],
        }
    }
    pub fn mip(mut self, mip: u32) -> Self {
        self.mip = mip;
        self
    }
    pub fn layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextureCopy<'a, B: Backend> {
    pub src: TextureLocation<'a, B>,
    pub dst: TextureLocation<'a, B>,
    pub extent: [u32; 3],
}

/// A copy between a buffer and one subresource of a texture.
#[derive(Debug)]
pub struct BufferTextureCopy<'a, B: Backend> {
    pub buffer: &'a B::Buffer,
    pub buffer_offset: u64,
    /// Bytes between rows in the buffer; 0 picks the tightest pitch the backend allows.
    pub row_pitch: u32,
    pub texture: TextureLocation<'a, B>,
    pub extent: [u32; 3],
}

impl<B: Backend> Clone for BufferTextureCopy<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for BufferTextureCopy<'_, B> {}

impl<'a, B: Backend> BufferTextureCopy<'a, B> {
    /// Copies all of mip 0, layer 0.
    pub fn whole(buffer: &'a B::Buffer, texture: &'a B::Texture) -> Self {
        let desc = texture.desc();
        BufferTextureCopy {
            buffer,
            buffer_offset: 0,
            row_pitch: 0,
            texture: TextureLocation::new(texture),
            extent: [desc.width, desc.height, desc.mip_extent(0).2],
        }
    }
}

pub(crate) fn validate_buffer_copy<B: Backend>(
    dst: &B::Buffer,
    dst_offset: u64,
    src: &B::Buffer,
    src_offset: u64,
    size: u64,
) -> Result<(), Error> {
    let fits = |buffer: &B::Buffer, offset: u64| offset.checked_add(size).is_some_and(|end| end <= buffer.desc().size);
    if size == 0 {
        return Err(Error::InvalidCopy("zero-sized buffer copy".to_string()));
    }
    if !fits(src, src_offset) {
        return Err(Error::InvalidCopy(format!(
            "{size} bytes at {src_offset} overrun source '{}'",
            src.desc().debug_name
        )));
    }
    if !fits(dst, dst_offset) {
        return Err(Error::InvalidCopy(format!(
            "{size} bytes at {dst_offset} overrun destination '{}'",
            dst.desc().debug_name
        )));
    }
    Ok(())
}

pub(crate) fn validate_texture_location<B: Backend>(location: &TextureLocation<'_, B>, extent: [u32; 3]) -> Result<(), Error> {
    let desc = location.texture.desc();
    if location.mip >= desc.mip_levels || location.layer >= desc.array_layers() {
        return Err(Error::InvalidCopy(format!(
            "mip {} layer {} does not exist in '{}'",
            location.mip, location.layer, desc.debug_name
        )));
    }
    let (w, h, d) = desc.mip_extent(location.mip);
    let limits = [w, h, d];
    for axis in 0..3 {
        if location.origin[axis].checked_add(extent[axis]).is_none_or(|end| end > limits[axis]) {
            return Err(Error::InvalidCopy(format!(
                "region exceeds mip {} of '{}' along axis {axis}",
                location.mip, desc.debug_name
            )));
        }
    }
    Ok(())
}

/**
Validates a buffer/texture copy and resolves its buffer footprint.

`row_alignment` and `placement_alignment` are the backend's requirements on row pitch and on
the buffer offset.
*/
pub(crate) fn resolve_footprint<B: Backend>(
    copy: &BufferTextureCopy<'_, B>,
    row_alignment: u32,
    placement_alignment: u64,
) -> Result<CopyFootprint, Error> {
    validate_texture_location(&copy.texture, copy.extent)?;
    let format = copy.texture.texture.desc().format;
    let [width, height, depth] = copy.extent;
    if copy.buffer_offset % placement_alignment != 0 {
        return Err(Error::InvalidCopy(format!(
            "buffer offset {} is not a multiple of {placement_alignment}",
            copy.buffer_offset
        )));
    }
    let mut footprint = CopyFootprint::new(format, width, height, depth, row_alignment);
    if copy.row_pitch != 0 {
        CopyFootprint::validate_row_pitch(format, width, copy.row_pitch, row_alignment)?;
        let tight = CopyFootprint::new(format, width, height, depth, 1);
        let unpadded = tight.row_pitch as u64;
        footprint.row_pitch = copy.row_pitch;
        footprint.slice_pitch = copy.row_pitch as u64 * footprint.rows as u64;
        footprint.total_bytes = if depth == 0 || footprint.rows == 0 {
            0
        } else {
            footprint.slice_pitch * (depth as u64 - 1) + copy.row_pitch as u64 * (footprint.rows as u64 - 1) + unpadded
        };
    }
    let end = copy.buffer_offset.checked_add(footprint.total_bytes);
    if end.is_none_or(|end| end > copy.buffer.desc().size) {
        return Err(Error::InvalidCopy(format!(
            "{} bytes at {} overrun buffer '{}'",
            footprint.total_bytes,
            copy.buffer_offset,
            copy.buffer.desc().debug_name
        )));
    }
    Ok(footprint)
}

/**
The application-facing command-list surface, implemented by every backend.

Lists are created by [`Device::create_command_list`](crate::Device::create_command_list),
recorded between [`begin`](CommandList::begin) and [`end`](CommandList::end), then handed to a
queue.
*/
pub trait CommandList: std::fmt::Debug + Send {
    type Backend: Backend;

    fn queue_type(&self) -> QueueType;

    /// Starts recording, discarding anything recorded before.
    fn begin(&mut self);
    /// Finishes recording.  Ends any open encoder; an open rendering scope is a sequencing error.
    fn end(&mut self);
    fn is_recording(&self) -> bool;

    fn begin_rendering(&mut self, desc: &RenderingDesc<'_, Self::Backend>);
    fn end_rendering(&mut self);

    fn bind_pipeline(&mut self, pipeline: &<Self::Backend as Backend>::Pipeline);
    fn bind_vertex_buffer(&mut self, slot: u32, buffer: &<Self::Backend as Backend>::Buffer, offset: u64);
    fn bind_index_buffer(&mut self, buffer: &<Self::Backend as Backend>::Buffer, offset: u64, format: IndexFormat);
    fn bind_viewport(&mut self, viewport: Viewport);
    fn bind_scissor_rect(&mut self, rect: ScissorRect);
    fn bind_resource_group(&mut self, group: &<Self::Backend as Backend>::BindGroup);

    /// Transitions resources, taking every full-resource source state from its tracker.
    fn pipeline_barrier(&mut self, desc: &PipelineBarrierDesc<'_, Self::Backend>);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn draw_indirect(&mut self, buffer: &<Self::Backend as Backend>::Buffer, offset: u64, draw_count: u32, stride: u32);
    fn draw_indexed_indirect(
        &mut self,
        buffer: &<Self::Backend as Backend>::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn dispatch_indirect(&mut self, buffer: &<Self::Backend as Backend>::Buffer, offset: u64);

    fn copy_buffer_region(
        &mut self,
        dst: &<Self::Backend as Backend>::Buffer,
        dst_offset: u64,
        src: &<Self::Backend as Backend>::Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<(), Error>;
    fn copy_texture_region(&mut self, copy: &TextureCopy<'_, Self::Backend>) -> Result<(), Error>;
    fn copy_buffer_to_texture(&mut self, copy: &BufferTextureCopy<'_, Self::Backend>) -> Result<(), Error>;
    fn copy_texture_to_buffer(&mut self, copy: &BufferTextureCopy<'_, Self::Backend>) -> Result<(), Error>;

    /// Makes `kind` the active encoder.  A no-op when it already is.
    ///
    /// Switching to [`EncoderKind::Render`] needs an open `begin_rendering` scope.
    fn switch_encoder(&mut self, kind: EncoderKind);
    fn active_encoder(&self) -> EncoderKind;
}
