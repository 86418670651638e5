// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Metal vocabulary: enums and flags with their native values, object handles, argument-buffer
records and the recorded encoder calls.
*/

use crate::commands::{ScissorRect, Viewport};
use crate::resources::{ResourceId, SamplerDesc};

/// Highest buffer argument table index plus one (`[[buffer(n)]]`, n < 31).
pub const MAX_BUFFER_ARGUMENTS: u32 = 31;
/// Bytes one argument occupies in a tier 2 argument buffer (a GPU address or `MTLResourceID`).
pub const ARGUMENT_ENTRY_BYTES: u64 = 8;
/// Offset alignment of argument buffers within the arena.
pub const ARGUMENT_BUFFER_ALIGNMENT: u64 = 256;

/// `MTLDataType`, restricted to what an argument can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    Texture = 58,
    Sampler = 59,
    Pointer = 60,
}

/// `MTLBindingAccess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BindingAccess {
    ReadOnly = 0,
    ReadWrite = 1,
    WriteOnly = 2,
}

/// `MTLTextureType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureType {
    D1 = 0,
    D1Array = 1,
    D2 = 2,
    D2Array = 3,
    D2Multisample = 4,
    Cube = 5,
    CubeArray = 6,
    D3 = 7,
}

bitflags::bitflags! {
    /// `MTLResourceUsage`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceUsageFlags: u32 {
        const READ = 1;
        const WRITE = 2;
    }
}

bitflags::bitflags! {
    /// `MTLRenderStages`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderStages: u32 {
        const VERTEX = 1;
        const FRAGMENT = 2;
        const TILE = 4;
        const OBJECT = 8;
        const MESH = 16;
    }
}

bitflags::bitflags! {
    /// `MTLBarrierScope`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierScope: u32 {
        const BUFFERS = 1;
        const TEXTURES = 2;
        const RENDER_TARGETS = 4;
    }
}

/// `MTLLoadAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LoadAction {
    DontCare = 0,
    Load = 1,
    Clear = 2,
}

/// `MTLStoreAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StoreAction {
    DontCare = 0,
    Store = 1,
}

/// `MTLPrimitiveType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrimitiveType {
    Point = 0,
    Line = 1,
    LineStrip = 2,
    Triangle = 3,
    TriangleStrip = 4,
}

/// `MTLIndexType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IndexType {
    UInt16 = 0,
    UInt32 = 1,
}

/// The function table a `set*Buffer`/`set*Bytes` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionStage {
    Vertex,
    Fragment,
    Compute,
}

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: $name = $name(0);
                pub fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

handle!(
    /// An `MTLBuffer`.
    BufferHandle,
    /// An `MTLTexture`, including texture views.
    TextureHandle,
    /// An `MTLSamplerState`.
    SamplerHandle,
    /// An `MTLRenderPipelineState` or `MTLComputePipelineState`.
    PipelineHandle,
    /// An `MTLFence`, ordering encoders within a command buffer.
    FenceHandle,
    /// An `MTLSharedEvent`, ordering command buffers across queues.
    EventHandle,
    /// A `CAMetalLayer`.
    LayerHandle,
    /// A `CAMetalDrawable`.
    DrawableHandle,
);

/// One entry of an argument-buffer layout (`MTLArgumentDescriptor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentDescriptor {
    /// `[[id(n)]]` of the first element.
    pub index: u32,
    pub data_type: DataType,
    pub access: BindingAccess,
    pub array_length: u32,
    /// Set for texture arguments only.
    pub texture_type: Option<TextureType>,
}

/// A sampler declared `constexpr` in the shader rather than bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantSampler {
    pub binding: u32,
    pub space: u32,
    pub sampler: SamplerDesc,
}

/// What one argument holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentValue {
    Buffer { buffer: BufferHandle, offset: u64 },
    Texture(TextureHandle),
    Sampler(SamplerHandle),
}

/// One argument written into an argument buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentWrite {
    pub argument_buffer: BufferHandle,
    /// Byte offset of the argument buffer within `argument_buffer`.
    pub base_offset: u64,
    /// Argument id: the slot's first id plus the array element.
    pub id: u32,
    pub value: ArgumentValue,
}

/// A resource an argument buffer references, for `useResources`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResidentResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachmentDescriptor {
    pub resource: ResourceId,
    pub texture: TextureHandle,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachmentDescriptor {
    pub resource: ResourceId,
    pub texture: TextureHandle,
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub has_stencil: bool,
}

/// `MTLRenderPassDescriptor`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub render_area: ScissorRect,
    pub color_attachments: Vec<ColorAttachmentDescriptor>,
    pub depth_attachment: Option<DepthAttachmentDescriptor>,
}

/// A recorded command-buffer or encoder call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RenderCommandEncoder(RenderPassDescriptor),
    ComputeCommandEncoder,
    BlitCommandEncoder,
    AccelerationStructureCommandEncoder,
    EndEncoding,

    /// `updateFence:` (render encoders use `afterStages: fragment`).
    UpdateFence(FenceHandle),
    /// `waitForFence:` (render encoders use `beforeStages: vertex`).
    WaitForFence(FenceHandle),
    /// `memoryBarrierWithScope:`; render encoders also name the stages.
    MemoryBarrier {
        scope: BarrierScope,
        after_stages: Option<RenderStages>,
        before_stages: Option<RenderStages>,
    },

    SetRenderPipelineState(PipelineHandle),
    SetComputePipelineState(PipelineHandle),
    SetBuffer {
        stage: FunctionStage,
        index: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    SetBytes {
        stage: FunctionStage,
        index: u32,
        data: Vec<u8>,
    },
    UseResources {
        resources: Vec<ResidentResource>,
        usage: ResourceUsageFlags,
        /// `None` on compute encoders.
        stages: Option<RenderStages>,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),

    DrawPrimitives {
        primitive: PrimitiveType,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        base_instance: u32,
    },
    DrawIndexedPrimitives {
        primitive: PrimitiveType,
        index_count: u32,
        index_type: IndexType,
        index_buffer: BufferHandle,
        index_buffer_offset: u64,
        instance_count: u32,
        base_vertex: i32,
        base_instance: u32,
    },
    DrawPrimitivesIndirect {
        primitive: PrimitiveType,
        indirect_buffer: BufferHandle,
        indirect_buffer_offset: u64,
    },
    DrawIndexedPrimitivesIndirect {
        primitive: PrimitiveType,
        index_type: IndexType,
        index_buffer: BufferHandle,
        index_buffer_offset: u64,
        indirect_buffer: BufferHandle,
        indirect_buffer_offset: u64,
    },
    DispatchThreadgroups {
        threadgroups: [u32; 3],
        threads_per_threadgroup: [u32; 3],
    },
    DispatchThreadgroupsIndirect {
        indirect_buffer: BufferHandle,
        indirect_buffer_offset: u64,
        threads_per_threadgroup: [u32; 3],
    },

    CopyBufferToBuffer {
        source: BufferHandle,
        source_offset: u64,
        destination: BufferHandle,
        destination_offset: u64,
        size: u64,
    },
    CopyTextureToTexture {
        source: TextureHandle,
        source_slice: u32,
        source_level: u32,
        source_origin: [u32; 3],
        source_size: [u32; 3],
        destination: TextureHandle,
        destination_slice: u32,
        destination_level: u32,
        destination_origin: [u32; 3],
    },
    CopyBufferToTexture {
        source: BufferHandle,
        source_offset: u64,
        source_bytes_per_row: u32,
        source_bytes_per_image: u64,
        source_size: [u32; 3],
        destination: TextureHandle,
        destination_slice: u32,
        destination_level: u32,
        destination_origin: [u32; 3],
    },
    CopyTextureToBuffer {
        source: TextureHandle,
        source_slice: u32,
        source_level: u32,
        source_origin: [u32; 3],
        source_size: [u32; 3],
        destination: BufferHandle,
        destination_offset: u64,
        destination_bytes_per_row: u32,
        destination_bytes_per_image: u64,
    },
}
