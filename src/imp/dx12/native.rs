// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
D3D12 vocabulary: enums and flags with their native values, handles, and the recorded
`ID3D12GraphicsCommandList4` calls.
*/

use crate::commands::{IndexFormat, ScissorRect, Viewport};
use crate::pipeline::PrimitiveTopology;
use crate::resources::{Format, ResourceId, SamplerDesc, SubresourceRange};

bitflags::bitflags! {
    /// `D3D12_RESOURCE_STATES`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceStates: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;
        const RAYTRACING_ACCELERATION_STRUCTURE = 0x40_0000;
    }
}

impl ResourceStates {
    /// `D3D12_RESOURCE_STATE_COMMON`.
    pub const COMMON: ResourceStates = ResourceStates::empty();
    /// `D3D12_RESOURCE_STATE_PRESENT`, an alias of `COMMON`.
    pub const PRESENT: ResourceStates = ResourceStates::empty();
    pub const GENERIC_READ: ResourceStates = ResourceStates::VERTEX_AND_CONSTANT_BUFFER
        .union(ResourceStates::INDEX_BUFFER)
        .union(ResourceStates::NON_PIXEL_SHADER_RESOURCE)
        .union(ResourceStates::PIXEL_SHADER_RESOURCE)
        .union(ResourceStates::INDIRECT_ARGUMENT)
        .union(ResourceStates::COPY_SOURCE);
}

/// `D3D12_DESCRIPTOR_RANGE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum DescriptorRangeType {
    Srv = 0,
    Uav = 1,
    Cbv = 2,
    Sampler = 3,
}

/// `D3D12_SHADER_VISIBILITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ShaderVisibility {
    All = 0,
    Vertex = 1,
    Hull = 2,
    Domain = 3,
    Geometry = 4,
    Pixel = 5,
    Amplification = 6,
    Mesh = 7,
}

/// `D3D12_DESCRIPTOR_HEAP_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DescriptorHeapType {
    CbvSrvUav = 0,
    Sampler = 1,
    Rtv = 2,
    Dsv = 3,
}

/// `D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES`.
pub const ALL_SUBRESOURCES: u32 = 0xffff_ffff;

/// Row pitch alignment of buffer/texture copies (`D3D12_TEXTURE_DATA_PITCH_ALIGNMENT`).
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u32 = 256;
/// Offset alignment of buffer/texture copies (`D3D12_TEXTURE_DATA_PLACEMENT_ALIGNMENT`).
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;
/// Size and offset alignment of constant buffer views.
pub const CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT: u64 = 256;

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
    /// An `ID3D12Resource`.
    ResourceHandle,
    /// An `ID3D12DescriptorHeap`.
    HeapHandle,
    /// An `ID3D12RootSignature`.
    RootSignatureHandle,
    /// An `ID3D12PipelineState`.
    PipelineStateHandle,
    /// An `ID3D12Fence` used for queue-to-queue ordering.
    SemaphoreHandle,
    /// An `IDXGISwapChain3`.
    SwapChainHandle,
    /// `D3D12_CPU_DESCRIPTOR_HANDLE`.
    CpuDescriptorHandle,
    /// `D3D12_GPU_DESCRIPTOR_HANDLE`.
    GpuDescriptorHandle,
);

impl CpuDescriptorHandle {
    pub fn offset(self, index: u32, increment: u32) -> Self {
        CpuDescriptorHandle(self.0 + index as u64 * increment as u64)
    }
}

impl GpuDescriptorHandle {
    pub fn offset(self, index: u32, increment: u32) -> Self {
        GpuDescriptorHandle(self.0 + index as u64 * increment as u64)
    }
}

/// What the driver reports about a freshly created descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapInfo {
    pub handle: HeapHandle,
    pub cpu_start: CpuDescriptorHandle,
    /// Only shader-visible heaps have one.
    pub gpu_start: Option<GpuDescriptorHandle>,
    pub increment: u32,
}

/// `D3D12_DESCRIPTOR_RANGE1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub range_type: DescriptorRangeType,
    pub num_descriptors: u32,
    pub base_shader_register: u32,
    pub register_space: u32,
    pub offset_in_descriptors_from_table_start: u32,
}

/// `D3D12_ROOT_PARAMETER1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootParameter {
    DescriptorTable {
        ranges: Vec<DescriptorRange>,
        visibility: ShaderVisibility,
    },
    Constants {
        shader_register: u32,
        register_space: u32,
        num_32bit_values: u32,
        visibility: ShaderVisibility,
    },
    Cbv {
        shader_register: u32,
        register_space: u32,
        visibility: ShaderVisibility,
    },
}

impl RootParameter {
    /// `D3D12_ROOT_PARAMETER_TYPE`.
    pub fn parameter_type(&self) -> u32 {
        match self {
            RootParameter::DescriptorTable { .. } => 0,
            RootParameter::Constants { .. } => 1,
            RootParameter::Cbv { .. } => 2,
        }
    }

    /// Cost in the 64-DWORD root signature budget.
    pub fn dwords(&self) -> u32 {
        match self {
            RootParameter::DescriptorTable { .. } => 1,
            RootParameter::Constants { num_32bit_values, .. } => *num_32bit_values,
            RootParameter::Cbv { .. } => 2,
        }
    }
}

/// `D3D12_STATIC_SAMPLER_DESC`.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSampler {
    pub sampler: SamplerDesc,
    pub shader_register: u32,
    pub register_space: u32,
    pub visibility: ShaderVisibility,
}

/// `D3D12_VERSIONED_ROOT_SIGNATURE_DESC` (version 1.1).
#[derive(Debug, Clone, PartialEq)]
pub struct RootSignatureLayout {
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
    pub allow_input_assembler: bool,
}

/// The view a descriptor is created for.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewDesc {
    Cbv {
        location: u64,
        size_in_bytes: u32,
    },
    /// `stride == 0` is a raw (`R32_TYPELESS`) view.
    BufferSrv {
        first_element: u64,
        num_elements: u32,
        stride: u32,
    },
    BufferUav {
        first_element: u64,
        num_elements: u32,
        stride: u32,
    },
    TextureSrv {
        format: Format,
        range: SubresourceRange,
    },
    TextureUav {
        format: Format,
        mip: u32,
        first_layer: u32,
        layers: u32,
    },
    RenderTarget {
        format: Format,
    },
    DepthStencil {
        format: Format,
    },
    Sampler(SamplerDesc),
}

/// One `CopyDescriptorsSimple` of a single descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCopy {
    pub dst: CpuDescriptorHandle,
    pub src: CpuDescriptorHandle,
    pub heap_type: DescriptorHeapType,
}

/// `D3D12_RESOURCE_BARRIER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBarrier {
    Transition {
        resource_id: ResourceId,
        resource: ResourceHandle,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    /// A null resource orders every UAV access.
    Uav { resource: Option<ResourceHandle> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
    pub stride_in_bytes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
    pub format: IndexFormat,
}

/// `D3D12_RENDER_PASS_BEGINNING_ACCESS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeginningAccess {
    Discard,
    Preserve,
    ClearColor([f32; 4]),
    ClearDepthStencil { depth: f32, stencil: u8 },
}

/// `D3D12_RENDER_PASS_ENDING_ACCESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndingAccess {
    Discard,
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassTarget {
    pub resource: ResourceId,
    pub descriptor: CpuDescriptorHandle,
    pub beginning: BeginningAccess,
    pub ending: EndingAccess,
}

/// A copy endpoint (`D3D12_TEXTURE_COPY_LOCATION`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureCopyLocation {
    Subresource {
        resource: ResourceHandle,
        index: u32,
    },
    PlacedFootprint {
        resource: ResourceHandle,
        offset: u64,
        format: Format,
        width: u32,
        height: u32,
        depth: u32,
        row_pitch: u32,
    },
}

/// The command signature an `ExecuteIndirect` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectKind {
    Draw,
    DrawIndexed,
    Dispatch,
}

/// Which root-argument setters a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

/// A recorded `ID3D12GraphicsCommandList4` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetDescriptorHeaps(Vec<HeapHandle>),
    SetRootSignature {
        bind_point: BindPoint,
        root_signature: RootSignatureHandle,
    },
    SetPipelineState(PipelineStateHandle),
    SetRootDescriptorTable {
        bind_point: BindPoint,
        index: u32,
        base: GpuDescriptorHandle,
    },
    SetRootConstantBufferView {
        bind_point: BindPoint,
        index: u32,
        address: u64,
    },
    SetRoot32BitConstants {
        bind_point: BindPoint,
        index: u32,
        values: Vec<u32>,
        dest_offset: u32,
    },
    IaSetPrimitiveTopology(PrimitiveTopology),
    IaSetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    IaSetIndexBuffer(IndexBufferView),
    RsSetViewports(Vec<Viewport>),
    RsSetScissorRects(Vec<ScissorRect>),
    BeginRenderPass {
        render_targets: Vec<RenderPassTarget>,
        depth_stencil: Option<RenderPassTarget>,
    },
    EndRenderPass,
    ResourceBarrier(Vec<ResourceBarrier>),
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    ExecuteIndirect {
        kind: IndirectKind,
        max_count: u32,
        stride: u32,
        argument_buffer: ResourceHandle,
        argument_offset: u64,
    },
    CopyBufferRegion {
        dst: ResourceHandle,
        dst_offset: u64,
        src: ResourceHandle,
        src_offset: u64,
        num_bytes: u64,
    },
    CopyTextureRegion {
        dst: TextureCopyLocation,
        dst_origin: [u32; 3],
        src: TextureCopyLocation,
        /// `left, top, front, right, bottom, back`; `None` copies the whole source.
        src_box: Option<[u32; 6]>,
    },
}
