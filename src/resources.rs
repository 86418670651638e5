// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Backend-neutral descriptions of buffers, textures and samplers.

Every backend creates its native objects from these descriptions.  Each created resource is
assigned a process-unique [`ResourceId`], which is what bind groups report when queried and what
command streams refer to in diagnostics.
*/

use crate::bindings::usage::ResourceUsage;
use crate::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a buffer, texture or sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl ResourceId {
    pub(crate) fn next() -> Self {
        ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

bitflags::bitflags! {
    /// Ways a buffer may be used over its lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT = 1 << 2;
        const SHADER_RESOURCE = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
        const INDIRECT = 1 << 5;
        const COPY_SRC = 1 << 6;
        const COPY_DST = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Ways a texture may be used over its lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const UNORDERED_ACCESS = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
        const PRESENT = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    #[default]
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryLocation,
    /// Element stride for structured buffers; 0 for raw or constant buffers.
    pub stride: u32,
    pub debug_name: String,
    /// The usage the buffer is in immediately after creation.
    pub initial_usage: ResourceUsage,
}

impl BufferDesc {
    pub fn new(debug_name: &str, size: u64, usage: BufferUsage) -> Self {
        BufferDesc {
            size,
            usage,
            memory: MemoryLocation::GpuOnly,
            stride: 0,
            debug_name: debug_name.to_string(),
            initial_usage: ResourceUsage::UNDEFINED,
        }
    }
    pub fn with_memory(mut self, memory: MemoryLocation) -> Self {
        self.memory = memory;
        self
    }
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }
    pub fn with_initial_usage(mut self, usage: ResourceUsage) -> Self {
        self.initial_usage = usage;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
    Cube,
}

/// Texel formats understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    R32Uint,
    Rgba32Uint,
    Rgb10A2Unorm,
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,
    Bc1Unorm,
    Bc3Unorm,
    Bc7Unorm,
}

impl Format {
    /// Bytes per block; a block is one texel for uncompressed formats.
    pub const fn bytes_per_block(self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::Rg8Unorm | Format::R16Float | Format::D16Unorm => 2,
            Format::Rgba8Unorm
            | Format::Rgba8UnormSrgb
            | Format::Bgra8Unorm
            | Format::Bgra8UnormSrgb
            | Format::Rg16Float
            | Format::R32Float
            | Format::R32Uint
            | Format::Rgb10A2Unorm
            | Format::D24UnormS8Uint
            | Format::D32Float => 4,
            Format::Rgba16Float | Format::Rg32Float | Format::D32FloatS8Uint => 8,
            Format::Rgb32Float => 12,
            Format::Rgba32Float | Format::Rgba32Uint => 16,
            Format::Bc1Unorm => 8,
            Format::Bc3Unorm | Format::Bc7Unorm => 16,
        }
    }

    /// Width and height of a block in texels.
    pub const fn block_extent(self) -> (u32, u32) {
        match self {
            Format::Bc1Unorm | Format::Bc3Unorm | Format::Bc7Unorm => (4, 4),
            _ => (1, 1),
        }
    }

    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D24UnormS8Uint | Format::D32Float | Format::D32FloatS8Uint
        )
    }

    pub const fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32FloatS8Uint)
    }

    pub const fn is_srgb(self) -> bool {
        matches!(self, Format::Rgba8UnormSrgb | Format::Bgra8UnormSrgb)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array layers otherwise (6 per cube).
    pub depth_or_layers: u32,
    pub mip_levels: u32,
    pub dimension: TextureDimension,
    pub format: Format,
    pub usage: TextureUsage,
    pub samples: u32,
    pub debug_name: String,
    pub initial_usage: ResourceUsage,
}

impl TextureDesc {
    pub fn new_2d(debug_name: &str, width: u32, height: u32, format: Format, usage: TextureUsage) -> Self {
        TextureDesc {
            width,
            height,
            depth_or_layers: 1,
            mip_levels: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
            samples: 1,
            debug_name: debug_name.to_string(),
            initial_usage: ResourceUsage::UNDEFINED,
        }
    }
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.depth_or_layers = layers;
        self
    }
    pub fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }
    pub fn with_initial_usage(mut self, usage: ResourceUsage) -> Self {
        self.initial_usage = usage;
        self
    }

    pub fn array_layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.depth_or_layers,
        }
    }

    /// Extent of `mip`, clamped to one texel.
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        let depth = match self.dimension {
            TextureDimension::D3 => (self.depth_or_layers >> mip).max(1),
            _ => 1,
        };
        ((self.width >> mip).max(1), (self.height >> mip).max(1), depth)
    }
}

/// A range of mips and array layers within a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub fn all(desc: &TextureDesc) -> Self {
        SubresourceRange {
            base_mip: 0,
            mip_count: desc.mip_levels,
            base_layer: 0,
            layer_count: desc.array_layers(),
        }
    }

    pub fn mip(level: u32) -> Self {
        SubresourceRange {
            base_mip: level,
            mip_count: 1,
            base_layer: 0,
            layer_count: 1,
        }
    }

    pub fn covers(&self, desc: &TextureDesc) -> bool {
        self.base_mip == 0
            && self.base_layer == 0
            && self.mip_count >= desc.mip_levels
            && self.layer_count >= desc.array_layers()
    }

    pub fn within(&self, desc: &TextureDesc) -> bool {
        self.mip_count > 0
            && self.layer_count > 0
            && self.base_mip + self.mip_count <= desc.mip_levels
            && self.base_layer + self.layer_count <= desc.array_layers()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirrorRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mip_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub max_anisotropy: u32,
    pub compare: Option<CompareOp>,
    pub border: BorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
    pub debug_name: String,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        SamplerDesc {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            max_anisotropy: 1,
            compare: None,
            border: BorderColor::TransparentBlack,
            min_lod: 0.0,
            max_lod: f32::MAX,
            debug_name: String::from("sampler"),
        }
    }
}

/// Layout of texel data in a buffer, for buffer/texture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFootprint {
    /// Bytes between the starts of consecutive block rows.
    pub row_pitch: u32,
    /// Number of block rows per depth slice.
    pub rows: u32,
    /// Bytes between the starts of consecutive depth slices.
    pub slice_pitch: u64,
    /// Bytes the copy touches, from the first texel to the end of the last row.
    pub total_bytes: u64,
}

impl CopyFootprint {
    /// Computes the tightest footprint for a `width`x`height`x`depth` region whose rows are
    /// padded to `row_alignment` bytes.
    pub fn new(format: Format, width: u32, height: u32, depth: u32, row_alignment: u32) -> Self {
        let (bw, bh) = format.block_extent();
        let blocks_wide = width.div_ceil(bw);
        let rows = height.div_ceil(bh);
        let unpadded = blocks_wide * format.bytes_per_block();
        let row_pitch = unpadded.next_multiple_of(row_alignment.max(1));
        let slice_pitch = row_pitch as u64 * rows as u64;
        let total_bytes = if depth == 0 || rows == 0 {
            0
        } else {
            slice_pitch * (depth as u64 - 1) + row_pitch as u64 * (rows as u64 - 1) + unpadded as u64
        };
        CopyFootprint {
            row_pitch,
            rows,
            slice_pitch,
            total_bytes,
        }
    }

    /// Checks a caller-provided row pitch against the format and an alignment requirement.
    pub(crate) fn validate_row_pitch(
        format: Format,
        width: u32,
        row_pitch: u32,
        row_alignment: u32,
    ) -> Result<(), Error> {
        let (bw, _) = format.block_extent();
        let minimum = width.div_ceil(bw) * format.bytes_per_block();
        if row_pitch < minimum {
            return Err(Error::InvalidCopy(format!(
                "row pitch {row_pitch} is smaller than the {minimum} bytes a row of {width} texels needs"
            )));
        }
        if row_pitch % row_alignment != 0 {
            return Err(Error::InvalidCopy(format!(
                "row pitch {row_pitch} is not a multiple of {row_alignment}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn footprint_pads_rows() {
        let fp = CopyFootprint::new(Format::Rgba8Unorm, 100, 10, 1, 256);
        assert_eq!(fp.row_pitch, 512);
        assert_eq!(fp.rows, 10);
        assert_eq!(fp.total_bytes, 512 * 9 + 400);
    }

    #[test]
    fn footprint_of_compressed_format_counts_blocks() {
        let fp = CopyFootprint::new(Format::Bc1Unorm, 16, 16, 1, 1);
        assert_eq!(fp.row_pitch, 4 * 8);
        assert_eq!(fp.rows, 4);
    }

    #[test]
    fn row_pitch_validation() {
        assert!(CopyFootprint::validate_row_pitch(Format::R32Float, 64, 256, 256).is_ok());
        assert!(CopyFootprint::validate_row_pitch(Format::R32Float, 64, 300, 256).is_err());
        assert!(CopyFootprint::validate_row_pitch(Format::R32Float, 128, 256, 256).is_err());
    }

    #[test]
    fn subresource_coverage() {
        let desc = TextureDesc::new_2d("t", 64, 64, Format::Rgba8Unorm, TextureUsage::SHADER_RESOURCE)
            .with_mip_levels(4);
        assert!(SubresourceRange::all(&desc).covers(&desc));
        assert!(!SubresourceRange::mip(1).covers(&desc));
        assert!(SubresourceRange::mip(3).within(&desc));
        assert!(!SubresourceRange::mip(4).within(&desc));
        assert_eq!(desc.mip_extent(2), (16, 16, 1));
    }
}
