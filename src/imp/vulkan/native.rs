// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Owned records of the Vulkan structures this backend produces.
//!
//! They carry the same fields as their `Vk*` counterparts, minus `pNext` chains and pointers, so a
//! driver can fill the native structs directly and tests can compare them.

use crate::commands::{ScissorRect, Viewport};
use crate::resources::ResourceId;
use ash::vk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
    pub immutable_samplers: Vec<vk::Sampler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stage_flags: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    pub ty: vk::DescriptorType,
    pub descriptor_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorInfo {
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Image {
        sampler: vk::Sampler,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    },
}

/// One element of a `VkWriteDescriptorSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub info: DescriptorInfo,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub resource: ResourceId,
    pub image_view: vk::ImageView,
    pub image_layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: ClearValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub render_area: ScissorRect,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubresourceRange {
    pub aspect_mask: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSubresourceLayers {
    pub aspect_mask: vk::ImageAspectFlags,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMemoryBarrier {
    pub resource: ResourceId,
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMemoryBarrier {
    pub resource: ResourceId,
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub image: vk::Image,
    pub subresource_range: ImageSubresourceRange,
}

/// One `vkCmdPipelineBarrier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBarrier {
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub memory_barriers: Vec<MemoryBarrier>,
    pub buffer_memory_barriers: Vec<BufferMemoryBarrier>,
    pub image_memory_barriers: Vec<ImageMemoryBarrier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopy {
    pub src_subresource: ImageSubresourceLayers,
    pub src_offset: [i32; 3],
    pub dst_subresource: ImageSubresourceLayers,
    pub dst_offset: [i32; 3],
    pub extent: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    /// In texels; 0 means tightly packed.
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_subresource: ImageSubresourceLayers,
    pub image_offset: [i32; 3],
    pub image_extent: [u32; 3],
}

/// A recorded `vkCmd*` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRendering(RenderingInfo),
    EndRendering,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    PipelineBarrier(PipelineBarrier),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: vk::Buffer,
        offset: u64,
    },
    CopyBuffer {
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: Vec<BufferCopy>,
    },
    CopyImage {
        src_image: vk::Image,
        src_image_layout: vk::ImageLayout,
        dst_image: vk::Image,
        dst_image_layout: vk::ImageLayout,
        regions: Vec<ImageCopy>,
    },
    CopyBufferToImage {
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: vk::ImageLayout,
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        src_image: vk::Image,
        src_image_layout: vk::ImageLayout,
        dst_buffer: vk::Buffer,
        regions: Vec<BufferImageCopy>,
    },
}
