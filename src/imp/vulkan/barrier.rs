// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Usage transitions as `vkCmdPipelineBarrier` calls.

Access masks are the union of a fixed per-usage table.  Image layouts come from a precedence
table where the first matching usage wins.  Stage masks are the smallest set of stages that can
perform those accesses on the issuing queue, limited to the stages the device supports.

A UAV to UAV transition is not a state change at all but a write-to-read/write hazard, so it gets
its own masks (`SHADER_WRITE` to `SHADER_WRITE | SHADER_READ`, `GENERAL` on both sides) instead of
the table entries.
*/

use super::Vulkan;
use super::native::{BufferMemoryBarrier, ImageMemoryBarrier, ImageSubresourceRange, MemoryBarrier, PipelineBarrier};
use crate::backend::{GpuBuffer, GpuTexture};
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::commands::{BufferBarrier, PipelineBarrierDesc, QueueTransfer, TextureBarrier};
use crate::config::DeviceCapabilities;
use crate::resources::SubresourceRange;
use ash::vk;

pub fn access_flags(usage: ResourceUsage) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    for (bit, access) in [
        (ResourceUsage::COPY_SRC, vk::AccessFlags::TRANSFER_READ),
        (ResourceUsage::COPY_DST, vk::AccessFlags::TRANSFER_WRITE),
        (
            ResourceUsage::VERTEX_AND_CONSTANT_BUFFER,
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ,
        ),
        (ResourceUsage::INDEX_BUFFER, vk::AccessFlags::INDEX_READ),
        (
            ResourceUsage::UNORDERED_ACCESS,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ),
        (
            ResourceUsage::RENDER_TARGET,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (
            ResourceUsage::DEPTH_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (ResourceUsage::DEPTH_READ, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ),
        (ResourceUsage::SHADER_RESOURCE, vk::AccessFlags::SHADER_READ),
        (ResourceUsage::PRESENT, vk::AccessFlags::MEMORY_READ),
        (ResourceUsage::INDIRECT_ARGUMENT, vk::AccessFlags::INDIRECT_COMMAND_READ),
        (
            ResourceUsage::ACCELERATION_STRUCTURE_READ,
            vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR,
        ),
        (
            ResourceUsage::ACCELERATION_STRUCTURE_WRITE,
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        ),
        (
            ResourceUsage::COMMON,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        ),
    ] {
        if usage.contains(bit) {
            flags |= access;
        }
    }
    flags
}

/// The layout for `usage`, or `UNDEFINED` when no usage bit implies one.
pub fn image_layout(usage: ResourceUsage) -> vk::ImageLayout {
    const PRECEDENCE: [(ResourceUsage, vk::ImageLayout); 9] = [
        (ResourceUsage::COPY_SRC, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
        (ResourceUsage::COPY_DST, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
        (ResourceUsage::RENDER_TARGET, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        (ResourceUsage::DEPTH_WRITE, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        (ResourceUsage::DEPTH_READ, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL),
        (ResourceUsage::UNORDERED_ACCESS, vk::ImageLayout::GENERAL),
        (ResourceUsage::SHADER_RESOURCE, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        (ResourceUsage::PRESENT, vk::ImageLayout::PRESENT_SRC_KHR),
        (ResourceUsage::COMMON, vk::ImageLayout::GENERAL),
    ];
    PRECEDENCE
        .iter()
        .find(|(bit, _)| usage.contains(*bit))
        .map(|(_, layout)| *layout)
        .unwrap_or(vk::ImageLayout::UNDEFINED)
}

/// Shader stages that exist on `queue` given the device's capabilities.
fn shader_stage_mask(queue: QueueType, capabilities: &DeviceCapabilities) -> vk::PipelineStageFlags {
    let mut stages = vk::PipelineStageFlags::COMPUTE_SHADER;
    if capabilities.ray_tracing {
        stages |= vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
    }
    if queue != QueueType::Graphics {
        return stages;
    }
    stages |= vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER;
    if capabilities.geometry_shader {
        stages |= vk::PipelineStageFlags::GEOMETRY_SHADER;
    }
    if capabilities.tessellation {
        stages |= vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
            | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER;
    }
    if capabilities.mesh_shader {
        stages |= vk::PipelineStageFlags::TASK_SHADER_EXT | vk::PipelineStageFlags::MESH_SHADER_EXT;
    }
    stages
}

/// Stages a compute queue can execute.
fn compute_queue_stages() -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::TRANSFER
        | vk::PipelineStageFlags::COMPUTE_SHADER
        | vk::PipelineStageFlags::DRAW_INDIRECT
        | vk::PipelineStageFlags::ALL_COMMANDS
        | vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR
        | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR
}

/**
The stages that produce or consume `usage` on `queue`.

Empty for `UNDEFINED` and `PRESENT`; callers substitute `TOP_OF_PIPE`/`BOTTOM_OF_PIPE`.
*/
pub fn pipeline_stages(usage: ResourceUsage, queue: QueueType, capabilities: &DeviceCapabilities) -> vk::PipelineStageFlags {
    let mut stages = vk::PipelineStageFlags::empty();
    if usage.is_undefined() {
        return stages;
    }
    if queue == QueueType::Copy {
        return vk::PipelineStageFlags::ALL_COMMANDS;
    }
    let shaders = shader_stage_mask(queue, capabilities);
    if usage.intersects(ResourceUsage::COPY_SRC | ResourceUsage::COPY_DST) {
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if usage.contains(ResourceUsage::VERTEX_AND_CONSTANT_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_INPUT | shaders;
    }
    if usage.contains(ResourceUsage::INDEX_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if usage.intersects(ResourceUsage::UNORDERED_ACCESS | ResourceUsage::SHADER_RESOURCE) {
        stages |= shaders;
    }
    if usage.contains(ResourceUsage::RENDER_TARGET) {
        stages |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if usage.intersects(ResourceUsage::DEPTH_WRITE | ResourceUsage::DEPTH_READ) {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if usage.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        stages |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if usage.intersects(ResourceUsage::ACCELERATION_STRUCTURE_READ | ResourceUsage::ACCELERATION_STRUCTURE_WRITE)
        && capabilities.ray_tracing
    {
        stages |= vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
    }
    if usage.contains(ResourceUsage::COMMON) {
        stages |= vk::PipelineStageFlags::ALL_COMMANDS;
    }
    if queue == QueueType::Compute {
        stages &= compute_queue_stages();
    }
    stages
}

/// Translates barrier descriptions recorded on one queue.
#[derive(Debug)]
pub(crate) struct BarrierTranslator<'a> {
    pub(crate) queue: QueueType,
    pub(crate) capabilities: &'a DeviceCapabilities,
    /// Queue family index per [`QueueType::index`].
    pub(crate) families: [u32; 3],
}

impl BarrierTranslator<'_> {
    /**
    Builds one barrier command for `desc`, updating trackers as it goes.

    Returns `None` when every transition in `desc` turned out to be a no-op.
    */
    pub(crate) fn translate(&self, desc: &PipelineBarrierDesc<'_, Vulkan>) -> Option<PipelineBarrier> {
        let mut barrier = PipelineBarrier {
            src_stage_mask: vk::PipelineStageFlags::empty(),
            dst_stage_mask: vk::PipelineStageFlags::empty(),
            memory_barriers: Vec::new(),
            buffer_memory_barriers: Vec::new(),
            image_memory_barriers: Vec::new(),
        };
        for texture in &desc.textures {
            self.texture(texture, &mut barrier);
        }
        for buffer in &desc.buffers {
            self.buffer(buffer, &mut barrier);
        }
        for memory in &desc.memory {
            if memory.before == memory.after && !memory.before.contains(ResourceUsage::UNORDERED_ACCESS) {
                continue;
            }
            let (src, dst) = self.accesses(memory.before, memory.after);
            barrier.memory_barriers.push(MemoryBarrier {
                src_access_mask: src,
                dst_access_mask: dst,
            });
            self.add_stages(&mut barrier, memory.before, memory.after);
        }
        if barrier.memory_barriers.is_empty()
            && barrier.buffer_memory_barriers.is_empty()
            && barrier.image_memory_barriers.is_empty()
        {
            return None;
        }
        if barrier.src_stage_mask.is_empty() {
            barrier.src_stage_mask = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        if barrier.dst_stage_mask.is_empty() {
            barrier.dst_stage_mask = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }
        Some(barrier)
    }

    fn accesses(&self, before: ResourceUsage, after: ResourceUsage) -> (vk::AccessFlags, vk::AccessFlags) {
        if ResourceUsage::is_uav_to_uav(before, after) {
            (
                vk::AccessFlags::SHADER_WRITE,
                vk::AccessFlags::SHADER_WRITE | vk::AccessFlags::SHADER_READ,
            )
        } else {
            (access_flags(before), access_flags(after))
        }
    }

    fn add_stages(&self, barrier: &mut PipelineBarrier, before: ResourceUsage, after: ResourceUsage) {
        barrier.src_stage_mask |= pipeline_stages(before, self.queue, self.capabilities);
        barrier.dst_stage_mask |= pipeline_stages(after, self.queue, self.capabilities);
    }

    fn queue_families(&self, transfer: Option<QueueTransfer>, before: ResourceUsage) -> (u32, u32) {
        match transfer {
            Some(transfer) if !before.is_undefined() => (
                self.families[transfer.src.index()],
                self.families[transfer.dst.index()],
            ),
            _ => (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED),
        }
    }

    fn texture(&self, request: &TextureBarrier<'_, Vulkan>, barrier: &mut PipelineBarrier) {
        let texture = request.texture;
        let desc = texture.desc();
        let (before, tracked_layout, range) = match request.subresource {
            Some(partial) => {
                if !partial.range.within(desc) {
                    logwise::error_sync!(
                        "subresource barrier on {name} is outside the texture; skipped",
                        name = logwise::privacy::LogIt(&desc.debug_name)
                    );
                    return;
                }
                (partial.before, image_layout(partial.before), partial.range)
            }
            None => (
                texture.tracker().source_state(request.expected_before, &desc.debug_name),
                texture.current_layout(),
                SubresourceRange::all(desc),
            ),
        };
        let after = request.after;
        if before == after && !before.contains(ResourceUsage::UNORDERED_ACCESS) && request.queue_transfer.is_none() {
            logwise::trace_sync!(
                "{name} already in {usage}; no barrier",
                name = logwise::privacy::LogIt(&desc.debug_name),
                usage = logwise::privacy::LogIt(&after)
            );
            return;
        }
        let (old_layout, new_layout) = if ResourceUsage::is_uav_to_uav(before, after) {
            (vk::ImageLayout::GENERAL, vk::ImageLayout::GENERAL)
        } else {
            let new_layout = match image_layout(after) {
                vk::ImageLayout::UNDEFINED => {
                    logwise::warn_sync!(
                        "no image layout for {usage} on {name}; keeping {layout}",
                        usage = logwise::privacy::LogIt(&after),
                        name = logwise::privacy::LogIt(&desc.debug_name),
                        layout = logwise::privacy::LogIt(&tracked_layout)
                    );
                    tracked_layout
                }
                layout => layout,
            };
            (tracked_layout, new_layout)
        };
        let (src_access_mask, dst_access_mask) = self.accesses(before, after);
        let (src_queue_family_index, dst_queue_family_index) = self.queue_families(request.queue_transfer, before);
        barrier.image_memory_barriers.push(ImageMemoryBarrier {
            resource: texture.id(),
            src_access_mask,
            dst_access_mask,
            old_layout,
            new_layout,
            src_queue_family_index,
            dst_queue_family_index,
            image: texture.image(),
            subresource_range: ImageSubresourceRange {
                aspect_mask: texture.aspect(),
                base_mip_level: range.base_mip,
                level_count: range.mip_count,
                base_array_layer: range.base_layer,
                layer_count: range.layer_count,
            },
        });
        self.add_stages(barrier, before, after);
        if request.subresource.is_none() {
            texture.tracker().transition(after, new_layout.as_raw());
        }
    }

    fn buffer(&self, request: &BufferBarrier<'_, Vulkan>, barrier: &mut PipelineBarrier) {
        let buffer = request.buffer;
        let name = &buffer.desc().debug_name;
        let before = buffer.tracker().source_state(request.expected_before, name);
        let after = request.after;
        if before == after && !before.contains(ResourceUsage::UNORDERED_ACCESS) && request.queue_transfer.is_none() {
            logwise::trace_sync!(
                "{name} already in {usage}; no barrier",
                name = logwise::privacy::LogIt(name),
                usage = logwise::privacy::LogIt(&after)
            );
            return;
        }
        let (src_access_mask, dst_access_mask) = self.accesses(before, after);
        let (src_queue_family_index, dst_queue_family_index) = self.queue_families(request.queue_transfer, before);
        barrier.buffer_memory_barriers.push(BufferMemoryBarrier {
            resource: buffer.id(),
            src_access_mask,
            dst_access_mask,
            src_queue_family_index,
            dst_queue_family_index,
            buffer: buffer.handle(),
            offset: 0,
            size: vk::WHOLE_SIZE,
        });
        self.add_stages(barrier, before, after);
        buffer.tracker().transition(after, 0);
    }
}
