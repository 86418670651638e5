// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Usage transitions as `ResourceBarrier` calls.

Each usage maps to a fixed set of `D3D12_RESOURCE_STATES` bits; a combined usage is the union.
Compute and copy queues only accept a subset of states, so the target state is masked to what
the issuing queue can legally transition to.

A transition whose source and target states are the same is dropped, except UAV to UAV: there
the state does not change but writes still have to be ordered, which is what a UAV barrier is
for.  Queue ownership transfers need no barrier of their own in D3D12; resources decay to
`COMMON` when a queue finishes with them.
*/

use super::Dx12;
use super::native::{ResourceBarrier, ResourceStates, ALL_SUBRESOURCES};
use super::resources::Texture;
use crate::backend::{GpuBuffer, GpuTexture};
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::commands::{BufferBarrier, PipelineBarrierDesc, TextureBarrier};

pub fn resource_states(usage: ResourceUsage) -> ResourceStates {
    let mut states = ResourceStates::COMMON;
    for (bit, state) in [
        (ResourceUsage::COPY_SRC, ResourceStates::COPY_SOURCE),
        (ResourceUsage::COPY_DST, ResourceStates::COPY_DEST),
        (
            ResourceUsage::VERTEX_AND_CONSTANT_BUFFER,
            ResourceStates::VERTEX_AND_CONSTANT_BUFFER,
        ),
        (ResourceUsage::INDEX_BUFFER, ResourceStates::INDEX_BUFFER),
        (ResourceUsage::UNORDERED_ACCESS, ResourceStates::UNORDERED_ACCESS),
        (ResourceUsage::RENDER_TARGET, ResourceStates::RENDER_TARGET),
        (ResourceUsage::DEPTH_WRITE, ResourceStates::DEPTH_WRITE),
        (ResourceUsage::DEPTH_READ, ResourceStates::DEPTH_READ),
        (
            ResourceUsage::SHADER_RESOURCE,
            ResourceStates::NON_PIXEL_SHADER_RESOURCE.union(ResourceStates::PIXEL_SHADER_RESOURCE),
        ),
        (ResourceUsage::INDIRECT_ARGUMENT, ResourceStates::INDIRECT_ARGUMENT),
        (
            ResourceUsage::ACCELERATION_STRUCTURE_READ,
            ResourceStates::RAYTRACING_ACCELERATION_STRUCTURE,
        ),
        (
            ResourceUsage::ACCELERATION_STRUCTURE_WRITE,
            ResourceStates::RAYTRACING_ACCELERATION_STRUCTURE,
        ),
    ] {
        if usage.contains(bit) {
            states |= state;
        }
    }
    states
}

/// States a compute command list may transition to.
const COMPUTE_QUEUE_STATES: ResourceStates = ResourceStates::VERTEX_AND_CONSTANT_BUFFER
    .union(ResourceStates::UNORDERED_ACCESS)
    .union(ResourceStates::NON_PIXEL_SHADER_RESOURCE)
    .union(ResourceStates::INDIRECT_ARGUMENT)
    .union(ResourceStates::COPY_DEST)
    .union(ResourceStates::COPY_SOURCE)
    .union(ResourceStates::RAYTRACING_ACCELERATION_STRUCTURE);

/// States a copy command list may transition to.
const COPY_QUEUE_STATES: ResourceStates = ResourceStates::COPY_DEST.union(ResourceStates::COPY_SOURCE);

/// The state `usage` maps to, limited to what `queue` accepts.
pub fn queue_states(usage: ResourceUsage, queue: QueueType) -> ResourceStates {
    let states = resource_states(usage);
    match queue {
        QueueType::Graphics => states,
        QueueType::Compute => states & COMPUTE_QUEUE_STATES,
        QueueType::Copy => states & COPY_QUEUE_STATES,
    }
}

pub(crate) struct BarrierTranslator {
    pub(crate) queue: QueueType,
}

impl BarrierTranslator {
    /// Builds the barrier batch for `desc`, updating trackers as it goes.  Empty when nothing
    /// needs to be recorded.
    pub(crate) fn translate(&self, desc: &PipelineBarrierDesc<'_, Dx12>) -> Vec<ResourceBarrier> {
        let mut barriers = Vec::new();
        for texture in &desc.textures {
            self.texture(texture, &mut barriers);
        }
        for buffer in &desc.buffers {
            self.buffer(buffer, &mut barriers);
        }
        let orders_uav = desc
            .memory
            .iter()
            .any(|m| m.before != m.after || m.before.contains(ResourceUsage::UNORDERED_ACCESS));
        if orders_uav {
            barriers.push(ResourceBarrier::Uav { resource: None });
        }
        barriers
    }

    fn texture(&self, request: &TextureBarrier<'_, Dx12>, barriers: &mut Vec<ResourceBarrier>) {
        let texture = request.texture;
        let desc = texture.desc();
        let after = request.after;
        let after_state = queue_states(after, self.queue);
        if let Some(transfer) = request.queue_transfer {
            logwise::trace_sync!(
                "{name} moves from the {src} to the {dst} queue through COMMON decay",
                name = logwise::privacy::LogIt(&desc.debug_name),
                src = logwise::privacy::LogIt(&transfer.src),
                dst = logwise::privacy::LogIt(&transfer.dst)
            );
        }
        let Some(partial) = request.subresource else {
            let before = texture.tracker().source_state(request.expected_before, &desc.debug_name);
            let before_state = texture.current_state();
            push_transition(
                barriers,
                request.texture,
                ALL_SUBRESOURCES,
                (before, before_state),
                (after, after_state),
            );
            texture.tracker().transition(after, after_state.bits() as i32);
            return;
        };
        if !partial.range.within(desc) {
            logwise::error_sync!(
                "subresource barrier on {name} is outside the texture; skipped",
                name = logwise::privacy::LogIt(&desc.debug_name)
            );
            return;
        }
        let before_state = queue_states(partial.before, self.queue);
        let range = partial.range;
        for layer in range.base_layer..range.base_layer + range.layer_count {
            for mip in range.base_mip..range.base_mip + range.mip_count {
                push_transition(
                    barriers,
                    texture,
                    texture.subresource_index(mip, layer),
                    (partial.before, before_state),
                    (after, after_state),
                );
            }
        }
    }

    fn buffer(&self, request: &BufferBarrier<'_, Dx12>, barriers: &mut Vec<ResourceBarrier>) {
        let buffer = request.buffer;
        let name = &buffer.desc().debug_name;
        let before = buffer.tracker().source_state(request.expected_before, name);
        let before_state = ResourceStates::from_bits_retain(buffer.tracker().raw_layout() as u32);
        let after = request.after;
        let after_state = queue_states(after, self.queue);
        let resource = buffer.resource();
        if before_state != after_state {
            barriers.push(ResourceBarrier::Transition {
                resource_id: buffer.id(),
                resource,
                subresource: ALL_SUBRESOURCES,
                before: before_state,
                after: after_state,
            });
        } else if ResourceUsage::is_uav_to_uav(before, after) {
            barriers.push(ResourceBarrier::Uav {
                resource: Some(resource),
            });
        }
        buffer.tracker().transition(after, after_state.bits() as i32);
    }
}

fn push_transition(
    barriers: &mut Vec<ResourceBarrier>,
    texture: &Texture,
    subresource: u32,
    (before, before_state): (ResourceUsage, ResourceStates),
    (after, after_state): (ResourceUsage, ResourceStates),
) {
    if before_state != after_state {
        barriers.push(ResourceBarrier::Transition {
            resource_id: texture.id(),
            resource: texture.resource(),
            subresource,
            before: before_state,
            after: after_state,
        });
    } else if ResourceUsage::is_uav_to_uav(before, after) {
        barriers.push(ResourceBarrier::Uav {
            resource: Some(texture.resource()),
        });
    } else {
        logwise::trace_sync!(
            "{name} already in {state}; no barrier",
            name = logwise::privacy::LogIt(&texture.desc().debug_name),
            state = logwise::privacy::LogIt(&after_state)
        );
    }
}
