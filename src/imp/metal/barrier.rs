// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Usage transitions for a backend without transitions.

Metal has no layouts and no per-resource barriers.  What remains of a transition is ordering:
either a `memoryBarrierWithScope:` inside the current render or compute encoder, or a fence
between the encoder that produced the data and the one that consumes it.  The translator only
decides which of the two a barrier needs; the command list places it.

Trackers are still updated so usages reported to the application, and the no-op rule, behave
like the other backends.
*/

use super::Metal;
use super::native::{BarrierScope, RenderStages};
use crate::backend::{GpuBuffer, GpuTexture};
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::commands::{BufferBarrier, PipelineBarrierDesc, TextureBarrier};
use crate::encoder::EncoderKind;
use crate::resources::{ResourceId, SubresourceRange};

/// A usage change recorded by a barrier, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// `None` for global memory barriers.
    pub resource: Option<ResourceId>,
    pub before: ResourceUsage,
    pub after: ResourceUsage,
    /// Set for partial texture barriers.
    pub subresource: Option<SubresourceRange>,
}

const ATTACHMENT: ResourceUsage = ResourceUsage::RENDER_TARGET
    .union(ResourceUsage::DEPTH_WRITE)
    .union(ResourceUsage::DEPTH_READ);

/// Render stages that read or write `usage`.
pub fn usage_stages(usage: ResourceUsage) -> RenderStages {
    let mut stages = RenderStages::empty();
    if usage.intersects(ResourceUsage::INDEX_BUFFER | ResourceUsage::INDIRECT_ARGUMENT) {
        stages |= RenderStages::VERTEX;
    }
    if usage.intersects(
        ResourceUsage::VERTEX_AND_CONSTANT_BUFFER
            | ResourceUsage::SHADER_RESOURCE
            | ResourceUsage::UNORDERED_ACCESS
            | ResourceUsage::COMMON,
    ) {
        stages |= RenderStages::VERTEX | RenderStages::FRAGMENT;
    }
    if usage.intersects(ATTACHMENT) {
        stages |= RenderStages::FRAGMENT;
    }
    stages
}

/**
Whether an encoder of `kind` can order `usage` with a memory barrier of its own.

Copies and presentation belong to other encoders or to the drawable, and an attachment cannot be
ordered against itself inside its own render pass, so those always take a fence.
*/
pub fn encoder_absorbs(kind: EncoderKind, usage: ResourceUsage) -> bool {
    let shader = ResourceUsage::SHADER_RESOURCE
        | ResourceUsage::UNORDERED_ACCESS
        | ResourceUsage::VERTEX_AND_CONSTANT_BUFFER
        | ResourceUsage::INDIRECT_ARGUMENT;
    match kind {
        EncoderKind::Render => (shader | ResourceUsage::INDEX_BUFFER).contains(usage),
        EncoderKind::Compute => shader.contains(usage),
        EncoderKind::None | EncoderKind::Blit | EncoderKind::AccelerationStructure => false,
    }
}

/// The ordering one `pipeline_barrier` call asks for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncoderBarrier {
    pub(crate) scope: BarrierScope,
    pub(crate) after_stages: RenderStages,
    pub(crate) before_stages: RenderStages,
    /// Every usage on either side of a recorded transition.
    pub(crate) touched: ResourceUsage,
    pub(crate) transitions: Vec<Transition>,
}

impl EncoderBarrier {
    fn add(&mut self, transition: Transition, scope: BarrierScope) {
        self.scope |= scope;
        self.after_stages |= usage_stages(transition.before);
        self.before_stages |= usage_stages(transition.after);
        self.touched |= transition.before | transition.after;
        self.transitions.push(transition);
    }
}

fn texture_scope(before: ResourceUsage, after: ResourceUsage) -> BarrierScope {
    if (before | after).intersects(ATTACHMENT) {
        BarrierScope::TEXTURES | BarrierScope::RENDER_TARGETS
    } else {
        BarrierScope::TEXTURES
    }
}

#[derive(Debug)]
pub(crate) struct BarrierTranslator {
    pub(crate) queue: QueueType,
}

impl BarrierTranslator {
    /// Resolves `desc`, updating trackers.  `None` when every transition was a no-op.
    pub(crate) fn translate(&self, desc: &PipelineBarrierDesc<'_, Metal>) -> Option<EncoderBarrier> {
        let mut barrier = EncoderBarrier {
            scope: BarrierScope::empty(),
            after_stages: RenderStages::empty(),
            before_stages: RenderStages::empty(),
            touched: ResourceUsage::UNDEFINED,
            transitions: Vec::new(),
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
            barrier.add(
                Transition {
                    resource: None,
                    before: memory.before,
                    after: memory.after,
                    subresource: None,
                },
                BarrierScope::BUFFERS | texture_scope(memory.before, memory.after),
            );
        }
        if barrier.transitions.is_empty() {
            return None;
        }
        if barrier.after_stages.is_empty() {
            barrier.after_stages = RenderStages::VERTEX | RenderStages::FRAGMENT;
        }
        if barrier.before_stages.is_empty() {
            barrier.before_stages = RenderStages::VERTEX | RenderStages::FRAGMENT;
        }
        Some(barrier)
    }

    fn texture(&self, request: &TextureBarrier<'_, Metal>, barrier: &mut EncoderBarrier) {
        let texture = request.texture;
        let desc = texture.desc();
        let before = match request.subresource {
            Some(partial) => {
                if !partial.range.within(desc) {
                    logwise::error_sync!(
                        "subresource barrier on {name} is outside the texture; skipped",
                        name = logwise::privacy::LogIt(&desc.debug_name)
                    );
                    return;
                }
                partial.before
            }
            None => texture.tracker().source_state(request.expected_before, &desc.debug_name),
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
        if let Some(transfer) = request.queue_transfer {
            self.note_transfer(&desc.debug_name, transfer.src, transfer.dst);
        }
        barrier.add(
            Transition {
                resource: Some(texture.id()),
                before,
                after,
                subresource: request.subresource.map(|p| p.range),
            },
            texture_scope(before, after),
        );
        if request.subresource.is_none() {
            texture.tracker().transition(after, 0);
        }
    }

    fn buffer(&self, request: &BufferBarrier<'_, Metal>, barrier: &mut EncoderBarrier) {
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
        if let Some(transfer) = request.queue_transfer {
            self.note_transfer(name, transfer.src, transfer.dst);
        }
        barrier.add(
            Transition {
                resource: Some(buffer.id()),
                before,
                after,
                subresource: None,
            },
            BarrierScope::BUFFERS,
        );
        buffer.tracker().transition(after, 0);
    }

    /// Resources are not owned by a queue in Metal; cross-queue order comes from shared events.
    fn note_transfer(&self, name: &str, src: QueueType, dst: QueueType) {
        logwise::trace_sync!(
            "{name}: {src} to {dst} transfer recorded on {queue} needs no ownership change",
            name = logwise::privacy::LogIt(&name),
            src = logwise::privacy::LogIt(&src),
            dst = logwise::privacy::LogIt(&dst),
            queue = logwise::privacy::LogIt(&self.queue)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_table() {
        assert_eq!(usage_stages(ResourceUsage::RENDER_TARGET), RenderStages::FRAGMENT);
        assert_eq!(usage_stages(ResourceUsage::INDEX_BUFFER), RenderStages::VERTEX);
        assert_eq!(
            usage_stages(ResourceUsage::UNORDERED_ACCESS),
            RenderStages::VERTEX | RenderStages::FRAGMENT
        );
        assert!(usage_stages(ResourceUsage::COPY_DST | ResourceUsage::PRESENT).is_empty());
    }

    #[test]
    fn encoders_absorb_shader_hazards_only() {
        let uav = ResourceUsage::UNORDERED_ACCESS;
        assert!(encoder_absorbs(EncoderKind::Compute, uav));
        assert!(encoder_absorbs(EncoderKind::Render, uav | ResourceUsage::SHADER_RESOURCE));
        assert!(encoder_absorbs(EncoderKind::Render, ResourceUsage::INDEX_BUFFER));
        assert!(!encoder_absorbs(EncoderKind::Compute, ResourceUsage::INDEX_BUFFER));
        assert!(!encoder_absorbs(EncoderKind::Render, ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_RESOURCE));
        assert!(!encoder_absorbs(EncoderKind::Compute, uav | ResourceUsage::COPY_SRC));
        assert!(!encoder_absorbs(EncoderKind::Blit, ResourceUsage::COPY_SRC));
        assert!(!encoder_absorbs(EncoderKind::None, uav));
    }

    #[test]
    fn attachments_widen_the_scope() {
        assert_eq!(
            texture_scope(ResourceUsage::RENDER_TARGET, ResourceUsage::SHADER_RESOURCE),
            BarrierScope::TEXTURES | BarrierScope::RENDER_TARGETS
        );
        assert_eq!(
            texture_scope(ResourceUsage::UNORDERED_ACCESS, ResourceUsage::UNORDERED_ACCESS),
            BarrierScope::TEXTURES
        );
    }
}
