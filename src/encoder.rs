// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The encoder state machine and deferred-binding cache shared by every command list.

Metal records work through one typed encoder at a time (render, compute, blit,
acceleration-structure) and loses all bound state when the encoder ends.  Vulkan and D3D12 do not
have that restriction, but render-pass scoping gives them a weaker version of the same problem.
Every backend therefore runs the same machine:

* [`EncoderState`] knows which encoder is active and plans the end/begin pair a switch needs;
  switching to the active encoder plans nothing;
* [`BindingCache`] remembers what the application bound and which bind point (graphics or
  compute) still has to see it natively.  Nothing is re-issued until a draw or dispatch needs
  it.
*/

use crate::commands::{IndexFormat, ScissorRect, Viewport};
use crate::error::fatal;
use crate::pipeline::PipelineKind;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncoderKind {
    #[default]
    None,
    Render,
    Compute,
    Blit,
    AccelerationStructure,
}

/// An encoder switch: end `from` (if not `None`), then begin `to` (if not `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EncoderSwitch {
    pub(crate) from: EncoderKind,
    pub(crate) to: EncoderKind,
}

#[derive(Debug, Default)]
pub(crate) struct EncoderState {
    active: EncoderKind,
    created: u32,
}

impl EncoderState {
    pub(crate) fn active(&self) -> EncoderKind {
        self.active
    }

    /// Encoders begun since the last reset.
    pub(crate) fn created(&self) -> u32 {
        self.created
    }

    /// Plans the switch to `to`, or `None` when `to` is already active.
    pub(crate) fn switch_to(&mut self, to: EncoderKind) -> Option<EncoderSwitch> {
        if self.active == to {
            return None;
        }
        let switch = EncoderSwitch { from: self.active, to };
        logwise::trace_sync!(
            "encoder switch {from} -> {to}",
            from = logwise::privacy::LogIt(&switch.from),
            to = logwise::privacy::LogIt(&switch.to)
        );
        self.active = to;
        if to != EncoderKind::None {
            self.created += 1;
        }
        Some(switch)
    }

    /**
    Fatal unless graphics work may be recorded now.

    Graphics operations never end a compute, blit or acceleration-structure encoder on their own;
    the caller returns to rendering with an explicit switch to [`EncoderKind::Render`].  An idle
    encoder is fine: inside a rendering scope it only follows a barrier that had to end the
    render encoder.
    */
    pub(crate) fn require_graphics(&self, op: &str) {
        match self.active {
            EncoderKind::None | EncoderKind::Render => {}
            active => fatal!("{op} is graphics-only, active encoder is {active:?}"),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.active = EncoderKind::None;
        self.created = 0;
    }
}

/// Encoder-scoped render state: re-applied whenever a render encoder begins.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderState<H> {
    pub(crate) viewport: Option<Viewport>,
    pub(crate) scissor: Option<ScissorRect>,
    pub(crate) vertex_buffers: BTreeMap<u32, (H, u64)>,
    pub(crate) index_buffer: Option<(H, u64, IndexFormat)>,
}

impl<H> Default for RenderState<H> {
    fn default() -> Self {
        RenderState {
            viewport: None,
            scissor: None,
            vertex_buffers: BTreeMap::new(),
            index_buffer: None,
        }
    }
}

/**
Logically bound state, with per-bind-point dirty tracking.

`P` is the backend's pipeline snapshot, `G` its bind-group snapshot, and `H` its native buffer
handle.
*/
#[derive(Debug)]
pub(crate) struct BindingCache<P, G, H> {
    pipelines: [Option<P>; 2],
    pipeline_dirty: [bool; 2],
    groups: BTreeMap<u32, G>,
    group_dirty: [BTreeSet<u32>; 2],
    render: RenderState<H>,
    render_dirty: bool,
}

impl<P: Clone, G: Clone, H: Clone> Default for BindingCache<P, G, H> {
    fn default() -> Self {
        BindingCache {
            pipelines: [None, None],
            pipeline_dirty: [false, false],
            groups: BTreeMap::new(),
            group_dirty: [BTreeSet::new(), BTreeSet::new()],
            render: RenderState::default(),
            render_dirty: false,
        }
    }
}

impl<P: Clone, G: Clone, H: Clone> BindingCache<P, G, H> {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Binding a pipeline disturbs everything bound for its bind point.
    pub(crate) fn set_pipeline(&mut self, kind: PipelineKind, pipeline: P) {
        let i = kind.index();
        self.pipelines[i] = Some(pipeline);
        self.pipeline_dirty[i] = true;
        self.group_dirty[i].extend(self.groups.keys().copied());
    }

    pub(crate) fn pipeline(&self, kind: PipelineKind) -> Option<&P> {
        self.pipelines[kind.index()].as_ref()
    }

    pub(crate) fn set_group(&mut self, space: u32, group: G) {
        self.groups.insert(space, group);
        for dirty in &mut self.group_dirty {
            dirty.insert(space);
        }
    }

    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        self.render.viewport = Some(viewport);
        self.render_dirty = true;
    }

    pub(crate) fn set_scissor(&mut self, scissor: ScissorRect) {
        self.render.scissor = Some(scissor);
        self.render_dirty = true;
    }

    pub(crate) fn set_vertex_buffer(&mut self, slot: u32, buffer: H, offset: u64) {
        self.render.vertex_buffers.insert(slot, (buffer, offset));
        self.render_dirty = true;
    }

    pub(crate) fn set_index_buffer(&mut self, buffer: H, offset: u64, format: IndexFormat) {
        self.render.index_buffer = Some((buffer, offset, format));
        self.render_dirty = true;
    }

    pub(crate) fn index_buffer(&self) -> Option<&(H, u64, IndexFormat)> {
        self.render.index_buffer.as_ref()
    }

    /**
    Updates dirtiness for a freshly begun encoder.

    A render encoder needs its encoder-scoped state again.  When `invalidate_bindings` is set
    (Metal), the new encoder starts with nothing bound, so pipelines and groups are dirty too.
    */
    pub(crate) fn on_encoder_begin(&mut self, kind: EncoderKind, invalidate_bindings: bool) {
        if kind == EncoderKind::Render {
            self.render_dirty = true;
        }
        if invalidate_bindings {
            for i in 0..2 {
                self.pipeline_dirty[i] = self.pipelines[i].is_some();
                self.group_dirty[i].extend(self.groups.keys().copied());
            }
        }
    }

    /// The pipeline for `kind` if it still has to be issued.
    pub(crate) fn take_pipeline(&mut self, kind: PipelineKind) -> Option<P> {
        let i = kind.index();
        if std::mem::take(&mut self.pipeline_dirty[i]) {
            self.pipelines[i].clone()
        } else {
            None
        }
    }

    /// Groups that still have to be issued for `kind`, by ascending space.
    pub(crate) fn take_groups(&mut self, kind: PipelineKind) -> Vec<(u32, G)> {
        let dirty = std::mem::take(&mut self.group_dirty[kind.index()]);
        dirty
            .into_iter()
            .filter_map(|space| self.groups.get(&space).map(|g| (space, g.clone())))
            .collect()
    }

    /// The render state if it has to be (re)applied.
    pub(crate) fn take_render_state(&mut self) -> Option<RenderState<H>> {
        if std::mem::take(&mut self.render_dirty) {
            Some(self.render.clone())
        } else {
            None
        }
    }

    pub(crate) fn has_dirty_groups(&self, kind: PipelineKind) -> bool {
        !self.group_dirty[kind.index()].is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_to_active_encoder_is_a_no_op() {
        let mut state = EncoderState::default();
        assert_eq!(
            state.switch_to(EncoderKind::Render),
            Some(EncoderSwitch {
                from: EncoderKind::None,
                to: EncoderKind::Render
            })
        );
        assert_eq!(state.switch_to(EncoderKind::Render), None);
        assert_eq!(state.created(), 1);
        assert_eq!(
            state.switch_to(EncoderKind::Compute),
            Some(EncoderSwitch {
                from: EncoderKind::Render,
                to: EncoderKind::Compute
            })
        );
        assert_eq!(state.created(), 2);
        state.switch_to(EncoderKind::None);
        assert_eq!(state.active(), EncoderKind::None);
        assert_eq!(state.created(), 2);
    }

    #[test]
    fn graphics_is_allowed_from_render_or_idle() {
        let mut state = EncoderState::default();
        state.require_graphics("draw");
        state.switch_to(EncoderKind::Render);
        state.require_graphics("draw");
    }

    #[test]
    #[should_panic(expected = "draw is graphics-only, active encoder is Compute")]
    fn graphics_during_compute_is_fatal() {
        let mut state = EncoderState::default();
        state.switch_to(EncoderKind::Compute);
        state.require_graphics("draw");
    }

    #[test]
    #[should_panic(expected = "bind_vertex_buffer is graphics-only, active encoder is Blit")]
    fn graphics_during_blit_is_fatal() {
        let mut state = EncoderState::default();
        state.switch_to(EncoderKind::Blit);
        state.require_graphics("bind_vertex_buffer");
    }

    #[test]
    fn groups_are_deferred_per_bind_point() {
        let mut cache: BindingCache<&str, &str, u64> = BindingCache::default();
        cache.set_group(0, "frame");
        cache.set_group(1, "material");
        assert_eq!(cache.take_groups(PipelineKind::Graphics), vec![(0, "frame"), (1, "material")]);
        assert!(cache.take_groups(PipelineKind::Graphics).is_empty());
        // compute never consumed them
        assert_eq!(cache.take_groups(PipelineKind::Compute).len(), 2);
    }

    #[test]
    fn rebinding_pipeline_dirties_its_groups() {
        let mut cache: BindingCache<&str, &str, u64> = BindingCache::default();
        cache.set_group(0, "frame");
        cache.set_pipeline(PipelineKind::Graphics, "opaque");
        assert_eq!(cache.take_pipeline(PipelineKind::Graphics), Some("opaque"));
        cache.take_groups(PipelineKind::Graphics);
        assert_eq!(cache.take_pipeline(PipelineKind::Graphics), None);
        cache.set_pipeline(PipelineKind::Graphics, "transparent");
        assert_eq!(cache.take_groups(PipelineKind::Graphics), vec![(0, "frame")]);
    }

    #[test]
    fn render_state_returns_after_render_encoder_begins() {
        let mut cache: BindingCache<&str, &str, u64> = BindingCache::default();
        cache.set_viewport(Viewport::new(8.0, 8.0));
        assert!(cache.take_render_state().is_some());
        assert!(cache.take_render_state().is_none());
        cache.on_encoder_begin(EncoderKind::Compute, false);
        assert!(cache.take_render_state().is_none());
        cache.on_encoder_begin(EncoderKind::Render, false);
        let state = cache.take_render_state().unwrap();
        assert_eq!(state.viewport, Some(Viewport::new(8.0, 8.0)));
    }

    #[test]
    fn invalidation_dirties_everything_bound() {
        let mut cache: BindingCache<&str, &str, u64> = BindingCache::default();
        cache.set_pipeline(PipelineKind::Compute, "cs");
        cache.set_group(2, "g");
        cache.take_pipeline(PipelineKind::Compute);
        cache.take_groups(PipelineKind::Compute);
        cache.on_encoder_begin(EncoderKind::Compute, true);
        assert_eq!(cache.take_pipeline(PipelineKind::Compute), Some("cs"));
        assert_eq!(cache.take_pipeline(PipelineKind::Graphics), None);
        assert_eq!(cache.take_groups(PipelineKind::Compute), vec![(2, "g")]);
    }
}
