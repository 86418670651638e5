// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Tracked usage state for GPU resources
//!
//! Every buffer and texture owns a [`UsageTracker`] recording the usage it will be in once all
//! previously encoded barriers for it have executed.  Textures additionally record a native
//! layout (a Vulkan `VkImageLayout`; other backends leave it at zero).
//!
//! # Ownership
//!
//! The tracker is the single source of truth for a resource's state:
//! - anyone may read the state through [`UsageTracker::usage`];
//! - only the barrier translators inside this crate may change it, through
//!   `transition`, which is not public.
//!
//! Bind groups, swap chains and command lists read the state, never write it.
//!
//! # Concurrency
//!
//! Reads and writes are atomic, so a tracker may be shared between threads.  The tracker does not
//! order *competing* transitions though: two command lists transitioning the same resource
//! concurrently race, and the caller must serialize them (typically in one per-frame
//! transition pass).

use crate::bindings::usage::ResourceUsage;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

pub struct UsageTracker {
    usage: AtomicU32,
    layout: AtomicI32,
}

impl UsageTracker {
    pub(crate) fn new(usage: ResourceUsage, layout: i32) -> Self {
        UsageTracker {
            usage: AtomicU32::new(usage.bits()),
            layout: AtomicI32::new(layout),
        }
    }

    /// The usage the resource will be in after every barrier recorded so far.
    pub fn usage(&self) -> ResourceUsage {
        ResourceUsage::from_bits_retain(self.usage.load(Ordering::Acquire))
    }

    /// The raw native layout recorded alongside the usage.
    pub(crate) fn raw_layout(&self) -> i32 {
        self.layout.load(Ordering::Acquire)
    }

    /**
    Picks the source state of a transition.

    The tracked state always wins.  When the caller supplied an expectation that disagrees,
    that is reported as a warning so the stale assumption can be found.
    */
    pub(crate) fn source_state(&self, expected: Option<ResourceUsage>, name: &str) -> ResourceUsage {
        let tracked = self.usage();
        if let Some(expected) = expected
            && expected != tracked
        {
            logwise::warn_sync!(
                "barrier on {name} expected {expected} but the tracked state is {tracked}; using the tracked state",
                name = logwise::privacy::LogIt(&name),
                expected = logwise::privacy::LogIt(&expected),
                tracked = logwise::privacy::LogIt(&tracked)
            );
        }
        tracked
    }

    /// Records a transition, returning the previous `(usage, layout)`.
    pub(crate) fn transition(&self, usage: ResourceUsage, layout: i32) -> (ResourceUsage, i32) {
        let old_usage = self.usage.swap(usage.bits(), Ordering::AcqRel);
        let old_layout = self.layout.swap(layout, Ordering::AcqRel);
        logwise::trace_sync!(
            "usage transition {old} -> {new}",
            old = logwise::privacy::LogIt(&ResourceUsage::from_bits_retain(old_usage)),
            new = logwise::privacy::LogIt(&usage)
        );
        (ResourceUsage::from_bits_retain(old_usage), old_layout)
    }
}

impl Debug for UsageTracker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("usage", &self.usage())
            .field("layout", &self.raw_layout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_chain() {
        let tracker = UsageTracker::new(ResourceUsage::UNDEFINED, 0);
        let (old, _) = tracker.transition(ResourceUsage::COPY_DST, 7);
        assert_eq!(old, ResourceUsage::UNDEFINED);
        let (old, old_layout) = tracker.transition(ResourceUsage::SHADER_RESOURCE, 5);
        assert_eq!(old, ResourceUsage::COPY_DST);
        assert_eq!(old_layout, 7);
        assert_eq!(tracker.usage(), ResourceUsage::SHADER_RESOURCE);
        assert_eq!(tracker.raw_layout(), 5);
    }

    #[test]
    fn tracked_state_beats_expectation() {
        let tracker = UsageTracker::new(ResourceUsage::RENDER_TARGET, 0);
        assert_eq!(
            tracker.source_state(Some(ResourceUsage::COPY_SRC), "t"),
            ResourceUsage::RENDER_TARGET
        );
        assert_eq!(tracker.source_state(None, "t"), ResourceUsage::RENDER_TARGET);
    }
}
