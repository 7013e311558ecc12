//! Recorder: turns the committed live state of a tick into a snapshot frame.
//!
//! RULES:
//!   - Runs once per tick, after every gameplay subsystem has committed.
//!   - Only in Recording mode with the clock running; otherwise a no-op.
//!   - Capture, then prune. Lookups never see a frame outside the window.

use crate::{
    adapters::AdapterRegistry,
    capacity::PruneReport,
    controller::RewindMode,
    error::{SpineError, SpineResult},
    snapshot::SnapshotEntry,
    spine::TimeSpine,
    types::Tick,
    world::World,
};
use serde::Serialize;

/// What one `record_tick` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub tick:     Tick,
    /// Entries written, or None when the tick was off-interval.
    pub captured: Option<usize>,
    pub pruned:   PruneReport,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Recorder;

impl Recorder {
    pub fn new() -> Self {
        Self
    }

    /// Record `tick`. Returns `Ok(None)` when the gate is closed.
    pub fn record_tick(
        &self,
        tick: Tick,
        mode: RewindMode,
        paused: bool,
        world: &World,
        spine: &mut TimeSpine,
        registry: &AdapterRegistry,
    ) -> SpineResult<Option<RecordReport>> {
        if mode != RewindMode::Recording || paused {
            let err = SpineError::ModeViolation {
                operation: "record_tick",
                mode:      if paused { "paused" } else { mode.name() },
            };
            log::warn!("recorder: {err}");
            return Ok(None);
        }

        let captured = if spine.is_capture_tick(tick) {
            let entries = self.capture_world(tick, world, registry);
            let count = entries.len();
            spine.snapshots_mut().capture(tick, entries)?;
            Some(count)
        } else {
            None
        };

        let pruned = spine.prune(tick);
        spine.state.last_recorded_tick = tick;

        log::debug!(
            "recorder: tick {tick} captured={captured:?} frames={} journal={}",
            spine.snapshots().len(),
            spine.journal().len()
        );
        Ok(Some(RecordReport { tick, captured, pruned }))
    }

    /// Build the full frame for `tick` without touching the store.
    pub fn capture_world(
        &self,
        tick: Tick,
        world: &World,
        registry: &AdapterRegistry,
    ) -> Vec<SnapshotEntry> {
        registry.capture_all(world, tick)
    }
}
