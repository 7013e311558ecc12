//! The time spine: the context object that owns all rewind history.
//!
//! One `TimeSpine` exists per session. It is passed explicitly to the
//! Recorder, the Rewind Controller and the gameplay subsystems; nothing
//! reaches it through global state.

use crate::{
    capacity::{CapacityManager, PruneReport},
    config::SpineConfig,
    error::SpineResult,
    journal::{JournalEntry, MutationJournal},
    snapshot::SnapshotStore,
    types::Tick,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpineState {
    pub last_recorded_tick: Tick,
    pub last_playback_tick: Tick,
    /// Ticks retained; 0 means unbounded.
    pub horizon:            Tick,
}

#[derive(Debug)]
pub struct TimeSpine {
    pub state:         SpineState,
    snapshots:         SnapshotStore,
    journal:           MutationJournal,
    capacity:          CapacityManager,
    snapshot_interval: Tick,
}

impl TimeSpine {
    pub fn new(cfg: &SpineConfig) -> Self {
        Self {
            state: SpineState {
                last_recorded_tick: 0,
                last_playback_tick: 0,
                horizon:            cfg.horizon,
            },
            snapshots:         SnapshotStore::new(),
            journal:           MutationJournal::new(),
            capacity:          CapacityManager::from_config(cfg),
            snapshot_interval: cfg.snapshot_interval.max(1),
        }
    }

    /// Journal append hook for gameplay.
    pub fn append(&mut self, entry: JournalEntry) -> SpineResult<()> {
        self.journal.append(entry)
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn journal(&self) -> &MutationJournal {
        &self.journal
    }

    pub fn snapshot_interval(&self) -> Tick {
        self.snapshot_interval
    }

    /// Whether `tick` gets a full capture.
    pub fn is_capture_tick(&self, tick: Tick) -> bool {
        tick % self.snapshot_interval == 0
    }

    pub(crate) fn snapshots_mut(&mut self) -> &mut SnapshotStore {
        &mut self.snapshots
    }

    pub(crate) fn journal_mut(&mut self) -> &mut MutationJournal {
        &mut self.journal
    }

    /// Prune both stores against `current`.
    pub fn prune(&mut self, current: Tick) -> PruneReport {
        self.capacity
            .enforce(current, &mut self.snapshots, &mut self.journal)
    }

    /// Forget everything after `tick`. The rewound timeline becomes the live one.
    pub fn truncate_after(&mut self, tick: Tick) {
        let frames = self.snapshots.truncate_after(tick);
        let entries = self.journal.truncate_after(tick);
        self.state.last_recorded_tick = self.state.last_recorded_tick.min(tick);
        log::info!("spine: branched at tick {tick}, discarded {frames} frames and {entries} journal entries");
    }

    /// Oldest tick a rewind can still target.
    pub fn oldest_reachable_tick(&self) -> Option<Tick> {
        self.snapshots.oldest_tick()
    }
}
