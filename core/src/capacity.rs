//! Capacity manager: one cutoff, applied to both stores.
//!
//! The window keeps exactly `horizon` ticks ending at the current tick:
//!   cutoff = max(0, current + 1 - horizon)
//! so after recording tick 250 with a horizon of 100 the oldest retained
//! tick is 151. An optional journal entry cap can only raise the cutoff,
//! and it always drops whole ticks.
//!
//! The cutoff never passes the newest frame at or before the current tick,
//! so the baseline needed to rebuild the current tick is always retained,
//! together with the journal entries replayed on top of it.

use crate::{
    config::SpineConfig,
    journal::MutationJournal,
    snapshot::SnapshotStore,
    types::Tick,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub cutoff:          Tick,
    pub frames_removed:  usize,
    pub entries_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityManager {
    horizon:             Tick,
    max_journal_entries: usize,
}

impl CapacityManager {
    /// `horizon == 0` disables tick-based pruning.
    pub fn new(horizon: Tick, max_journal_entries: usize) -> Self {
        Self { horizon, max_journal_entries }
    }

    pub fn from_config(cfg: &SpineConfig) -> Self {
        Self::new(cfg.horizon, cfg.max_journal_entries)
    }

    pub fn is_unbounded(&self) -> bool {
        self.horizon == 0 && self.max_journal_entries == 0
    }

    /// Tick-horizon cutoff alone.
    pub fn tick_cutoff(&self, current: Tick) -> Tick {
        if self.horizon == 0 {
            return 0;
        }
        (current + 1).saturating_sub(self.horizon)
    }

    /// Cutoff shared by both stores. Clamped to the newest frame at or
    /// before `current`; with no such frame nothing is pruned.
    pub fn cutoff(&self, current: Tick, snapshots: &SnapshotStore, journal: &MutationJournal) -> Tick {
        let by_count = journal.count_cutoff(self.max_journal_entries).unwrap_or(0);
        let baseline = snapshots.find_latest_at_or_before(current).unwrap_or(0);
        self.tick_cutoff(current).max(by_count).min(current).min(baseline)
    }

    pub fn enforce(
        &self,
        current: Tick,
        snapshots: &mut SnapshotStore,
        journal: &mut MutationJournal,
    ) -> PruneReport {
        let cutoff = self.cutoff(current, snapshots, journal);
        let frames_removed = snapshots.prune(cutoff);
        let entries_removed = journal.prune(cutoff);
        if frames_removed > 0 || entries_removed > 0 {
            log::debug!(
                "capacity: cutoff={cutoff} dropped {frames_removed} frames, {entries_removed} journal entries"
            );
        }
        PruneReport { cutoff, frames_removed, entries_removed }
    }
}
