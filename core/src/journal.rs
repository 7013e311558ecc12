//! Mutation journal: an append-only, tick-ordered log of gameplay mutations.
//!
//! Gameplay appends an entry at the moment it mutates live state. Rewind
//! replays the entries between a snapshot tick and the target tick to get
//! from the snapshot baseline to the exact target state.
//!
//! RULES:
//!   - Entries are immutable once written.
//!   - Ticks never decrease along the log.
//!   - Appends are only accepted while the journal is open (Recording).

use crate::{
    error::{SpineError, SpineResult},
    snapshot::DomainTag,
    types::{EntityId, Position, ResourceType, Tick},
    world::SkillDiscipline,
};
use serde::{Deserialize, Serialize};
use std::collections::{vec_deque, VecDeque};

/// Stable operation enumeration understood by the replay handlers.
/// Variants are appended only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Units moved from a resource node into a vessel hold.
    Gather,
    /// A vessel spilled its hold as a pickup.
    Spawn,
    /// A carrier collected a pickup into storage.
    Pickup,
    /// An agent earned experience in one discipline.
    SkillGain,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Gather,
        OperationKind::Spawn,
        OperationKind::Pickup,
        OperationKind::SkillGain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gather    => "gather",
            Self::Spawn     => "spawn",
            Self::Pickup    => "pickup",
            Self::SkillGain => "skill_gain",
        }
    }
}

/// What an entry moves: a quantity of a resource or experience in a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item", content = "value", rename_all = "snake_case")]
pub enum Item {
    Resource(ResourceType),
    Skill(SkillDiscipline),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub tick:     Tick,
    pub kind:     OperationKind,
    pub source:   Option<EntityId>,
    pub target:   Option<EntityId>,
    pub domain:   DomainTag,
    pub item:     Item,
    pub amount:   f32,
    pub position: Option<Position>,
}

impl JournalEntry {
    pub fn gather(
        tick: Tick,
        node: EntityId,
        vessel: EntityId,
        resource: ResourceType,
        amount: f32,
    ) -> Self {
        Self {
            tick,
            kind:     OperationKind::Gather,
            source:   Some(node),
            target:   Some(vessel),
            domain:   DomainTag::ResourceNode,
            item:     Item::Resource(resource),
            amount,
            position: None,
        }
    }

    pub fn spawn(
        tick: Tick,
        vessel: EntityId,
        resource: ResourceType,
        amount: f32,
        position: Position,
    ) -> Self {
        Self {
            tick,
            kind:     OperationKind::Spawn,
            source:   Some(vessel),
            target:   None,
            domain:   DomainTag::Pickup,
            item:     Item::Resource(resource),
            amount,
            position: Some(position),
        }
    }

    /// `pickup` is informational only; pickup handles do not survive a rewind,
    /// so replay matches the pickup by resource, position and amount.
    pub fn pickup(
        tick: Tick,
        pickup: EntityId,
        carrier: EntityId,
        resource: ResourceType,
        amount: f32,
        position: Position,
    ) -> Self {
        Self {
            tick,
            kind:     OperationKind::Pickup,
            source:   Some(pickup),
            target:   Some(carrier),
            domain:   DomainTag::StorageSlot,
            item:     Item::Resource(resource),
            amount,
            position: Some(position),
        }
    }

    pub fn skill_gain(tick: Tick, agent: EntityId, discipline: SkillDiscipline, delta: f32) -> Self {
        Self {
            tick,
            kind:     OperationKind::SkillGain,
            source:   None,
            target:   Some(agent),
            domain:   DomainTag::Skills,
            item:     Item::Skill(discipline),
            amount:   delta,
            position: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MutationJournal {
    entries: VecDeque<JournalEntry>,
    sealed:  bool,
}

impl MutationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. O(1) amortized.
    pub fn append(&mut self, entry: JournalEntry) -> SpineResult<()> {
        if self.sealed {
            return Err(SpineError::ModeViolation {
                operation: "journal append",
                mode:      "sealed",
            });
        }
        if let Some(newest) = self.newest_tick() {
            if entry.tick < newest {
                return Err(SpineError::JournalOrder { tick: entry.tick, newest });
            }
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Stop accepting appends (Playback / CatchUp).
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn unseal(&mut self) {
        self.sealed = false;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Remove every entry strictly older than `cutoff`. Returns the count removed.
    pub fn prune(&mut self, cutoff: Tick) -> usize {
        let mut removed = 0;
        while self.entries.front().is_some_and(|e| e.tick < cutoff) {
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Drop entries newer than `tick` (the timeline branched at `tick`).
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        let keep = self.entries.partition_point(|e| e.tick <= tick);
        let removed = self.entries.len() - keep;
        self.entries.truncate(keep);
        removed
    }

    /// Entries with `from_exclusive < tick <= to_inclusive`, ascending.
    /// The returned iterator is lazy and can be cloned to restart it.
    pub fn replay_range(&self, from_exclusive: Tick, to_inclusive: Tick) -> ReplayRange<'_> {
        if from_exclusive >= to_inclusive {
            return ReplayRange { inner: self.entries.range(0..0) };
        }
        let start = self.entries.partition_point(|e| e.tick <= from_exclusive);
        let end = self.entries.partition_point(|e| e.tick <= to_inclusive);
        ReplayRange { inner: self.entries.range(start..end) }
    }

    /// Smallest tick such that keeping entries at or after it stays within
    /// `max_entries`. Never splits a tick.
    pub fn count_cutoff(&self, max_entries: usize) -> Option<Tick> {
        if max_entries == 0 || self.entries.len() <= max_entries {
            return None;
        }
        let last_excess = self.entries.len() - max_entries - 1;
        Some(self.entries[last_excess].tick + 1)
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.entries.front().map(|e| e.tick)
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.entries.back().map(|e| e.tick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }
}

/// Borrowed, restartable view over a slice of the journal.
#[derive(Clone)]
pub struct ReplayRange<'a> {
    inner: vec_deque::Iter<'a, JournalEntry>,
}

impl<'a> Iterator for ReplayRange<'a> {
    type Item = &'a JournalEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ReplayRange<'_> {}
