//! Snapshot store: ring buffer of full-state captures, one frame per tick.
//!
//! A frame holds every tracked (entity, domain) entry captured at one tick.
//! Frames are kept in ascending tick order in a deque so pruning pops from
//! the front and the nearest-snapshot lookup is a binary search.
//!
//! RULES:
//!   - A frame is built completely before it is inserted. Readers never see
//!     half a tick.
//!   - Capturing a tick that already has a frame replaces it (last write wins).
//!   - Capturing below the last prune cutoff is a broken pruning sequence.

use crate::{
    error::{SpineError, SpineResult},
    types::{EntityId, Position, ResourceType, Tick},
    world::SkillXp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default number of ticks retained by the spine.
pub const DEFAULT_SNAPSHOT_HORIZON: Tick = 512;

/// Stable tag for every tracked entity kind.
/// Variants are appended only; the order drives capture and apply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainTag {
    ResourceNode,
    VesselCargo,
    StorageSlot,
    Pickup,
    Telemetry,
    Skills,
}

impl DomainTag {
    pub const ALL: [DomainTag; 6] = [
        DomainTag::ResourceNode,
        DomainTag::VesselCargo,
        DomainTag::StorageSlot,
        DomainTag::Pickup,
        DomainTag::Telemetry,
        DomainTag::Skills,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceNode => "resource_node",
            Self::VesselCargo  => "vessel_cargo",
            Self::StorageSlot  => "storage_slot",
            Self::Pickup       => "pickup",
            Self::Telemetry    => "telemetry",
            Self::Skills       => "skills",
        }
    }

    /// Entities of this kind are destroyed and recreated on rewind.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Pickup)
    }
}

/// Per-domain payload. Gameplay owns the shape of each variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum SnapshotPayload {
    ResourceNode {
        resource:  ResourceType,
        remaining: f32,
        position:  Position,
    },
    VesselCargo {
        resource: ResourceType,
        amount:   f32,
    },
    StorageSlot {
        resource: ResourceType,
        amount:   f32,
        capacity: f32,
    },
    Pickup {
        resource:   ResourceType,
        amount:     f32,
        position:   Position,
        spawn_tick: Tick,
    },
    Telemetry {
        ore_in_hold: f32,
    },
    Skills {
        xp:                  SkillXp,
        last_processed_tick: Tick,
    },
}

impl SnapshotPayload {
    pub fn domain(&self) -> DomainTag {
        match self {
            Self::ResourceNode { .. } => DomainTag::ResourceNode,
            Self::VesselCargo { .. }  => DomainTag::VesselCargo,
            Self::StorageSlot { .. }  => DomainTag::StorageSlot,
            Self::Pickup { .. }       => DomainTag::Pickup,
            Self::Telemetry { .. }    => DomainTag::Telemetry,
            Self::Skills { .. }       => DomainTag::Skills,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub tick:    Tick,
    pub entity:  EntityId,
    /// Non-owning back-reference, e.g. the vessel a pickup spilled from.
    pub related: Option<EntityId>,
    pub payload: SnapshotPayload,
}

impl SnapshotEntry {
    pub fn new(tick: Tick, entity: EntityId, payload: SnapshotPayload) -> Self {
        Self { tick, entity, related: None, payload }
    }

    pub fn with_related(mut self, related: Option<EntityId>) -> Self {
        self.related = related;
        self
    }

    pub fn domain(&self) -> DomainTag {
        self.payload.domain()
    }
}

/// Every entry captured at one tick, sorted by (domain, entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    pub tick:    Tick,
    pub entries: Vec<SnapshotEntry>,
}

impl SnapshotFrame {
    pub fn entries_for(&self, domain: DomainTag) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter().filter(move |e| e.domain() == domain)
    }
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    frames:        VecDeque<SnapshotFrame>,
    pruned_before: Tick,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the frame for `tick`.
    pub fn capture(&mut self, tick: Tick, mut entries: Vec<SnapshotEntry>) -> SpineResult<()> {
        if tick < self.pruned_before {
            return Err(SpineError::InconsistentCaptureWrite {
                tick,
                cutoff: self.pruned_before,
            });
        }

        for entry in &mut entries {
            entry.tick = tick;
        }
        // Stable sort: storage slots keep their in-container order.
        entries.sort_by(|a, b| (a.domain(), a.entity).cmp(&(b.domain(), b.entity)));
        let frame = SnapshotFrame { tick, entries };

        match self.frames.binary_search_by_key(&tick, |f| f.tick) {
            Ok(idx) => {
                log::debug!("snapshot: replacing frame at tick {tick}");
                self.frames[idx] = frame;
            }
            Err(idx) if idx == self.frames.len() => self.frames.push_back(frame),
            Err(idx) => self.frames.insert(idx, frame),
        }
        Ok(())
    }

    /// Greatest recorded tick `<= target`.
    pub fn find_latest_at_or_before(&self, target: Tick) -> Option<Tick> {
        let idx = self.frames.partition_point(|f| f.tick <= target);
        idx.checked_sub(1).map(|i| self.frames[i].tick)
    }

    pub fn frame_at(&self, tick: Tick) -> Option<&SnapshotFrame> {
        self.frames
            .binary_search_by_key(&tick, |f| f.tick)
            .ok()
            .map(|idx| &self.frames[idx])
    }

    /// Entries at `tick` grouped by domain. Empty when no frame exists.
    pub fn entries_at(&self, tick: Tick) -> BTreeMap<DomainTag, Vec<&SnapshotEntry>> {
        let mut grouped: BTreeMap<DomainTag, Vec<&SnapshotEntry>> = BTreeMap::new();
        if let Some(frame) = self.frame_at(tick) {
            for entry in &frame.entries {
                grouped.entry(entry.domain()).or_default().push(entry);
            }
        }
        grouped
    }

    /// Drop frames older than `cutoff`. Returns the number of frames removed.
    pub fn prune(&mut self, cutoff: Tick) -> usize {
        let mut removed = 0;
        while self.frames.front().is_some_and(|f| f.tick < cutoff) {
            self.frames.pop_front();
            removed += 1;
        }
        self.pruned_before = self.pruned_before.max(cutoff);
        removed
    }

    /// Drop frames newer than `tick` (the timeline branched at `tick`).
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        let mut removed = 0;
        while self.frames.back().is_some_and(|f| f.tick > tick) {
            self.frames.pop_back();
            removed += 1;
        }
        removed
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.frames.front().map(|f| f.tick)
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.frames.back().map(|f| f.tick)
    }

    pub fn pruned_before(&self) -> Tick {
        self.pruned_before
    }

    /// Number of frames (captured ticks) retained.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.frames.iter().map(|f| f.entries.len()).sum()
    }

    pub fn frames(&self) -> impl Iterator<Item = &SnapshotFrame> {
        self.frames.iter()
    }
}
