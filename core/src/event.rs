//! Per-tick events: the engine's report of what happened.
//!
//! RULE: Events describe; they never drive state. Nothing is replayed from
//! events; the journal is the only replay source.

use crate::{
    controller::RewindMode,
    types::{EntityId, Position, ResourceType, RunId, Tick},
    world::SkillDiscipline,
};
use serde::{Deserialize, Serialize};

/// Every event emitted during simulation.
/// Variants are added over time, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    TickStarted {
        tick: Tick,
    },
    TickCompleted {
        tick: Tick,
    },
    RunInitialized {
        run_id: RunId,
        seed:   u64,
    },

    // ── Gameplay events ────────────────────────────
    Gathered {
        tick:     Tick,
        node:     EntityId,
        vessel:   EntityId,
        resource: ResourceType,
        amount:   f32,
    },
    PickupSpawned {
        tick:     Tick,
        pickup:   EntityId,
        vessel:   EntityId,
        resource: ResourceType,
        amount:   f32,
        position: Position,
    },
    PickupCollected {
        tick:     Tick,
        carrier:  EntityId,
        resource: ResourceType,
        amount:   f32,
    },
    SkillGained {
        tick:       Tick,
        agent:      EntityId,
        discipline: SkillDiscipline,
        delta:      f32,
    },
    TelemetryUpdated {
        tick:        Tick,
        ore_in_hold: f32,
    },

    // ── Time spine events ──────────────────────────
    ModeChanged {
        tick: Tick,
        from: RewindMode,
        to:   RewindMode,
    },
    RewindCompleted {
        target:        Tick,
        snapshot_tick: Tick,
        replayed:      usize,
        skipped:       usize,
    },
    RewindRejected {
        target: Tick,
        reason: String,
    },
    TimelineBranched {
        tick: Tick,
    },
}
