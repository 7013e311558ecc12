//! Capture/apply adapters and replay handlers, bound per domain at startup.
//!
//! Each `DomainTag` has exactly one `DomainAdapter`: the Recorder calls
//! `capture` and the Rewind Controller calls `apply`. Each `OperationKind`
//! has exactly one `ReplayHandler`, used when replaying the journal.

use crate::{
    error::{SpineError, SpineResult},
    journal::{Item, JournalEntry, OperationKind},
    snapshot::{DomainTag, SnapshotEntry, SnapshotPayload},
    types::{EntityId, Tick},
    world::{Pickup, StorageSlot, World},
};
use std::collections::BTreeMap;

/// Handle used for the singleton telemetry record.
pub const TELEMETRY_ENTITY: EntityId = EntityId::new(u32::MAX, 0);

pub trait DomainAdapter: Send {
    fn domain(&self) -> DomainTag;

    /// Full state of every live entity of this kind at `tick`.
    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry>;

    /// Overwrite live state from one frame's entries for this domain.
    /// Returns the number of entries applied.
    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize;
}

pub trait ReplayHandler: Send {
    fn kind(&self) -> OperationKind;

    /// Re-apply one journaled mutation.
    /// Fails with `DanglingJournalReference` when a referenced entity is gone.
    fn apply(&self, entry: &JournalEntry, world: &mut World) -> SpineResult<()>;
}

fn dangling(entry: &JournalEntry) -> SpineError {
    SpineError::DanglingJournalReference {
        tick: entry.tick,
        kind: entry.kind.name(),
    }
}

// ── Capture / apply adapters ───────────────────────────────────────

pub struct ResourceNodeAdapter;

impl DomainAdapter for ResourceNodeAdapter {
    fn domain(&self) -> DomainTag { DomainTag::ResourceNode }

    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        world
            .nodes
            .iter()
            .map(|(id, node)| {
                SnapshotEntry::new(tick, *id, SnapshotPayload::ResourceNode {
                    resource:  node.resource,
                    remaining: node.remaining,
                    position:  node.position,
                })
            })
            .collect()
    }

    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize {
        let mut applied = 0;
        for entry in entries {
            if let SnapshotPayload::ResourceNode { remaining, position, .. } = entry.payload {
                if let Some(node) = world.nodes.get_mut(&entry.entity) {
                    node.remaining = remaining;
                    node.position = position;
                    applied += 1;
                }
            }
        }
        applied
    }
}

pub struct VesselCargoAdapter;

impl DomainAdapter for VesselCargoAdapter {
    fn domain(&self) -> DomainTag { DomainTag::VesselCargo }

    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        world
            .vessels
            .iter()
            .map(|(id, vessel)| {
                SnapshotEntry::new(tick, *id, SnapshotPayload::VesselCargo {
                    resource: vessel.resource,
                    amount:   vessel.cargo,
                })
            })
            .collect()
    }

    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize {
        let mut applied = 0;
        for entry in entries {
            if let SnapshotPayload::VesselCargo { resource, amount } = entry.payload {
                if let Some(vessel) = world.vessels.get_mut(&entry.entity) {
                    vessel.cargo = amount;
                    vessel.resource = resource;
                    applied += 1;
                }
            }
        }
        applied
    }
}

/// One entry per occupied slot. Carriers missing from the frame had no
/// slots at that tick and are emptied on apply.
pub struct StorageSlotAdapter;

impl DomainAdapter for StorageSlotAdapter {
    fn domain(&self) -> DomainTag { DomainTag::StorageSlot }

    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        world
            .carriers
            .iter()
            .flat_map(|(id, carrier)| {
                carrier.slots.iter().map(move |slot| {
                    SnapshotEntry::new(tick, *id, SnapshotPayload::StorageSlot {
                        resource: slot.resource,
                        amount:   slot.amount,
                        capacity: slot.capacity,
                    })
                })
            })
            .collect()
    }

    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize {
        let mut per_carrier: BTreeMap<EntityId, Vec<StorageSlot>> = BTreeMap::new();
        for entry in entries {
            if let SnapshotPayload::StorageSlot { resource, amount, capacity } = entry.payload {
                per_carrier.entry(entry.entity).or_default().push(StorageSlot {
                    resource,
                    amount: amount.max(0.0),
                    capacity,
                });
            }
        }

        let mut applied = 0;
        for (id, carrier) in world.carriers.iter_mut() {
            let slots = per_carrier.remove(id).unwrap_or_default();
            applied += slots.len();
            carrier.slots = slots;
        }
        for id in per_carrier.keys() {
            log::debug!("storage: carrier {id} from snapshot no longer exists");
        }
        applied
    }
}

/// Ephemeral: apply destroys every live pickup and recreates the frame's set.
pub struct PickupAdapter;

impl DomainAdapter for PickupAdapter {
    fn domain(&self) -> DomainTag { DomainTag::Pickup }

    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        world
            .pickups()
            .map(|(id, pickup)| {
                SnapshotEntry::new(tick, id, SnapshotPayload::Pickup {
                    resource:   pickup.resource,
                    amount:     pickup.amount,
                    position:   pickup.position,
                    spawn_tick: pickup.spawn_tick,
                })
                .with_related(pickup.source)
            })
            .collect()
    }

    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize {
        let destroyed = world.clear_pickups();
        let mut created = 0;
        for entry in entries {
            if let SnapshotPayload::Pickup { resource, amount, position, spawn_tick } = entry.payload {
                world.spawn_pickup(Pickup {
                    resource,
                    amount,
                    source: entry.related,
                    position,
                    spawn_tick,
                });
                created += 1;
            }
        }
        log::debug!("pickups: destroyed {destroyed}, recreated {created}");
        created
    }
}

pub struct TelemetryAdapter;

impl DomainAdapter for TelemetryAdapter {
    fn domain(&self) -> DomainTag { DomainTag::Telemetry }

    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        vec![SnapshotEntry::new(tick, TELEMETRY_ENTITY, SnapshotPayload::Telemetry {
            ore_in_hold: world.telemetry.ore_in_hold,
        })]
    }

    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize {
        let Some(entry) = entries.last() else {
            return 0;
        };
        if let SnapshotPayload::Telemetry { ore_in_hold } = entry.payload {
            world.telemetry.ore_in_hold = ore_in_hold;
            world.telemetry.last_update_tick = entry.tick;
            return 1;
        }
        0
    }
}

pub struct SkillsAdapter;

impl DomainAdapter for SkillsAdapter {
    fn domain(&self) -> DomainTag { DomainTag::Skills }

    fn capture(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        world
            .agents
            .iter()
            .map(|(id, agent)| {
                SnapshotEntry::new(tick, *id, SnapshotPayload::Skills {
                    xp:                  agent.xp,
                    last_processed_tick: agent.last_processed_tick,
                })
            })
            .collect()
    }

    fn apply(&self, world: &mut World, entries: &[&SnapshotEntry]) -> usize {
        let mut applied = 0;
        for entry in entries {
            if let SnapshotPayload::Skills { xp, last_processed_tick } = entry.payload {
                if let Some(agent) = world.agents.get_mut(&entry.entity) {
                    agent.xp = xp;
                    agent.skills = xp.levels();
                    agent.last_processed_tick = last_processed_tick;
                    applied += 1;
                }
            }
        }
        applied
    }
}

// ── Replay handlers ────────────────────────────────────────────────

pub struct GatherReplay;

impl ReplayHandler for GatherReplay {
    fn kind(&self) -> OperationKind { OperationKind::Gather }

    fn apply(&self, entry: &JournalEntry, world: &mut World) -> SpineResult<()> {
        let (Some(node), Some(vessel), Item::Resource(resource)) = (entry.source, entry.target, entry.item)
        else {
            return Err(dangling(entry));
        };
        if !world.gather(node, vessel, entry.amount) {
            return Err(dangling(entry));
        }
        if let Some(v) = world.vessels.get_mut(&vessel) {
            v.resource = resource;
        }
        Ok(())
    }
}

pub struct SpawnReplay;

impl ReplayHandler for SpawnReplay {
    fn kind(&self) -> OperationKind { OperationKind::Spawn }

    fn apply(&self, entry: &JournalEntry, world: &mut World) -> SpineResult<()> {
        let (Some(vessel), Some(position), Item::Resource(resource)) = (entry.source, entry.position, entry.item)
        else {
            return Err(dangling(entry));
        };
        world
            .spill(vessel, resource, entry.amount, position, entry.tick)
            .map(|_| ())
            .ok_or_else(|| dangling(entry))
    }
}

/// Pickup handles do not survive a rewind, so the pickup is found by value.
pub struct PickupReplay;

impl ReplayHandler for PickupReplay {
    fn kind(&self) -> OperationKind { OperationKind::Pickup }

    fn apply(&self, entry: &JournalEntry, world: &mut World) -> SpineResult<()> {
        let (Some(carrier), Some(position), Item::Resource(resource)) = (entry.target, entry.position, entry.item)
        else {
            return Err(dangling(entry));
        };
        let pickup = world
            .find_pickup(resource, entry.amount, &position)
            .ok_or_else(|| dangling(entry))?;
        world
            .collect(pickup, carrier)
            .map(|_| ())
            .ok_or_else(|| dangling(entry))
    }
}

/// Strictly additive: the snapshot holds the XP baseline and each entry
/// adds its delta once.
pub struct SkillGainReplay;

impl ReplayHandler for SkillGainReplay {
    fn kind(&self) -> OperationKind { OperationKind::SkillGain }

    fn apply(&self, entry: &JournalEntry, world: &mut World) -> SpineResult<()> {
        let (Some(agent), Item::Skill(discipline)) = (entry.target, entry.item) else {
            return Err(dangling(entry));
        };
        if world.grant_xp(agent, discipline, entry.amount, entry.tick) {
            Ok(())
        } else {
            Err(dangling(entry))
        }
    }
}

// ── Registry ───────────────────────────────────────────────────────

/// Fixed binding of domain tags to adapters and operation kinds to handlers.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<DomainTag, Box<dyn DomainAdapter>>,
    handlers: BTreeMap<OperationKind, Box<dyn ReplayHandler>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every domain and operation kind bound to its standard implementation.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register_adapter(Box::new(ResourceNodeAdapter));
        registry.register_adapter(Box::new(VesselCargoAdapter));
        registry.register_adapter(Box::new(StorageSlotAdapter));
        registry.register_adapter(Box::new(PickupAdapter));
        registry.register_adapter(Box::new(TelemetryAdapter));
        registry.register_adapter(Box::new(SkillsAdapter));

        registry.register_handler(Box::new(GatherReplay));
        registry.register_handler(Box::new(SpawnReplay));
        registry.register_handler(Box::new(PickupReplay));
        registry.register_handler(Box::new(SkillGainReplay));
        registry
    }

    /// Bind an adapter, replacing any previous one for the same domain.
    pub fn register_adapter(&mut self, adapter: Box<dyn DomainAdapter>) {
        self.adapters.insert(adapter.domain(), adapter);
    }

    pub fn register_handler(&mut self, handler: Box<dyn ReplayHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Adapters in domain-tag order.
    pub fn adapters(&self) -> impl Iterator<Item = &dyn DomainAdapter> {
        self.adapters.values().map(|a| a.as_ref())
    }

    pub fn adapter(&self, domain: DomainTag) -> Option<&dyn DomainAdapter> {
        self.adapters.get(&domain).map(|a| a.as_ref())
    }

    pub fn handler(&self, kind: OperationKind) -> Option<&dyn ReplayHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }

    /// Capture the whole world through every adapter.
    pub fn capture_all(&self, world: &World, tick: Tick) -> Vec<SnapshotEntry> {
        self.adapters().flat_map(|a| a.capture(world, tick)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{Position, ResourceType},
        world::{Carrier, ResourceNode, Vessel},
    };

    fn small_world() -> (World, EntityId, EntityId, EntityId) {
        let mut world = World::new();
        let node = world.add_node(ResourceNode {
            name:        "n".into(),
            resource:    ResourceType::Minerals,
            remaining:   100.0,
            max_amount:  100.0,
            gather_rate: 5.0,
            position:    Position::ZERO,
        });
        let vessel = world.add_vessel(Vessel {
            name:        "v".into(),
            resource:    ResourceType::Minerals,
            cargo:       0.0,
            capacity:    10.0,
            target_node: node,
            crew:        None,
            position:    Position::new(1.0, 0.0, 0.0),
        });
        let carrier = world.add_carrier(Carrier {
            name:          "c".into(),
            slots:         Vec::new(),
            position:      Position::new(2.0, 0.0, 0.0),
            pickup_radius: 3.0,
            crew:          None,
        });
        (world, node, vessel, carrier)
    }

    #[test]
    fn standard_registry_binds_every_domain_and_kind() {
        let registry = AdapterRegistry::standard();
        for tag in DomainTag::ALL {
            assert_eq!(registry.adapter(tag).map(|a| a.domain()), Some(tag));
        }
        for kind in OperationKind::ALL {
            assert_eq!(registry.handler(kind).map(|h| h.kind()), Some(kind));
        }
    }

    #[test]
    fn capture_is_byte_identical_for_identical_state() {
        let (world, ..) = small_world();
        let registry = AdapterRegistry::standard();
        let a = serde_json::to_string(&registry.capture_all(&world, 3)).unwrap();
        let b = serde_json::to_string(&registry.capture_all(&world.clone(), 3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn storage_apply_empties_carriers_absent_from_frame() {
        let (mut world, _, _, carrier) = small_world();
        world.carriers.get_mut(&carrier).unwrap().store(ResourceType::Ice, 4.0);

        StorageSlotAdapter.apply(&mut world, &[]);
        assert!(world.carriers[&carrier].slots.is_empty());
    }

    #[test]
    fn gather_replay_skips_missing_entities() {
        let (mut world, node, ..) = small_world();
        let entry = JournalEntry::gather(1, node, EntityId::new(999, 0), ResourceType::Minerals, 2.0);
        let err = GatherReplay.apply(&entry, &mut world).unwrap_err();
        assert!(matches!(err, SpineError::DanglingJournalReference { tick: 1, .. }));
        assert_eq!(world.nodes[&node].remaining, 100.0, "nothing applied");
    }

    #[test]
    fn pickup_replay_matches_by_value_not_handle() {
        let (mut world, _, vessel, carrier) = small_world();
        let original = world
            .spill(vessel, ResourceType::Minerals, 3.0, Position::new(1.0, 0.0, 0.0), 1)
            .unwrap();
        let entry = JournalEntry::pickup(
            2,
            EntityId::new(original.index, original.generation + 7),
            carrier,
            ResourceType::Minerals,
            3.0,
            Position::new(1.0, 0.0, 0.0),
        );

        PickupReplay.apply(&entry, &mut world).unwrap();
        assert_eq!(world.pickup_count(), 0);
        assert_eq!(world.carriers[&carrier].stored(), 3.0);
    }
}
