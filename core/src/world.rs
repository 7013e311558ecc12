//! Live simulation state: the entity store the spine records and rewinds.
//!
//! Every kind lives in its own ordered map keyed by a generation-stamped
//! handle, so iteration order is the handle order and never depends on
//! hashing. Pickups are the only ephemeral kind: their slots are recycled
//! with a bumped generation when destroyed.

use crate::{
    config::ScenarioConfig,
    error::SpineResult,
    types::{EntityId, Position, ResourceType, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_STORAGE_SLOTS: usize = 4;
pub const DEFAULT_SLOT_CAPACITY: f32 = 1_000.0;
/// Amounts at or below this are treated as empty.
pub const AMOUNT_EPSILON: f32 = 1e-4;

// ── Skills ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillDiscipline {
    Mining,
    Hauling,
    Combat,
    Repair,
    Exploration,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkillXp {
    pub mining:      f32,
    pub hauling:     f32,
    pub combat:      f32,
    pub repair:      f32,
    pub exploration: f32,
}

impl SkillXp {
    pub fn get(&self, discipline: SkillDiscipline) -> f32 {
        match discipline {
            SkillDiscipline::Mining      => self.mining,
            SkillDiscipline::Hauling     => self.hauling,
            SkillDiscipline::Combat      => self.combat,
            SkillDiscipline::Repair      => self.repair,
            SkillDiscipline::Exploration => self.exploration,
        }
    }

    pub fn add(&mut self, discipline: SkillDiscipline, delta: f32) {
        let slot = match discipline {
            SkillDiscipline::Mining      => &mut self.mining,
            SkillDiscipline::Hauling     => &mut self.hauling,
            SkillDiscipline::Combat      => &mut self.combat,
            SkillDiscipline::Repair      => &mut self.repair,
            SkillDiscipline::Exploration => &mut self.exploration,
        };
        *slot += delta;
    }

    pub fn levels(&self) -> SkillLevels {
        SkillLevels {
            mining:      xp_to_skill(self.mining),
            hauling:     xp_to_skill(self.hauling),
            combat:      xp_to_skill(self.combat),
            repair:      xp_to_skill(self.repair),
            exploration: xp_to_skill(self.exploration),
        }
    }
}

/// Normalized skill in [0, 1). Derived from XP, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkillLevels {
    pub mining:      f32,
    pub hauling:     f32,
    pub combat:      f32,
    pub repair:      f32,
    pub exploration: f32,
}

/// Saturating curve: 100 XP is half of mastery.
pub fn xp_to_skill(xp: f32) -> f32 {
    let xp = xp.max(0.0);
    xp / (xp + 100.0)
}

// ── Entity kinds ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub name:        String,
    pub resource:    ResourceType,
    pub remaining:   f32,
    pub max_amount:  f32,
    pub gather_rate: f32,
    pub position:    Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub name:        String,
    pub resource:    ResourceType,
    pub cargo:       f32,
    pub capacity:    f32,
    pub target_node: EntityId,
    pub crew:        Option<EntityId>,
    pub position:    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub resource: ResourceType,
    pub amount:   f32,
    pub capacity: f32,
}

impl StorageSlot {
    pub fn create(resource: ResourceType) -> Self {
        Self { resource, amount: 0.0, capacity: DEFAULT_SLOT_CAPACITY }
    }

    pub fn free_space(&self) -> f32 {
        (self.capacity - self.amount).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub name:          String,
    pub slots:         Vec<StorageSlot>,
    pub position:      Position,
    pub pickup_radius: f32,
    pub crew:          Option<EntityId>,
}

impl Carrier {
    /// Credit `amount` into the slot for `resource`, opening a slot if one
    /// is free. All or nothing: returns false and stores nothing when the
    /// amount does not fit.
    pub fn store(&mut self, resource: ResourceType, amount: f32) -> bool {
        if self.room_for(resource) < amount {
            return false;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.resource == resource) {
            slot.amount += amount;
            return true;
        }
        if self.slots.len() < MAX_STORAGE_SLOTS {
            let mut slot = StorageSlot::create(resource);
            slot.amount = amount;
            self.slots.push(slot);
            return true;
        }
        false
    }

    /// Room available for `resource` without exceeding slot capacity.
    pub fn room_for(&self, resource: ResourceType) -> f32 {
        match self.slots.iter().find(|s| s.resource == resource) {
            Some(slot) => slot.free_space(),
            None if self.slots.len() < MAX_STORAGE_SLOTS => DEFAULT_SLOT_CAPACITY,
            None => 0.0,
        }
    }

    pub fn stored(&self) -> f32 {
        self.slots.iter().map(|s| s.amount).sum()
    }
}

/// Transient resource drop. Identity is not stable across a rewind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub resource:   ResourceType,
    pub amount:     f32,
    pub source:     Option<EntityId>,
    pub position:   Position,
    pub spawn_tick: Tick,
}

impl Pickup {
    /// Value identity used when a handle cannot be trusted.
    pub fn matches(&self, resource: ResourceType, amount: f32, position: &Position) -> bool {
        self.resource == resource
            && self.amount.to_bits() == amount.to_bits()
            && self.position.same_bits(position)
    }

    pub(crate) fn sort_key(&self) -> (ResourceType, [u32; 3], u32, Tick, Option<EntityId>) {
        (
            self.resource,
            [
                self.position.x.to_bits(),
                self.position.y.to_bits(),
                self.position.z.to_bits(),
            ],
            self.amount.to_bits(),
            self.spawn_tick,
            self.source,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name:                String,
    pub xp:                  SkillXp,
    pub skills:              SkillLevels,
    pub last_processed_tick: Tick,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:                name.into(),
            xp:                  SkillXp::default(),
            skills:              SkillLevels::default(),
            last_processed_tick: 0,
        }
    }

    pub fn gain(&mut self, discipline: SkillDiscipline, delta: f32, tick: Tick) {
        self.xp.add(discipline, delta);
        self.skills = self.xp.levels();
        self.last_processed_tick = tick;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MiningTelemetry {
    pub ore_in_hold:      f32,
    pub last_update_tick: Tick,
}

// ── Entity allocation ──────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive:       Vec<bool>,
    free:        Vec<u32>,
}

impl EntityAllocator {
    pub fn allocate(&mut self) -> EntityId {
        // Lowest free index first keeps allocation independent of destroy order.
        if let Some(pos) = self
            .free
            .iter()
            .enumerate()
            .min_by_key(|(_, idx)| **idx)
            .map(|(pos, _)| pos)
        {
            let index = self.free.swap_remove(pos);
            self.alive[index as usize] = true;
            return EntityId::new(index, self.generations[index as usize]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Free `id`, invalidating every outstanding copy of the handle.
    pub fn release(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free.push(id.index);
        true
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index as usize;
        idx < self.generations.len() && self.alive[idx] && self.generations[idx] == id.generation
    }
}

// ── World ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct World {
    allocator:     EntityAllocator,
    pub nodes:     BTreeMap<EntityId, ResourceNode>,
    pub vessels:   BTreeMap<EntityId, Vessel>,
    pub carriers:  BTreeMap<EntityId, Carrier>,
    pub agents:    BTreeMap<EntityId, Agent>,
    pickups:       BTreeMap<EntityId, Pickup>,
    pub telemetry: MiningTelemetry,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate a world from a scenario description.
    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        let mut world = World::new();

        let node_ids: Vec<EntityId> = scenario
            .nodes
            .iter()
            .map(|n| {
                world.add_node(ResourceNode {
                    name:        n.name.clone(),
                    resource:    n.resource,
                    remaining:   n.amount,
                    max_amount:  n.amount,
                    gather_rate: n.gather_rate,
                    position:    n.position,
                })
            })
            .collect();

        for v in &scenario.vessels {
            let Some(&target) = node_ids.get(v.node) else {
                log::warn!("scenario: vessel '{}' targets unknown node {}", v.name, v.node);
                continue;
            };
            let resource = scenario.nodes[v.node].resource;
            let crew = v.crewed.then(|| world.add_agent(Agent::new(format!("{} crew", v.name))));
            world.add_vessel(Vessel {
                name: v.name.clone(),
                resource,
                cargo: 0.0,
                capacity: v.capacity,
                target_node: target,
                crew,
                position: v.position,
            });
        }

        for c in &scenario.carriers {
            let crew = c.crewed.then(|| world.add_agent(Agent::new(format!("{} crew", c.name))));
            world.add_carrier(Carrier {
                name:          c.name.clone(),
                slots:         Vec::new(),
                position:      c.position,
                pickup_radius: c.pickup_radius,
                crew,
            });
        }

        world
    }

    pub fn add_node(&mut self, node: ResourceNode) -> EntityId {
        let id = self.allocator.allocate();
        self.nodes.insert(id, node);
        id
    }

    pub fn add_vessel(&mut self, vessel: Vessel) -> EntityId {
        let id = self.allocator.allocate();
        self.vessels.insert(id, vessel);
        id
    }

    pub fn add_carrier(&mut self, carrier: Carrier) -> EntityId {
        let id = self.allocator.allocate();
        self.carriers.insert(id, carrier);
        id
    }

    pub fn add_agent(&mut self, agent: Agent) -> EntityId {
        let id = self.allocator.allocate();
        self.agents.insert(id, agent);
        id
    }

    pub fn spawn_pickup(&mut self, pickup: Pickup) -> EntityId {
        let id = self.allocator.allocate();
        self.pickups.insert(id, pickup);
        id
    }

    pub fn destroy_pickup(&mut self, id: EntityId) -> Option<Pickup> {
        let pickup = self.pickups.remove(&id)?;
        self.allocator.release(id);
        Some(pickup)
    }

    /// Destroy every pickup. Returns how many were destroyed.
    pub fn clear_pickups(&mut self) -> usize {
        let ids: Vec<EntityId> = self.pickups.keys().copied().collect();
        for id in &ids {
            self.destroy_pickup(*id);
        }
        ids.len()
    }

    pub fn pickup(&self, id: EntityId) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    pub fn pickups(&self) -> impl Iterator<Item = (EntityId, &Pickup)> {
        self.pickups.iter().map(|(id, p)| (*id, p))
    }

    pub fn pickup_count(&self) -> usize {
        self.pickups.len()
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    /// Sum of every carrier's storage, accumulated in handle order.
    pub fn total_stored(&self) -> f32 {
        self.carriers.values().map(|c| c.stored()).sum()
    }

    pub fn refresh_telemetry(&mut self, tick: Tick) {
        self.telemetry = MiningTelemetry {
            ore_in_hold:      self.total_stored(),
            last_update_tick: tick,
        };
    }

    // ── Mutations ──────────────────────────────────────────────────
    //
    // Live gameplay and journal replay both go through these, so a replayed
    // entry performs the same arithmetic in the same order as the original.

    /// Move `amount` from a node into a vessel hold.
    /// Returns false, touching nothing, if either entity is gone.
    pub fn gather(&mut self, node_id: EntityId, vessel_id: EntityId, amount: f32) -> bool {
        if !self.nodes.contains_key(&node_id) || !self.vessels.contains_key(&vessel_id) {
            return false;
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.remaining = (node.remaining - amount).max(0.0);
        }
        if let Some(vessel) = self.vessels.get_mut(&vessel_id) {
            vessel.cargo += amount;
        }
        true
    }

    /// Spill `amount` of a vessel's hold as a pickup at `position`.
    pub fn spill(
        &mut self,
        vessel_id: EntityId,
        resource: ResourceType,
        amount: f32,
        position: Position,
        tick: Tick,
    ) -> Option<EntityId> {
        let vessel = self.vessels.get_mut(&vessel_id)?;
        vessel.cargo = (vessel.cargo - amount).max(0.0);
        Some(self.spawn_pickup(Pickup {
            resource,
            amount,
            source: Some(vessel_id),
            position,
            spawn_tick: tick,
        }))
    }

    /// Move a whole pickup into a carrier's storage and destroy it.
    pub fn collect(&mut self, pickup_id: EntityId, carrier_id: EntityId) -> Option<Pickup> {
        let pickup = self.pickups.get(&pickup_id)?;
        let carrier = self.carriers.get_mut(&carrier_id)?;
        if !carrier.store(pickup.resource, pickup.amount) {
            return None;
        }
        self.destroy_pickup(pickup_id)
    }

    /// Pickup equal by value to the given one. Ties resolve to the lowest
    /// `sort_key`, the same order hauling uses, never to handle order.
    pub fn find_pickup(
        &self,
        resource: ResourceType,
        amount: f32,
        position: &Position,
    ) -> Option<EntityId> {
        self.pickups
            .iter()
            .filter(|(_, p)| p.matches(resource, amount, position))
            .min_by_key(|(_, p)| p.sort_key())
            .map(|(id, _)| *id)
    }

    pub fn grant_xp(
        &mut self,
        agent_id: EntityId,
        discipline: SkillDiscipline,
        delta: f32,
        tick: Tick,
    ) -> bool {
        match self.agents.get_mut(&agent_id) {
            Some(agent) => {
                agent.gain(discipline, delta, tick);
                true
            }
            None => false,
        }
    }

    /// Canonical JSON of the complete live state. Pickups are listed as a
    /// value set without handles, since handles are not stable across a rewind.
    pub fn fingerprint(&self) -> SpineResult<String> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            nodes:     Vec<(EntityId, &'a ResourceNode)>,
            vessels:   Vec<(EntityId, &'a Vessel)>,
            carriers:  Vec<(EntityId, &'a Carrier)>,
            agents:    Vec<(EntityId, &'a Agent)>,
            pickups:   Vec<&'a Pickup>,
            telemetry: MiningTelemetry,
        }

        let mut pickups: Vec<&Pickup> = self.pickups.values().collect();
        pickups.sort_by_key(|p| p.sort_key());

        let canonical = Canonical {
            nodes:     self.nodes.iter().map(|(id, n)| (*id, n)).collect(),
            vessels:   self.vessels.iter().map(|(id, v)| (*id, v)).collect(),
            carriers:  self.carriers.iter().map(|(id, c)| (*id, c)).collect(),
            agents:    self.agents.iter().map(|(id, a)| (*id, a)).collect(),
            pickups,
            telemetry: self.telemetry,
        };
        Ok(serde_json::to_string(&canonical)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pickup(amount: f32) -> Pickup {
        Pickup {
            resource:   ResourceType::Ice,
            amount,
            source:     None,
            position:   Position::new(1.0, 2.0, 3.0),
            spawn_tick: 0,
        }
    }

    #[test]
    fn destroyed_pickup_handles_go_stale() {
        let mut world = World::new();
        let old = world.spawn_pickup(pickup(5.0));
        assert!(world.is_alive(old));

        world.destroy_pickup(old);
        let fresh = world.spawn_pickup(pickup(5.0));

        assert_eq!(fresh.index, old.index, "slot is recycled");
        assert_ne!(fresh.generation, old.generation);
        assert!(!world.is_alive(old));
        assert!(world.pickup(old).is_none());
        assert!(world.pickup(fresh).is_some());
    }

    #[test]
    fn fingerprint_ignores_pickup_handles() {
        let mut a = World::new();
        a.spawn_pickup(pickup(1.0));
        a.spawn_pickup(pickup(2.0));

        let mut b = World::new();
        let junk = b.spawn_pickup(pickup(9.0));
        b.spawn_pickup(pickup(2.0));
        b.destroy_pickup(junk);
        b.spawn_pickup(pickup(1.0));

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn carrier_opens_at_most_four_slots() {
        let mut carrier = Carrier {
            name:          "c".into(),
            slots:         Vec::new(),
            position:      Position::ZERO,
            pickup_radius: 5.0,
            crew:          None,
        };
        let kinds = [
            ResourceType::Minerals,
            ResourceType::RareMetals,
            ResourceType::EnergyCrystals,
            ResourceType::OrganicMatter,
        ];
        for kind in kinds {
            assert!(carrier.store(kind, 1.0));
        }
        assert!(!carrier.store(ResourceType::Ice, 1.0));
        assert!(carrier.store(ResourceType::Minerals, 2.0));
        assert_eq!(carrier.stored(), 6.0);
    }

    #[test]
    fn collect_never_overfills_a_slot() {
        let mut world = World::new();
        let carrier = world.add_carrier(Carrier {
            name:          "c".into(),
            slots:         vec![StorageSlot { resource: ResourceType::Ice, amount: 995.0, capacity: DEFAULT_SLOT_CAPACITY }],
            position:      Position::ZERO,
            pickup_radius: 5.0,
            crew:          None,
        });
        let pickup = world.spawn_pickup(Pickup {
            resource:   ResourceType::Ice,
            amount:     8.0,
            source:     None,
            position:   Position::ZERO,
            spawn_tick: 0,
        });

        assert!(world.collect(pickup, carrier).is_none());
        assert!(world.is_alive(pickup), "a rejected pickup stays in the world");
        assert_eq!(world.carriers[&carrier].slots[0].amount, 995.0);
    }

    #[test]
    fn skill_levels_follow_xp() {
        let mut agent = Agent::new("a");
        agent.gain(SkillDiscipline::Hauling, 100.0, 3);
        assert_eq!(agent.skills.hauling, 0.5);
        assert_eq!(agent.last_processed_tick, 3);
        assert_eq!(agent.skills.mining, 0.0);
    }
}
