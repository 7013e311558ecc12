use crate::{
    config::GameplayConfig,
    error::SpineResult,
    event::SimEvent,
    journal::JournalEntry,
    rng::SubsystemRng,
    spine::TimeSpine,
    subsystem::{journal, SimSubsystem},
    types::{EntityId, Tick},
    world::{SkillDiscipline, World, AMOUNT_EPSILON},
};

/// Vessels pull ore from their target node. A full hold is dumped as a
/// pickup for the carrier to collect.
///
/// Holds no state of its own: everything it changes lives in the World,
/// so a rewind restores it completely.
pub struct MiningSubsystem {
    cfg: GameplayConfig,
}

impl MiningSubsystem {
    pub fn new(cfg: GameplayConfig) -> Self {
        Self { cfg }
    }

    /// Yield for one tick, before clamping to what the node has left.
    pub fn gather_rate(&self, base: f32, roll: f32, skill: f32) -> f32 {
        let jitter = self.cfg.gather_jitter;
        base * (1.0 - jitter / 2.0 + jitter * roll) * (1.0 + self.cfg.mining_skill_bonus * skill)
    }
}

impl Default for MiningSubsystem {
    fn default() -> Self { Self::new(GameplayConfig::default()) }
}

impl SimSubsystem for MiningSubsystem {
    fn name(&self) -> &'static str { "mining" }

    fn update(
        &mut self,
        tick: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        rng: &mut SubsystemRng,
    ) -> SpineResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        let vessel_ids: Vec<EntityId> = world.vessels.keys().copied().collect();

        for vessel_id in vessel_ids {
            // One roll per vessel every tick keeps the stream aligned
            // whether or not the vessel can mine.
            let roll = rng.next_f32();

            let Some(vessel) = world.vessels.get(&vessel_id) else { continue };
            let node_id = vessel.target_node;
            let crew = vessel.crew;
            let Some(node) = world.nodes.get(&node_id) else { continue };
            if node.remaining <= AMOUNT_EPSILON {
                continue;
            }

            let skill = crew
                .and_then(|a| world.agents.get(&a))
                .map(|a| a.skills.mining)
                .unwrap_or(0.0);
            let resource = node.resource;
            let amount = self.gather_rate(node.gather_rate, roll, skill).min(node.remaining);
            if amount <= AMOUNT_EPSILON {
                continue;
            }

            world.gather(node_id, vessel_id, amount);
            journal(spine, JournalEntry::gather(tick, node_id, vessel_id, resource, amount))?;
            events.push(SimEvent::Gathered {
                tick,
                node: node_id,
                vessel: vessel_id,
                resource,
                amount,
            });

            if let Some(agent) = crew {
                let delta = amount * self.cfg.xp_per_unit_mined;
                if world.grant_xp(agent, SkillDiscipline::Mining, delta, tick) {
                    journal(spine, JournalEntry::skill_gain(tick, agent, SkillDiscipline::Mining, delta))?;
                    events.push(SimEvent::SkillGained {
                        tick,
                        agent,
                        discipline: SkillDiscipline::Mining,
                        delta,
                    });
                }
            }

            // Full hold: dump everything where the vessel sits.
            let Some(vessel) = world.vessels.get(&vessel_id) else { continue };
            if vessel.cargo + AMOUNT_EPSILON >= vessel.capacity {
                let (cargo, position) = (vessel.cargo, vessel.position);
                if let Some(pickup) = world.spill(vessel_id, resource, cargo, position, tick) {
                    journal(spine, JournalEntry::spawn(tick, vessel_id, resource, cargo, position))?;
                    log::debug!("tick={tick} mining: vessel {vessel_id} dumped {cargo:.2} as {pickup}");
                    events.push(SimEvent::PickupSpawned {
                        tick,
                        pickup,
                        vessel: vessel_id,
                        resource,
                        amount: cargo,
                        position,
                    });
                }
            }
        }

        Ok(events)
    }
}
