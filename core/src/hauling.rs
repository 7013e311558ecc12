use crate::{
    config::GameplayConfig,
    error::SpineResult,
    event::SimEvent,
    journal::JournalEntry,
    rng::SubsystemRng,
    spine::TimeSpine,
    subsystem::{journal, SimSubsystem},
    types::{EntityId, Tick},
    world::{SkillDiscipline, World},
};

/// Carriers collect pickups inside their reach. Hauling skill widens the
/// reach. Candidates are ordered by distance, then by pickup value, so the
/// outcome never depends on pickup handles.
pub struct HaulingSubsystem {
    cfg: GameplayConfig,
}

impl HaulingSubsystem {
    pub fn new(cfg: GameplayConfig) -> Self {
        Self { cfg }
    }

    pub fn reach(&self, base_radius: f32, skill: f32) -> f32 {
        base_radius * (1.0 + self.cfg.hauling_radius_bonus * skill)
    }
}

impl Default for HaulingSubsystem {
    fn default() -> Self { Self::new(GameplayConfig::default()) }
}

impl SimSubsystem for HaulingSubsystem {
    fn name(&self) -> &'static str { "hauling" }

    fn update(
        &mut self,
        tick: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        _rng: &mut SubsystemRng,
    ) -> SpineResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        let carrier_ids: Vec<EntityId> = world.carriers.keys().copied().collect();

        for carrier_id in carrier_ids {
            let Some(carrier) = world.carriers.get(&carrier_id) else { continue };
            let crew = carrier.crew;
            let skill = crew
                .and_then(|a| world.agents.get(&a))
                .map(|a| a.skills.hauling)
                .unwrap_or(0.0);
            let reach = self.reach(carrier.pickup_radius, skill);
            let reach_sq = reach * reach;
            let origin = carrier.position;

            let mut candidates: Vec<_> = world
                .pickups()
                .map(|(id, p)| (p.position.distance_sq(&origin), p.sort_key(), id))
                .filter(|(d, _, _)| *d <= reach_sq)
                .collect();
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            for (_, _, pickup_id) in candidates {
                let Some(pickup) = world.pickup(pickup_id) else { continue };
                let (resource, amount, position) = (pickup.resource, pickup.amount, pickup.position);
                let room = world
                    .carriers
                    .get(&carrier_id)
                    .map(|c| c.room_for(resource))
                    .unwrap_or(0.0);
                if room < amount {
                    continue;
                }

                if world.collect(pickup_id, carrier_id).is_none() {
                    continue;
                }
                journal(
                    spine,
                    JournalEntry::pickup(tick, pickup_id, carrier_id, resource, amount, position),
                )?;
                events.push(SimEvent::PickupCollected {
                    tick,
                    carrier: carrier_id,
                    resource,
                    amount,
                });

                if let Some(agent) = crew {
                    let delta = amount * self.cfg.xp_per_unit_hauled;
                    if world.grant_xp(agent, SkillDiscipline::Hauling, delta, tick) {
                        journal(spine, JournalEntry::skill_gain(tick, agent, SkillDiscipline::Hauling, delta))?;
                        events.push(SimEvent::SkillGained {
                            tick,
                            agent,
                            discipline: SkillDiscipline::Hauling,
                            delta,
                        });
                    }
                }
            }
        }

        if !events.is_empty() {
            log::debug!("tick={tick} hauling: {} events, {} pickups left", events.len(), world.pickup_count());
        }
        Ok(events)
    }
}
