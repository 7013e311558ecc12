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

/// Disciplines a drill can exercise. Mining and hauling only grow on the job.
const DRILL_DISCIPLINES: [SkillDiscipline; 3] = [
    SkillDiscipline::Combat,
    SkillDiscipline::Repair,
    SkillDiscipline::Exploration,
];

/// Off-duty crew drills. Each agent rolls once per tick.
pub struct TrainingSubsystem {
    cfg: GameplayConfig,
}

impl TrainingSubsystem {
    pub fn new(cfg: GameplayConfig) -> Self {
        Self { cfg }
    }
}

impl Default for TrainingSubsystem {
    fn default() -> Self { Self::new(GameplayConfig::default()) }
}

impl SimSubsystem for TrainingSubsystem {
    fn name(&self) -> &'static str { "training" }

    fn update(
        &mut self,
        tick: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        rng: &mut SubsystemRng,
    ) -> SpineResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        let agent_ids: Vec<EntityId> = world.agents.keys().copied().collect();

        for agent in agent_ids {
            if !rng.chance(self.cfg.drill_chance) {
                continue;
            }
            let pick = rng.next_u64_below(DRILL_DISCIPLINES.len() as u64) as usize;
            let discipline = DRILL_DISCIPLINES[pick];
            let delta = self.cfg.drill_xp;

            if world.grant_xp(agent, discipline, delta, tick) {
                journal(spine, JournalEntry::skill_gain(tick, agent, discipline, delta))?;
                events.push(SimEvent::SkillGained { tick, agent, discipline, delta });
            }
        }
        Ok(events)
    }
}
