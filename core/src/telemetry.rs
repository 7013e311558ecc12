use crate::{
    error::SpineResult,
    event::SimEvent,
    rng::SubsystemRng,
    spine::TimeSpine,
    subsystem::SimSubsystem,
    types::Tick,
    world::World,
};

/// Recomputes the ore-in-hold aggregate from carrier storage. Runs last so
/// it sees every transfer of the tick. Derived state: never journaled.
#[derive(Default)]
pub struct TelemetrySubsystem;

impl TelemetrySubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for TelemetrySubsystem {
    fn name(&self) -> &'static str { "telemetry" }

    fn update(
        &mut self,
        tick: Tick,
        world: &mut World,
        _spine: &mut TimeSpine,
        _rng: &mut SubsystemRng,
    ) -> SpineResult<Vec<SimEvent>> {
        let before = world.telemetry.ore_in_hold;
        world.refresh_telemetry(tick);
        let ore_in_hold = world.telemetry.ore_in_hold;

        if ore_in_hold.to_bits() == before.to_bits() {
            return Ok(vec![]);
        }
        Ok(vec![SimEvent::TelemetryUpdated { tick, ore_in_hold }])
    }
}
