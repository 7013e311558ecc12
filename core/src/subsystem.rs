//! Subsystem trait.
//!
//! RULE: Every gameplay subsystem implements SimSubsystem.
//! The engine calls update() on each registered subsystem
//! in registration order, every Recording tick.
//! Execution order is fixed and documented in engine.rs.
//!
//! RULE: A subsystem journals every mutation it makes, in the order it
//! makes them, through the World mutation methods that replay also uses.

use crate::{
    error::SpineResult,
    event::SimEvent,
    journal::JournalEntry,
    rng::SubsystemRng,
    spine::TimeSpine,
    types::Tick,
    world::World,
};

/// The contract every subsystem must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per Recording tick by the engine.
    ///
    /// - `tick`:  the tick being simulated
    /// - `world`: live state, already holding earlier subsystems' changes
    /// - `spine`: journal append hook
    /// - `rng`:   this subsystem's deterministic RNG for this tick
    fn update(
        &mut self,
        tick: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        rng: &mut SubsystemRng,
    ) -> SpineResult<Vec<SimEvent>>;
}

/// Append to the journal, logging and dropping recoverable rejections.
pub(crate) fn journal(spine: &mut TimeSpine, entry: JournalEntry) -> SpineResult<()> {
    match spine.append(entry) {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable() => {
            log::warn!("journal: {e}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
