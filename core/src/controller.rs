//! Rewind controller: reconstructs historical ticks and owns the mode.
//!
//! RULES:
//!   - reconstruct() validates before it mutates. A rejected rewind leaves
//!     the world exactly as it was.
//!   - Baseline = nearest snapshot at or before the target, applied through
//!     the domain adapters. Then the journal is replayed over
//!     (snapshot_tick, target], each entry exactly once.
//!   - The journal is sealed outside Recording.
//!
//! Mode transitions:
//!   Recording --rewind--> Playback --resume--> CatchUp --(live reached)--> Recording
//!                         Playback --branch--> Recording (future discarded)

use crate::{
    adapters::AdapterRegistry,
    clock::SimClock,
    error::{SpineError, SpineResult},
    spine::TimeSpine,
    types::Tick,
    world::World,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewindMode {
    Recording,
    Playback,
    CatchUp,
}

impl RewindMode {
    pub fn name(&self) -> &'static str {
        match self {
            RewindMode::Recording => "recording",
            RewindMode::Playback  => "playback",
            RewindMode::CatchUp   => "catch_up",
        }
    }
}

/// Outcome of a successful reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewindReport {
    pub snapshot_tick: Tick,
    pub target:        Tick,
    pub replayed:      usize,
    /// Journal entries skipped because an entity they name is gone.
    pub skipped:       usize,
}

#[derive(Debug, Clone)]
pub struct RewindController {
    mode:          RewindMode,
    playback_tick: Tick,
}

impl Default for RewindController {
    fn default() -> Self {
        Self::new()
    }
}

impl RewindController {
    pub fn new() -> Self {
        Self {
            mode:          RewindMode::Recording,
            playback_tick: 0,
        }
    }

    pub fn mode(&self) -> RewindMode {
        self.mode
    }

    /// Tick the world currently shows while not Recording.
    pub fn playback_tick(&self) -> Tick {
        self.playback_tick
    }

    /// Rebuild the world as it was at the end of `target`.
    pub fn reconstruct(
        &self,
        target: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        registry: &AdapterRegistry,
    ) -> SpineResult<RewindReport> {
        let live = spine.state.last_recorded_tick;
        if target > live {
            return Err(SpineError::TargetBeyondLive { target, live });
        }

        let snapshots = spine.snapshots();
        let snapshot_tick = match snapshots.find_latest_at_or_before(target) {
            Some(tick) if target >= snapshots.pruned_before() => tick,
            _ => {
                return Err(SpineError::OutOfRetentionWindow {
                    target,
                    oldest: snapshots.oldest_tick(),
                })
            }
        };

        // Baseline. Every adapter runs, so a domain with no entries in the
        // frame (no pickups, no slots) is emptied rather than left stale.
        let by_domain = snapshots.entries_at(snapshot_tick);
        for adapter in registry.adapters() {
            let entries = by_domain
                .get(&adapter.domain())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let applied = adapter.apply(world, entries);
            log::debug!(
                "rewind: applied {applied} {} entries from tick {snapshot_tick}",
                adapter.domain().name()
            );
        }

        let mut replayed = 0;
        let mut skipped = 0;
        for entry in spine.journal().replay_range(snapshot_tick, target) {
            let Some(handler) = registry.handler(entry.kind) else {
                log::warn!("rewind: no replay handler for {}", entry.kind.name());
                skipped += 1;
                continue;
            };
            match handler.apply(entry, world) {
                Ok(()) => replayed += 1,
                Err(e @ SpineError::DanglingJournalReference { .. }) => {
                    log::warn!("rewind: skipping entry: {e}");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // Derived state.
        world.refresh_telemetry(target);
        for agent in world.agents.values_mut() {
            agent.skills = agent.xp.levels();
        }
        spine.state.last_playback_tick = target;

        Ok(RewindReport { snapshot_tick, target, replayed, skipped })
    }

    /// Enter (or move within) Playback at `target`.
    pub fn rewind(
        &mut self,
        target: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        registry: &AdapterRegistry,
    ) -> SpineResult<RewindReport> {
        let report = self.reconstruct(target, world, spine, registry)?;
        if self.mode == RewindMode::Recording {
            log::info!(
                "rewind: leaving recording at tick {}",
                spine.state.last_recorded_tick
            );
        }
        self.mode = RewindMode::Playback;
        self.playback_tick = target;
        spine.journal_mut().seal();
        log::info!(
            "rewind: tick {target} from snapshot {} ({} replayed, {} skipped)",
            report.snapshot_tick,
            report.replayed,
            report.skipped
        );
        Ok(report)
    }

    /// Playback → CatchUp.
    pub fn resume(&mut self) -> SpineResult<()> {
        if self.mode != RewindMode::Playback {
            return Err(SpineError::ModeViolation {
                operation: "resume",
                mode:      self.mode.name(),
            });
        }
        self.mode = RewindMode::CatchUp;
        log::info!("rewind: catching up from tick {}", self.playback_tick);
        Ok(())
    }

    /// Advance catch-up by up to `stride` ticks. Switches back to Recording
    /// once the live tick is reconstructed.
    pub fn step_catch_up(
        &mut self,
        stride: Tick,
        world: &mut World,
        spine: &mut TimeSpine,
        registry: &AdapterRegistry,
    ) -> SpineResult<RewindReport> {
        if self.mode != RewindMode::CatchUp {
            return Err(SpineError::ModeViolation {
                operation: "catch_up",
                mode:      self.mode.name(),
            });
        }
        let live = spine.state.last_recorded_tick;
        let next = (self.playback_tick + stride.max(1)).min(live);
        let report = self.reconstruct(next, world, spine, registry)?;
        self.playback_tick = next;

        if next == live {
            self.mode = RewindMode::Recording;
            spine.journal_mut().unseal();
            log::info!("rewind: caught up to live tick {live}, recording");
        }
        Ok(report)
    }

    /// Playback → Recording on the rewound timeline. Everything recorded
    /// after the playback tick is discarded and the clock moves back to it.
    pub fn branch(&mut self, clock: &mut SimClock, spine: &mut TimeSpine) -> SpineResult<Tick> {
        if self.mode != RewindMode::Playback {
            return Err(SpineError::ModeViolation {
                operation: "branch",
                mode:      self.mode.name(),
            });
        }
        let tick = self.playback_tick;
        clock.rewind_to(tick);
        spine.truncate_after(tick);
        spine.journal_mut().unseal();
        self.mode = RewindMode::Recording;
        Ok(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ScenarioConfig, SpineConfig},
        journal::JournalEntry,
        recorder::Recorder,
        types::ResourceType,
    };

    /// Record ticks 0..=last, draining node 0 into vessel 0 by 1.0 per tick.
    fn recorded(last: Tick, horizon: Tick) -> (World, TimeSpine, AdapterRegistry) {
        let mut world = World::from_scenario(&ScenarioConfig::default());
        let mut spine = TimeSpine::new(&SpineConfig { horizon, ..SpineConfig::default() });
        let registry = AdapterRegistry::standard();
        let node = *world.nodes.keys().next().unwrap();
        let vessel = *world.vessels.keys().next().unwrap();

        for tick in 0..=last {
            if tick > 0 {
                world.gather(node, vessel, 1.0);
                spine
                    .append(JournalEntry::gather(tick, node, vessel, ResourceType::Minerals, 1.0))
                    .unwrap();
            }
            world.refresh_telemetry(tick);
            Recorder::new()
                .record_tick(tick, RewindMode::Recording, false, &world, &mut spine, &registry)
                .unwrap();
        }
        (world, spine, registry)
    }

    #[test]
    fn rejected_rewind_leaves_world_untouched() {
        let (mut world, mut spine, registry) = recorded(30, 10);
        let before = world.fingerprint().unwrap();
        let controller = RewindController::new();

        let err = controller.reconstruct(5, &mut world, &mut spine, &registry).unwrap_err();
        assert!(matches!(err, SpineError::OutOfRetentionWindow { target: 5, oldest: Some(21) }));
        let err = controller.reconstruct(31, &mut world, &mut spine, &registry).unwrap_err();
        assert!(matches!(err, SpineError::TargetBeyondLive { target: 31, live: 30 }));

        assert_eq!(world.fingerprint().unwrap(), before);
    }

    #[test]
    fn sealed_journal_in_playback() {
        let (mut world, mut spine, registry) = recorded(5, 0);
        let mut controller = RewindController::new();
        controller.rewind(2, &mut world, &mut spine, &registry).unwrap();
        assert_eq!(controller.mode(), RewindMode::Playback);
        assert!(spine.journal().is_sealed());

        let node = *world.nodes.keys().next().unwrap();
        let vessel = *world.vessels.keys().next().unwrap();
        let err = spine
            .append(JournalEntry::gather(9, node, vessel, ResourceType::Minerals, 1.0))
            .unwrap_err();
        assert!(matches!(err, SpineError::ModeViolation { .. }));
    }

    #[test]
    fn catch_up_strides_to_live_then_records() {
        let (mut world, mut spine, registry) = recorded(10, 0);
        let live = world.fingerprint().unwrap();
        let mut controller = RewindController::new();

        controller.rewind(1, &mut world, &mut spine, &registry).unwrap();
        controller.resume().unwrap();

        let mut steps = Vec::new();
        while controller.mode() == RewindMode::CatchUp {
            steps.push(controller.step_catch_up(4, &mut world, &mut spine, &registry).unwrap().target);
        }
        assert_eq!(steps, vec![5, 9, 10]);
        assert_eq!(controller.mode(), RewindMode::Recording);
        assert!(!spine.journal().is_sealed());
        assert_eq!(world.fingerprint().unwrap(), live);
    }

    #[test]
    fn resume_outside_playback_is_a_mode_violation() {
        let mut controller = RewindController::new();
        assert!(matches!(
            controller.resume(),
            Err(SpineError::ModeViolation { operation: "resume", mode: "recording" })
        ));
    }

    #[test]
    fn branch_discards_the_future() {
        let (mut world, mut spine, registry) = recorded(10, 0);
        let mut clock = SimClock::new("r".into());
        clock.current_tick = 10;
        let mut controller = RewindController::new();

        controller.rewind(6, &mut world, &mut spine, &registry).unwrap();
        let tick = controller.branch(&mut clock, &mut spine).unwrap();

        assert_eq!(tick, 6);
        assert_eq!(clock.current_tick, 6);
        assert_eq!(spine.snapshots().newest_tick(), Some(6));
        assert_eq!(spine.journal().newest_tick(), Some(6));
        assert_eq!(spine.state.last_recorded_tick, 6);
        assert_eq!(controller.mode(), RewindMode::Recording);
    }
}
