//! The simulation engine. Drives one tick at a time and owns the spine.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   0. Time-control commands queued since the last tick (rewinds coalesced)
//!   1. Mining subsystem
//!   2. Hauling subsystem
//!   3. Training subsystem
//!   4. Telemetry subsystem
//!   5. Recorder (capture, then prune)
//!   6. History export mirror, when attached
//!
//! RULES:
//!   - Recording: steps 1–6 run. Playback: nothing runs, the world holds the
//!     rewound tick. CatchUp: the controller reconstructs forward instead of
//!     the subsystems running. Never both on the same tick.
//!   - A paused clock runs nothing but step 0.
//!   - All randomness flows through the RngBank, per subsystem and tick.

use crate::{
    adapters::AdapterRegistry,
    clock::SimClock,
    command::{TimeCommand, TimeControl},
    config::SimConfig,
    controller::{RewindController, RewindMode, RewindReport},
    error::SpineResult,
    event::SimEvent,
    hauling::HaulingSubsystem,
    mining::MiningSubsystem,
    recorder::{RecordReport, Recorder},
    rng::{RngBank, SubsystemSlot},
    spine::TimeSpine,
    store::HistoryExport,
    subsystem::SimSubsystem,
    telemetry::TelemetrySubsystem,
    training::TrainingSubsystem,
    types::{RunId, Tick},
    world::World,
};
use serde::Serialize;

/// Summary served to the runner and IPC clients.
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub run_id:          RunId,
    pub live_tick:       Tick,
    pub mode:            RewindMode,
    /// Tick the world currently shows.
    pub world_tick:      Tick,
    pub paused:          bool,
    pub oldest_tick:     Option<Tick>,
    pub frames:          usize,
    pub journal_entries: usize,
    pub pickups:         usize,
    pub ore_in_hold:     f32,
}

pub struct SimEngine {
    pub run_id:   RunId,
    pub clock:    SimClock,
    pub rng_bank: RngBank,
    seed:         u64,
    subsystems:   Vec<(SubsystemSlot, Box<dyn SimSubsystem>)>,
    world:        World,
    spine:        TimeSpine,
    recorder:     Recorder,
    controller:   RewindController,
    registry:     AdapterRegistry,
    control:      TimeControl,
    export:       Option<HistoryExport>,
}

impl SimEngine {
    /// An engine over `world` with no subsystems registered and tick 0
    /// recorded as the first frame.
    pub fn new(run_id: RunId, seed: u64, config: &SimConfig, world: World) -> SpineResult<Self> {
        let mut engine = Self {
            clock:      SimClock::new(run_id.clone()),
            rng_bank:   RngBank::new(seed),
            seed,
            subsystems: Vec::new(),
            world,
            spine:      TimeSpine::new(&config.spine),
            recorder:   Recorder::new(),
            controller: RewindController::new(),
            registry:   AdapterRegistry::standard(),
            control:    TimeControl::new(),
            export:     None,
            run_id,
        };

        engine.world.refresh_telemetry(0);
        engine.recorder.record_tick(
            0,
            RewindMode::Recording,
            false,
            &engine.world,
            &mut engine.spine,
            &engine.registry,
        )?;
        Ok(engine)
    }

    /// Build a fully wired engine with all subsystems registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(run_id: RunId, seed: u64, config: &SimConfig) -> SpineResult<Self> {
        let world = World::from_scenario(&config.scenario);
        let mut engine = SimEngine::new(run_id, seed, config, world)?;

        // EXECUTION ORDER: fixed, documented, never reordered.
        let gameplay = &config.gameplay;
        engine.register(SubsystemSlot::Mining, Box::new(MiningSubsystem::new(gameplay.clone())));
        engine.register(SubsystemSlot::Hauling, Box::new(HaulingSubsystem::new(gameplay.clone())));
        engine.register(SubsystemSlot::Training, Box::new(TrainingSubsystem::new(gameplay.clone())));
        engine.register(SubsystemSlot::Telemetry, Box::new(TelemetrySubsystem::new()));
        Ok(engine)
    }

    /// Default configuration and scenario.
    pub fn build_test(seed: u64) -> SpineResult<Self> {
        Self::build(format!("test-{seed}"), seed, &SimConfig::default())
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, slot: SubsystemSlot, subsystem: Box<dyn SimSubsystem>) {
        self.subsystems.push((slot, subsystem));
    }

    /// Attach a history export and mirror everything retained so far.
    pub fn attach_export(&mut self, export: HistoryExport) -> SpineResult<()> {
        export.insert_run(
            &self.run_id,
            self.seed,
            self.spine.state.horizon,
            env!("CARGO_PKG_VERSION"),
        )?;
        for frame in self.spine.snapshots().frames() {
            export.export_frame(&self.run_id, frame)?;
        }
        export.export_journal(&self.run_id, self.spine.journal().iter())?;
        self.export = Some(export);
        Ok(())
    }

    // ── Time control ───────────────────────────────────────────

    /// Queue a command for the next tick.
    pub fn submit(&mut self, command: TimeCommand) {
        self.control.submit(command);
    }

    /// Queue a command and apply everything queued, without stepping.
    pub fn request(&mut self, command: TimeCommand) -> SpineResult<Vec<SimEvent>> {
        self.submit(command);
        self.apply_pending()
    }

    /// Apply queued commands. Only the latest rewind request survives.
    pub fn apply_pending(&mut self) -> SpineResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        for command in self.control.drain() {
            self.apply_command(command, &mut events)?;
        }
        Ok(events)
    }

    fn apply_command(&mut self, command: TimeCommand, events: &mut Vec<SimEvent>) -> SpineResult<()> {
        let tick = self.clock.current_tick;
        let from = self.controller.mode();
        match command {
            TimeCommand::Pause => self.clock.pause(),
            TimeCommand::Resume => self.clock.resume(),
            TimeCommand::SetSpeed { speed } => self.clock.set_speed(speed),

            TimeCommand::Rewind { target } => {
                match self
                    .controller
                    .rewind(target, &mut self.world, &mut self.spine, &self.registry)
                {
                    Ok(report) => {
                        events.push(SimEvent::RewindCompleted {
                            target,
                            snapshot_tick: report.snapshot_tick,
                            replayed:      report.replayed,
                            skipped:       report.skipped,
                        });
                    }
                    Err(e) if e.is_recoverable() => {
                        log::warn!("engine: rewind to {target} rejected: {e}");
                        events.push(SimEvent::RewindRejected { target, reason: e.to_string() });
                    }
                    Err(e) => return Err(e),
                }
            }

            TimeCommand::ResumePlayback => {
                if let Err(e) = self.controller.resume() {
                    log::warn!("engine: {e}");
                }
            }

            TimeCommand::Branch => match self.controller.branch(&mut self.clock, &mut self.spine) {
                Ok(at) => {
                    if let Some(export) = &self.export {
                        export.truncate_after(&self.run_id, at)?;
                    }
                    events.push(SimEvent::TimelineBranched { tick: at });
                }
                Err(e) => log::warn!("engine: {e}"),
            },
        }

        let to = self.controller.mode();
        if from != to {
            events.push(SimEvent::ModeChanged { tick, from, to });
        }
        Ok(())
    }

    // ── Stepping ───────────────────────────────────────────────

    /// One engine step. What it does depends on the rewind mode.
    pub fn tick(&mut self) -> SpineResult<Vec<SimEvent>> {
        let mut events = self.apply_pending()?;
        if self.clock.paused {
            log::debug!("engine: paused at tick {}", self.clock.current_tick);
            return Ok(events);
        }

        match self.controller.mode() {
            RewindMode::Recording => events.extend(self.record_step()?),
            RewindMode::Playback => {}
            RewindMode::CatchUp => {
                let stride = self.clock.ticks_per_step();
                let report = self.controller.step_catch_up(
                    stride,
                    &mut self.world,
                    &mut self.spine,
                    &self.registry,
                )?;
                log::debug!("engine: catch-up at tick {}", report.target);
                if self.controller.mode() == RewindMode::Recording {
                    events.push(SimEvent::ModeChanged {
                        tick: report.target,
                        from: RewindMode::CatchUp,
                        to:   RewindMode::Recording,
                    });
                }
            }
        }
        Ok(events)
    }

    fn record_step(&mut self) -> SpineResult<Vec<SimEvent>> {
        let current_tick = self.clock.advance();
        let mut tick_events = vec![SimEvent::TickStarted { tick: current_tick }];

        // Each subsystem sees the world as earlier subsystems left it.
        for (slot, subsystem) in &mut self.subsystems {
            let mut rng = self.rng_bank.for_subsystem_at_tick(*slot, current_tick);
            log::trace!("engine: tick {current_tick} {} ({} stream)", subsystem.name(), rng.name);
            let new_events =
                subsystem.update(current_tick, &mut self.world, &mut self.spine, &mut rng)?;
            tick_events.extend(new_events);
        }

        let report = self.recorder.record_tick(
            current_tick,
            RewindMode::Recording,
            self.clock.paused,
            &self.world,
            &mut self.spine,
            &self.registry,
        )?;
        if let Some(report) = report {
            self.mirror(&report)?;
        }

        tick_events.push(SimEvent::TickCompleted { tick: current_tick });
        Ok(tick_events)
    }

    /// Copy the tick just recorded into the export, then apply the same cutoff.
    fn mirror(&self, report: &RecordReport) -> SpineResult<()> {
        let Some(export) = &self.export else {
            return Ok(());
        };
        let tick = report.tick;
        if report.captured.is_some() {
            if let Some(frame) = self.spine.snapshots().frame_at(tick) {
                export.export_frame(&self.run_id, frame)?;
            }
        }
        export.export_journal(
            &self.run_id,
            self.spine.journal().replay_range(tick.saturating_sub(1), tick),
        )?;
        export.prune(&self.run_id, report.pruned.cutoff)?;
        Ok(())
    }

    /// Run n engine steps with the clock running. Used for testing and
    /// fast-forward.
    pub fn run_ticks(&mut self, n: u64) -> SpineResult<Vec<SimEvent>> {
        let mut events = Vec::new();
        if self.clock.current_tick == 0 && self.controller.mode() == RewindMode::Recording {
            events.push(SimEvent::RunInitialized {
                run_id: self.run_id.clone(),
                seed:   self.seed,
            });
        }
        self.clock.resume();
        for _ in 0..n {
            events.extend(self.tick()?);
        }
        self.clock.pause();
        Ok(events)
    }

    /// Rewind immediately, outside the tick loop, returning the typed outcome.
    /// Commands still queued are applied first.
    pub fn rewind_to(&mut self, target: Tick) -> SpineResult<RewindReport> {
        self.apply_pending()?;
        self.controller
            .rewind(target, &mut self.world, &mut self.spine, &self.registry)
    }

    // ── Inspection ─────────────────────────────────────────────

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn spine(&self) -> &TimeSpine {
        &self.spine
    }

    pub fn mode(&self) -> RewindMode {
        self.controller.mode()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn export(&self) -> Option<&HistoryExport> {
        self.export.as_ref()
    }

    /// Tick the world currently reflects.
    pub fn world_tick(&self) -> Tick {
        match self.controller.mode() {
            RewindMode::Recording => self.clock.current_tick,
            _ => self.controller.playback_tick(),
        }
    }

    pub fn fingerprint(&self) -> SpineResult<String> {
        self.world.fingerprint()
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            run_id:          self.run_id.clone(),
            live_tick:       self.clock.current_tick,
            mode:            self.controller.mode(),
            world_tick:      self.world_tick(),
            paused:          self.clock.paused,
            oldest_tick:     self.spine.oldest_reachable_tick(),
            frames:          self.spine.snapshots().len(),
            journal_entries: self.spine.journal().len(),
            pickups:         self.world.pickup_count(),
            ore_in_hold:     self.world.telemetry.ore_in_hold,
        }
    }
}
