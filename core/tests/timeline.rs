//! Mode transitions through the engine: playback, catch-up, branch.

use timespine_core::{
    clock::SimSpeed,
    command::TimeCommand,
    config::SimConfig,
    controller::RewindMode,
    engine::SimEngine,
    event::SimEvent,
    store::HistoryExport,
    types::Tick,
};

fn engine_with(config: &SimConfig, seed: u64) -> SimEngine {
    SimEngine::build(format!("timeline-{seed}"), seed, config).expect("engine")
}

#[test]
fn playback_holds_the_world_and_seals_the_journal() {
    let mut engine = SimEngine::build_test(21).expect("engine");
    engine.run_ticks(60).expect("run");
    let journal_len = engine.spine().journal().len();

    engine.rewind_to(20).expect("rewind");
    let held = engine.fingerprint().expect("fingerprint");
    engine.run_ticks(15).expect("playback ticks");

    assert_eq!(engine.mode(), RewindMode::Playback);
    assert!(engine.spine().journal().is_sealed());
    assert_eq!(engine.clock.current_tick, 60, "live tick does not move in playback");
    assert_eq!(engine.fingerprint().expect("fingerprint"), held);
    assert_eq!(engine.spine().journal().len(), journal_len);
}

#[test]
fn catch_up_strides_by_speed_and_returns_to_recording() {
    let mut engine = SimEngine::build_test(22).expect("engine");
    engine.run_ticks(100).expect("run");
    let live = engine.fingerprint().expect("fingerprint");

    engine.rewind_to(40).expect("rewind");
    engine.request(TimeCommand::SetSpeed { speed: SimSpeed::Accelerated }).expect("speed");
    let events = engine.request(TimeCommand::ResumePlayback).expect("resume");
    assert!(events.iter().any(|e| matches!(
        e,
        SimEvent::ModeChanged { from: RewindMode::Playback, to: RewindMode::CatchUp, .. }
    )));

    let mut steps = 0;
    while engine.mode() == RewindMode::CatchUp {
        engine.run_ticks(1).expect("catch-up step");
        steps += 1;
    }

    assert_eq!(steps, 15, "60 ticks at 4 per step");
    assert_eq!(engine.mode(), RewindMode::Recording);
    assert!(!engine.spine().journal().is_sealed());
    assert_eq!(engine.world_tick(), 100);
    assert_eq!(engine.fingerprint().expect("fingerprint"), live);

    engine.run_ticks(1).expect("record again");
    assert_eq!(engine.clock.current_tick, 101);
    assert_eq!(engine.spine().state.last_recorded_tick, 101);
}

#[test]
fn branching_discards_the_future_and_resimulates_identically() {
    let mut engine = SimEngine::build_test(23).expect("engine");
    engine.run_ticks(90).expect("run");
    let original = engine.fingerprint().expect("fingerprint");

    engine.rewind_to(50).expect("rewind");
    let events = engine.request(TimeCommand::Branch).expect("branch");
    assert!(events.iter().any(|e| matches!(e, SimEvent::TimelineBranched { tick: 50 })));

    assert_eq!(engine.mode(), RewindMode::Recording);
    assert_eq!(engine.clock.current_tick, 50);
    assert_eq!(engine.spine().snapshots().newest_tick(), Some(50));
    assert!(engine.spine().journal().newest_tick().unwrap_or(0) <= 50);

    engine.run_ticks(40).expect("re-simulate");
    assert_eq!(engine.fingerprint().expect("fingerprint"), original);
}

#[test]
fn branch_outside_playback_is_ignored() {
    let mut engine = SimEngine::build_test(24).expect("engine");
    engine.run_ticks(10).expect("run");
    let events = engine.request(TimeCommand::Branch).expect("branch");
    assert!(events.is_empty());
    assert_eq!(engine.clock.current_tick, 10);
}

#[test]
fn sparse_snapshots_replay_the_gap() {
    let mut config = SimConfig::default().with_horizon(0);
    config.spine.snapshot_interval = 8;
    let mut engine = engine_with(&config, 25);

    let mut recorded = vec![engine.fingerprint().expect("fingerprint")];
    for _ in 0..60 {
        engine.run_ticks(1).expect("tick");
        recorded.push(engine.fingerprint().expect("fingerprint"));
    }
    assert_eq!(engine.spine().snapshots().len(), 8, "ticks 0, 8, .., 56");

    for target in [5 as Tick, 8, 43, 60] {
        let report = engine.rewind_to(target).expect("rewind");
        assert_eq!(report.snapshot_tick, target / 8 * 8);
        assert_eq!(
            engine.fingerprint().expect("fingerprint"),
            recorded[target as usize],
            "tick {target} rebuilt from snapshot {}",
            report.snapshot_tick
        );
    }
}

#[test]
fn history_export_mirrors_the_retained_window() {
    let config = SimConfig::default().with_horizon(50);
    let mut engine = engine_with(&config, 26);
    let export = HistoryExport::in_memory().expect("export");
    export.migrate().expect("migrate");
    engine.attach_export(export).expect("attach");

    engine.run_ticks(150).expect("run");

    let export = engine.export().expect("attached");
    let run_id = engine.run_id.clone();
    assert_eq!(export.snapshot_tick_range(&run_id).expect("range"), Some((101, 150)));
    assert_eq!(
        export.snapshot_entry_count(&run_id).expect("count") as usize,
        engine.spine().snapshots().entry_count()
    );
    assert_eq!(
        export.journal_entry_count(&run_id).expect("count") as usize,
        engine.spine().journal().len()
    );

    engine.rewind_to(120).expect("rewind");
    engine.request(TimeCommand::Branch).expect("branch");
    let export = engine.export().expect("attached");
    assert_eq!(export.snapshot_tick_range(&run_id).expect("range"), Some((101, 120)));
    assert_eq!(
        export.journal_entry_count(&run_id).expect("count") as usize,
        engine.spine().journal().len()
    );
}

fn sparse_engine(horizon: Tick, max_journal_entries: usize, seed: u64) -> SimEngine {
    let mut config = SimConfig::default().with_horizon(horizon);
    config.spine.snapshot_interval = 8;
    config.spine.max_journal_entries = max_journal_entries;
    engine_with(&config, seed)
}

fn assert_current_tick_rebuilds(mut engine: SimEngine) {
    engine.run_ticks(13).expect("run");
    let at_13 = engine.fingerprint().expect("fingerprint");
    engine.run_ticks(2).expect("run");
    let at_15 = engine.fingerprint().expect("fingerprint");

    assert_eq!(engine.spine().oldest_reachable_tick(), Some(8));
    assert_eq!(engine.spine().journal().oldest_tick().map(|t| t >= 8), Some(true));

    let report = engine.rewind_to(15).expect("current tick stays reachable");
    assert_eq!(report.snapshot_tick, 8);
    assert_eq!(engine.fingerprint().expect("fingerprint"), at_15);

    engine.rewind_to(13).expect("rewind inside the gap");
    assert_eq!(engine.fingerprint().expect("fingerprint"), at_13);
}

#[test]
fn short_horizon_keeps_the_baseline_frame_between_captures() {
    assert_current_tick_rebuilds(sparse_engine(4, 0, 27));
}

#[test]
fn journal_cap_keeps_the_baseline_frame_between_captures() {
    assert_current_tick_rebuilds(sparse_engine(512, 10, 28));
}
