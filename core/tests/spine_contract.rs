//! Store and controller contracts exercised directly, without gameplay.

use timespine_core::{
    adapters::AdapterRegistry,
    config::{SpineConfig, SimConfig},
    command::TimeCommand,
    controller::{RewindController, RewindMode},
    engine::SimEngine,
    error::SpineError,
    event::SimEvent,
    journal::JournalEntry,
    recorder::Recorder,
    snapshot::{SnapshotEntry, SnapshotPayload, SnapshotStore},
    spine::TimeSpine,
    types::{EntityId, Position, ResourceType},
    world::{Pickup, ResourceNode, Vessel, World},
};

fn pickup(amount: f32, x: f32) -> Pickup {
    Pickup {
        resource:   ResourceType::Ice,
        amount,
        source:     None,
        position:   Position::new(x, 0.0, 0.0),
        spawn_tick: 0,
    }
}

fn record(tick: u64, world: &World, spine: &mut TimeSpine, registry: &AdapterRegistry) {
    Recorder::new()
        .record_tick(tick, RewindMode::Recording, false, world, spine, registry)
        .expect("record");
}

#[test]
fn ephemeral_pickups_are_rebuilt_from_the_snapshot() {
    let registry = AdapterRegistry::standard();
    let mut spine = TimeSpine::new(&SpineConfig::default());
    let mut world = World::new();

    let mut old = Vec::new();
    for i in 0..3 {
        old.push(world.spawn_pickup(pickup(1.0 + i as f32, i as f32)));
    }
    record(0, &world, &mut spine, &registry);
    let at_zero = world.fingerprint().expect("fingerprint");

    for i in 3..5 {
        old.push(world.spawn_pickup(pickup(1.0 + i as f32, i as f32)));
    }
    record(1, &world, &mut spine, &registry);
    assert_eq!(world.pickup_count(), 5);

    RewindController::new()
        .reconstruct(0, &mut world, &mut spine, &registry)
        .expect("reconstruct");

    assert_eq!(world.pickup_count(), 3);
    let mut amounts: Vec<f32> = world.pickups().map(|(_, p)| p.amount).collect();
    amounts.sort_by(f32::total_cmp);
    assert_eq!(amounts, vec![1.0, 2.0, 3.0]);
    for handle in old {
        assert!(!world.is_alive(handle), "stale handle {handle} still resolves");
    }
    assert_eq!(world.fingerprint().expect("fingerprint"), at_zero);
}

#[test]
fn dangling_journal_entries_are_skipped_and_counted() {
    let registry = AdapterRegistry::standard();
    // Off-interval tick 1 forces the replay path.
    let mut spine = TimeSpine::new(&SpineConfig { snapshot_interval: 2, ..SpineConfig::default() });
    let mut world = World::new();
    let node = world.add_node(ResourceNode {
        name:        "n".into(),
        resource:    ResourceType::Ice,
        remaining:   50.0,
        max_amount:  50.0,
        gather_rate: 1.0,
        position:    Position::ZERO,
    });
    let vessel = world.add_vessel(Vessel {
        name:        "v".into(),
        resource:    ResourceType::Ice,
        cargo:       0.0,
        capacity:    100.0,
        target_node: node,
        crew:        None,
        position:    Position::ZERO,
    });
    record(0, &world, &mut spine, &registry);

    world.gather(node, vessel, 2.0);
    spine.append(JournalEntry::gather(1, node, vessel, ResourceType::Ice, 2.0)).expect("append");
    spine
        .append(JournalEntry::gather(1, node, EntityId::new(77, 3), ResourceType::Ice, 5.0))
        .expect("append");
    record(1, &world, &mut spine, &registry);

    let report = RewindController::new()
        .reconstruct(1, &mut world, &mut spine, &registry)
        .expect("reconstruct");
    assert_eq!((report.snapshot_tick, report.replayed, report.skipped), (0, 1, 1));
    assert_eq!(world.nodes[&node].remaining, 48.0);
    assert_eq!(world.vessels[&vessel].cargo, 2.0);
}

#[test]
fn capture_below_the_prune_cutoff_is_fatal() {
    let mut store = SnapshotStore::new();
    for tick in 0..10 {
        store.capture(tick, Vec::new()).expect("capture");
    }
    store.prune(6);

    let err = store.capture(3, Vec::new()).expect_err("below cutoff");
    assert!(matches!(err, SpineError::InconsistentCaptureWrite { tick: 3, cutoff: 6 }));
    assert!(!err.is_recoverable());
}

#[test]
fn recapturing_a_tick_replaces_it() {
    let mut store = SnapshotStore::new();
    let entry = |amount| {
        SnapshotEntry::new(
            4,
            EntityId::new(0, 0),
            SnapshotPayload::VesselCargo { resource: ResourceType::Ice, amount },
        )
    };
    store.capture(4, vec![entry(1.0)]).expect("first");
    store.capture(4, vec![entry(9.0)]).expect("second");

    assert_eq!(store.len(), 1);
    let frame = store.frame_at(4).expect("frame");
    assert_eq!(frame.entries, vec![entry(9.0)]);
}

#[test]
fn journal_cap_prunes_both_stores_together() {
    let mut config = SimConfig::default().with_horizon(0);
    config.spine.max_journal_entries = 200;
    let mut engine = SimEngine::build("capped".into(), 3, &config).expect("engine");
    engine.run_ticks(150).expect("run");

    let spine = engine.spine();
    assert!(spine.journal().len() <= 200);
    let oldest_frame = spine.snapshots().oldest_tick().expect("frames");
    let oldest_entry = spine.journal().oldest_tick().expect("entries");
    assert!(oldest_frame > 0, "the cap must have pruned something");
    assert!(oldest_frame <= oldest_entry);

    engine.rewind_to(oldest_frame).expect("oldest frame is still reachable");
    let err = engine.rewind_to(oldest_frame - 1).expect_err("pruned by the cap");
    assert!(matches!(err, SpineError::OutOfRetentionWindow { .. }));
}

#[test]
fn only_the_latest_rewind_request_in_a_frame_applies() {
    let mut engine = SimEngine::build_test(8).expect("engine");
    engine.run_ticks(40).expect("run");

    engine.submit(TimeCommand::Rewind { target: 10 });
    engine.submit(TimeCommand::Rewind { target: 30 });
    let events = engine.apply_pending().expect("apply");

    let completed: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SimEvent::RewindCompleted { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![30]);
    assert_eq!(engine.world_tick(), 30);
}

#[test]
fn rejected_rewind_request_is_reported_as_an_event() {
    let mut engine = SimEngine::build_test(8).expect("engine");
    engine.run_ticks(5).expect("run");

    let events = engine.request(TimeCommand::Rewind { target: 99 }).expect("apply");
    assert!(events
        .iter()
        .any(|e| matches!(e, SimEvent::RewindRejected { target: 99, .. })));
    assert_eq!(engine.mode(), RewindMode::Recording);
}
