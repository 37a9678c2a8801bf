//! Rollback / Restore Integration Tests
//!
//! End-to-end flows over an on-disk store:
//! - Recording through the async recorder
//! - Rollback by actor, region and inventory
//! - Restore of a marker
//! - Partial failure, cancellation and drift

use std::sync::Arc;

use tempfile::TempDir;

use worldlog::utils::now_millis;
use worldlog::{
    Action, AuditConfig, AuditService, BlockPos, EngineConfig, EventRecorder, EventStore, InventorySnapshot,
    InventorySnapshots, MemoryWorld, Mutation, RecorderConfig, Region, RollbackEngine, RollbackRequest,
    RollbackState, Scope, State, Target, Window,
};

const ALICE: &str = "u-alice";
const BOB: &str = "u-bob";

fn open_store(dir: &TempDir) -> EventStore {
    EventStore::open(&AuditConfig::new(dir.path())).expect("Failed to open store")
}

fn mutation(actor: &str, action: Action, before: State, after: State, ts: i64) -> Mutation {
    Mutation::new(actor, actor, "world", action, before, after).at(ts)
}

#[tokio::test]
async fn test_alice_scenario_through_recorder() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let recorder = EventRecorder::spawn(store.clone(), RecorderConfig::default());

    let at = BlockPos::new(10, 64, 10);
    recorder.record(mutation(ALICE, Action::BlockPlace { at }, State::air(), State::block("stone"), 0));
    recorder.record(mutation(ALICE, Action::BlockBreak { at }, State::block("stone"), State::air(), 500));
    recorder.record(mutation(ALICE, Action::BlockPlace { at }, State::air(), State::block("dirt"), 900));
    recorder.shutdown().await;

    let target = Target::block("world", at);
    let mut world = MemoryWorld::new().with(target.clone(), State::block("dirt"));
    let engine = RollbackEngine::new(store, EngineConfig::default());

    let result = engine
        .run("staff", Scope::actor(ALICE), Window::new(0, 1000), &mut world)
        .unwrap();

    assert_eq!(result.state, RollbackState::Done);
    assert_eq!(result.matched_events, 3);
    assert_eq!(result.applied, 1);
    assert!(world.state(&target).is_air());
}

#[test]
fn test_three_chest_edits_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let chest = BlockPos::new(-4, 70, 12);

    let events: Vec<_> = [(0, 100), (1, 200), (0, 300)]
        .into_iter()
        .map(|(slot, ts)| {
            mutation(
                BOB,
                Action::ContainerSlotChange { at: chest, slot },
                State::item("gold_ingot", 4),
                State::air(),
                ts,
            )
            .into_event(0)
        })
        .collect();
    store.append_batch(&events).unwrap();

    let found = store.query_by_location("world", chest, 0).unwrap();
    let times: Vec<i64> = found.iter().map(|e| e.timestamp).collect();
    assert_eq!(times, vec![300, 200, 100]);
}

#[test]
fn test_round_trip_restores_post_window_state() {
    let temp_dir = TempDir::new().unwrap();
    let service = AuditService::open(AuditConfig::new(temp_dir.path())).unwrap();
    let now = now_millis();

    let mut world = MemoryWorld::new();
    let mut events = Vec::new();
    for x in 0..20 {
        let at = BlockPos::new(x, 64, 0);
        let before = if x % 2 == 0 { State::air() } else { State::block("grass_block") };
        let after = State::block("tnt");
        world.insert(Target::block("world", at), after.clone());
        events.push(mutation(BOB, Action::BlockPlace { at }, before, after, now - 60_000 + x as i64).into_event(0));
    }
    service.store().append_batch(&events).unwrap();

    let undone = service
        .rollback(&RollbackRequest::actor("staff", BOB, "10m"), &mut world)
        .unwrap();
    assert_eq!(undone.applied, 20);
    assert!(world.state(&Target::block("world", BlockPos::new(0, 64, 0))).is_air());
    assert_eq!(
        world.state(&Target::block("world", BlockPos::new(1, 64, 0))),
        State::block("grass_block")
    );

    // immediately again: nothing left to undo
    let again = service
        .rollback(&RollbackRequest::actor("staff", BOB, "10m"), &mut world)
        .unwrap();
    assert_eq!((again.matched_events, again.applied), (0, 0));

    let redone = service.restore(undone.marker_id.unwrap(), &mut world).unwrap();
    assert!(redone.is_success());
    for x in 0..20 {
        assert_eq!(
            world.state(&Target::block("world", BlockPos::new(x, 64, 0))),
            State::block("tnt")
        );
    }

    let markers = service.markers(10).unwrap();
    assert_eq!(markers.len(), 1);
    assert!(markers[0].restored_at.is_some());
}

#[test]
fn test_region_rollback_from_selection_spares_outside() {
    let temp_dir = TempDir::new().unwrap();
    let service = AuditService::open(AuditConfig::new(temp_dir.path())).unwrap();
    let now = now_millis();

    let inside = BlockPos::new(5, 64, 5);
    let outside = BlockPos::new(500, 64, 5);
    service
        .store()
        .append_batch(&[
            mutation(ALICE, Action::BlockBreak { at: inside }, State::block("chest"), State::air(), now - 10).into_event(0),
            mutation(BOB, Action::BlockBreak { at: outside }, State::block("chest"), State::air(), now - 10).into_event(0),
            mutation(BOB, Action::Drop { slot: 0 }, State::item("diamond", 1), State::air(), now - 10).into_event(0),
        ])
        .unwrap();

    let sessions = service.sessions();
    sessions.set_corner("staff", worldlog::Corner::A, worldlog::Location::new("world", BlockPos::new(0, 0, 0)));
    sessions.set_corner("staff", worldlog::Corner::B, worldlog::Location::new("world", BlockPos::new(10, 255, 10)));

    let mut world = MemoryWorld::new();
    let request = RollbackRequest {
        issuer_id: "staff".to_string(),
        time: "1h".to_string(),
        ..Default::default()
    }
    .selection();
    let result = service.rollback(&request, &mut world).unwrap();

    assert_eq!(result.matched_events, 1);
    assert_eq!(world.state(&Target::block("world", inside)), State::block("chest"));
    assert!(world.state(&Target::block("world", outside)).is_air());
    assert!(world.state(&Target::inventory(BOB, 0)).is_air());
}

#[test]
fn test_rejected_write_skipped_rest_applied() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let events: Vec<_> = (0..10)
        .map(|x| {
            mutation(
                BOB,
                Action::BlockBreak { at: BlockPos::new(x, 64, 0) },
                State::block("glass"),
                State::air(),
                x as i64,
            )
            .into_event(0)
        })
        .collect();
    store.append_batch(&events).unwrap();

    let protected = Target::block("world", BlockPos::new(4, 64, 0));
    let mut world = MemoryWorld::new();
    world.reject(protected.clone());

    let engine = RollbackEngine::new(
        store,
        EngineConfig {
            apply_batch_size: 3,
            ..Default::default()
        },
    );
    let result = engine
        .run("staff", Scope::actor(BOB), Window::new(0, 100), &mut world)
        .unwrap();

    assert_eq!(result.state, RollbackState::Done);
    assert_eq!((result.applied, result.skipped), (9, 1));
    assert_eq!(result.errors.len(), 1);
    assert!(world.state(&protected).is_air());

    let marker = engine.store().marker(result.marker_id.unwrap()).unwrap().unwrap();
    assert_eq!(marker.event_ids.len(), 9);
    assert_eq!(marker.skipped_count, 1);
}

#[test]
fn test_cancel_between_batches_reports_partial_counts() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let events: Vec<_> = (0..10)
        .map(|x| {
            mutation(
                ALICE,
                Action::BlockPlace { at: BlockPos::new(x, 64, 0) },
                State::air(),
                State::block("sand"),
                x as i64,
            )
            .into_event(0)
        })
        .collect();
    store.append_batch(&events).unwrap();

    let engine = RollbackEngine::new(
        store,
        EngineConfig {
            apply_batch_size: 4,
            ..Default::default()
        },
    );
    let mut world = MemoryWorld::new();
    let mut job = engine.prepare("staff", Scope::actor(ALICE), Window::new(0, 100)).unwrap();
    let cancel = job.cancel_handle();
    assert_eq!((job.matched_events(), job.planned()), (10, 10));

    assert_eq!(job.apply_batch(&mut world), 4);
    cancel.cancel();
    assert_eq!(job.apply_batch(&mut world), 0);

    let result = engine.finish(job);
    assert_eq!(result.state, RollbackState::Cancelled);
    assert_eq!((result.applied, result.skipped), (4, 0));
    assert_eq!(world.writes(), 4);

    // the applied part is recorded and can be restored
    let marker = engine.store().marker(result.marker_id.unwrap()).unwrap().unwrap();
    assert_eq!(marker.event_ids.len(), 4);
}

#[test]
fn test_drift_counted_and_overwritten() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let at = BlockPos::new(0, 64, 0);
    store
        .append(&mutation(ALICE, Action::BlockPlace { at }, State::air(), State::block("stone"), 10).into_event(0))
        .unwrap();

    // someone else changed the block after the window, unrecorded
    let target = Target::block("world", at);
    let mut world = MemoryWorld::new().with(target.clone(), State::block("obsidian"));
    let engine = RollbackEngine::new(store, EngineConfig::default());

    let result = engine
        .run("staff", Scope::actor(ALICE), Window::new(0, 100), &mut world)
        .unwrap();
    assert_eq!(result.drifted, 1);
    assert_eq!(result.applied, 1);
    assert!(world.state(&target).is_air());
}

#[tokio::test]
async fn test_inventory_rollback_uses_snapshot_anchor() {
    let temp_dir = TempDir::new().unwrap();
    let service = AuditService::open(AuditConfig::new(temp_dir.path())).unwrap();
    let recorder = Arc::new(EventRecorder::spawn(service.store().clone(), RecorderConfig::default()));
    let snapshots = InventorySnapshots::from_config(Arc::clone(&recorder), service.config());
    let now = now_millis();

    // anchor two hours ago
    let mut world = MemoryWorld::new()
        .with(Target::inventory(ALICE, 0), State::item("diamond_pickaxe", 1))
        .with(Target::inventory(ALICE, 1), State::item("bread", 10));
    assert!(snapshots
        .capture_at(ALICE, "Alice", &world, now - 2 * 3_600_000)
        .unwrap());

    // before the window: ate some bread
    recorder.record(mutation(
        ALICE,
        Action::InventorySlotChange { slot: 1 },
        State::item("bread", 10),
        State::item("bread", 7),
        now - 3_600_000,
    ));
    // inside the window: the pickaxe moved from slot 0 to slot 5, then got dropped
    recorder.record(mutation(
        ALICE,
        Action::InventorySlotChange { slot: 0 },
        State::item("diamond_pickaxe", 1),
        State::air(),
        now - 60_000,
    ));
    recorder.record(mutation(
        ALICE,
        Action::InventorySlotChange { slot: 5 },
        State::air(),
        State::item("diamond_pickaxe", 1),
        now - 59_000,
    ));
    recorder.record(mutation(
        ALICE,
        Action::Drop { slot: 5 },
        State::item("diamond_pickaxe", 1),
        State::air(),
        now - 30_000,
    ));
    recorder.shutdown().await;

    world.insert(Target::inventory(ALICE, 0), State::air());
    world.insert(Target::inventory(ALICE, 1), State::item("bread", 7));

    let result = service.inventory_rollback("staff", ALICE, "10m", &mut world).unwrap();
    assert_eq!(result.state, RollbackState::Done);
    assert_eq!(result.matched_events, 3);

    assert_eq!(world.state(&Target::inventory(ALICE, 0)), State::item("diamond_pickaxe", 1));
    assert_eq!(world.state(&Target::inventory(ALICE, 1)), State::item("bread", 7));
    assert!(world.state(&Target::inventory(ALICE, 5)).is_air());
}

#[test]
fn test_inventory_round_trip_keeps_later_slot_changes() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);

    let contents = vec![(1, State::item("torch", 8))].into_iter().collect();
    store
        .save_snapshot(&InventorySnapshot::new(10, ALICE, "Alice", contents))
        .unwrap();
    store
        .append_batch(&[
            mutation(ALICE, Action::InventorySlotChange { slot: 0 }, State::air(), State::item("stone", 4), 100)
                .into_event(0),
            // after the window: the torches get used up
            mutation(ALICE, Action::InventorySlotChange { slot: 1 }, State::item("torch", 8), State::air(), 300)
                .into_event(0),
        ])
        .unwrap();

    let mut world = MemoryWorld::new()
        .with(Target::inventory(ALICE, 0), State::item("stone", 4))
        .with(Target::inventory(ALICE, 1), State::air());
    let engine = RollbackEngine::new(store.clone(), EngineConfig::default());

    let scope = Scope::actor(ALICE).only(&[worldlog::EventCategory::Inventory]);
    let undone = engine.run("staff", scope, Window::new(50, 200), &mut world).unwrap();
    assert_eq!((undone.applied, undone.drifted), (1, 0));
    assert!(world.state(&Target::inventory(ALICE, 0)).is_air());
    assert!(world.state(&Target::inventory(ALICE, 1)).is_air());

    let restore = worldlog::RestoreEngine::new(store, EngineConfig::default());
    let redone = restore.run(undone.marker_id.unwrap(), &mut world).unwrap();
    assert!(redone.is_success());
    assert_eq!(world.state(&Target::inventory(ALICE, 0)), State::item("stone", 4));
    assert!(world.state(&Target::inventory(ALICE, 1)).is_air());
}

#[test]
fn test_marker_outliving_its_purged_events_restores_nothing_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let now = now_millis();
    let alice_at = BlockPos::new(0, 64, 0);
    let bob_at = BlockPos::new(999, 64, 0);

    let alice_marker = {
        let store = open_store(&temp_dir);
        store
            .append(&mutation(ALICE, Action::BlockPlace { at: alice_at }, State::air(), State::block("stone"), 1_000).into_event(0))
            .unwrap();
        let engine = RollbackEngine::new(store.clone(), EngineConfig::default());
        let mut world = MemoryWorld::new();
        let result = engine
            .run("staff", Scope::actor(ALICE), Window::new(0, 2_000), &mut world)
            .unwrap();

        // the event expires, the marker (created now) does not
        let counts = store.purge_before(10_000).unwrap();
        assert_eq!((counts.block, counts.markers), (1, 0));
        result.marker_id.unwrap()
    };

    let store = open_store(&temp_dir);
    let bob_id = store
        .append(&mutation(BOB, Action::BlockPlace { at: bob_at }, State::air(), State::block("tnt"), now).into_event(0))
        .unwrap();
    assert!(bob_id > 1);

    let mut world = MemoryWorld::new().with(Target::block("world", bob_at), State::block("tnt"));
    let engine = RollbackEngine::new(store.clone(), EngineConfig::default());
    engine
        .run("staff", Scope::actor(BOB), Window::new(now - 1_000, now + 1), &mut world)
        .unwrap();
    assert!(world.state(&Target::block("world", bob_at)).is_air());

    let restore = worldlog::RestoreEngine::new(store, EngineConfig::default());
    let result = restore.run(alice_marker, &mut world).unwrap();
    assert_eq!((result.matched_events, result.applied), (0, 0));
    assert!(world.state(&Target::block("world", bob_at)).is_air());
}

#[test]
fn test_zero_width_and_inverted_windows() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RollbackEngine::new(open_store(&temp_dir), EngineConfig::default());
    let mut world = MemoryWorld::new();

    let result = engine
        .run("staff", Scope::actor(ALICE), Window::new(100, 100), &mut world)
        .unwrap();
    assert_eq!(result.state, RollbackState::Done);
    assert_eq!((result.applied, result.skipped, result.matched_events), (0, 0, 0));

    let region = Region::new("world", BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1));
    assert!(engine
        .run("staff", Scope::region(region), Window::new(100, 0), &mut world)
        .is_err());
}

#[test]
fn test_purge_twice_second_removes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let now = now_millis();
    let day = worldlog::types::MS_PER_DAY;

    store
        .append_batch(&[
            mutation(ALICE, Action::Pickup { slot: 0 }, State::air(), State::item("apple", 1), now - 10 * day).into_event(0),
            mutation(ALICE, Action::Pickup { slot: 1 }, State::air(), State::item("apple", 1), now - 6 * day).into_event(0),
        ])
        .unwrap();
    store
        .save_snapshot(&InventorySnapshot::new(now - 8 * day, ALICE, "Alice", Default::default()))
        .unwrap();

    let first = store.purge(7).unwrap();
    assert_eq!((first.inventory, first.snapshots), (1, 1));
    assert_eq!(store.purge(7).unwrap().total(), 0);
    assert_eq!(store.stats().unwrap().total_events(), 1);
}
