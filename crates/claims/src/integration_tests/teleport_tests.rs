use std::sync::{Arc, Mutex};

use crate::error::{BridgeError, SchedulerError};
use crate::host::Location;
use crate::teleport::{safe_teleport, teleport_to_claim, TeleportOutcome};
use crate::test_harness::{
    at, player_ref, ClaimSpec, ForkProfile, SchedulerProfile, TestHost, DEFAULT_SURFACE_Y,
};

type Slot = Arc<Mutex<Option<TeleportOutcome>>>;

fn outcome_slot() -> (Slot, impl FnOnce(TeleportOutcome) + Send + 'static) {
    let slot: Slot = Arc::default();
    let write = Arc::clone(&slot);
    (slot, move |outcome| *write.lock().unwrap() = Some(outcome))
}

fn taken(slot: &Slot) -> Option<TeleportOutcome> {
    slot.lock().unwrap().clone()
}

// ====================================================================
// Safe teleport
// ====================================================================

#[test]
fn test_teleport_lands_above_surface_classic() {
    let mut host = TestHost::new(ForkProfile::legacy());
    host.world().set_surface(100, -41, 70);
    let player = host.spawn_player("p1", at(0.5, 64.0, 0.5));
    let bridge = host.bridge();
    let (slot, done) = outcome_slot();

    safe_teleport(&bridge, &player_ref(&player), &at(100.3, 90.0, -40.7), done).unwrap();
    host.tick(2);

    let expected = Location::new("world", 100.5, 71.0, -40.5);
    assert_eq!(taken(&slot), Some(TeleportOutcome::Teleported(expected.clone())));
    assert_eq!(player.location(), expected);
    assert!(host.affinity_violations().is_empty(), "{:?}", host.affinity_violations());
}

#[test]
fn test_teleport_across_regions_partitioned() {
    let mut host = TestHost::partitioned(ForkProfile::legacy());
    host.world().set_surface(4000, 4000, 90);
    let player = host.spawn_player("p1", at(-3000.5, 64.0, 12.5));
    let bridge = host.bridge();
    let (slot, done) = outcome_slot();

    safe_teleport(&bridge, &player_ref(&player), &at(4000.0, 10.0, 4000.0), done).unwrap();
    host.tick(1);
    assert_eq!(taken(&slot), None, "entity hop runs on the following tick");
    host.tick(1);

    let expected = Location::new("world", 4000.5, 91.0, 4000.5);
    assert_eq!(taken(&slot), Some(TeleportOutcome::Teleported(expected.clone())));
    assert_eq!(player.location(), expected);
    assert!(host.affinity_violations().is_empty(), "{:?}", host.affinity_violations());
}

#[test]
fn test_teleport_of_removed_entity_reports_failure() {
    let mut host = TestHost::partitioned(ForkProfile::legacy());
    let player = host.spawn_player("p1", at(0.5, 64.0, 0.5));
    let bridge = host.bridge();
    let (slot, done) = outcome_slot();

    safe_teleport(&bridge, &player_ref(&player), &at(50.0, 64.0, 50.0), done).unwrap();
    player.remove();
    host.tick(3);

    assert!(matches!(taken(&slot), Some(TeleportOutcome::Failed(_))));
    assert_eq!(player.location(), at(0.5, 64.0, 0.5));
}

#[test]
fn test_teleport_into_unloaded_world_fails() {
    let mut host = TestHost::new(ForkProfile::legacy());
    let player = host.spawn_player("p1", at(0.5, 64.0, 0.5));
    let bridge = host.bridge();
    let (slot, done) = outcome_slot();

    let target = Location::new("world_the_end", 0.0, 64.0, 0.0);
    safe_teleport(&bridge, &player_ref(&player), &target, done).unwrap();
    host.tick(2);

    assert!(matches!(taken(&slot), Some(TeleportOutcome::Failed(_))));
    assert_eq!(player.location().world, "world");
}

#[test]
fn test_teleport_refused_without_region_scheduler() {
    let mut host = TestHost::with_model(
        ForkProfile::legacy(),
        SchedulerProfile::PartitionedMissingRegionMethods,
    );
    let player = host.spawn_player("p1", at(0.5, 64.0, 0.5));
    let bridge = host.bridge();
    let (slot, done) = outcome_slot();

    let result = safe_teleport(&bridge, &player_ref(&player), &at(80.0, 64.0, 80.0), done);
    assert!(matches!(
        result,
        Err(BridgeError::Scheduler(SchedulerError::NoCompatibleMethod { .. }))
    ));
    host.tick(3);
    assert_eq!(taken(&slot), None);
    assert_eq!(player.location(), at(0.5, 64.0, 0.5));
}

// ====================================================================
// Claim teleport
// ====================================================================

#[test]
fn test_teleport_to_claim_centre() {
    for model in [SchedulerProfile::Classic, SchedulerProfile::Partitioned] {
        let mut host = TestHost::with_model(ForkProfile::modern(), model)
            .with_claim(ClaimSpec::column(1, 100, 100, 120, 120));
        let player = host.spawn_player("p1", at(0.5, 64.0, 0.5));
        let bridge = host.bridge();
        let claim = bridge.find_by_id("1").expect("claim");
        let (slot, done) = outcome_slot();

        teleport_to_claim(&bridge, &player_ref(&player), &claim, done).unwrap();
        host.tick(2);

        let expected = Location::new("world", 110.5, (DEFAULT_SURFACE_Y + 1) as f64, 110.5);
        assert_eq!(
            taken(&slot),
            Some(TeleportOutcome::Teleported(expected)),
            "{model:?}"
        );
        assert!(host.affinity_violations().is_empty(), "{model:?}");
    }
}
