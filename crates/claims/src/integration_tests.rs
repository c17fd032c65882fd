//! Integration tests for the claim bridge using the `TestHost` harness.
//!
//! Each test starts a headless Bevy App with `ClaimBridgePlugin` against a
//! fake server and a fake claim plugin shaped like one fork, and drives it
//! through the public bridge API.

mod prompt_tests;
mod teleport_tests;
mod trust_propagation_tests;

use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::error::SchedulerError;
use crate::test_harness::{at, ClaimSpec, ForkProfile, SchedulerProfile, TestHost};
use crate::trust::TrustLevel;
use crate::Bridge;

// ===========================================================================
// 1. Harness bootstrap
// ===========================================================================

#[test]
fn test_plugin_inserts_bridge_resource() {
    let mut host = TestHost::new(ForkProfile::legacy());
    host.tick(1);
    assert!(host.app_mut().world().get_resource::<Bridge>().is_some());
    assert!(host.bridge().is_available());
}

#[test]
fn test_startup_binds_store_and_detects_fork() {
    let mut host = TestHost::new(ForkProfile::three_d()).with_claim(ClaimSpec::column(1, 0, 0, 10, 10));
    let bridge = host.bridge();
    let binding = bridge.resolver().binding().expect("bound during startup");
    assert!(binding.claim_at.is_some());
    assert!(bridge.resolver().detect_fork_variant().supports_3d);
}

#[test]
fn test_invalid_config_leaves_bridge_out() {
    let config = BridgeConfig {
        world_min_y: 320,
        world_max_y: -64,
        ..BridgeConfig::default()
    };
    let mut host = TestHost::new(ForkProfile::legacy()).with_config(config);
    assert!(host.try_bridge().is_none());
}

#[test]
fn test_missing_store_keeps_bridge_running() {
    let mut host = TestHost::without_store(SchedulerProfile::Classic);
    host.tick(3);
    let bridge = host.bridge();
    assert!(!bridge.is_available());
    assert!(bridge.locate("world", 0.0, 64.0, 0.0).is_none());
    assert!(bridge.find_by_id("1").is_none());
}

// ===========================================================================
// 2. Most specific claim wins
// ===========================================================================

fn mailbox_tree() -> ClaimSpec {
    ClaimSpec::new(1, (0, 0, 0), (50, 255, 50)).child(ClaimSpec::new(2, (5, 64, 5), (5, 64, 5)))
}

#[test]
fn test_mailbox_subdivision_beats_parent_on_every_fork() {
    for fork in [
        ForkProfile::legacy(),
        ForkProfile::modern(),
        ForkProfile::three_d(),
        ForkProfile::bare(),
    ] {
        let mut host = TestHost::new(fork.clone()).with_claim(mailbox_tree());
        let bridge = host.bridge();
        for _ in 0..5 {
            let found = bridge
                .locate("world", 5.0, 64.0, 5.0)
                .and_then(|claim| claim.id());
            assert_eq!(found.as_deref(), Some("2"), "fork {}", fork.claim_class);
        }
    }
}

#[test]
fn test_locate_sees_claims_added_after_startup() {
    let mut host = TestHost::new(ForkProfile::bare());
    let bridge = host.bridge();
    assert!(bridge.locate("world", 5.0, 64.0, 5.0).is_none());
    host.add_claim(&mailbox_tree());
    assert_eq!(
        bridge.locate("world", 5.0, 64.0, 5.0).and_then(|c| c.id()).as_deref(),
        Some("2")
    );
}

#[test]
fn test_located_claim_reports_parent() {
    let mut host = TestHost::new(ForkProfile::three_d()).with_claim(mailbox_tree());
    let bridge = host.bridge();
    let mailbox = bridge.locate("world", 5.0, 64.0, 5.0).expect("mailbox");
    assert!(mailbox.is_subdivision());
    let parent = mailbox.parent().expect("has a parent");
    assert_eq!(parent.id().as_deref(), Some("1"));
    assert!(!parent.is_subdivision(), "self-parented top level is not a subdivision");
}

// ===========================================================================
// 3. Lookup by id at any depth
// ===========================================================================

fn deep_tree() -> ClaimSpec {
    ClaimSpec::column(10, 0, 0, 200, 200).child(
        ClaimSpec::column(11, 10, 10, 100, 100)
            .child(ClaimSpec::column(12, 20, 20, 60, 60).child(ClaimSpec::column(13, 30, 30, 40, 40))),
    )
}

#[test]
fn test_find_by_id_at_depth_three() {
    for fork in [ForkProfile::legacy(), ForkProfile::three_d(), ForkProfile::bare()] {
        let mut host = TestHost::new(fork)
            .with_claim(ClaimSpec::column(1, 500, 500, 510, 510))
            .with_claim(deep_tree());
        let bridge = host.bridge();
        let found = bridge.find_by_id("13").expect("depth-3 subdivision");
        assert_eq!(found.id().as_deref(), Some("13"));
        assert_eq!(found.corners().map(|c| (c.min_x, c.max_x)), Some((30, 40)));
        assert!(bridge.find_by_id("99").is_none());
    }
}

#[test]
fn test_find_by_id_matches_admin_claims() {
    let mut host = TestHost::new(ForkProfile::legacy()).with_claim(ClaimSpec::column(7, 0, 0, 5, 5).admin());
    let claim = host.bridge().find_by_id("7").expect("admin claim");
    assert!(claim.is_admin());
    assert_eq!(claim.owner(), None);
}

// ===========================================================================
// 4. Fork detection is memoized
// ===========================================================================

#[test]
fn test_repeated_fork_detection_does_not_probe() {
    let mut host = TestHost::new(ForkProfile::three_d()).with_claim(ClaimSpec::column(1, 0, 0, 10, 10));
    let bridge = host.bridge();
    let lookups = || host.plugin_loader().lookups() + host.bridge_loader().lookups();

    let before = lookups();
    let first = bridge.resolver().detect_fork_variant();
    let second = bridge.resolver().detect_fork_variant();
    assert_eq!(first, second);
    assert_eq!(lookups(), before, "verdict was cached at startup");
}

// ===========================================================================
// 5. Trust through the permission enum
// ===========================================================================

#[test]
fn test_permission_only_fork_grants_build() {
    let mut host = TestHost::new(ForkProfile::modern()).with_claim(ClaimSpec::column(1, 0, 0, 10, 10));
    let bridge = host.bridge();
    let claim = bridge.find_by_id("1").expect("claim");
    assert!(bridge.trust().grant(TrustLevel::Build, "alice", &claim));
    assert_eq!(host.claim(1).trusted(TrustLevel::Build), vec!["alice"]);
}

#[test]
fn test_fork_without_trust_api_refuses() {
    let mut host = TestHost::new(ForkProfile::bare()).with_claim(ClaimSpec::column(1, 0, 0, 10, 10));
    let bridge = host.bridge();
    let claim = bridge.find_by_id("1").expect("claim");
    assert!(!bridge.trust().grant(TrustLevel::Build, "alice", &claim));
    assert!(host.claim(1).trusted(TrustLevel::Build).is_empty());
}

// ===========================================================================
// 6. Region scheduling never falls back
// ===========================================================================

#[test]
fn test_region_without_submit_methods_fails_loudly() {
    let mut host = TestHost::with_model(
        ForkProfile::legacy(),
        SchedulerProfile::PartitionedMissingRegionMethods,
    );
    let bridge = host.bridge();
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let result = bridge.scheduler().run_at_location(&at(0.0, 64.0, 0.0), move || {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    });
    assert!(matches!(result, Err(SchedulerError::NoCompatibleMethod { .. })));
    host.tick(10);
    host.join_async();
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
}

// ===========================================================================
// 7. Unavailable diagnostics are rate limited
// ===========================================================================

#[test]
fn test_unavailable_store_logs_once_in_a_tight_loop() {
    let mut host = TestHost::without_store(SchedulerProfile::Classic);
    let bridge = host.bridge();
    let after_startup = bridge.resolver().unavailable_reports();
    assert_eq!(after_startup, 1, "startup probe reports once");
    for _ in 0..5_000 {
        assert!(!bridge.is_available());
    }
    assert_eq!(bridge.resolver().unavailable_reports(), 1);
}

#[test]
fn test_store_loaded_after_startup_becomes_available() {
    let mut host = TestHost::new(ForkProfile::three_d());
    host.unload_store();
    host.tick(1);
    let bridge = host.bridge();
    assert!(!bridge.is_available());
    host.load_store();
    host.add_claim(&ClaimSpec::column(1, 0, 0, 10, 10));
    assert!(bridge.is_available());
    assert!(bridge.find_by_id("1").is_some());
}
