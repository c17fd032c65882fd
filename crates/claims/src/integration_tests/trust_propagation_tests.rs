use crate::test_harness::{ClaimSpec, ForkProfile, TestHost};
use crate::trust::{PropagationReport, TrustLevel};

/// Town with two plots; the second plot holds a shed.
fn town() -> ClaimSpec {
    ClaimSpec::column(1, 0, 0, 200, 200)
        .child(ClaimSpec::column(2, 10, 10, 50, 50))
        .child(ClaimSpec::column(3, 60, 60, 120, 120).child(ClaimSpec::column(4, 70, 70, 80, 80)))
}

// ====================================================================
// Trust propagation across a claim tree
// ====================================================================

#[test]
fn test_grant_tree_covers_every_subdivision() {
    for fork in [ForkProfile::legacy(), ForkProfile::modern(), ForkProfile::three_d()] {
        let mut host = TestHost::new(fork.clone()).with_claim(town());
        let bridge = host.bridge();
        let root = bridge.find_by_id("1").expect("town");

        let report = bridge.trust().grant_tree(TrustLevel::Container, "alice", &root);
        assert_eq!(report, PropagationReport { applied: 4, unsupported: 0 }, "{}", fork.claim_class);
        for id in 1..=4 {
            assert_eq!(host.claim(id).trusted(TrustLevel::Container), vec!["alice"]);
        }
    }
}

#[test]
fn test_revoke_tree_leaves_ancestors_alone() {
    let mut host = TestHost::new(ForkProfile::three_d()).with_claim(town());
    let bridge = host.bridge();
    let root = bridge.find_by_id("1").expect("town");
    bridge.trust().grant_tree(TrustLevel::Build, "bob", &root);

    let plot = bridge.find_by_id("3").expect("plot");
    let report = bridge.trust().revoke_tree(TrustLevel::Build, "bob", &plot);
    assert_eq!(report.applied, 2);

    assert_eq!(host.claim(1).trusted(TrustLevel::Build), vec!["bob"]);
    assert_eq!(host.claim(2).trusted(TrustLevel::Build), vec!["bob"]);
    assert!(host.claim(3).trusted(TrustLevel::Build).is_empty());
    assert!(host.claim(4).trusted(TrustLevel::Build).is_empty());
}

#[test]
fn test_located_claim_can_be_trusted() {
    let mut host = TestHost::new(ForkProfile::modern()).with_claim(town());
    let bridge = host.bridge();
    let shed = bridge.locate("world", 75.0, 64.0, 75.0).expect("shed");
    assert_eq!(shed.id().as_deref(), Some("4"));
    assert!(bridge.trust().grant(TrustLevel::Access, "carol", &shed));
    assert_eq!(host.claim(4).trusted(TrustLevel::Access), vec!["carol"]);
    assert!(host.claim(3).trusted(TrustLevel::Access).is_empty());
}

#[test]
fn test_unsupported_fork_reports_whole_tree() {
    let mut host = TestHost::new(ForkProfile::bare()).with_claim(town());
    let bridge = host.bridge();
    let root = bridge.find_by_id("1").expect("town");
    let report = bridge.trust().grant_tree(TrustLevel::Manager, "dave", &root);
    assert_eq!(report, PropagationReport { applied: 0, unsupported: 4 });
}
