use std::sync::Arc;

use super::*;
use crate::config::BridgeConfig;
use crate::context::BridgeContext;
use crate::test_harness::{ClaimSpec, ForkProfile, SchedulerProfile, TestHost};

fn context(host: &TestHost) -> BridgeContext {
    let runtime: Arc<dyn HostRuntime> = host.runtime().clone();
    BridgeContext::new(runtime, BridgeConfig::default()).expect("default config is valid")
}

fn sample_claims() -> Vec<ClaimSpec> {
    vec![
        ClaimSpec::column(1, 0, 0, 50, 50),
        ClaimSpec::column(2, 100, 100, 120, 120),
    ]
}

// ---------------------------------------------------------------------------
// Store binding
// ---------------------------------------------------------------------------

#[test]
fn test_legacy_binds_through_public_static() {
    let host = TestHost::new(ForkProfile::legacy());
    let ctx = context(&host);
    let binding = ctx.resolver().binding().expect("legacy store binds");
    assert_eq!(
        binding.source,
        StoreSource::StaticField {
            class: "me.ryanhamshire.GriefPrevention.GriefPrevention".to_string()
        }
    );
    assert_eq!(binding.claim_at, Some(ClaimAtShape::Basic));
    assert_eq!(binding.claims, vec![Getter::Method("getClaims".to_string())]);
}

#[test]
fn test_modern_binds_through_declared_field() {
    let host = TestHost::new(ForkProfile::modern());
    let ctx = context(&host);
    let binding = ctx.resolver().binding().expect("modern store binds");
    assert!(
        matches!(binding.source, StoreSource::DeclaredField { ref class } if class.ends_with("griefprevention.GriefPrevention")),
        "got {:?}",
        binding.source
    );
    assert_eq!(
        binding.claim_at,
        Some(ClaimAtShape::WithPlayer(crate::host::ParamKind::PlayerData))
    );
}

#[test]
fn test_three_d_falls_back_to_plugin_instance() {
    let host = TestHost::new(ForkProfile::three_d());
    let ctx = context(&host);
    let binding = ctx.resolver().binding().expect("plugin instance carries the store");
    assert_eq!(binding.source, StoreSource::PluginInstance);
    assert_eq!(binding.claim_at, Some(ClaimAtShape::WithSubclaimCache));
    assert_eq!(binding.claims, vec![Getter::Field("claims".to_string())]);
}

#[test]
fn test_no_plugin_means_unavailable() {
    let host = TestHost::without_store(SchedulerProfile::Classic);
    let ctx = context(&host);
    assert!(!ctx.is_available());
    assert!(ctx.resolver().binding().is_none());
    assert!(ctx.resolver().top_level_claims().is_empty());
}

#[test]
fn test_disabled_plugin_is_unavailable() {
    let host = TestHost::new(ForkProfile::legacy()).with_store_disabled();
    let ctx = context(&host);
    assert!(!ctx.is_available());
    assert!(ctx.resolver().available_binding().is_none());
}

#[test]
fn test_failed_binding_is_retried_later() {
    let host = TestHost::new(ForkProfile::three_d());
    host.unload_store();
    let ctx = context(&host);
    assert!(ctx.resolver().binding().is_none());

    host.load_store();
    assert!(ctx.resolver().binding().is_some());
    assert!(ctx.is_available());
}

#[test]
fn test_binding_survives_plugin_unload_but_availability_does_not() {
    let host = TestHost::new(ForkProfile::modern());
    let ctx = context(&host);
    assert!(ctx.is_available());
    host.unload_store();
    assert!(ctx.resolver().binding().is_some(), "binding is frozen once resolved");
    assert!(!ctx.is_available());
}

// ---------------------------------------------------------------------------
// Top-level claims in every collection shape
// ---------------------------------------------------------------------------

#[test]
fn test_top_level_claims_from_list_array_and_map() {
    for fork in [ForkProfile::legacy(), ForkProfile::modern(), ForkProfile::three_d()] {
        let host = TestHost::new(fork.clone()).with_claims(sample_claims());
        let ctx = context(&host);
        let claims = ctx.resolver().top_level_claims();
        assert_eq!(claims.len(), 2, "fork {:?}", fork.claims_shape);
    }
}

#[test]
fn test_accessors_resolved_once_per_class() {
    let host = TestHost::new(ForkProfile::legacy()).with_claims(sample_claims());
    let ctx = context(&host);
    let ids: Vec<_> = ctx
        .resolver()
        .top_level_claims()
        .into_iter()
        .map(|o| ctx.resolver().handle(o).id())
        .collect();
    assert_eq!(ids, vec![Some("1".to_string()), Some("2".to_string())]);
    assert_eq!(ctx.resolver().accessor_cache().cached_classes(), 1);
}

// ---------------------------------------------------------------------------
// Fork detection
// ---------------------------------------------------------------------------

#[test]
fn test_legacy_fork_detected_from_plugin_loader() {
    let host = TestHost::new(ForkProfile::legacy());
    let ctx = context(&host);
    let fork = ctx.resolver().detect_fork_variant();
    assert_eq!(fork.evidence, ForkEvidence::PluginLoader);
    assert!(!fork.supports_3d);
}

#[test]
fn test_three_d_fork_detected_from_live_claim() {
    let host = TestHost::new(ForkProfile::three_d()).with_claims(sample_claims());
    let ctx = context(&host);
    let fork = ctx.resolver().detect_fork_variant();
    assert_eq!(fork.evidence, ForkEvidence::LiveInstance);
    assert!(fork.supports_3d);
}

#[test]
fn test_empty_store_falls_back_to_name_heuristic() {
    let profile = ForkProfile {
        store_class: "com.example.GriefPrevention3D.GriefPrevention3D",
        ..ForkProfile::three_d()
    };
    let host = TestHost::new(profile);
    let ctx = context(&host);
    let fork = ctx.resolver().detect_fork_variant();
    assert_eq!(fork.evidence, ForkEvidence::NameHeuristic);
    assert!(fork.supports_3d);
}

#[test]
fn test_fork_detection_probes_once() {
    let host = TestHost::new(ForkProfile::three_d()).with_claims(sample_claims());
    let ctx = context(&host);

    let before = host.plugin_loader().lookups() + host.bridge_loader().lookups();
    let first = ctx.resolver().detect_fork_variant();
    let after_first = host.plugin_loader().lookups() + host.bridge_loader().lookups();
    assert!(after_first > before, "first detection must probe loaders");
    let reads = host.data_store().claims_reads();

    let second = ctx.resolver().detect_fork_variant();
    assert_eq!(first, second);
    assert_eq!(
        host.plugin_loader().lookups() + host.bridge_loader().lookups(),
        after_first,
        "second detection must not touch any loader"
    );
    assert_eq!(host.data_store().claims_reads(), reads);
}

#[test]
fn test_fork_verdict_outlives_plugin_reload() {
    let host = TestHost::new(ForkProfile::three_d()).with_claims(sample_claims());
    let ctx = context(&host);
    let first = ctx.resolver().detect_fork_variant();
    host.unload_store();
    host.load_store();
    assert_eq!(ctx.resolver().detect_fork_variant(), first);
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[test]
fn test_unavailable_diagnostic_is_rate_limited() {
    let host = TestHost::without_store(SchedulerProfile::Classic);
    let ctx = context(&host);
    for _ in 0..10_000 {
        assert!(!ctx.is_available());
    }
    assert_eq!(ctx.resolver().unavailable_reports(), 1);
}

#[test]
fn test_available_store_emits_no_diagnostic() {
    let host = TestHost::new(ForkProfile::legacy());
    let ctx = context(&host);
    for _ in 0..100 {
        assert!(ctx.is_available());
    }
    assert_eq!(ctx.resolver().unavailable_reports(), 0);
}

#[test]
fn test_missing_piece_names_the_gap() {
    assert_eq!(MissingPiece::Plugin.to_string(), "plugin not loaded");
    assert_eq!(MissingPiece::DataStore.to_string(), "data store not found");
}
