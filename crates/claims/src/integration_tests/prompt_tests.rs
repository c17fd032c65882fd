use std::sync::{Arc, Mutex};

use crate::config::BridgeConfig;
use crate::host::Location;
use crate::test_harness::{at, player_ref, FakePlayer, ForkProfile, SchedulerProfile, TestHost};

const TIMEOUT: u64 = 20;

/// Every answer a prompt callback received, in order.
type Answers = Arc<Mutex<Vec<Option<String>>>>;

fn host(model: SchedulerProfile) -> TestHost {
    TestHost::with_model(ForkProfile::legacy(), model).with_config(BridgeConfig {
        prompt_timeout_ticks: TIMEOUT,
        ..BridgeConfig::default()
    })
}

fn open(host: &mut TestHost, player: &Arc<FakePlayer>, answers: &Answers) {
    let bridge = host.bridge();
    let sink = Arc::clone(answers);
    host.prompts()
        .open(
            &bridge,
            &player_ref(player),
            &["Name this claim".to_string()],
            move |answer| sink.lock().unwrap().push(answer),
        )
        .unwrap();
}

fn answers(answers: &Answers) -> Vec<Option<String>> {
    answers.lock().unwrap().clone()
}

/// Player stands at (10, 64, 10); the sign goes four blocks below.
fn sign_spot() -> Location {
    Location::new("world", 10.0, 60.0, 10.0)
}

// ====================================================================
// Sign prompt lifecycle
// ====================================================================

#[test]
fn test_prompt_places_sign_and_opens_editor() {
    for model in [SchedulerProfile::Classic, SchedulerProfile::Partitioned] {
        let mut host = host(model);
        let player = host.spawn_player("p1", at(10.5, 64.0, 10.5));
        let got = Answers::default();

        open(&mut host, &player, &got);
        host.tick(2);

        assert_eq!(host.world().block_at(10, 60, 10), "oak_sign", "{model:?}");
        assert_eq!(
            host.world().sign_lines(10, 60, 10),
            Some(vec!["Name this claim".to_string()])
        );
        assert_eq!(player.opened_signs(), vec![sign_spot()]);
        assert!(host.prompts().is_pending("p1"));
        assert!(answers(&got).is_empty());
        assert!(host.affinity_violations().is_empty(), "{model:?}");
    }
}

#[test]
fn test_submission_answers_and_restores_block() {
    for model in [SchedulerProfile::Classic, SchedulerProfile::Partitioned] {
        let mut host = host(model);
        let player = host.spawn_player("p1", at(10.5, 64.0, 10.5));
        let got = Answers::default();

        open(&mut host, &player, &got);
        host.tick(2);
        host.submit_sign("p1", &["", "  Mailbox ", "ignored"]);
        host.tick(1);
        assert_eq!(answers(&got), vec![Some("Mailbox".to_string())], "{model:?}");
        assert!(!host.prompts().is_pending("p1"));

        host.tick(1);
        assert_eq!(host.world().block_at(10, 60, 10), "stone", "{model:?}");
        assert_eq!(host.world().sign_lines(10, 60, 10), None);

        // The cancelled timeout must not fire later.
        host.tick(TIMEOUT as u32 + 5);
        assert_eq!(answers(&got).len(), 1);
        assert!(host.affinity_violations().is_empty(), "{model:?}");
    }
}

#[test]
fn test_timeout_cancels_and_restores_block() {
    for model in [SchedulerProfile::Classic, SchedulerProfile::Partitioned] {
        let mut host = host(model);
        let player = host.spawn_player("p1", at(10.5, 64.0, 10.5));
        let got = Answers::default();

        open(&mut host, &player, &got);
        host.tick(TIMEOUT as u32 - 1);
        assert!(answers(&got).is_empty(), "{model:?}: too early");
        assert_eq!(host.world().block_at(10, 60, 10), "oak_sign");

        host.tick(1);
        assert_eq!(answers(&got), vec![None], "{model:?}");
        assert_eq!(host.world().block_at(10, 60, 10), "stone");
        assert_eq!(host.prompts().pending_count(), 0);
        assert!(host.affinity_violations().is_empty(), "{model:?}");
    }
}

#[test]
fn test_new_prompt_supersedes_old_one() {
    let mut host = host(SchedulerProfile::Classic);
    let player = host.spawn_player("p1", at(10.5, 64.0, 10.5));
    let first = Answers::default();
    let second = Answers::default();

    open(&mut host, &player, &first);
    host.tick(2);
    open(&mut host, &player, &second);
    assert_eq!(answers(&first), vec![None], "old prompt cancelled at once");
    assert_eq!(host.prompts().pending_count(), 1);

    host.tick(2);
    assert_eq!(host.world().block_at(10, 60, 10), "oak_sign");
    assert_eq!(player.opened_signs().len(), 2);

    host.submit_sign("p1", &["Garden"]);
    host.tick(2);
    assert_eq!(answers(&first), vec![None]);
    assert_eq!(answers(&second), vec![Some("Garden".to_string())]);
    assert_eq!(host.world().block_at(10, 60, 10), "stone", "original block survives both prompts");
}

#[test]
fn test_blank_submission_is_no_answer() {
    let mut host = host(SchedulerProfile::Classic);
    let player = host.spawn_player("p1", at(10.5, 64.0, 10.5));
    let got = Answers::default();

    open(&mut host, &player, &got);
    host.tick(2);
    host.submit_sign("p1", &["", "   "]);
    host.tick(1);
    assert_eq!(answers(&got), vec![None]);
}

#[test]
fn test_submission_without_prompt_is_ignored() {
    let mut host = host(SchedulerProfile::Classic);
    host.submit_sign("nobody", &["hello"]);
    host.tick(2);
    assert_eq!(host.prompts().pending_count(), 0);

    let bridge = host.bridge();
    assert!(!host.prompts().submit(&bridge, "nobody", &["hello".to_string()]));
}

#[test]
fn test_prompt_on_air_restores_air() {
    let mut host = host(SchedulerProfile::Classic);
    // Floating well above the terrain: the sign spot is air.
    let player = host.spawn_player("p1", at(10.5, 120.0, 10.5));
    let got = Answers::default();

    open(&mut host, &player, &got);
    host.tick(2);
    assert_eq!(host.world().block_at(10, 116, 10), "oak_sign");
    host.tick(TIMEOUT as u32);
    assert_eq!(host.world().block_at(10, 116, 10), "air");
    assert_eq!(answers(&got), vec![None]);
}

// ====================================================================
// Prompts that cannot be shown
// ====================================================================

#[test]
fn test_player_leaving_before_editor_opens_ends_prompt() {
    for model in [SchedulerProfile::Classic, SchedulerProfile::Partitioned] {
        let mut host = host(model);
        let player = host.spawn_player("p1", at(10.5, 64.0, 10.5));
        let got = Answers::default();

        open(&mut host, &player, &got);
        player.remove();
        host.tick(4);

        assert_eq!(answers(&got), vec![None], "{model:?}");
        assert!(!host.prompts().is_pending("p1"), "{model:?}");
        assert_eq!(host.world().block_at(10, 60, 10), "stone", "{model:?}");
        assert!(player.opened_signs().is_empty());

        // The disarmed timeout stays silent.
        host.tick(TIMEOUT as u32 + 5);
        assert_eq!(answers(&got).len(), 1, "{model:?}");
        assert!(host.affinity_violations().is_empty(), "{model:?}");
    }
}

#[test]
fn test_prompt_in_unloaded_world_answers_none() {
    let mut host = host(SchedulerProfile::Classic);
    let player = host.spawn_player("p1", Location::new("world_the_end", 0.5, 64.0, 0.5));
    let got = Answers::default();

    open(&mut host, &player, &got);
    host.tick(2);

    assert_eq!(answers(&got), vec![None]);
    assert_eq!(host.prompts().pending_count(), 0);
    host.tick(TIMEOUT as u32);
    assert_eq!(answers(&got).len(), 1);
}
