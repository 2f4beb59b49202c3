//! Activation controller behaviour against a scripted runtime.

use proxy_composer::activation::{ActivationError, ActivationState, Trigger};
use proxy_composer::compose::SkipKind;
use proxy_composer::fragments::{InstallError, SourceId};
use proxy_composer::parser::RenameError;

mod common;

use common::{FakeRuntime, Scratch};

const API_A: &str = "location /api/ {\n    proxy_pass http://a:3000/;\n}\n";
const API_B: &str = "location /api/ {\n    proxy_pass http://b:4000/;\n}\n";

#[tokio::test]
async fn test_first_run_success_activates() {
    let scratch = Scratch::new("activate");
    scratch.write_app("a.conf", API_A, 1_000);
    let runtime = FakeRuntime::new();
    let controller = scratch.controller(runtime.clone()).await;

    let outcome = controller.regenerate(Trigger::Startup).await;

    assert_eq!(outcome.state, ActivationState::Active);
    assert!(outcome.failure.is_none());
    let served = scratch.served_text().unwrap();
    assert!(served.contains("# Generated by proxy-composer"));
    assert!(served.contains(" a:3000;"));
    assert_eq!(runtime.checks(), 1);
    assert_eq!(runtime.reloads(), 1);

    let status = controller.status();
    assert_eq!(status.state, ActivationState::Idle);
    assert_eq!(status.served, Some(ActivationState::Active));
    assert_eq!(status.runs, 1);
    assert!(status.active_fingerprint.is_some());
    assert!(scratch.diagnostics().exists());
}

#[tokio::test]
async fn test_first_run_rejection_serves_disabled_bundle() {
    let scratch = Scratch::new("disabled");
    scratch.write_app("a.conf", "location /x/ {\n    bogus_directive on;\n    proxy_pass http://x:1;\n}\n", 1);
    let runtime = FakeRuntime::new();
    runtime.reject_when_contains("bogus_directive");
    let controller = scratch.controller(runtime.clone()).await;

    let outcome = controller.regenerate(Trigger::Startup).await;

    assert_eq!(outcome.state, ActivationState::Disabled);
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.stage, "validate");
    assert!(failure.detail.contains("bogus_directive"));

    let served = scratch.served_text().unwrap();
    assert!(served.contains("# status: disabled"));
    assert!(!served.contains("location"));
    // The stub itself is reloaded so the core configuration keeps serving.
    assert_eq!(runtime.reloads(), 1);
    assert_eq!(controller.status().active_fingerprint, None);
}

#[tokio::test]
async fn test_later_rejection_keeps_previous_bundle() {
    let scratch = Scratch::new("rollback");
    scratch.write_app("a.conf", API_A, 1_000);
    let runtime = FakeRuntime::new();
    let controller = scratch.controller(runtime.clone()).await;

    assert!(controller.regenerate(Trigger::Startup).await.activated());
    let good = scratch.served_text().unwrap();
    let good_fingerprint = controller.status().active_fingerprint.clone();

    scratch.write_app("broken.conf", "location /b/ {\n    bogus_directive on;\n}\n", 2_000);
    runtime.reject_when_contains("bogus_directive");
    let outcome = controller.regenerate(Trigger::SourcesChanged).await;

    assert_eq!(outcome.state, ActivationState::RolledBack);
    assert_eq!(scratch.served_text().unwrap(), good);
    assert_eq!(controller.status().active_fingerprint, good_fingerprint);
    assert_eq!(runtime.reloads(), 1);

    let note = outcome.diagnostics.activation.unwrap();
    assert_eq!(note.state, "rolled_back");
    assert!(note.detail.unwrap().starts_with("validate:"));

    // Fixing the fragment brings the new routes in.
    runtime.accept_everything();
    let outcome = controller.regenerate(Trigger::SourcesChanged).await;
    assert_eq!(outcome.state, ActivationState::Active);
    assert!(scratch.served_text().unwrap().contains("location /b/ {"));
}

#[tokio::test]
async fn test_reload_failure_restores_previous_bundle() {
    let scratch = Scratch::new("reload");
    scratch.write_app("a.conf", API_A, 1_000);
    let runtime = FakeRuntime::new();
    let controller = scratch.controller(runtime.clone()).await;

    assert!(controller.regenerate(Trigger::Startup).await.activated());
    let good = scratch.served_text().unwrap();

    scratch.write_app("c.conf", "location /c/ {\n    proxy_pass http://c:1;\n}\n", 2_000);
    runtime.fail_reloads(true);
    let outcome = controller.regenerate(Trigger::Signal).await;

    assert_eq!(outcome.state, ActivationState::RolledBack);
    assert_eq!(outcome.failure.unwrap().stage, "reload");
    assert_eq!(scratch.served_text().unwrap(), good);
}

#[tokio::test]
async fn test_concurrent_regenerations_run_one_at_a_time() {
    let scratch = Scratch::new("serial");
    scratch.write_app("a.conf", API_A, 1_000);
    let runtime = FakeRuntime::new();
    runtime.slow_checks(30);
    let controller = scratch.controller(runtime.clone()).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.regenerate(Trigger::Manual).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().activated());
    }

    assert_eq!(runtime.checks(), 4);
    assert_eq!(runtime.max_in_flight(), 1);
    assert_eq!(controller.status().runs, 4);
}

#[tokio::test]
async fn test_decisions_persist_only_after_activation() {
    let scratch = Scratch::new("decisions");
    scratch.write_app("a.conf", API_A, 1_000);
    scratch.write_app("b.conf", API_B, 2_000);
    let runtime = FakeRuntime::new();
    runtime.reject_when_contains("b:4000");
    let controller = scratch.controller(runtime.clone()).await;

    let outcome = controller.regenerate(Trigger::Startup).await;
    assert_eq!(outcome.state, ActivationState::Disabled);
    assert_eq!(outcome.diagnostics.conflicts.len(), 1);
    assert!(!scratch.decisions().exists());

    runtime.accept_everything();
    assert!(controller.regenerate(Trigger::Manual).await.activated());
    let stored = std::fs::read_to_string(scratch.decisions()).unwrap();
    assert!(stored.contains("b.conf"));
    assert!(stored.contains("recency"));
}

#[tokio::test]
async fn test_manual_resolution_overrides_recency() {
    let scratch = Scratch::new("manual");
    let older = scratch.write_app("a.conf", API_A, 1_000);
    scratch.write_app("b.conf", API_B, 2_000);
    let controller = scratch.controller(FakeRuntime::new()).await;

    let outcome = controller.regenerate(Trigger::Startup).await;
    assert!(scratch.served_text().unwrap().contains(" b:4000;"));
    let key = outcome.diagnostics.conflicts[0].normalized_key.clone();

    let outcome = controller
        .resolve_conflict(&key, SourceId::from_path(&older))
        .await
        .unwrap();
    assert!(outcome.activated());
    assert!(scratch.served_text().unwrap().contains(" a:3000;"));
    let report = &outcome.diagnostics.conflicts[0];
    assert_eq!(report.winner, SourceId::from_path(&older));
    assert!(report.reused);

    let stored = std::fs::read_to_string(scratch.decisions()).unwrap();
    assert!(stored.contains("manual"));

    // The decision sticks while the candidate set is unchanged.
    let outcome = controller.regenerate(Trigger::SourcesChanged).await;
    assert!(outcome.activated());
    assert!(scratch.served_text().unwrap().contains(" a:3000;"));
}

#[tokio::test]
async fn test_touched_loser_takes_over_recency_decision() {
    let scratch = Scratch::new("retouch");
    scratch.write_app("a.conf", API_A, 1_000);
    scratch.write_app("b.conf", API_B, 2_000);
    let controller = scratch.controller(FakeRuntime::new()).await;

    assert!(controller.regenerate(Trigger::Startup).await.activated());
    assert!(scratch.served_text().unwrap().contains(" b:4000;"));
    assert!(std::fs::read_to_string(scratch.decisions()).unwrap().contains("recency"));

    // Reinstalling `a` makes it the newest candidate; the stored decision is stale.
    let outcome = controller.install_app("a", API_A).await.unwrap();
    assert!(outcome.activated());
    let served = scratch.served_text().unwrap();
    assert!(served.contains(" a:3000;"));
    assert!(!served.contains("b:4000"));
    let report = &outcome.diagnostics.conflicts[0];
    assert_eq!(report.winner, SourceId::from_path(&scratch.apps().join("a.conf")));
    assert!(!report.reused);
}

#[tokio::test]
async fn test_manual_resolution_rejections() {
    let scratch = Scratch::new("resolve-reject");
    let app = scratch.write_app("a.conf", API_A, 1_000);
    let over = scratch.write_override("api.conf", "location /api/ {\n    proxy_pass http://c:5000/;\n}\n", 1);
    let controller = scratch.controller(FakeRuntime::new()).await;

    let err = controller
        .resolve_conflict("/api", SourceId::from_path(&app))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::UnknownConflict(_)));

    let outcome = controller.regenerate(Trigger::Startup).await;
    let key = outcome.diagnostics.conflicts[0].normalized_key.clone();
    assert_eq!(outcome.diagnostics.conflicts[0].winner, SourceId::from_path(&over));

    let err = controller
        .resolve_conflict(&key, SourceId::from_path(&app))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::OverrideSupremacy { .. }));

    let err = controller
        .resolve_conflict(&key, SourceId::new("/nowhere/x.conf"))
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::NotACandidate { .. }));

    assert!(!scratch.decisions().exists() || !std::fs::read_to_string(scratch.decisions()).unwrap().contains("manual"));
}

#[tokio::test]
async fn test_install_app_writes_and_activates() {
    let scratch = Scratch::new("install");
    let controller = scratch.controller(FakeRuntime::new()).await;

    let outcome = controller
        .install_app("shop", "location /shop/ {\n    proxy_pass http://shop:8080/;\n}\n")
        .await
        .unwrap();

    assert!(outcome.activated());
    assert!(matches!(outcome.trigger, Trigger::AppInstalled { ref name } if name == "shop"));
    assert!(scratch.apps().join("shop.conf").exists());
    assert!(scratch.served_text().unwrap().contains("location /shop/ {"));

    let err = controller.install_app("../escape", "location /x/ {}").await.unwrap_err();
    assert!(matches!(err, ActivationError::Install(InstallError::InvalidName(_))));
}

#[tokio::test]
async fn test_unparsed_fragment_does_not_block_activation() {
    let scratch = Scratch::new("unparsed");
    scratch.write_app("broken.conf", "location /broken/ {\n    proxy_pass http://x:1;\n", 1);
    scratch.write_app("ok.conf", "location /ok/ {\n    proxy_pass http://ok:8080;\n}\n", 1);
    let controller = scratch.controller(FakeRuntime::new()).await;

    let outcome = controller.regenerate(Trigger::Startup).await;

    assert!(outcome.activated());
    let served = scratch.served_text().unwrap();
    assert!(served.contains("location /ok/ {"));
    assert!(!served.contains("/broken/"));
    assert_eq!(outcome.diagnostics.unparsed().count(), 1);
    assert_eq!(outcome.diagnostics.skipped[0].kind, SkipKind::Unparsed);

    let written = std::fs::read_to_string(scratch.diagnostics()).unwrap();
    assert!(written.contains("unparsed"));
}

#[tokio::test]
async fn test_removed_fragment_disappears_from_bundle() {
    let scratch = Scratch::new("remove");
    scratch.write_app("a.conf", API_A, 1_000);
    scratch.write_app("c.conf", "location /c/ {\n    proxy_pass http://c:1;\n}\n", 1_000);
    let controller = scratch.controller(FakeRuntime::new()).await;
    assert!(controller.regenerate(Trigger::Startup).await.activated());

    scratch.remove_app("c.conf");
    assert!(controller.regenerate(Trigger::SourcesChanged).await.activated());
    let served = scratch.served_text().unwrap();
    assert!(served.contains("location /api/ {"));
    assert!(!served.contains("location /c/ {"));
}

#[tokio::test]
async fn test_rename_route_rewrites_fragment_and_activates() {
    let scratch = Scratch::new("rename");
    let path = scratch.write_app("a.conf", "# api\nlocation /api/ {\n    proxy_pass http://a:3000/;\n}\n", 1_000);
    let controller = scratch.controller(FakeRuntime::new()).await;
    assert!(controller.regenerate(Trigger::Startup).await.activated());

    let outcome = controller
        .rename_route(SourceId::from_path(&path), "/api/", "/v2/")
        .await
        .unwrap();

    assert!(outcome.activated());
    assert!(matches!(outcome.trigger, Trigger::RouteRenamed { ref to, .. } if to == "/v2/"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "# api\nlocation /v2/ {\n    proxy_pass http://a:3000/;\n}\n"
    );
    let served = scratch.served_text().unwrap();
    assert!(served.contains("location /v2/ {"));
    assert!(!served.contains("location /api/ {"));
}

#[tokio::test]
async fn test_rename_route_rejections() {
    let scratch = Scratch::new("rename-reject");
    let path = scratch.write_app("a.conf", API_A, 1_000);
    let controller = scratch.controller(FakeRuntime::new()).await;

    let err = controller
        .rename_route(SourceId::from_path(&scratch.apps().join("ghost.conf")), "/api/", "/v2/")
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::UnknownSource(_)));

    let err = controller
        .rename_route(SourceId::from_path(&path), "/nope/", "/v2/")
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::Rename { error: RenameError::NotFound(_), .. }));

    let err = controller
        .rename_route(SourceId::from_path(&path), "/api", "v2")
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::Rename { error: RenameError::InvalidPattern { .. }, .. }));

    // Nothing was written and nothing ran.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), API_A);
    assert_eq!(controller.status().runs, 0);
}
