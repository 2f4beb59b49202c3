//! Admin API driven through the client SDK.

use sdk_rust::{ComposerClient, RenameRouteRequest, ResolveConflictRequest};

use proxy_composer::admin;
use proxy_composer::lifecycle::Shutdown;

mod common;

use common::{FakeRuntime, Scratch};

/// Start the admin router on an ephemeral port; returns the API base URL.
async fn start(scratch: &Scratch, runtime: FakeRuntime) -> (String, Shutdown) {
    let controller = scratch.controller(runtime).await;
    let base_path = controller.config().admin.base_path.clone();
    let router = admin::router(controller);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = admin::serve(listener, router, server_shutdown).await;
    });

    (format!("http://{}{}", addr, base_path), shutdown)
}

#[tokio::test]
async fn test_status_before_and_after_reload() {
    let scratch = Scratch::new("api-status");
    scratch.write_app("a.conf", "location /a/ {\n    proxy_pass http://a:1;\n}\n", 1);
    let (url, shutdown) = start(&scratch, FakeRuntime::new()).await;
    let client = ComposerClient::new(&url);

    let status = client.status().await.unwrap();
    assert_eq!(status.status, 200);
    assert_eq!(status.body["state"], "idle");
    assert_eq!(status.body["runs"], 0);

    let reload = client.reload().await.unwrap();
    assert_eq!(reload.status, 200);
    assert_eq!(reload.body["state"], "active");
    assert_eq!(reload.body["trigger"]["kind"], "manual");

    let status = client.status().await.unwrap();
    assert_eq!(status.body["served"], "active");
    assert_eq!(status.body["runs"], 1);
    assert_eq!(status.body["last_run"]["blocks"], 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_install_app_and_read_diagnostics() {
    let scratch = Scratch::new("api-install");
    let (url, shutdown) = start(&scratch, FakeRuntime::new()).await;
    let client = ComposerClient::new(&url);

    let resp = client
        .install_app("shop", "location /shop/ {\n    proxy_pass http://shop:8080/;\n}\n")
        .await
        .unwrap();
    assert!(resp.is_success());
    assert!(scratch.apps().join("shop.conf").exists());
    assert!(scratch.served_text().unwrap().contains("location /shop/ {"));

    let diagnostics = client.diagnostics().await.unwrap();
    assert_eq!(diagnostics.status, 200);
    assert_eq!(diagnostics.body["included"][0]["location"], "/shop/");
    assert_eq!(diagnostics.body["included"][0]["hardened"], true);

    let bad = client.install_app(".hidden", "location /x/ {}").await.unwrap();
    assert_eq!(bad.status, 400);
    assert!(bad.body["error"].as_str().unwrap().contains(".hidden"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_rejected_candidate_is_unprocessable() {
    let scratch = Scratch::new("api-reject");
    scratch.write_app("a.conf", "location /a/ {\n    bogus_directive on;\n}\n", 1);
    let runtime = FakeRuntime::new();
    runtime.reject_when_contains("bogus_directive");
    let (url, shutdown) = start(&scratch, runtime).await;
    let client = ComposerClient::new(&url);

    let resp = client.reload().await.unwrap();
    assert_eq!(resp.status, 422);
    assert_eq!(resp.body["state"], "disabled");
    assert_eq!(resp.body["failure"]["stage"], "validate");

    shutdown.trigger();
}

#[tokio::test]
async fn test_list_and_resolve_conflicts() {
    let scratch = Scratch::new("api-conflicts");
    let older = scratch.write_app("a.conf", "location /api/ {\n    proxy_pass http://a:3000/;\n}\n", 1_000);
    scratch.write_app("b.conf", "location /api/ {\n    proxy_pass http://b:4000/;\n}\n", 2_000);
    let (url, shutdown) = start(&scratch, FakeRuntime::new()).await;
    let client = ComposerClient::new(&url);

    let empty = client.conflicts().await.unwrap();
    assert_eq!(empty.body, serde_json::json!([]));

    client.reload().await.unwrap();
    let conflicts = client.conflicts().await.unwrap();
    let list = conflicts.body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["strategy"], "recency");
    let key = list[0]["normalized_key"].as_str().unwrap().to_string();

    let unknown = client
        .resolve_conflict(ResolveConflictRequest {
            key: "/nothing-here".into(),
            winner: older.display().to_string(),
        })
        .await
        .unwrap();
    assert_eq!(unknown.status, 404);

    let stranger = client
        .resolve_conflict(ResolveConflictRequest {
            key: key.clone(),
            winner: "/elsewhere/z.conf".into(),
        })
        .await
        .unwrap();
    assert_eq!(stranger.status, 400);

    let resolved = client
        .resolve_conflict(ResolveConflictRequest {
            key,
            winner: older.display().to_string(),
        })
        .await
        .unwrap();
    assert_eq!(resolved.status, 200);
    assert_eq!(resolved.body["diagnostics"]["conflicts"][0]["strategy"], "manual");
    assert!(scratch.served_text().unwrap().contains(" a:3000;"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_config_and_unknown_route() {
    let scratch = Scratch::new("api-config");
    let (url, shutdown) = start(&scratch, FakeRuntime::new()).await;
    let client = ComposerClient::new(&url);

    let config = client.config().await.unwrap();
    assert_eq!(config.status, 200);
    assert_eq!(config.body["apiBasePath"], "/devproxy/api");
    assert_eq!(config.body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(config.body["admin"]["base_path"], "/devproxy/api");
    assert_eq!(config.body["runtime"]["enabled"], false);

    let missing = reqwest::get(format!("{}/nope", url)).await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    shutdown.trigger();
}

#[tokio::test]
async fn test_rename_route_endpoint() {
    let scratch = Scratch::new("api-rename");
    let path = scratch.write_app("a.conf", "location = /health {\n    return 200;\n}\n", 1);
    let (url, shutdown) = start(&scratch, FakeRuntime::new()).await;
    let client = ComposerClient::new(&url);

    let renamed = client
        .rename_route(RenameRouteRequest {
            source: path.display().to_string(),
            from: "= /health".into(),
            to: "/healthz".into(),
        })
        .await
        .unwrap();
    assert_eq!(renamed.status, 200);
    assert_eq!(renamed.body["trigger"]["kind"], "route_renamed");
    assert!(scratch.served_text().unwrap().contains("location = /healthz {"));

    let missing = client
        .rename_route(RenameRouteRequest {
            source: path.display().to_string(),
            from: "= /health".into(),
            to: "/again".into(),
        })
        .await
        .unwrap();
    assert_eq!(missing.status, 404);

    let invalid = client
        .rename_route(RenameRouteRequest {
            source: path.display().to_string(),
            from: "= /healthz".into(),
            to: "no-slash".into(),
        })
        .await
        .unwrap();
    assert_eq!(invalid.status, 400);

    let unknown = client
        .rename_route(RenameRouteRequest {
            source: "/nowhere/x.conf".into(),
            from: "/".into(),
            to: "/y".into(),
        })
        .await
        .unwrap();
    assert_eq!(unknown.status, 404);

    shutdown.trigger();
}
