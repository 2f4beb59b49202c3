//! Admin API.
//!
//! # Endpoints (under `admin.base_path`)
//! - `POST /reload`: regenerate now
//! - `POST /apps/{name}`: install an app fragment (raw body), then regenerate
//! - `GET /status`: controller state and last run
//! - `GET /overrides/conflicts`: conflicts settled by the last run
//! - `POST /resolve-conflict`: record a manual winner, then regenerate
//! - `POST /rename-route`: rename a route inside a stored fragment, then regenerate
//! - `GET /diagnostics`: diagnostics of the last run
//! - `GET /config`: effective configuration, `apiBasePath` and `version`
//!
//! # Design Decisions
//! - Mutating endpoints run the regeneration inline and answer with its
//!   outcome; the controller's lock serializes them with every other trigger
//! - Read endpoints never wait for a run

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::lifecycle::Shutdown;
use self::handlers::*;

pub fn router(controller: AdminState) -> Router {
    let base_path = controller.config().admin.base_path.trim_end_matches('/').to_string();

    let api = Router::new()
        .route("/reload", post(reload))
        .route("/apps/{name}", post(install_app))
        .route("/status", get(get_status))
        .route("/overrides/conflicts", get(get_conflicts))
        .route("/resolve-conflict", post(resolve_conflict))
        .route("/rename-route", post(rename_route))
        .route("/diagnostics", get(get_diagnostics))
        .route("/config", get(get_config))
        .with_state(controller);

    let app = if base_path.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&base_path, api)
    };
    app.layer(TraceLayer::new_for_http())
}

/// Serve until shutdown.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(Shutdown::wait(shutdown.subscribe()))
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
