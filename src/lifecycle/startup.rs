//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the decision store and pick the runtime from configuration
//! - Run the initial regeneration before any other trigger is served
//! - Start the watcher, signal listener, admin API and trigger loop
//!
//! # Design Decisions
//! - Fail fast: a broken decision store or an unbindable admin address is
//!   fatal at startup
//! - A failed initial regeneration is not fatal; the controller already
//!   fell back to a disabled bundle or kept the served one

use std::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::activation::{runtime, ActivationController, Trigger};
use crate::admin;
use crate::config::watcher::SourceWatcher;
use crate::config::ComposerConfig;
use crate::lifecycle::{signals, triggers, Shutdown};
use crate::observability::metrics;
use crate::resolver::decisions::{DecisionStore, JsonFileRepository, StoreError};

/// Wire the controller from configuration.
pub async fn build_controller(config: Arc<ComposerConfig>) -> Result<Arc<ActivationController>, StoreError> {
    let decisions = DecisionStore::open(Box::new(JsonFileRepository::new(
        config.output.decisions_path.clone(),
    )))
    .await?;
    let runtime = runtime::from_config(&config.runtime, &config.output.bundle_path);
    Ok(Arc::new(ActivationController::new(config, runtime, decisions)))
}

/// `proxy-composer run`: serve triggers until SIGINT/SIGTERM.
pub async fn run(config: ComposerConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Arc::new(config);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let controller = build_controller(config.clone()).await?;
    let shutdown = Shutdown::new();
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

    let initial = controller.regenerate(Trigger::Startup).await;
    tracing::info!(state = %initial.state, "Initial regeneration finished");

    let _watcher = if config.schedule.watch_sources {
        match SourceWatcher::new(&config.sources, trigger_tx.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start fragment watcher; relying on re-scans");
                None
            }
        }
    } else {
        None
    };

    let signal_task = tokio::spawn(signals::listen(trigger_tx.clone(), shutdown.clone()));

    let admin_task = if config.admin.enabled {
        let listener = tokio::net::TcpListener::bind(&config.admin.bind_address).await?;
        let router = admin::router(controller.clone());
        Some(tokio::spawn(admin::serve(listener, router, shutdown.clone())))
    } else {
        None
    };

    drop(trigger_tx);
    triggers::run_trigger_loop(controller, trigger_rx, config.schedule.clone(), shutdown.clone()).await;

    shutdown.trigger();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin server failed"),
            Err(e) => tracing::error!(error = %e, "Admin task panicked"),
            Ok(Ok(())) => {}
        }
    }
    match signal_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Signal listener failed"),
        Err(e) => tracing::error!(error = %e, "Signal task panicked"),
        Ok(Ok(())) => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
