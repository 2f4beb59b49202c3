//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM/SIGINT: trigger shutdown
//! - SIGHUP: request a regeneration (manual reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP never shuts anything down

use tokio::sync::mpsc;

use crate::activation::Trigger;
use crate::lifecycle::Shutdown;

/// Listen for signals until shutdown.
#[cfg(unix)]
pub async fn listen(trigger_tx: mpsc::UnboundedSender<Trigger>, shutdown: Shutdown) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, regenerating");
                if trigger_tx.send(Trigger::Signal).is_err() {
                    break;
                }
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                shutdown.trigger();
                break;
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received, shutting down");
                shutdown.trigger();
                break;
            }
            _ = stop.recv() => break,
        }
    }
    Ok(())
}

/// Listen for Ctrl+C until shutdown.
#[cfg(not(unix))]
pub async fn listen(_trigger_tx: mpsc::UnboundedSender<Trigger>, shutdown: Shutdown) -> std::io::Result<()> {
    let mut stop = shutdown.subscribe();
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("Ctrl+C received, shutting down");
            shutdown.trigger();
        }
        _ = stop.recv() => {}
    }
    Ok(())
}
