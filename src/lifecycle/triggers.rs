//! Trigger loop: turns watcher events, interval ticks and signals into
//! regenerations.
//!
//! # Design Decisions
//! - File events are debounced: a burst of writes yields one run
//! - Triggers that arrive while a run is pending are coalesced into it,
//!   since one run always reflects the whole current snapshot

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::activation::{ActivationController, Trigger};
use crate::config::schema::ScheduleConfig;
use crate::lifecycle::Shutdown;

/// Run until shutdown or until every trigger sender is gone.
pub async fn run_trigger_loop(
    controller: Arc<ActivationController>,
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    schedule: ScheduleConfig,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    let mut ticker = rescan_interval(schedule.rescan_interval_secs);
    let debounce = Duration::from_millis(schedule.debounce_ms);

    loop {
        let trigger = tokio::select! {
            received = triggers.recv() => match received {
                Some(trigger) => trigger,
                None => break,
            },
            _ = next_tick(&mut ticker) => Trigger::Scheduled,
            _ = stop.recv() => break,
        };

        let trigger = if trigger == Trigger::SourcesChanged {
            settle(&mut triggers, debounce, trigger).await
        } else {
            trigger
        };
        let coalesced = drain(&mut triggers);
        if coalesced > 0 {
            tracing::debug!(coalesced, "Pending triggers folded into this run");
        }

        let outcome = controller.regenerate(trigger).await;
        if !outcome.activated() {
            tracing::warn!(state = %outcome.state, "Regeneration did not activate a new bundle");
        }
    }

    tracing::info!("Trigger loop stopped");
}

fn rescan_interval(secs: u64) -> Option<Interval> {
    if secs == 0 {
        return None;
    }
    let period = Duration::from_secs(secs);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Wait until no file event arrived for `quiet`. A non-file trigger that
/// shows up meanwhile takes over as the run's trigger.
async fn settle(
    triggers: &mut mpsc::UnboundedReceiver<Trigger>,
    quiet: Duration,
    mut trigger: Trigger,
) -> Trigger {
    while let Ok(Some(next)) = tokio::time::timeout(quiet, triggers.recv()).await {
        if next != Trigger::SourcesChanged {
            trigger = next;
        }
    }
    trigger
}

fn drain(triggers: &mut mpsc::UnboundedReceiver<Trigger>) -> usize {
    let mut count = 0;
    while triggers.try_recv().is_ok() {
        count += 1;
    }
    count
}
