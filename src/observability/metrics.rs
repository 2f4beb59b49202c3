//! Metrics collection and exposition.
//!
//! # Metrics
//! - `composer_runs_total` (counter): regenerations by `outcome`
//! - `composer_run_duration_seconds` (histogram): load to activation
//! - `composer_blocks` (gauge): blocks in the last composed bundle
//! - `composer_conflicts_total` (counter): conflicts settled
//! - `composer_blocked_total` (counter): winners removed by the reserved guard
//! - `composer_unparsed_total` (counter): fragments skipped as unparsed

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished regeneration.
pub fn record_run(outcome: &str, duration: Duration) {
    counter!("composer_runs_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("composer_run_duration_seconds").record(duration.as_secs_f64());
}

/// Record what a composition produced.
pub fn record_composition(blocks: usize, conflicts: usize, blocked: usize, unparsed: usize) {
    gauge!("composer_blocks").set(blocks as f64);
    counter!("composer_conflicts_total").increment(conflicts as u64);
    counter!("composer_blocked_total").increment(blocked as u64);
    counter!("composer_unparsed_total").increment(unparsed as u64);
}
