//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one span per regeneration)
//!     → metrics.rs (run counters, bundle gauges, duration histogram)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for log shipping)
//!     → metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every regeneration carries a `run_id` so its log lines group together
//! - Metrics are recorded through the `metrics` facade; without an
//!   installed recorder they are no-ops

pub mod logging;
pub mod metrics;
