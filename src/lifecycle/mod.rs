//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open decision store → Initial regeneration → Start watcher, signals,
//!     admin API → Trigger loop
//!
//! Triggers (triggers.rs):
//!     watcher / interval / SIGHUP / admin → debounce → regenerate
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → broadcast → trigger loop and admin API stop
//! ```
//!
//! # Design Decisions
//! - The initial run completes before any other trigger is served
//! - Every trigger funnels into one channel consumed by one loop

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod triggers;

pub use shutdown::Shutdown;
