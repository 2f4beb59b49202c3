//! Activation subsystem.
//!
//! # Data Flow
//! ```text
//! Trigger (startup, watcher, interval, SIGHUP, admin, CLI)
//!     → controller.rs (single-flight run)
//!     → compose::pipeline (pure)
//!     → storage.rs (staging write)
//!     → runtime.rs (syntax check against the core configuration)
//!     → storage.rs (atomic promote) → runtime.rs (hot reload)
//!     → state.rs (published status)
//! ```
//!
//! # Design Decisions
//! - The served bundle only changes after the runtime accepted it
//! - The runtime sits behind a trait so tests and dry environments can
//!   substitute it

pub mod controller;
pub mod runtime;
pub mod state;
pub mod storage;

pub use controller::{ActivationController, ActivationError, RegenerateOutcome};
pub use runtime::{NginxRuntime, NoopRuntime, ProxyRuntime, RuntimeError};
pub use state::{ActivationState, ActivationStatus, FailureReport, RunSummary, Trigger};
pub use storage::BundleStore;
