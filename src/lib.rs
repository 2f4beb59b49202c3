//! Fragment composer for a development reverse proxy.
//!
//! Independently authored nginx `location` fragments (one per backend app,
//! plus proxy-owned overrides) are merged into one bundle that is checked
//! by the runtime before it is served.

// Pipeline
pub mod fragments;
pub mod parser;
pub mod resolver;
pub mod harden;
pub mod compose;

// Activation and its surfaces
pub mod activation;
pub mod admin;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use activation::{ActivationController, RegenerateOutcome, Trigger};
pub use compose::{compose, Bundle, ComposeSettings, Composition, Diagnostics};
pub use config::ComposerConfig;
pub use lifecycle::Shutdown;
