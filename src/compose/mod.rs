//! Bundle composition subsystem.
//!
//! # Responsibilities
//! - Run the pure pipeline from a fragment snapshot to bundle text
//! - Order blocks deterministically and stamp provenance on each
//! - Produce the diagnostics document alongside the bundle
//!
//! # Design Decisions
//! - Composition never fails: every problem becomes a diagnostics entry
//! - The bundle is a value; writing it anywhere is the activation
//!   controller's job

pub mod bundle;
pub mod diagnostics;
pub mod pipeline;

pub use bundle::{Bundle, BundleBlock, ManifestEntry, ManifestStatus};
pub use diagnostics::{ConflictReport, Diagnostics, IncludedEntry, SkipKind, SkipReason, SkippedEntry};
pub use pipeline::{compose, ComposeSettings, Composition};
