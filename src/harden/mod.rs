//! Upstream hardening subsystem.
//!
//! # Responsibilities
//! - Route every proxied winner through a per-request resolved variable
//! - Attach the shared fallback location to blocks without error handling
//! - Leave already-hardened and upstream-less blocks as authored
//!
//! # Design Decisions
//! - Hardening works on the parsed body, never on regex rewrites of text
//! - Variable names are derived from the block identity, so repeated runs
//!   over unchanged inputs emit identical bundles

pub mod naming;
pub mod upstream;

pub use naming::variable_name;
pub use upstream::{harden, HardenNote, HardenedBlock};
