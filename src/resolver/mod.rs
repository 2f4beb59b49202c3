//! Conflict resolution subsystem.
//!
//! # Data Flow
//! ```text
//! RouteRecord[] (all fragments)
//!     → conflict.rs (group by key, lanes, precedence, stored decisions)
//!     → winners + conflict report + next decision map
//!     → reserved.rs (drop winners claiming reserved paths)
//!     → allowed winners
//! ```
//!
//! # Design Decisions
//! - The decision store is passed in as a snapshot and the new map is
//!   handed back; only the activation controller writes it
//! - The reserved guard runs after resolution so an override can never
//!   sneak a reserved route past it

pub mod conflict;
pub mod decisions;
pub mod reserved;

pub use conflict::{resolve, Lane, Resolution, RouteGroup};
pub use decisions::{DecisionSet, DecisionStore, ResolutionDecision, Strategy};
pub use reserved::{guard, ReservedPaths};
