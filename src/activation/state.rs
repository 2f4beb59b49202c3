//! Activation state, triggers and run summaries.
//!
//! # State Machine
//! ```text
//! Idle → Composing → Validating → Active ─────┐
//!                         │                   ├→ Idle
//!                         └──→ RolledBack ────┘
//!                         └──→ Disabled (no good bundle has ever been served)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::fragments::SourceId;

/// Phase of the activation controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    Idle,
    Composing,
    Validating,
    /// The candidate passed the check and is being served.
    Active,
    /// The candidate failed; the previous bundle is still served.
    RolledBack,
    /// No valid bundle could be produced and none existed before; a stub
    /// that routes nothing is served.
    Disabled,
}

impl ActivationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationState::Idle => "idle",
            ActivationState::Composing => "composing",
            ActivationState::Validating => "validating",
            ActivationState::Active => "active",
            ActivationState::RolledBack => "rolled_back",
            ActivationState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What asked for a regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    /// A fragment directory changed on disk.
    SourcesChanged,
    /// Interval re-scan.
    Scheduled,
    /// SIGHUP.
    Signal,
    /// Admin API reload.
    Manual,
    AppInstalled { name: String },
    ManualResolution { key: String },
    RouteRenamed { source: SourceId, from: String, to: String },
    /// One-shot command line run.
    Command,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Startup => write!(f, "startup"),
            Trigger::SourcesChanged => write!(f, "sources_changed"),
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Signal => write!(f, "signal"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::AppInstalled { name } => write!(f, "app_installed({})", name),
            Trigger::ManualResolution { key } => write!(f, "manual_resolution({})", key),
            Trigger::RouteRenamed { source, from, to } => {
                write!(f, "route_renamed({}: {} -> {})", source.file_name(), from, to)
            }
            Trigger::Command => write!(f, "command"),
        }
    }
}

/// Why a run did not activate its candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Step that failed: `load`, `stage`, `validate`, `promote` or `reload`.
    pub stage: String,
    pub detail: String,
}

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub trigger: Trigger,
    /// Unix seconds.
    pub started_at: u64,
    pub duration_ms: u64,
    pub outcome: ActivationState,
    pub blocks: usize,
    pub conflicts: usize,
    pub skipped: usize,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationStatus {
    pub state: ActivationState,
    /// Outcome of the last finished run.
    pub served: Option<ActivationState>,
    /// Fingerprint of the bundle currently served.
    pub active_fingerprint: Option<String>,
    pub runs: u64,
    pub last_run: Option<RunSummary>,
}

impl Default for ActivationStatus {
    fn default() -> Self {
        Self {
            state: ActivationState::Idle,
            served: None,
            active_fingerprint: None,
            runs: 0,
            last_run: None,
        }
    }
}

impl ActivationStatus {
    pub fn with_state(&self, state: ActivationState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}
