//! Activation controller.
//!
//! # Responsibilities
//! - Serialize regenerations: one run at a time, whatever the trigger
//! - Run load → compose → stage → check → promote → reload
//! - Keep the previous good bundle when a candidate fails
//! - Persist resolution decisions only after a successful activation
//! - Publish status and the last composition for the admin API
//!
//! # Data Flow
//! ```text
//! trigger ─→ lock ─→ load_snapshot ─→ compose ─→ stage ─→ runtime.check
//!                                                            │
//!                  ┌────────────── ok ───────────────────────┤
//!                  ▼                                         ▼ err
//!     promote → reload → CAS decisions → Active     served? → RolledBack
//!                  │ reload err                     none    → Disabled stub
//!                  └─→ restore previous → RolledBack
//! ```
//!
//! # Design Decisions
//! - The lock is a `tokio::sync::Mutex` held across the whole run; overlapping
//!   triggers queue behind it instead of interleaving file writes
//! - Status and the last composition live in `ArcSwap`s so readers never
//!   wait for a run to finish
//! - A failed run still writes diagnostics, annotated with the failure

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::activation::runtime::{ProxyRuntime, RuntimeError};
use crate::activation::state::{
    ActivationState, ActivationStatus, FailureReport, RunSummary, Trigger,
};
use crate::activation::storage::{write_atomic, BundleStore};
use crate::compose::diagnostics::ActivationNote;
use crate::compose::{compose, Bundle, ComposeSettings, Composition, ConflictReport, Diagnostics};
use crate::config::ComposerConfig;
use crate::fragments::{install_fragment, load_snapshot, InstallError, Origin, SourceId};
use crate::observability::metrics;
use crate::resolver::{DecisionStore, Lane, ResolutionDecision, Strategy};
use crate::parser::{rename_location, RenameError, RouteRecord};
use crate::resolver::decisions::{CandidateTimes, StoreError};

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("decision store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error("no conflict is currently recorded for {0:?}")]
    UnknownConflict(String),
    #[error("{winner} is not a candidate for {key:?}")]
    NotACandidate { key: String, winner: SourceId },
    #[error("{winner} is an app fragment and cannot win {key:?} over an override")]
    OverrideSupremacy { key: String, winner: SourceId },
    #[error("no fragment {0} in the current sources")]
    UnknownSource(SourceId),
    #[error("{source_id}: {error}")]
    Rename { source_id: SourceId, error: RenameError },
    #[error("fragment I/O: {0}")]
    Io(#[from] io::Error),
}

/// Result of one regeneration.
#[derive(Debug, Clone, Serialize)]
pub struct RegenerateOutcome {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub state: ActivationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    /// Present unless loading the fragments failed.
    #[serde(skip)]
    pub bundle: Option<Bundle>,
    pub diagnostics: Diagnostics,
}

impl RegenerateOutcome {
    pub fn activated(&self) -> bool {
        self.state == ActivationState::Active
    }
}

struct RunState {
    decisions: DecisionStore,
    /// A bundle this process promoted is being served.
    served_good: bool,
}

/// Single-flight owner of the served bundle.
pub struct ActivationController {
    config: Arc<ComposerConfig>,
    settings: ComposeSettings,
    runtime: Box<dyn ProxyRuntime>,
    store: BundleStore,
    run: Mutex<RunState>,
    status: ArcSwap<ActivationStatus>,
    last: ArcSwapOption<Composition>,
}

impl ActivationController {
    pub fn new(
        config: Arc<ComposerConfig>,
        runtime: Box<dyn ProxyRuntime>,
        decisions: DecisionStore,
    ) -> Self {
        Self {
            settings: ComposeSettings::from_config(&config),
            store: BundleStore::new(config.output.clone()),
            config,
            runtime,
            run: Mutex::new(RunState {
                decisions,
                served_good: false,
            }),
            status: ArcSwap::from_pointee(ActivationStatus::default()),
            last: ArcSwapOption::empty(),
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn status(&self) -> Arc<ActivationStatus> {
        self.status.load_full()
    }

    /// Composition from the most recent run, successful or not.
    pub fn last_composition(&self) -> Option<Arc<Composition>> {
        self.last.load_full()
    }

    /// Conflicts settled by the most recent run.
    pub fn conflicts(&self) -> Vec<ConflictReport> {
        self.last_composition()
            .map(|c| c.diagnostics.conflicts.clone())
            .unwrap_or_default()
    }

    /// Compose from the current fragments without activating anything.
    pub async fn dry_run(&self) -> std::io::Result<Composition> {
        let snapshot = load_snapshot(&self.config.sources).await?;
        let run = self.run.lock().await;
        Ok(compose(&snapshot, run.decisions.snapshot(), &self.settings, unix_now()))
    }

    /// Run the full pipeline once.
    pub async fn regenerate(&self, trigger: Trigger) -> RegenerateOutcome {
        let mut run = self.run.lock().await;
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("regenerate", %run_id, trigger = %trigger);
        self.regenerate_locked(&mut run, run_id, trigger)
            .instrument(span)
            .await
    }

    async fn regenerate_locked(
        &self,
        run: &mut RunState,
        run_id: Uuid,
        trigger: Trigger,
    ) -> RegenerateOutcome {
        let started = Instant::now();
        let started_at = unix_now();
        tracing::info!("Regeneration started");
        self.set_state(ActivationState::Composing);

        let snapshot = match load_snapshot(&self.config.sources).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let failure = FailureReport {
                    stage: "load".into(),
                    detail: e.to_string(),
                };
                let state = self.fail(run, &failure, started_at).await;
                let mut diagnostics = Diagnostics::default();
                self.finish_diagnostics(&mut diagnostics, state, Some(&failure)).await;
                self.publish(run_id, &trigger, started_at, started, state, None, &diagnostics, Some(failure.clone()));
                return RegenerateOutcome {
                    run_id,
                    trigger,
                    state,
                    failure: Some(failure),
                    bundle: None,
                    diagnostics,
                };
            }
        };

        let version = run.decisions.version();
        let composition = compose(&snapshot, run.decisions.snapshot(), &self.settings, started_at);
        metrics::record_composition(
            composition.bundle.blocks.len(),
            composition.diagnostics.conflicts.len(),
            composition.blocked_count(),
            composition.unparsed_count(),
        );

        let (state, failure) = self.activate(run, &composition, run_id, version, started_at).await;

        let mut diagnostics = composition.diagnostics.clone();
        self.finish_diagnostics(&mut diagnostics, state, failure.as_ref()).await;
        let bundle = composition.bundle.clone();
        self.last.store(Some(Arc::new(Composition {
            diagnostics: diagnostics.clone(),
            ..composition
        })));

        self.publish(run_id, &trigger, started_at, started, state, Some(&bundle), &diagnostics, failure.clone());

        RegenerateOutcome {
            run_id,
            trigger,
            state,
            failure,
            bundle: Some(bundle),
            diagnostics,
        }
    }

    /// Stage, check, promote and reload one composition.
    async fn activate(
        &self,
        run: &mut RunState,
        composition: &Composition,
        run_id: Uuid,
        version: u64,
        now: u64,
    ) -> (ActivationState, Option<FailureReport>) {
        let staged = match self.store.stage(&composition.bundle, run_id).await {
            Ok(path) => path,
            Err(e) => {
                let failure = FailureReport {
                    stage: "stage".into(),
                    detail: e.to_string(),
                };
                return (self.fail(run, &failure, now).await, Some(failure));
            }
        };

        self.set_state(ActivationState::Validating);
        if let Err(e) = self.runtime.check(&staged).await {
            self.store.discard(&staged).await;
            let failure = runtime_failure("validate", &e);
            return (self.fail(run, &failure, now).await, Some(failure));
        }

        let previous = match self.store.served().await {
            Ok(previous) => previous,
            Err(e) => {
                self.store.discard(&staged).await;
                let failure = FailureReport {
                    stage: "promote".into(),
                    detail: e.to_string(),
                };
                return (self.fail(run, &failure, now).await, Some(failure));
            }
        };

        let promoted = self.store.promote(&staged).await;
        self.store.discard(&staged).await;
        if let Err(e) = promoted {
            let failure = FailureReport {
                stage: "promote".into(),
                detail: e.to_string(),
            };
            return (self.fail(run, &failure, now).await, Some(failure));
        }

        if let Err(e) = self.runtime.reload().await {
            let failure = runtime_failure("reload", &e);
            match &previous {
                Some(text) => {
                    if let Err(restore) = self.store.restore(text).await {
                        tracing::error!(error = %restore, "Failed to restore previous bundle after reload failure");
                    }
                }
                None => {
                    let stub = Bundle::disabled(now, &failure.detail);
                    if let Err(write) = self.store.write_disabled(&stub).await {
                        tracing::error!(error = %write, "Failed to write disabled bundle");
                    }
                }
            }
            return (self.fail(run, &failure, now).await, Some(failure));
        }

        match run
            .decisions
            .compare_and_swap(version, composition.decisions.clone())
            .await
        {
            Ok(true) => tracing::debug!(version = run.decisions.version(), "Decisions persisted"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to persist resolution decisions"),
        }
        run.served_good = true;

        tracing::info!(
            blocks = composition.bundle.blocks.len(),
            fingerprint = %composition.bundle.fingerprint(),
            "Bundle activated"
        );
        (ActivationState::Active, None)
    }

    /// Keep whatever is served, or fall back to the disabled stub when
    /// nothing good has ever been served.
    async fn fail(&self, run: &mut RunState, failure: &FailureReport, now: u64) -> ActivationState {
        let have_served = run.served_good
            || matches!(self.store.served().await, Ok(Some(text)) if !text.contains("# status: disabled"));

        if have_served {
            tracing::warn!(
                stage = %failure.stage,
                detail = %failure.detail,
                "Candidate rejected, previous bundle kept"
            );
            return ActivationState::RolledBack;
        }

        tracing::error!(
            stage = %failure.stage,
            detail = %failure.detail,
            served = ?self.store.served_path(),
            "No valid bundle has ever been activated; serving a disabled bundle so the core configuration keeps working"
        );
        let stub = Bundle::disabled(now, format!("{} failed: {}", failure.stage, failure.detail));
        if let Err(e) = self.store.write_disabled(&stub).await {
            tracing::error!(error = %e, "Failed to write disabled bundle");
        } else if let Err(e) = self.runtime.reload().await {
            tracing::error!(error = %e, "Reload after disabling failed");
        }
        ActivationState::Disabled
    }

    async fn finish_diagnostics(
        &self,
        diagnostics: &mut Diagnostics,
        state: ActivationState,
        failure: Option<&FailureReport>,
    ) {
        diagnostics.activation = Some(ActivationNote {
            state: state.to_string(),
            detail: failure.map(|f| format!("{}: {}", f.stage, f.detail)),
        });
        if let Err(e) = self.store.write_diagnostics(diagnostics).await {
            tracing::warn!(path = ?self.store.diagnostics_path(), error = %e, "Failed to write diagnostics");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn publish(
        &self,
        run_id: Uuid,
        trigger: &Trigger,
        started_at: u64,
        started: Instant,
        state: ActivationState,
        bundle: Option<&Bundle>,
        diagnostics: &Diagnostics,
        failure: Option<FailureReport>,
    ) {
        let duration = started.elapsed();
        metrics::record_run(state.as_str(), duration);

        let previous = self.status.load_full();
        let fingerprint = bundle.map(Bundle::fingerprint).unwrap_or_default();
        let active_fingerprint = match state {
            ActivationState::Active => Some(fingerprint.clone()),
            ActivationState::Disabled => None,
            _ => previous.active_fingerprint.clone(),
        };

        self.status.store(Arc::new(ActivationStatus {
            state: ActivationState::Idle,
            served: Some(state),
            active_fingerprint,
            runs: previous.runs + 1,
            last_run: Some(RunSummary {
                run_id,
                trigger: trigger.clone(),
                started_at,
                duration_ms: duration.as_millis() as u64,
                outcome: state,
                blocks: bundle.map(|b| b.blocks.len()).unwrap_or_default(),
                conflicts: diagnostics.conflicts.len(),
                skipped: diagnostics.skipped.len(),
                fingerprint,
                failure,
            }),
        }));
        tracing::info!(
            outcome = %state,
            duration_ms = duration.as_millis() as u64,
            "Regeneration finished"
        );
    }

    fn set_state(&self, state: ActivationState) {
        let next = self.status.load().with_state(state);
        self.status.store(Arc::new(next));
    }

    /// Install an app fragment, then regenerate.
    pub async fn install_app(&self, name: &str, text: &str) -> Result<RegenerateOutcome, ActivationError> {
        install_fragment(
            &self.config.sources.app_dir,
            name,
            &self.config.sources.extension,
            text,
        )
        .await?;
        Ok(self
            .regenerate(Trigger::AppInstalled {
                name: name.to_string(),
            })
            .await)
    }

    /// Record a manual winner for a currently conflicting lane, then
    /// regenerate.
    ///
    /// `key` is the lane key from the conflict report (`= /x` for exact
    /// routes, the normalized key otherwise).
    pub async fn resolve_conflict(
        &self,
        key: &str,
        winner: SourceId,
    ) -> Result<RegenerateOutcome, ActivationError> {
        {
            let mut run = self.run.lock().await;
            let composition = self
                .last_composition()
                .ok_or_else(|| ActivationError::UnknownConflict(key.to_string()))?;

            let lane: Vec<&RouteRecord> = composition
                .groups
                .iter()
                .flat_map(|g| g.candidates.iter())
                .filter(|r| Lane::of(r).decision_key(&r.normalized_key) == key)
                .collect();
            let candidates: Vec<(SourceId, Origin)> =
                lane.iter().map(|r| (r.source.clone(), r.origin)).collect();
            let candidate_mtimes: CandidateTimes = lane
                .iter()
                .map(|r| (r.source.as_str().to_string(), r.mod_time_ms))
                .collect();
            if candidates.len() < 2 {
                return Err(ActivationError::UnknownConflict(key.to_string()));
            }

            let winner_origin = candidates
                .iter()
                .find(|(id, _)| *id == winner)
                .map(|(_, origin)| *origin)
                .ok_or_else(|| ActivationError::NotACandidate {
                    key: key.to_string(),
                    winner: winner.clone(),
                })?;
            let override_present = candidates.iter().any(|(_, o)| *o == Origin::Override);
            if override_present && winner_origin == Origin::App {
                return Err(ActivationError::OverrideSupremacy {
                    key: key.to_string(),
                    winner,
                });
            }

            let mut alternatives: Vec<SourceId> = candidates
                .into_iter()
                .map(|(id, _)| id)
                .filter(|id| *id != winner)
                .collect();
            alternatives.sort();
            alternatives.dedup();

            let version = run.decisions.record(ResolutionDecision {
                normalized_key: key.to_string(),
                winner: winner.clone(),
                alternatives,
                resolved_at: unix_now(),
                strategy: Strategy::Manual,
                candidate_mtimes,
            })
            .await?;
            tracing::info!(key = %key, winner = %winner, version, "Manual resolution recorded");
        }

        Ok(self
            .regenerate(Trigger::ManualResolution {
                key: key.to_string(),
            })
            .await)
    }

    /// Rename one route inside a stored fragment, then regenerate.
    ///
    /// `from` is the route's location spec or normalized key within that
    /// fragment; only the pattern text is rewritten.
    pub async fn rename_route(
        &self,
        source: SourceId,
        from: &str,
        to: &str,
    ) -> Result<RegenerateOutcome, ActivationError> {
        {
            let _run = self.run.lock().await;
            let snapshot = load_snapshot(&self.config.sources).await?;
            let fragment = snapshot
                .get(&source)
                .ok_or_else(|| ActivationError::UnknownSource(source.clone()))?;

            let text = rename_location(fragment, from, to).map_err(|error| ActivationError::Rename {
                source_id: source.clone(),
                error,
            })?;
            write_atomic(Path::new(source.as_str()), text.as_bytes()).await?;
            tracing::info!(source = %source, from = %from, to = %to, "Route renamed");
        }

        Ok(self
            .regenerate(Trigger::RouteRenamed {
                source: source.clone(),
                from: from.to_string(),
                to: to.to_string(),
            })
            .await)
    }
}

fn runtime_failure(stage: &str, error: &RuntimeError) -> FailureReport {
    FailureReport {
        stage: stage.to_string(),
        detail: error.to_string(),
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
