//! Persisted resolution decisions.
//!
//! # Responsibilities
//! - Hold the decision chosen for every conflicting lane
//! - Persist decisions through a swappable repository
//! - Guard updates with a version number (compare-and-swap)
//!
//! # Design Decisions
//! - The store is an explicit value owned by the activation controller and
//!   passed to the resolver as a snapshot; there is no global map
//! - A save only happens when the decision map actually changed
//! - The JSON file is replaced atomically (write temp, rename)
//! - Automatic decisions remember every candidate's modification time and
//!   go stale as soon as one of them changes; manual decisions only depend
//!   on the candidate set

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;

use crate::fragments::SourceId;

/// How a decision's winner was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// An override-origin candidate outranked everything else.
    OverridePrecedence,
    /// The most recently modified candidate won.
    Recency,
    /// An operator picked the winner.
    Manual,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::OverridePrecedence => write!(f, "override precedence"),
            Strategy::Recency => write!(f, "most recent"),
            Strategy::Manual => write!(f, "manual"),
        }
    }
}

/// Candidate identity → modification time (ms) as seen by one run.
pub type CandidateTimes = BTreeMap<String, u64>;

/// The stored outcome for one conflicting lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDecision {
    pub normalized_key: String,
    pub winner: SourceId,
    pub alternatives: Vec<SourceId>,
    /// Seconds since the Unix epoch.
    pub resolved_at: u64,
    pub strategy: Strategy,
    /// Modification times of every candidate when the decision was made.
    #[serde(default)]
    pub candidate_mtimes: CandidateTimes,
}

impl ResolutionDecision {
    /// True when the decision still applies to `candidates`.
    ///
    /// The candidate set must be exactly the one decided over. Automatic
    /// decisions additionally require every modification time to match.
    pub fn covers(&self, candidates: &CandidateTimes) -> bool {
        let same_set = self.alternatives.len() + 1 == candidates.len()
            && candidates.contains_key(self.winner.as_str())
            && self
                .alternatives
                .iter()
                .all(|a| candidates.contains_key(a.as_str()));
        if !same_set {
            return false;
        }
        match self.strategy {
            Strategy::Manual => true,
            Strategy::Recency | Strategy::OverridePrecedence => self.candidate_mtimes == *candidates,
        }
    }
}

/// Versioned set of decisions keyed by lane key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSet {
    pub version: u64,
    pub decisions: BTreeMap<String, ResolutionDecision>,
}

impl DecisionSet {
    pub fn get(&self, key: &str) -> Option<&ResolutionDecision> {
        self.decisions.get(key)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("decision store I/O: {0}")]
    Io(#[from] io::Error),

    #[error("decision store is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("decision store changed underneath (expected version {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("decision store lock poisoned")]
    Poisoned,
}

/// Load/save interface for decisions.
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn load(&self) -> Result<DecisionSet, StoreError>;
    async fn save(&self, set: &DecisionSet) -> Result<(), StoreError>;
}

/// Decisions kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DecisionRepository for JsonFileRepository {
    async fn load(&self) -> Result<DecisionSet, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DecisionSet::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, set: &DecisionSet) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(set)?;
        crate::activation::storage::write_atomic(&self.path, &json).await?;
        Ok(())
    }
}

/// Decisions kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<DecisionSet>,
}

impl MemoryRepository {
    pub fn new(initial: DecisionSet) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }
}

#[async_trait]
impl DecisionRepository for MemoryRepository {
    async fn load(&self) -> Result<DecisionSet, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.clone())
    }

    async fn save(&self, set: &DecisionSet) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        *inner = set.clone();
        Ok(())
    }
}

/// Versioned, repository-backed decision store.
pub struct DecisionStore {
    repo: Box<dyn DecisionRepository>,
    current: DecisionSet,
}

impl DecisionStore {
    /// Open the store, loading whatever the repository holds.
    pub async fn open(repo: Box<dyn DecisionRepository>) -> Result<Self, StoreError> {
        let current = repo.load().await?;
        tracing::debug!(
            version = current.version,
            decisions = current.decisions.len(),
            "Decision store opened"
        );
        Ok(Self { repo, current })
    }

    pub fn snapshot(&self) -> &DecisionSet {
        &self.current
    }

    pub fn version(&self) -> u64 {
        self.current.version
    }

    /// Replace the decision map if the store is still at `expected`.
    ///
    /// Returns `true` when something was written.
    pub async fn compare_and_swap(
        &mut self,
        expected: u64,
        decisions: BTreeMap<String, ResolutionDecision>,
    ) -> Result<bool, StoreError> {
        if expected != self.current.version {
            return Err(StoreError::VersionConflict {
                expected,
                actual: self.current.version,
            });
        }
        if decisions == self.current.decisions {
            return Ok(false);
        }

        let next = DecisionSet {
            version: expected + 1,
            decisions,
        };
        self.repo.save(&next).await?;
        tracing::info!(
            version = next.version,
            decisions = next.decisions.len(),
            "Resolution decisions updated"
        );
        self.current = next;
        Ok(true)
    }

    /// Insert or replace a single decision.
    pub async fn record(&mut self, decision: ResolutionDecision) -> Result<u64, StoreError> {
        let mut decisions = self.current.decisions.clone();
        decisions.insert(decision.normalized_key.clone(), decision);
        self.compare_and_swap(self.current.version, decisions).await?;
        Ok(self.current.version)
    }
}
