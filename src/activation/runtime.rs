//! The external proxy runtime.
//!
//! # Responsibilities
//! - Syntax-check a candidate bundle together with the static core config
//! - Signal a hot reload once the candidate is served
//!
//! # Design Decisions
//! - The check runs against a harness: a copy of the core configuration in
//!   which the served bundle path is replaced by the candidate path, so the
//!   served file is never touched before the candidate passes
//! - The check is bounded by a timeout and the child is killed on expiry

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::RuntimeConfig;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("{binary} did not finish within {secs}s")]
    Timeout { binary: String, secs: u64 },
    #[error("configuration rejected: {output}")]
    Rejected { output: String },
    #[error("reload refused: {output}")]
    ReloadFailed { output: String },
    #[error("preparing check harness {path}: {source}")]
    Harness {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Validate-and-reload interface of the serving runtime.
#[async_trait]
pub trait ProxyRuntime: Send + Sync {
    /// Check that the runtime accepts `candidate` in place of the served
    /// bundle.
    async fn check(&self, candidate: &Path) -> Result<(), RuntimeError>;

    /// Ask the runtime to pick up the served bundle.
    async fn reload(&self) -> Result<(), RuntimeError>;
}

/// `nginx -t` / `nginx -s reload`.
pub struct NginxRuntime {
    config: RuntimeConfig,
    served_path: PathBuf,
}

impl NginxRuntime {
    pub fn new(config: RuntimeConfig, served_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            served_path: served_path.into(),
        }
    }

    /// Core configuration text with the served bundle swapped for
    /// `candidate`.
    pub fn harness_text(core: &str, served: &Path, candidate: &Path) -> String {
        let served = served.to_string_lossy();
        let candidate = candidate.to_string_lossy();
        core.replace(served.as_ref(), candidate.as_ref())
    }

    async fn write_harness(&self, candidate: &Path) -> Result<PathBuf, RuntimeError> {
        let harness_err = |source| RuntimeError::Harness {
            path: self.config.harness_path.clone(),
            source,
        };
        let core = tokio::fs::read_to_string(&self.config.core_config)
            .await
            .map_err(harness_err)?;
        if !core.contains(self.served_path.to_string_lossy().as_ref()) {
            tracing::warn!(
                core_config = ?self.config.core_config,
                served = ?self.served_path,
                "Core configuration does not include the served bundle by its full path; check covers the core only"
            );
        }
        let text = Self::harness_text(&core, &self.served_path, candidate);
        if let Some(parent) = self.config.harness_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(harness_err)?;
        }
        tokio::fs::write(&self.config.harness_path, text)
            .await
            .map_err(harness_err)?;
        Ok(self.config.harness_path.clone())
    }

    async fn run(&self, args: &[&str]) -> Result<(bool, String), RuntimeError> {
        let binary = self.config.binary.clone();
        let secs = self.config.check_timeout_secs;
        let child = Command::new(&binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(secs), child)
            .await
            .map_err(|_| RuntimeError::Timeout {
                binary: binary.clone(),
                secs,
            })?
            .map_err(|source| RuntimeError::Spawn { binary, source })?;

        // nginx reports on stderr even when it succeeds.
        let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stdout.trim());
        }
        Ok((output.status.success(), text))
    }
}

#[async_trait]
impl ProxyRuntime for NginxRuntime {
    async fn check(&self, candidate: &Path) -> Result<(), RuntimeError> {
        let harness = self.write_harness(candidate).await?;
        let harness = harness.to_string_lossy().into_owned();
        let (ok, output) = self.run(&["-t", "-q", "-c", &harness]).await?;
        if ok {
            tracing::debug!(candidate = ?candidate, "Runtime accepted candidate");
            Ok(())
        } else {
            Err(RuntimeError::Rejected { output })
        }
    }

    async fn reload(&self) -> Result<(), RuntimeError> {
        let (ok, output) = self.run(&["-s", "reload"]).await?;
        if ok {
            tracing::info!("Runtime reload signalled");
            Ok(())
        } else {
            Err(RuntimeError::ReloadFailed { output })
        }
    }
}

/// Runtime used when `runtime.enabled = false`: every check passes and
/// reloads do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRuntime;

#[async_trait]
impl ProxyRuntime for NoopRuntime {
    async fn check(&self, candidate: &Path) -> Result<(), RuntimeError> {
        tracing::debug!(candidate = ?candidate, "Runtime disabled, skipping syntax check");
        Ok(())
    }

    async fn reload(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// The runtime the configuration asks for.
pub fn from_config(config: &RuntimeConfig, served_path: &Path) -> Box<dyn ProxyRuntime> {
    if config.enabled {
        Box::new(NginxRuntime::new(config.clone(), served_path))
    } else {
        Box::new(NoopRuntime)
    }
}
