//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use proxy_composer::activation::{ActivationController, ProxyRuntime, RuntimeError};
use proxy_composer::config::ComposerConfig;
use proxy_composer::resolver::decisions::{DecisionStore, JsonFileRepository};

/// Scratch deployment under the OS temp dir, removed on drop.
pub struct Scratch {
    pub root: PathBuf,
}

impl Scratch {
    pub fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!("composer-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("apps")).unwrap();
        std::fs::create_dir_all(root.join("overrides")).unwrap();
        Self { root }
    }

    pub fn apps(&self) -> PathBuf {
        self.root.join("apps")
    }

    pub fn overrides(&self) -> PathBuf {
        self.root.join("overrides")
    }

    pub fn served(&self) -> PathBuf {
        self.root.join("served/apps.conf")
    }

    pub fn decisions(&self) -> PathBuf {
        self.root.join("decisions.json")
    }

    pub fn diagnostics(&self) -> PathBuf {
        self.root.join("diagnostics.json")
    }

    /// Write an app fragment with a fixed modification time (seconds).
    pub fn write_app(&self, name: &str, text: &str, mtime_secs: u64) -> PathBuf {
        write_with_mtime(&self.apps().join(name), text, mtime_secs)
    }

    pub fn write_override(&self, name: &str, text: &str, mtime_secs: u64) -> PathBuf {
        write_with_mtime(&self.overrides().join(name), text, mtime_secs)
    }

    pub fn remove_app(&self, name: &str) {
        std::fs::remove_file(self.apps().join(name)).unwrap();
    }

    pub fn served_text(&self) -> Option<String> {
        std::fs::read_to_string(self.served()).ok()
    }

    /// Configuration pointing every path into the scratch directory.
    pub fn config(&self) -> ComposerConfig {
        let mut config = ComposerConfig::default();
        config.sources.app_dir = self.apps();
        config.sources.override_dir = self.overrides();
        config.output.bundle_path = self.served();
        config.output.staging_dir = self.root.join("staging");
        config.output.diagnostics_path = self.diagnostics();
        config.output.decisions_path = self.decisions();
        config.runtime.enabled = false;
        config.runtime.core_config = self.root.join("nginx.conf");
        config.runtime.harness_path = self.root.join("staging/harness.conf");
        config.schedule.watch_sources = false;
        config.schedule.rescan_interval_secs = 0;
        config
    }

    pub async fn controller(&self, runtime: FakeRuntime) -> Arc<ActivationController> {
        self.controller_with(self.config(), runtime).await
    }

    pub async fn controller_with(&self, config: ComposerConfig, runtime: FakeRuntime) -> Arc<ActivationController> {
        let decisions = DecisionStore::open(Box::new(JsonFileRepository::new(self.decisions())))
            .await
            .unwrap();
        Arc::new(ActivationController::new(
            Arc::new(config),
            Box::new(runtime),
            decisions,
        ))
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.root).unwrap_or_default();
    }
}

pub fn write_with_mtime(path: &Path, text: &str, mtime_secs: u64) -> PathBuf {
    std::fs::write(path, text).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs)).unwrap();
    path.to_path_buf()
}

#[derive(Default)]
struct FakeState {
    checks: AtomicUsize,
    reloads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_reload: AtomicBool,
    /// Candidates containing this text are rejected.
    reject_marker: Mutex<Option<String>>,
    check_delay_ms: AtomicUsize,
}

/// Runtime double: rejects candidates by content, counts calls and tracks
/// how many checks overlap.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_when_contains(&self, marker: &str) {
        *self.state.reject_marker.lock().unwrap() = Some(marker.to_string());
    }

    pub fn accept_everything(&self) {
        *self.state.reject_marker.lock().unwrap() = None;
    }

    pub fn fail_reloads(&self, fail: bool) {
        self.state.fail_reload.store(fail, Ordering::SeqCst);
    }

    pub fn slow_checks(&self, delay_ms: usize) {
        self.state.check_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.state.checks.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.state.reloads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyRuntime for FakeRuntime {
    async fn check(&self, candidate: &Path) -> Result<(), RuntimeError> {
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.state.checks.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.check_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let text = tokio::fs::read_to_string(candidate).await.unwrap_or_default();
        let marker = self.state.reject_marker.lock().unwrap().clone();
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        match marker {
            Some(marker) if text.contains(&marker) => Err(RuntimeError::Rejected {
                output: format!("unknown directive \"{}\"", marker),
            }),
            _ => Ok(()),
        }
    }

    async fn reload(&self) -> Result<(), RuntimeError> {
        self.state.reloads.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_reload.load(Ordering::SeqCst) {
            return Err(RuntimeError::ReloadFailed {
                output: "signal process started, but no master".into(),
            });
        }
        Ok(())
    }
}
