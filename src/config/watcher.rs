//! Fragment directory watcher.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::activation::Trigger;
use crate::config::SourcesConfig;

/// Watches both fragment directories and reports changes as triggers.
pub struct SourceWatcher {
    dirs: Vec<PathBuf>,
    extension: String,
    trigger_tx: mpsc::UnboundedSender<Trigger>,
}

impl SourceWatcher {
    pub fn new(sources: &SourcesConfig, trigger_tx: mpsc::UnboundedSender<Trigger>) -> Self {
        Self {
            dirs: vec![sources.app_dir.clone(), sources.override_dir.clone()],
            extension: sources.extension.clone(),
            trigger_tx,
        }
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.trigger_tx.clone();
        let extension = self.extension.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event, &extension) {
                        tracing::debug!(paths = ?event.paths, kind = ?event.kind, "Fragment change detected");
                        let _ = tx.send(Trigger::SourcesChanged);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in &self.dirs {
            if !dir.is_dir() {
                tracing::warn!(dir = ?dir, "Fragment directory does not exist, not watching it");
                continue;
            }
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            tracing::info!(dir = ?dir, "Fragment watcher started");
        }
        Ok(watcher)
    }
}

/// Create, modify or remove of a file carrying the fragment extension.
fn is_relevant(event: &Event, extension: &str) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches && event.paths.iter().any(|p| has_extension(p, extension))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}
