//! Durable artifacts: staged candidate, served bundle, diagnostics.
//!
//! # Design Decisions
//! - Every write goes to a temporary sibling and is renamed into place, so
//!   readers (nginx included) never observe a half-written file
//! - The served bundle is only written by `promote`, `restore` and
//!   `write_disabled`; staging never touches it

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::compose::{Bundle, Diagnostics};
use crate::config::OutputConfig;

/// Write `bytes` to `path` via a temporary sibling and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple());
    let tmp = match parent {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    };

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        fs::remove_file(&tmp).await.unwrap_or_default();
        return Err(e);
    }
    Ok(())
}

/// File locations for one deployment.
#[derive(Debug, Clone)]
pub struct BundleStore {
    output: OutputConfig,
}

impl BundleStore {
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    pub fn served_path(&self) -> &Path {
        &self.output.bundle_path
    }

    pub fn diagnostics_path(&self) -> &Path {
        &self.output.diagnostics_path
    }

    /// Write the candidate for `run_id` into the staging directory.
    pub async fn stage(&self, bundle: &Bundle, run_id: Uuid) -> io::Result<PathBuf> {
        let path = self
            .output
            .staging_dir
            .join(format!("candidate-{}.conf", run_id.simple()));
        write_atomic(&path, bundle.render().as_bytes()).await?;
        tracing::debug!(path = ?path, "Candidate staged");
        Ok(path)
    }

    /// Remove a staged candidate. Missing files are fine.
    pub async fn discard(&self, staged: &Path) {
        match fs::remove_file(staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = ?staged, error = %e, "Failed to remove staged candidate"),
        }
    }

    /// Currently served bundle text, if any.
    pub async fn served(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.output.bundle_path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the served bundle with the staged candidate.
    pub async fn promote(&self, staged: &Path) -> io::Result<()> {
        let text = fs::read(staged).await?;
        write_atomic(&self.output.bundle_path, &text).await?;
        tracing::info!(path = ?self.output.bundle_path, "Bundle promoted");
        Ok(())
    }

    /// Put previously served text back.
    pub async fn restore(&self, previous: &str) -> io::Result<()> {
        write_atomic(&self.output.bundle_path, previous.as_bytes()).await
    }

    /// Serve a stub that routes nothing.
    pub async fn write_disabled(&self, stub: &Bundle) -> io::Result<()> {
        write_atomic(&self.output.bundle_path, stub.render().as_bytes()).await
    }

    pub async fn write_diagnostics(&self, diagnostics: &Diagnostics) -> io::Result<()> {
        let json = diagnostics
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_atomic(&self.output.diagnostics_path, json.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BundleStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("composer-storage-{}", Uuid::new_v4()));
        let output = OutputConfig {
            bundle_path: root.join("served/apps.conf"),
            staging_dir: root.join("staging"),
            diagnostics_path: root.join("diagnostics.json"),
            decisions_path: root.join("decisions.json"),
        };
        (BundleStore::new(output), root)
    }

    #[tokio::test]
    async fn test_stage_does_not_touch_served() {
        let (store, root) = store();
        let bundle = Bundle::new(1, vec![], vec![], "fallback");
        let staged = store.stage(&bundle, Uuid::new_v4()).await.unwrap();

        assert!(staged.starts_with(root.join("staging")));
        assert!(store.served().await.unwrap().is_none());

        store.promote(&staged).await.unwrap();
        assert_eq!(store.served().await.unwrap().unwrap(), bundle.render());

        store.discard(&staged).await;
        assert!(!staged.exists());
        std::fs::remove_dir_all(root).unwrap_or_default();
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temporaries() {
        let (store, root) = store();
        store.restore("one").await.unwrap();
        store.restore("two").await.unwrap();

        let served_dir = root.join("served");
        let names: Vec<String> = std::fs::read_dir(&served_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["apps.conf".to_string()]);
        assert_eq!(store.served().await.unwrap().as_deref(), Some("two"));
        std::fs::remove_dir_all(root).unwrap_or_default();
    }
}
