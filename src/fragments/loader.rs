//! Fragment loading from disk.
//!
//! # Responsibilities
//! - List both fragment directories (app, override)
//! - Read each fragment's text and modification time in one pass
//! - Produce a `SourceSnapshot` that later stages treat as immutable
//!
//! # Design Decisions
//! - A missing directory is an empty collection, not an error
//! - Text and mtime come from the same open handle so a file replaced
//!   mid-scan is never half-reflected
//! - Invalid UTF-8 is decoded lossily; the parser decides if it is usable

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::config::SourcesConfig;
use crate::fragments::source::{FragmentSource, Origin, SourceId, SourceSnapshot};

/// Read both fragment collections into a snapshot.
pub async fn load_snapshot(config: &SourcesConfig) -> io::Result<SourceSnapshot> {
    let mut snapshot = SourceSnapshot::default();

    for (dir, origin) in [
        (&config.app_dir, Origin::App),
        (&config.override_dir, Origin::Override),
    ] {
        for source in load_collection(dir, origin, &config.extension).await? {
            snapshot.insert(source);
        }
    }

    tracing::debug!(sources = snapshot.len(), "Fragment snapshot captured");
    Ok(snapshot)
}

/// Read every fragment with the given extension from one directory.
pub async fn load_collection(
    dir: &Path,
    origin: Origin,
    extension: &str,
) -> io::Result<Vec<FragmentSource>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(dir = ?dir, %origin, "Fragment directory missing, treating as empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut sources = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if !entry.file_type().await?.is_file() {
            continue;
        }

        match read_fragment(&path, origin).await {
            Ok(source) => sources.push(source),
            // Deleted between listing and reading: not part of this snapshot.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "Fragment vanished during scan");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(sources)
}

async fn read_fragment(path: &Path, origin: Origin) -> io::Result<FragmentSource> {
    let mut file = fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut bytes).await?;

    let mod_time_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = ?path, "Fragment is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    Ok(FragmentSource {
        id: SourceId::from_path(path),
        origin,
        text,
        mod_time_ms,
    })
}
