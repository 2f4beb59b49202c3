//! Installing an app fragment on behalf of its application.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::activation::storage::write_atomic;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid fragment name {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidName(String),
    #[error("writing fragment {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File name for an app name, with the fragment extension appended when
/// the caller left it off.
pub fn fragment_file_name(name: &str, extension: &str) -> Result<String, InstallError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(InstallError::InvalidName(name.to_string()));
    }

    let suffix = format!(".{}", extension);
    if name.ends_with(&suffix) {
        Ok(name.to_string())
    } else {
        Ok(format!("{}{}", name, suffix))
    }
}

/// Atomically write `text` as the app fragment `name` in `dir`.
pub async fn install_fragment(
    dir: &Path,
    name: &str,
    extension: &str,
    text: &str,
) -> Result<PathBuf, InstallError> {
    let path = dir.join(fragment_file_name(name, extension)?);
    write_atomic(&path, text.as_bytes())
        .await
        .map_err(|source| InstallError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::info!(path = ?path, bytes = text.len(), "App fragment installed");
    Ok(path)
}
