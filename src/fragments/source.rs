//! Fragment source types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Which collection a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Proxy-owned; outranks app fragments.
    Override,
    /// Owned by a backend application.
    App,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Override => write!(f, "override"),
            Origin::App => write!(f, "app"),
        }
    }
}

/// Identity of a fragment: its path as loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, used in human-facing messages.
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fragment as read at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSource {
    pub id: SourceId,
    pub origin: Origin,
    pub text: String,
    /// Modification time, milliseconds since the Unix epoch.
    pub mod_time_ms: u64,
}

impl FragmentSource {
    pub fn new(id: impl Into<String>, origin: Origin, text: impl Into<String>, mod_time_ms: u64) -> Self {
        Self {
            id: SourceId::new(id),
            origin,
            text: text.into(),
            mod_time_ms,
        }
    }
}

/// Point-in-time view of every fragment, keyed by identity.
///
/// Keying by identity makes every later stage independent of the order in
/// which the filesystem listed the files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    sources: BTreeMap<SourceId, FragmentSource>,
}

impl SourceSnapshot {
    pub fn new(sources: impl IntoIterator<Item = FragmentSource>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn insert(&mut self, source: FragmentSource) {
        self.sources.insert(source.id.clone(), source);
    }

    pub fn get(&self, id: &SourceId) -> Option<&FragmentSource> {
        self.sources.get(id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    /// Sources in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &FragmentSource> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
