//! Bundle text.
//!
//! # Layout
//! ```text
//! # header: generation time + source manifest
//! # source: <id> (<origin>)        ← one provenance line per block
//! location ... { ... }
//! ...
//! location @<fallback> { ... }     ← exactly one, always last
//! ```
//!
//! Blocks go out in a fixed order so nginx sees the same file for the
//! same inputs: override exact, override prefix, app exact, app prefix,
//! regex, generic; then by key, then by source.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

use crate::fragments::{Origin, SourceId};
use crate::harden::HardenedBlock;
use crate::parser::MatchType;

/// Status of one source in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    /// At least one block from this source is in the bundle.
    Included,
    /// Parsed, but none of its routes made it in.
    Excluded,
    Unparsed,
}

impl ManifestStatus {
    fn as_str(self) -> &'static str {
        match self {
            ManifestStatus::Included => "included",
            ManifestStatus::Excluded => "excluded",
            ManifestStatus::Unparsed => "unparsed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub source: SourceId,
    pub origin: Origin,
    pub mod_time_ms: u64,
    pub status: ManifestStatus,
}

/// One emitted location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleBlock {
    pub source: SourceId,
    pub origin: Origin,
    pub match_type: MatchType,
    pub normalized_key: String,
    /// `= /x`, `^~ /x`, `/x/`, `~ ^/x`.
    pub location: String,
    /// Body lines, already indented, newline-terminated.
    pub body: String,
}

impl BundleBlock {
    pub fn from_hardened(block: &HardenedBlock) -> Self {
        Self {
            source: block.record.source.clone(),
            origin: block.record.origin,
            match_type: block.record.match_type,
            normalized_key: block.record.normalized_key.clone(),
            location: block.record.location_spec(),
            body: block.rewritten_body.clone(),
        }
    }

    fn rank(&self) -> u8 {
        match (self.match_type, self.origin) {
            (MatchType::Exact, Origin::Override) => 0,
            (MatchType::Prefix, Origin::Override) => 1,
            (MatchType::Exact, Origin::App) => 2,
            (MatchType::Prefix, Origin::App) => 3,
            (MatchType::Regex | MatchType::RegexCaseless, _) => 4,
            (MatchType::Generic, _) => 5,
        }
    }

    fn emission_order(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.normalized_key.cmp(&other.normalized_key))
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.location.cmp(&other.location))
    }
}

/// The composed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bundle {
    /// Unix seconds.
    pub generated_at: u64,
    pub manifest: Vec<ManifestEntry>,
    pub blocks: Vec<BundleBlock>,
    pub fallback_name: String,
    /// Set on a stub written when no valid bundle could be activated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

impl Bundle {
    pub fn new(
        generated_at: u64,
        mut manifest: Vec<ManifestEntry>,
        mut blocks: Vec<BundleBlock>,
        fallback_name: impl Into<String>,
    ) -> Self {
        manifest.sort_by(|a, b| (a.origin, &a.source).cmp(&(b.origin, &b.source)));
        blocks.sort_by(BundleBlock::emission_order);
        Self {
            generated_at,
            manifest,
            blocks,
            fallback_name: fallback_name.into(),
            disabled_reason: None,
        }
    }

    /// Empty bundle that keeps the include valid while routing nothing.
    pub fn disabled(generated_at: u64, reason: impl Into<String>) -> Self {
        Self {
            generated_at,
            manifest: Vec::new(),
            blocks: Vec::new(),
            fallback_name: String::new(),
            disabled_reason: Some(reason.into()),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_reason.is_some()
    }

    /// Full file contents.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Generated by proxy-composer. Do not edit; changes are overwritten.\n");
        out.push_str(&format!("# generated_at: {}\n", self.generated_at));

        if let Some(reason) = &self.disabled_reason {
            out.push_str("# status: disabled\n");
            for line in reason.lines() {
                out.push_str(&format!("# reason: {}\n", line));
            }
            return out;
        }

        out.push_str(&self.render_content());
        out
    }

    /// Everything after the timestamp. Identical inputs give identical
    /// content regardless of when they were composed.
    pub fn render_content(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# sources: {}\n", self.manifest.len()));
        for entry in &self.manifest {
            out.push_str(&format!(
                "#   {} {} mtime={} {}\n",
                entry.origin,
                entry.source,
                entry.mod_time_ms,
                entry.status.as_str()
            ));
        }

        for block in &self.blocks {
            out.push('\n');
            out.push_str(&format!("# source: {} ({})\n", block.source, block.origin));
            out.push_str(&format!("location {} {{\n", block.location));
            out.push_str(&block.body);
            out.push_str("}\n");
        }

        out.push('\n');
        out.push_str("# shared fallback for unavailable upstreams\n");
        out.push_str(&fallback_block(&self.fallback_name));
        out
    }

    /// SHA-256 of the timestamp-free content, hex encoded.
    pub fn fingerprint(&self) -> String {
        let content = match &self.disabled_reason {
            Some(reason) => format!("disabled: {}", reason),
            None => self.render_content(),
        };
        hex::encode(Sha256::digest(content.as_bytes()))
    }
}

fn fallback_block(name: &str) -> String {
    format!(
        "location @{} {{\n    default_type application/json;\n    add_header Retry-After 5 always;\n    return 503 '{{\"error\":\"upstream unavailable\"}}';\n}}\n",
        name
    )
}
