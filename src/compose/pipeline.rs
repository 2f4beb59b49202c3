//! The pure composition pass: snapshot in, bundle and diagnostics out.
//!
//! # Data Flow
//! ```text
//! SourceSnapshot + DecisionSet
//!     → parse every fragment (skips recorded, never fatal)
//!     → resolve conflicts (losers recorded, decisions carried forward)
//!     → reserved guard (blocked recorded)
//!     → harden winners
//!     → Bundle + Diagnostics + next decision map
//! ```
//!
//! Nothing here touches the filesystem or the clock; `now` is passed in so
//! the same inputs always compose the same bundle.

use std::collections::{BTreeMap, BTreeSet};

use crate::compose::bundle::{Bundle, BundleBlock, ManifestEntry, ManifestStatus};
use crate::compose::diagnostics::{Diagnostics, IncludedEntry, SkipReason};
use crate::config::{ComposerConfig, HardeningConfig};
use crate::fragments::{SourceId, SourceSnapshot};
use crate::harden::harden;
use crate::parser::{parse_fragment, ParseOutcome, RouteRecord};
use crate::resolver::{guard, resolve, DecisionSet, ReservedPaths, ResolutionDecision, RouteGroup};

/// Inputs to composition that come from configuration.
#[derive(Debug, Clone)]
pub struct ComposeSettings {
    pub hardening: HardeningConfig,
    pub reserved: ReservedPaths,
}

impl ComposeSettings {
    pub fn from_config(config: &ComposerConfig) -> Self {
        Self {
            hardening: config.hardening.clone(),
            reserved: ReservedPaths::from_config(config),
        }
    }
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self::from_config(&ComposerConfig::default())
    }
}

/// Result of one composition pass.
#[derive(Debug, Clone)]
pub struct Composition {
    pub bundle: Bundle,
    pub diagnostics: Diagnostics,
    /// Decisions for every lane that conflicted this run. Lanes that no
    /// longer conflict are absent.
    pub decisions: BTreeMap<String, ResolutionDecision>,
    pub groups: Vec<RouteGroup>,
}

impl Composition {
    /// Number of fragments that could not be parsed.
    pub fn unparsed_count(&self) -> usize {
        self.diagnostics.unparsed().count()
    }

    pub fn blocked_count(&self) -> usize {
        self.diagnostics.blocked().count()
    }
}

/// Compose a bundle from one snapshot.
///
/// `now` is Unix seconds; it stamps the bundle header and new decisions.
pub fn compose(
    snapshot: &SourceSnapshot,
    previous: &DecisionSet,
    settings: &ComposeSettings,
    now: u64,
) -> Composition {
    let mut diagnostics = Diagnostics::default();
    let mut records: Vec<RouteRecord> = Vec::new();
    let mut unparsed: BTreeSet<SourceId> = BTreeSet::new();

    for source in snapshot.iter() {
        match parse_fragment(source) {
            ParseOutcome::Parsed(parsed) => {
                for warning in &parsed.warnings {
                    diagnostics.warnings.push(format!("{}: {}", source.id, warning));
                }
                for record in &parsed.records {
                    for warning in &record.warnings {
                        diagnostics.warnings.push(format!("{}: {}", source.id, warning));
                    }
                }
                records.extend(parsed.records);
            }
            ParseOutcome::Skipped(reason) => {
                diagnostics.skip(&source.id, None, &SkipReason::Unparsed(reason));
                unparsed.insert(source.id.clone());
            }
        }
    }

    let resolution = resolve(records, previous, now);
    for (record, reason) in &resolution.losers {
        diagnostics.skip(&record.source, Some(record.location_spec()), reason);
    }
    diagnostics.conflicts = resolution.conflicts;

    let guarded = guard(resolution.winners, &settings.reserved);
    for record in &guarded.blocked {
        diagnostics.skip(
            &record.source,
            Some(record.location_spec()),
            &SkipReason::ReservedPath,
        );
    }

    let mut blocks = Vec::with_capacity(guarded.allowed.len());
    let mut included: BTreeSet<SourceId> = BTreeSet::new();
    for record in &guarded.allowed {
        let hardened = harden(record, &settings.hardening);
        diagnostics.included.push(IncludedEntry {
            source: record.source.clone(),
            origin: record.origin,
            location: record.location_spec(),
            normalized_key: record.normalized_key.clone(),
            upstream: record.upstream.as_ref().map(|u| u.logical()),
            variable: hardened.variable_name.clone(),
            hardened: hardened.is_hardened(),
            notes: hardened.notes.iter().map(ToString::to_string).collect(),
        });
        included.insert(record.source.clone());
        blocks.push(BundleBlock::from_hardened(&hardened));
    }

    let manifest = snapshot
        .iter()
        .map(|source| ManifestEntry {
            source: source.id.clone(),
            origin: source.origin,
            mod_time_ms: source.mod_time_ms,
            status: if unparsed.contains(&source.id) {
                ManifestStatus::Unparsed
            } else if included.contains(&source.id) {
                ManifestStatus::Included
            } else {
                ManifestStatus::Excluded
            },
        })
        .collect();

    let bundle = Bundle::new(now, manifest, blocks, settings.hardening.fallback_name.clone());
    diagnostics
        .included
        .sort_by(|a, b| (&a.normalized_key, &a.location, &a.source).cmp(&(&b.normalized_key, &b.location, &b.source)));
    diagnostics.sort();

    tracing::debug!(
        sources = snapshot.len(),
        blocks = bundle.blocks.len(),
        conflicts = diagnostics.conflicts.len(),
        skipped = diagnostics.skipped.len(),
        "Composition finished"
    );

    Composition {
        bundle,
        diagnostics,
        decisions: resolution.decisions,
        groups: resolution.groups,
    }
}
