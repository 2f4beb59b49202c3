//! Diagnostics document.
//!
//! Companion to the bundle: which routes went in, which were left out and
//! why, and every conflict the resolver settled.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fragments::{Origin, SourceId};
use crate::resolver::decisions::Strategy;

/// Why a route (or a whole fragment) is not in the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The fragment could not be parsed.
    Unparsed(String),
    /// Lost a conflict to another fragment of the same rank.
    LostTo(SourceId),
    /// Lost a conflict to an override fragment.
    LostToOverride,
    /// The same fragment declared the route more than once.
    DuplicateInFragment { first_line: usize },
    /// Claimed a reserved path.
    ReservedPath,
}

impl SkipReason {
    pub fn kind(&self) -> SkipKind {
        match self {
            SkipReason::Unparsed(_) => SkipKind::Unparsed,
            SkipReason::LostTo(_) | SkipReason::LostToOverride => SkipKind::Conflict,
            SkipReason::DuplicateInFragment { .. } => SkipKind::Duplicate,
            SkipReason::ReservedPath => SkipKind::Blocked,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unparsed(detail) => write!(f, "unparsed: {}", detail),
            SkipReason::LostTo(winner) => write!(f, "conflict: lost to {}", winner.file_name()),
            SkipReason::LostToOverride => write!(f, "conflict: lost to override"),
            SkipReason::DuplicateInFragment { first_line } => {
                write!(f, "duplicate: already declared at line {}", first_line)
            }
            SkipReason::ReservedPath => write!(f, "blocked: reserved path"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    Unparsed,
    Conflict,
    Duplicate,
    Blocked,
}

/// A route that made it into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedEntry {
    pub source: SourceId,
    pub origin: Origin,
    /// Location spec as emitted (`= /x`, `/api/` ...).
    pub location: String,
    pub normalized_key: String,
    pub upstream: Option<String>,
    pub variable: Option<String>,
    pub hardened: bool,
    pub notes: Vec<String>,
}

/// A route or fragment left out of the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub source: SourceId,
    /// `None` when the whole fragment was skipped.
    pub location: Option<String>,
    pub kind: SkipKind,
    pub reason: String,
}

/// One settled conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Lane key (`= /x` for exact routes, the normalized key otherwise).
    pub normalized_key: String,
    pub winner: SourceId,
    pub losers: Vec<SourceId>,
    pub strategy: Strategy,
    /// Human-readable explanation.
    pub reason: String,
    /// The winner came from a stored decision.
    pub reused: bool,
    /// Every candidate pointed at the same logical upstream.
    pub same_upstream: bool,
}

/// Activation result attached after the validate step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationNote {
    pub state: String,
    pub detail: Option<String>,
}

/// The full diagnostics document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub included: Vec<IncludedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub conflicts: Vec<ConflictReport>,
    /// Non-fatal parser observations, one line each.
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationNote>,
}

impl Diagnostics {
    pub fn skip(&mut self, source: &SourceId, location: Option<String>, reason: &SkipReason) {
        self.skipped.push(SkippedEntry {
            source: source.clone(),
            location,
            kind: reason.kind(),
            reason: reason.to_string(),
        });
    }

    /// Skipped entries for one source.
    pub fn skipped_for<'a>(&'a self, source: &'a SourceId) -> impl Iterator<Item = &'a SkippedEntry> + 'a {
        self.skipped.iter().filter(move |s| &s.source == source)
    }

    pub fn blocked(&self) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped.iter().filter(|s| s.kind == SkipKind::Blocked)
    }

    pub fn unparsed(&self) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped.iter().filter(|s| s.kind == SkipKind::Unparsed)
    }

    /// Deterministic ordering independent of input order.
    pub fn sort(&mut self) {
        self.skipped.sort_by(|a, b| {
            (&a.source, &a.location, &a.reason).cmp(&(&b.source, &b.location, &b.reason))
        });
        self.conflicts
            .sort_by(|a, b| a.normalized_key.cmp(&b.normalized_key));
        self.warnings.sort();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wording() {
        assert_eq!(
            SkipReason::LostTo(SourceId::new("/srv/apps/b.conf")).to_string(),
            "conflict: lost to b.conf"
        );
        assert_eq!(SkipReason::LostToOverride.to_string(), "conflict: lost to override");
        assert_eq!(SkipReason::ReservedPath.to_string(), "blocked: reserved path");
        assert_eq!(
            SkipReason::Unparsed("unterminated block opened at line 3".into()).to_string(),
            "unparsed: unterminated block opened at line 3"
        );
    }

    #[test]
    fn test_sort_is_stable_across_input_order() {
        let a = SourceId::new("a.conf");
        let b = SourceId::new("b.conf");
        let mut one = Diagnostics::default();
        one.skip(&b, None, &SkipReason::ReservedPath);
        one.skip(&a, Some("/x".into()), &SkipReason::LostToOverride);
        let mut two = Diagnostics::default();
        two.skip(&a, Some("/x".into()), &SkipReason::LostToOverride);
        two.skip(&b, None, &SkipReason::ReservedPath);
        one.sort();
        two.sort();
        assert_eq!(one, two);
        assert_eq!(one.blocked().count(), 1);
    }
}
