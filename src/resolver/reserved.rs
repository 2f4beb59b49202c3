//! Reserved-path guard.
//!
//! The root path and the proxy's own control-plane prefixes belong to the
//! static core configuration. No fragment, override or not, may claim them.

use crate::config::ComposerConfig;
use crate::parser::{MatchType, RouteRecord};

/// Regex metacharacters that end the literal prefix of a pattern.
const REGEX_META: &[char] = &['.', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\', '$'];

/// The reserved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedPaths {
    /// Canonical prefixes without trailing slash.
    prefixes: Vec<String>,
}

impl ReservedPaths {
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Self {
        let mut prefixes: Vec<String> = prefixes
            .iter()
            .map(|p| p.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort();
        prefixes.dedup();
        Self { prefixes }
    }

    /// Configured prefixes plus the admin API base path, which stays
    /// reserved even when it lies outside every configured prefix.
    pub fn from_config(config: &ComposerConfig) -> Self {
        let mut prefixes = config.reserved.prefixes.clone();
        prefixes.push(config.admin.base_path.clone());
        Self::new(prefixes.as_slice())
    }

    /// True if the route collides with the reserved namespace.
    pub fn is_reserved(&self, record: &RouteRecord) -> bool {
        match record.match_type {
            MatchType::Regex | MatchType::RegexCaseless => self.regex_is_reserved(&record.pattern),
            MatchType::Exact => {
                let trimmed = record.pattern.trim_end_matches('/');
                self.path_is_reserved(if trimmed.is_empty() { "/" } else { trimmed })
            }
            MatchType::Prefix | MatchType::Generic => self.path_is_reserved(&record.normalized_key),
        }
    }

    fn path_is_reserved(&self, path: &str) -> bool {
        if path == "/" {
            return true;
        }
        self.prefixes.iter().any(|p| {
            path == p
                || path
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Anchored regexes whose literal head is the root alone or lies inside
    /// a reserved prefix.
    fn regex_is_reserved(&self, pattern: &str) -> bool {
        let Some(anchored) = pattern.strip_prefix('^') else {
            return false;
        };
        let head_len = anchored.find(REGEX_META).unwrap_or(anchored.len());
        let (head, tail) = anchored.split_at(head_len);

        if head == "/" && matches!(tail, "$" | "?$" | "") {
            return true;
        }
        let head = head.trim_end_matches('/');
        !head.is_empty() && head != "/" && self.path_is_reserved(head)
    }
}

/// Winners split by the guard.
#[derive(Debug, Clone, Default)]
pub struct GuardOutcome {
    pub allowed: Vec<RouteRecord>,
    pub blocked: Vec<RouteRecord>,
}

/// Remove every winner that claims a reserved path.
pub fn guard(winners: Vec<RouteRecord>, reserved: &ReservedPaths) -> GuardOutcome {
    let mut outcome = GuardOutcome::default();
    for record in winners {
        if reserved.is_reserved(&record) {
            tracing::warn!(
                source = %record.source,
                origin = %record.origin,
                location = %record.location_spec(),
                "Blocked route claiming a reserved path"
            );
            outcome.blocked.push(record);
        } else {
            outcome.allowed.push(record);
        }
    }
    outcome
}
