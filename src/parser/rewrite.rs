//! In-place route renaming.
//!
//! Only the pattern token of the chosen location changes; the modifier,
//! the body, comments and surrounding text are kept byte for byte.

use thiserror::Error;

use crate::fragments::FragmentSource;
use crate::parser::location::{parse_fragment, ParseOutcome, RouteRecord};
use crate::parser::normalize::MatchType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenameError {
    #[error("fragment cannot be parsed: {0}")]
    Unparsed(String),

    #[error("no route {0:?} in fragment")]
    NotFound(String),

    #[error("route {route:?} matches {count} locations in fragment")]
    Ambiguous { route: String, count: usize },

    #[error("invalid location pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },
}

/// Rewrite `source` so the route addressed by `from` uses pattern `to`.
///
/// `from` is either the location spec as emitted (`= /health`, `/api/`)
/// or the route's normalized key. Returns the new fragment text.
pub fn rename_location(source: &FragmentSource, from: &str, to: &str) -> Result<String, RenameError> {
    let parsed = match parse_fragment(source) {
        ParseOutcome::Parsed(parsed) => parsed,
        ParseOutcome::Skipped(reason) => return Err(RenameError::Unparsed(reason)),
    };

    let from = from.trim();
    let matches: Vec<&RouteRecord> = parsed
        .records
        .iter()
        .filter(|r| r.location_spec() == from || r.normalized_key == from)
        .collect();
    let record = match matches.as_slice() {
        [] => return Err(RenameError::NotFound(from.to_string())),
        [record] => *record,
        many => {
            return Err(RenameError::Ambiguous {
                route: from.to_string(),
                count: many.len(),
            })
        }
    };

    let to = to.trim();
    validate_pattern(record.match_type, to)?;

    let span = record.pattern_span.clone();
    let mut text = String::with_capacity(source.text.len() + to.len());
    text.push_str(&source.text[..span.start]);
    text.push_str(to);
    text.push_str(&source.text[span.end..]);
    Ok(text)
}

fn validate_pattern(match_type: MatchType, pattern: &str) -> Result<(), RenameError> {
    let invalid = |reason| RenameError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };
    if pattern.is_empty() {
        return Err(invalid("empty"));
    }
    if pattern
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | ';' | '"' | '\'' | '#'))
    {
        return Err(invalid("contains whitespace, quotes, braces, ';' or '#'"));
    }
    match match_type {
        MatchType::Regex | MatchType::RegexCaseless => Ok(()),
        MatchType::Exact | MatchType::Prefix | MatchType::Generic if pattern.starts_with('/') => Ok(()),
        MatchType::Exact | MatchType::Prefix | MatchType::Generic => Err(invalid("must start with '/'")),
    }
}
