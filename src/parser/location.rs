//! Top-level location scanning.
//!
//! # Responsibilities
//! - Find `location` blocks at the top level of a fragment
//! - Match balanced braces and classify the match modifier
//! - Build one `RouteRecord` per block with its normalized key and upstream
//!
//! # Design Decisions
//! - A fragment either parses completely or is skipped as a whole; a broken
//!   fragment never contributes a partial route set
//! - Skips are values (`ParseOutcome::Skipped`), not errors, so one bad
//!   fragment never aborts the run
//! - Named locations are dropped with a warning; the composer owns the
//!   only named location in the bundle

use serde::Serialize;
use std::fmt;
use std::ops::Range;

use crate::fragments::{FragmentSource, Origin, SourceId};
use crate::parser::body::{BodyError, LocationBody};
use crate::parser::lexer::{tokenize, Token, TokenKind};
use crate::parser::normalize::{extract_upstream, normalized_key, MatchType, UpstreamSpec};

/// One location block extracted from a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub source: SourceId,
    pub origin: Origin,
    pub mod_time_ms: u64,
    pub match_type: MatchType,
    /// Pattern exactly as authored (minus surrounding whitespace).
    pub pattern: String,
    /// Byte range of the pattern within the fragment text.
    pub pattern_span: Range<usize>,
    pub normalized_key: String,
    /// Raw text between the braces.
    pub body_text: String,
    pub body: LocationBody,
    pub upstream: Option<UpstreamSpec>,
    /// Line the `location` keyword is on.
    pub line: usize,
    pub warnings: Vec<ParseWarning>,
}

impl RouteRecord {
    /// `= /x`, `^~ /x`, `/x` ...: the location line as it will be emitted.
    pub fn location_spec(&self) -> String {
        match self.match_type.modifier() {
            Some(m) => format!("{} {}", m, self.pattern),
            None => self.pattern.clone(),
        }
    }
}

/// Non-fatal observations made while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// More than one distinct upstream in one block; the proxy_pass one is used.
    MultipleUpstreams { line: usize, count: usize },
    /// A top-level statement or block that is not a location.
    IgnoredTopLevel { line: usize, directive: String },
    /// `location @name` blocks are not carried into the bundle.
    NamedLocation { line: usize, name: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MultipleUpstreams { line, count } => write!(
                f,
                "line {}: {} upstream candidates, using the proxy_pass target",
                line, count
            ),
            ParseWarning::IgnoredTopLevel { line, directive } => {
                write!(f, "line {}: ignored top-level `{}`", line, directive)
            }
            ParseWarning::NamedLocation { line, name } => {
                write!(f, "line {}: named location {} ignored", line, name)
            }
        }
    }
}

/// Successfully parsed fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFragment {
    pub records: Vec<RouteRecord>,
    /// Warnings not tied to an emitted record.
    pub warnings: Vec<ParseWarning>,
}

/// Outcome of parsing one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(ParsedFragment),
    /// The whole fragment is unusable; carries the human-readable reason.
    Skipped(String),
}

/// Parse every top-level location in a fragment.
pub fn parse_fragment(source: &FragmentSource) -> ParseOutcome {
    match scan(source) {
        Ok(parsed) => ParseOutcome::Parsed(parsed),
        Err(reason) => {
            tracing::warn!(source = %source.id, reason = %reason, "Fragment unparsed");
            ParseOutcome::Skipped(reason)
        }
    }
}

fn scan(source: &FragmentSource) -> Result<ParsedFragment, String> {
    let text = source.text.as_str();
    let tokens = tokenize(text).map_err(|e| e.to_string())?;
    let mut parsed = ParsedFragment::default();

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        match &token.kind {
            TokenKind::Comment | TokenKind::Semicolon => {
                i += 1;
            }
            TokenKind::Close => return Err(format!("unbalanced '}}' at line {}", token.line)),
            TokenKind::Open => return Err(format!("block without a name at line {}", token.line)),
            TokenKind::Word(word) if word == "location" => {
                let (record, next) = scan_location(source, &tokens, i)?;
                match record {
                    Located::Route(record) => parsed.records.push(record),
                    Located::Named(name) => {
                        tracing::warn!(source = %source.id, line = token.line, name = %name, "Named location ignored");
                        parsed.warnings.push(ParseWarning::NamedLocation {
                            line: token.line,
                            name,
                        });
                    }
                }
                i = next;
            }
            TokenKind::Word(word) => {
                let next = skip_statement(&tokens, i)?;
                tracing::debug!(source = %source.id, line = token.line, directive = %word, "Ignoring top-level directive");
                parsed.warnings.push(ParseWarning::IgnoredTopLevel {
                    line: token.line,
                    directive: word.clone(),
                });
                i = next;
            }
        }
    }

    Ok(parsed)
}

enum Located {
    Route(RouteRecord),
    Named(String),
}

/// Parse the location starting at `tokens[at]`; returns the index after it.
fn scan_location(
    source: &FragmentSource,
    tokens: &[Token],
    at: usize,
) -> Result<(Located, usize), String> {
    let keyword = &tokens[at];
    let mut args = Vec::new();
    let mut j = at + 1;
    loop {
        match tokens.get(j).map(|t| &t.kind) {
            Some(TokenKind::Word(w)) => args.push((w.as_str(), j)),
            Some(TokenKind::Comment) => {}
            Some(TokenKind::Open) => break,
            _ => {
                return Err(format!(
                    "location at line {} has no opening '{{'",
                    keyword.line
                ))
            }
        }
        j += 1;
    }
    let open = j;
    let close = matching_close(tokens, open)
        .ok_or_else(|| format!("unterminated block opened at line {}", tokens[open].line))?;

    let (modifier, (pattern, pattern_at)) = match args.as_slice() {
        [pattern] => (None, *pattern),
        [(modifier, _), pattern] => (Some(*modifier), *pattern),
        _ => {
            return Err(format!(
                "location at line {} must have a path and at most one modifier",
                keyword.line
            ))
        }
    };

    if modifier.is_none() && pattern.starts_with('@') {
        return Ok((Located::Named(pattern.to_string()), close + 1));
    }

    let match_type = MatchType::from_modifier(modifier).ok_or_else(|| {
        format!(
            "unknown location modifier {:?} at line {}",
            modifier.unwrap_or_default(),
            keyword.line
        )
    })?;

    let body_text = &source.text[tokens[open].end..tokens[close].start];
    let body = LocationBody::parse(body_text, tokens[open].line).map_err(|e| match e {
        BodyError::NestedLocation { .. } => e.to_string(),
        other => format!("in location at line {}: {}", keyword.line, other),
    })?;

    let scan = extract_upstream(&body);
    let mut warnings = Vec::new();
    if scan.candidates > 1 {
        tracing::warn!(
            source = %source.id,
            line = keyword.line,
            count = scan.candidates,
            "Multiple upstream candidates in one location"
        );
        warnings.push(ParseWarning::MultipleUpstreams {
            line: keyword.line,
            count: scan.candidates,
        });
    }

    let pattern = pattern.trim().to_string();
    let record = RouteRecord {
        source: source.id.clone(),
        origin: source.origin,
        mod_time_ms: source.mod_time_ms,
        match_type,
        normalized_key: normalized_key(match_type, &pattern),
        pattern,
        pattern_span: tokens[pattern_at].start..tokens[pattern_at].end,
        body_text: body_text.to_string(),
        body,
        upstream: scan.upstream,
        line: keyword.line,
        warnings,
    };

    Ok((Located::Route(record), close + 1))
}

fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Skip a top-level statement or block; returns the index after it.
fn skip_statement(tokens: &[Token], at: usize) -> Result<usize, String> {
    let line = tokens[at].line;
    for (idx, token) in tokens.iter().enumerate().skip(at) {
        match token.kind {
            TokenKind::Semicolon => return Ok(idx + 1),
            TokenKind::Open => {
                let close = matching_close(tokens, idx)
                    .ok_or_else(|| format!("unterminated block opened at line {}", token.line))?;
                return Ok(close + 1);
            }
            TokenKind::Close => return Err(format!("unbalanced '}}' at line {}", token.line)),
            _ => {}
        }
    }
    Err(format!("unterminated statement at line {}", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str) -> FragmentSource {
        FragmentSource::new("apps/test.conf", Origin::App, text, 100)
    }

    fn parsed(text: &str) -> ParsedFragment {
        match parse_fragment(&fragment(text)) {
            ParseOutcome::Parsed(p) => p,
            ParseOutcome::Skipped(reason) => panic!("unexpectedly skipped: {}", reason),
        }
    }

    fn skipped(text: &str) -> String {
        match parse_fragment(&fragment(text)) {
            ParseOutcome::Skipped(reason) => reason,
            ParseOutcome::Parsed(p) => panic!("unexpectedly parsed: {:?}", p),
        }
    }

    #[test]
    fn test_classifies_modifiers() {
        let p = parsed(
            r#"
            location = /x { proxy_pass http://a:1; }
            location ^~ /static/ { root /srv; }
            location ~ ^/img/ { proxy_pass http://img:2; }
            location ~* \.png$ { expires 1d; }
            location /api/ { proxy_pass http://api:3000/; }
            "#,
        );
        let types: Vec<_> = p.records.iter().map(|r| r.match_type).collect();
        assert_eq!(
            types,
            vec![
                MatchType::Exact,
                MatchType::Prefix,
                MatchType::Regex,
                MatchType::RegexCaseless,
                MatchType::Generic,
            ]
        );
        assert_eq!(p.records[0].normalized_key, "/x");
        assert_eq!(p.records[1].normalized_key, "/static");
        assert_eq!(p.records[4].pattern, "/api/");
        assert_eq!(p.records[4].upstream.as_ref().unwrap().authority(), "api:3000");
        assert_eq!(p.records[4].line, 6);
        assert!(p.records[1].upstream.is_none());
    }

    #[test]
    fn test_records_carry_source_metadata() {
        let p = parsed("location /a/ { proxy_pass http://a:1; }");
        let r = &p.records[0];
        assert_eq!(r.source.as_str(), "apps/test.conf");
        assert_eq!(r.origin, Origin::App);
        assert_eq!(r.mod_time_ms, 100);
        assert_eq!(r.body_text.trim(), "proxy_pass http://a:1;");
        assert_eq!(r.location_spec(), "/a/");
        assert_eq!(r.pattern_span, 9..12);

        let text = "# api\nlocation ^~  /static/ { root /srv; }";
        let p = parsed(text);
        assert_eq!(&text[p.records[0].pattern_span.clone()], "/static/");
    }

    #[test]
    fn test_unterminated_brace_skips_fragment() {
        let reason = skipped("location /ok/ { proxy_pass http://a:1; }\nlocation /bad/ {\n proxy_pass http://b:2;\n");
        assert_eq!(reason, "unterminated block opened at line 2");
    }

    #[test]
    fn test_stray_close_skips_fragment() {
        assert_eq!(skipped("location /a/ { }\n}"), "unbalanced '}' at line 2");
    }

    #[test]
    fn test_nested_location_skips_fragment() {
        let reason = skipped("location /a/ {\n  location /a/b/ { }\n}");
        assert_eq!(reason, "nested location at line 2 is not supported");
    }

    #[test]
    fn test_bad_modifier_skips_fragment() {
        assert!(skipped("location !! /a/ { }").contains("unknown location modifier"));
        assert!(skipped("location { }").contains("must have a path"));
    }

    #[test]
    fn test_ignores_other_top_level_content() {
        let p = parsed(
            "# app fragment\nupstream pool { server a:1; }\nclient_max_body_size 1m;\nlocation /a/ { proxy_pass http://pool; }",
        );
        assert_eq!(p.records.len(), 1);
        assert_eq!(
            p.warnings,
            vec![
                ParseWarning::IgnoredTopLevel { line: 2, directive: "upstream".into() },
                ParseWarning::IgnoredTopLevel { line: 3, directive: "client_max_body_size".into() },
            ]
        );
    }

    #[test]
    fn test_named_locations_dropped() {
        let p = parsed("location @custom { return 503; }\nlocation /a/ { }");
        assert_eq!(p.records.len(), 1);
        assert_eq!(
            p.warnings,
            vec![ParseWarning::NamedLocation { line: 1, name: "@custom".into() }]
        );
    }

    #[test]
    fn test_multiple_upstreams_warns() {
        let p = parsed("location /a/ {\n set $alt b:2;\n proxy_pass http://a:1;\n}");
        let r = &p.records[0];
        assert_eq!(r.upstream.as_ref().unwrap().host, "a");
        assert_eq!(r.warnings, vec![ParseWarning::MultipleUpstreams { line: 1, count: 2 }]);
    }

    #[test]
    fn test_empty_fragment() {
        assert!(parsed("# nothing here\n").records.is_empty());
    }
}
