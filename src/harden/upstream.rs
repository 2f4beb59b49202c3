//! Upstream hardening.
//!
//! # Rewrite
//! ```text
//! location /api/ {                      location /api/ {
//!     proxy_pass http://api:3000/;  →       resolver 127.0.0.11 valid=10s ipv6=off;
//! }                                         set $upstream_api_3000_1a2b3c4d api:3000;
//!                                           proxy_pass http://$upstream_api_3000_1a2b3c4d/;
//!                                           proxy_intercept_errors on;
//!                                           error_page 502 503 504 = @devproxy_fallback;
//!                                       }
//! ```
//!
//! # Design Decisions
//! - Going through a variable makes nginx resolve the name per request, so
//!   a backend that is down at reload time does not fail the whole config
//! - The URI part of `proxy_pass` (including a trailing slash, or its
//!   absence) is copied verbatim; it controls path stripping
//! - A body that already has a resolver and assigns the variable its
//!   proxy_pass uses is left untouched, which makes hardening idempotent
//! - Bodies that declare their own error handling keep it

use serde::Serialize;
use std::fmt;

use crate::config::HardeningConfig;
use crate::harden::naming::variable_name;
use crate::parser::normalize::UpstreamOrigin;
use crate::parser::{Directive, RouteRecord};

/// Why a block went out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HardenNote {
    /// Resolver and indirection were already in place.
    AlreadyHardened,
    /// Nothing to resolve; block emitted as authored.
    NoUpstream,
    /// The body handles backend errors itself.
    OwnErrorHandling,
}

impl fmt::Display for HardenNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardenNote::AlreadyHardened => write!(f, "already hardened"),
            HardenNote::NoUpstream => write!(f, "not hardened: no upstream detected"),
            HardenNote::OwnErrorHandling => write!(f, "kept fragment's own error handling"),
        }
    }
}

/// A winner ready to be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardenedBlock {
    pub record: RouteRecord,
    /// Body text as it will appear between the braces.
    pub rewritten_body: String,
    pub variable_name: Option<String>,
    pub has_resolver: bool,
    pub has_error_handler: bool,
    /// The block routes errors to the shared fallback location.
    pub uses_fallback: bool,
    pub notes: Vec<HardenNote>,
}

impl HardenedBlock {
    pub fn is_hardened(&self) -> bool {
        !self.notes.contains(&HardenNote::NoUpstream)
    }
}

const INDENT: &str = "    ";

/// Harden one winner.
pub fn harden(record: &RouteRecord, settings: &HardeningConfig) -> HardenedBlock {
    let body = &record.body;
    let has_resolver = body.has_resolver();
    let has_error_handler = body.has_error_handling();

    let Some(upstream) = record.upstream.as_ref() else {
        tracing::warn!(
            source = %record.source,
            location = %record.location_spec(),
            "Not hardened: no upstream detected"
        );
        return passthrough(record, None, has_resolver, has_error_handler, HardenNote::NoUpstream);
    };

    let existing = upstream
        .variable
        .as_deref()
        .filter(|v| body.assignment(v).is_some());

    if has_resolver {
        if let Some(var) = existing {
            return passthrough(
                record,
                Some(var.to_string()),
                true,
                has_error_handler,
                HardenNote::AlreadyHardened,
            );
        }
    }

    let variable = existing
        .map(str::to_string)
        .unwrap_or_else(|| variable_name(record, upstream));

    let mut directives = Vec::with_capacity(body.directives.len() + 4);
    if !has_resolver {
        directives.push(Directive::Resolver {
            args: format!(
                "{} valid={}s ipv6=off",
                settings.resolver, settings.resolver_valid_secs
            ),
        });
    }
    if existing.is_none() {
        directives.push(Directive::SetVar {
            name: variable.clone(),
            value: upstream.authority(),
        });
    }

    let mut rewritten = false;
    for directive in &body.directives {
        match directive {
            Directive::ProxyPass { .. } if !rewritten && upstream.origin == UpstreamOrigin::ProxyPass => {
                let scheme = upstream.scheme.as_deref().unwrap_or("http");
                directives.push(Directive::ProxyPass {
                    target: format!("{}://${}{}", scheme, variable, upstream.uri),
                });
                rewritten = true;
            }
            other => directives.push(other.clone()),
        }
    }

    let mut notes = Vec::new();
    let uses_fallback = !has_error_handler;
    if uses_fallback {
        directives.push(Directive::InterceptErrors { enabled: true });
        directives.push(Directive::ErrorPage {
            args: format!("{} = @{}", join_codes(&settings.error_codes), settings.fallback_name),
        });
    } else {
        notes.push(HardenNote::OwnErrorHandling);
    }

    let hardened_body = crate::parser::LocationBody { directives };
    tracing::debug!(
        source = %record.source,
        location = %record.location_spec(),
        variable = %variable,
        upstream = %upstream.authority(),
        "Route hardened"
    );

    HardenedBlock {
        record: record.clone(),
        rewritten_body: hardened_body.render(INDENT),
        variable_name: Some(variable),
        has_resolver: true,
        has_error_handler: true,
        uses_fallback,
        notes,
    }
}

fn passthrough(
    record: &RouteRecord,
    variable_name: Option<String>,
    has_resolver: bool,
    has_error_handler: bool,
    note: HardenNote,
) -> HardenedBlock {
    HardenedBlock {
        record: record.clone(),
        rewritten_body: reindent(&record.body_text),
        variable_name,
        has_resolver,
        has_error_handler,
        uses_fallback: false,
        notes: vec![note],
    }
}

/// Body text as authored, with surrounding blank lines removed and the
/// common indentation normalized to one level.
fn reindent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(start), Some(end)) = (start, end) else {
        return String::new();
    };
    let lines = &lines[start..=end];

    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out = String::new();
    for line in lines {
        let line = line.trim_end();
        if line.trim().is_empty() {
            out.push('\n');
            continue;
        }
        out.push_str(INDENT);
        out.push_str(line.get(common..).unwrap_or(line.trim_start()));
        out.push('\n');
    }
    out
}

fn join_codes(codes: &[u16]) -> String {
    codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragments::{FragmentSource, Origin};
    use crate::parser::{parse_fragment, ParseOutcome};

    fn record(body: &str) -> RouteRecord {
        let text = format!("location /api/ {{\n{}\n}}", body);
        match parse_fragment(&FragmentSource::new("apps/a.conf", Origin::App, text, 1)) {
            ParseOutcome::Parsed(mut p) => p.records.remove(0),
            ParseOutcome::Skipped(r) => panic!("{}", r),
        }
    }

    /// Re-parse a hardened block as if it had been written by hand.
    fn reparse(block: &HardenedBlock) -> RouteRecord {
        record(&block.rewritten_body)
    }

    fn settings() -> HardeningConfig {
        HardeningConfig::default()
    }

    #[test]
    fn test_literal_upstream_rewritten() {
        let r = record("    proxy_pass http://api:3000/;\n    proxy_set_header Host $host;");
        let block = harden(&r, &settings());
        let var = block.variable_name.clone().unwrap();

        assert_eq!(
            block.rewritten_body,
            format!(
                "    resolver 127.0.0.11 valid=10s ipv6=off;\n    set ${var} api:3000;\n    proxy_pass http://${var}/;\n    proxy_set_header Host $host;\n    proxy_intercept_errors on;\n    error_page 502 503 504 = @devproxy_fallback;\n",
                var = var
            )
        );
        assert!(block.has_resolver);
        assert!(block.has_error_handler);
        assert!(block.uses_fallback);
        assert!(block.is_hardened());
    }

    #[test]
    fn test_trailing_slash_preserved_exactly() {
        let with = harden(&record("proxy_pass http://api:3000/;"), &settings());
        let without = harden(&record("proxy_pass http://api:3000;"), &settings());
        let path = harden(&record("proxy_pass https://api:3000/v2;"), &settings());

        assert!(with.rewritten_body.contains(&format!("proxy_pass http://${}/;", with.variable_name.unwrap())));
        assert!(without.rewritten_body.contains(&format!("proxy_pass http://${};", without.variable_name.unwrap())));
        assert!(path.rewritten_body.contains(&format!("proxy_pass https://${}/v2;", path.variable_name.unwrap())));
    }

    #[test]
    fn test_ipv6_literal_upstream_rewritten() {
        let block = harden(&record("proxy_pass http://[::1]:8080/;"), &settings());
        let var = block.variable_name.clone().unwrap();
        assert!(var.starts_with("upstream_"));
        assert!(var.contains("_8080_"));
        assert!(block.rewritten_body.contains(&format!("set ${} [::1]:8080;", var)));
        assert!(block.rewritten_body.contains(&format!("proxy_pass http://${}/;", var)));
    }

    #[test]
    fn test_hardening_is_idempotent() {
        let once = harden(&record("proxy_pass http://api:3000/;"), &settings());
        let twice = harden(&reparse(&once), &settings());
        let thrice = harden(&reparse(&twice), &settings());

        assert_eq!(twice.rewritten_body, once.rewritten_body);
        assert_eq!(thrice.rewritten_body, once.rewritten_body);
        assert_eq!(twice.variable_name, once.variable_name);
        assert_eq!(twice.notes, vec![HardenNote::AlreadyHardened]);
    }

    #[test]
    fn test_existing_indirection_only_gains_resolver() {
        let r = record("set $api api:3000;\nproxy_pass http://$api;");
        let block = harden(&r, &settings());
        assert_eq!(block.variable_name.as_deref(), Some("api"));
        assert_eq!(block.rewritten_body.matches("set $").count(), 1);
        assert!(block.rewritten_body.starts_with("    resolver "));
        assert!(block.rewritten_body.contains("proxy_pass http://$api;"));
    }

    #[test]
    fn test_own_error_handling_kept() {
        let r = record("proxy_pass http://api:3000;\nerror_page 502 /502.html;");
        let block = harden(&r, &settings());
        assert!(!block.uses_fallback);
        assert_eq!(block.rewritten_body.matches("error_page").count(), 1);
        assert!(!block.rewritten_body.contains("proxy_intercept_errors"));
        assert_eq!(block.notes, vec![HardenNote::OwnErrorHandling]);
    }

    #[test]
    fn test_no_upstream_passes_through() {
        let r = record("        root /srv/static;\n        try_files $uri =404;");
        let block = harden(&r, &settings());
        assert_eq!(block.rewritten_body, "    root /srv/static;\n    try_files $uri =404;\n");
        assert_eq!(block.notes, vec![HardenNote::NoUpstream]);
        assert!(!block.is_hardened());
        assert!(block.variable_name.is_none());
        assert_eq!(HardenNote::NoUpstream.to_string(), "not hardened: no upstream detected");
    }

    #[test]
    fn test_custom_settings() {
        let custom = HardeningConfig {
            resolver: "10.0.0.2".into(),
            resolver_valid_secs: 30,
            fallback_name: "down".into(),
            error_codes: vec![502],
        };
        let block = harden(&record("proxy_pass http://api:3000;"), &custom);
        assert!(block.rewritten_body.contains("resolver 10.0.0.2 valid=30s ipv6=off;"));
        assert!(block.rewritten_body.contains("error_page 502 = @down;"));
    }
}
