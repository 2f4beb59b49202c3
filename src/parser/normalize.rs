//! Route normalization: grouping keys and upstream extraction.
//!
//! # Design Decisions
//! - Trailing slashes are canonicalized for prefix matches only; an exact
//!   match keeps its literal pattern because `/x` and `/x/` are different
//!   exact routes
//! - Regex keys carry their operator so they never collide with path keys
//! - The logical upstream (`host:port`) is for grouping and reporting; the
//!   hardener always works from the authored spelling

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parser::body::{Directive, LocationBody};

/// How a location matches request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// `location = /path`
    Exact,
    /// `location ^~ /path`
    Prefix,
    /// `location ~ pattern`
    Regex,
    /// `location ~* pattern`
    RegexCaseless,
    /// `location /path`
    Generic,
}

impl MatchType {
    /// Classify the modifier token preceding the pattern.
    pub fn from_modifier(modifier: Option<&str>) -> Option<Self> {
        match modifier {
            None => Some(MatchType::Generic),
            Some("=") => Some(MatchType::Exact),
            Some("^~") => Some(MatchType::Prefix),
            Some("~") => Some(MatchType::Regex),
            Some("~*") => Some(MatchType::RegexCaseless),
            Some(_) => None,
        }
    }

    pub fn modifier(self) -> Option<&'static str> {
        match self {
            MatchType::Exact => Some("="),
            MatchType::Prefix => Some("^~"),
            MatchType::Regex => Some("~"),
            MatchType::RegexCaseless => Some("~*"),
            MatchType::Generic => None,
        }
    }

    pub fn is_regex(self) -> bool {
        matches!(self, MatchType::Regex | MatchType::RegexCaseless)
    }

    /// Prefix-priority and plain prefix routes compete for the same paths.
    pub fn is_prefix_like(self) -> bool {
        matches!(self, MatchType::Prefix | MatchType::Generic)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Regex => "regex",
            MatchType::RegexCaseless => "regex_caseless",
            MatchType::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Grouping key for a pattern.
pub fn normalized_key(match_type: MatchType, pattern: &str) -> String {
    let pattern = pattern.trim();
    match match_type {
        MatchType::Exact => pattern.to_string(),
        MatchType::Prefix | MatchType::Generic => {
            let trimmed = pattern.trim_end_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            }
        }
        MatchType::Regex | MatchType::RegexCaseless => {
            format!("{} {}", match_type.modifier().unwrap_or("~"), pattern)
        }
    }
}

/// Where an upstream was found in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamOrigin {
    /// A literal `proxy_pass http://host:port...`.
    ProxyPass,
    /// `proxy_pass http://$var...` with `set $var host:port`.
    Indirect,
    /// Only a `set $var host:port` statement.
    Assignment,
}

/// Backend target extracted from a location body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamSpec {
    /// `http` or `https`; `None` when no proxy_pass carries one.
    pub scheme: Option<String>,
    /// Host as authored.
    pub host: String,
    /// Port as authored.
    pub port: Option<u16>,
    /// Everything after the authority in the proxy_pass target, verbatim.
    /// Its trailing slash decides how nginx rewrites the request path.
    pub uri: String,
    /// Indirection variable the proxy_pass already goes through.
    pub variable: Option<String>,
    pub origin: UpstreamOrigin,
}

impl UpstreamSpec {
    /// `host[:port]` exactly as authored.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// `host:port` with the scheme's default port filled in.
    pub fn logical(&self) -> String {
        let port = self.port.unwrap_or(match self.scheme.as_deref() {
            Some("https") => 443,
            _ => 80,
        });
        format!("{}:{}", self.host.to_ascii_lowercase(), port)
    }
}

/// Result of scanning a body for its upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamScan {
    pub upstream: Option<UpstreamSpec>,
    /// Number of distinct logical upstreams seen.
    pub candidates: usize,
}

/// Find the body's upstream. A `proxy_pass` wins over a bare assignment;
/// otherwise the first one seen is used.
pub fn extract_upstream(body: &LocationBody) -> UpstreamScan {
    let mut found: Vec<UpstreamSpec> = Vec::new();

    for directive in &body.directives {
        let spec = match directive {
            Directive::ProxyPass { target } => parse_proxy_pass(target, body),
            Directive::SetVar { name, value } => {
                split_target(value).and_then(|(scheme, authority, uri)| {
                    let (host, port) = split_authority(authority)?;
                    // A bare word is just as likely a flag or a path; only
                    // host:port or a URL counts as an upstream.
                    if port.is_none() && scheme.is_none() {
                        return None;
                    }
                    Some(UpstreamSpec {
                        scheme: scheme.map(str::to_string),
                        host: host.to_string(),
                        port,
                        uri: uri.to_string(),
                        variable: Some(name.clone()),
                        origin: UpstreamOrigin::Assignment,
                    })
                })
            }
            _ => None,
        };
        if let Some(spec) = spec {
            found.push(spec);
        }
    }

    let mut logical: Vec<String> = found.iter().map(UpstreamSpec::logical).collect();
    logical.sort();
    logical.dedup();

    let primary = found
        .iter()
        .position(|s| s.origin != UpstreamOrigin::Assignment)
        .unwrap_or(0);

    UpstreamScan {
        candidates: logical.len(),
        upstream: (!found.is_empty()).then(|| found.swap_remove(primary)),
    }
}

fn parse_proxy_pass(target: &str, body: &LocationBody) -> Option<UpstreamSpec> {
    let (scheme, authority, uri) = split_target(target)?;
    let scheme = scheme.map(str::to_string);

    if let Some(var) = authority.strip_prefix('$') {
        let assigned = body.assignment(var)?;
        let (_, assigned_authority, _) = split_target(assigned)?;
        let (host, port) = split_authority(assigned_authority)?;
        return Some(UpstreamSpec {
            scheme,
            host: host.to_string(),
            port,
            uri: uri.to_string(),
            variable: Some(var.to_string()),
            origin: UpstreamOrigin::Indirect,
        });
    }

    let (host, port) = split_authority(authority)?;
    Some(UpstreamSpec {
        scheme,
        host: host.to_string(),
        port,
        uri: uri.to_string(),
        variable: None,
        origin: UpstreamOrigin::ProxyPass,
    })
}

/// Split `scheme://authority/uri` (scheme optional) into its parts.
fn split_target(target: &str) -> Option<(Option<&str>, &str, &str)> {
    let target = target.trim_matches(|c: char| c == '"' || c == '\'');
    let (scheme, rest) = match target.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, target),
    };
    let split = rest.find('/').unwrap_or(rest.len());
    let (authority, uri) = rest.split_at(split);
    if authority.is_empty() {
        return None;
    }
    Some((scheme, authority, uri))
}

fn split_authority(authority: &str) -> Option<(&str, Option<u16>)> {
    if authority.starts_with('$') || authority.starts_with("unix:") {
        return None;
    }
    // Bracketed IPv6 literal: `[::1]` or `[::1]:8080`. The brackets stay
    // part of the host so `host:port` renders back verbatim.
    if authority.starts_with('[') {
        let close = authority.find(']')?;
        let (host, rest) = authority.split_at(close + 1);
        return match rest.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if rest.is_empty() => Some((host, None)),
            None => None,
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            (!host.is_empty()).then_some((host, Some(port)))
        }
        None => Some((authority, None)),
    }
}
