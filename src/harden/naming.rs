//! Indirection variable naming.
//!
//! `upstream_<host>_<port>_<tag>` where the tag is the first 8 hex chars of
//! SHA-256 over the source identity, match type and normalized key. Two
//! blocks pointing at the same `host:port` still get different names, and
//! the same block always gets the same name.

use sha2::{Digest, Sha256};

use crate::parser::{RouteRecord, UpstreamSpec};

const TAG_LEN: usize = 8;

pub fn variable_name(record: &RouteRecord, upstream: &UpstreamSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.source.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(record.match_type.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(record.normalized_key.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let logical = upstream.logical();
    let (host, port) = logical.rsplit_once(':').unwrap_or((logical.as_str(), "0"));

    format!("upstream_{}_{}_{}", sanitize(host), port, &digest[..TAG_LEN])
}

fn sanitize(host: &str) -> String {
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
