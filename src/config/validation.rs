//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status codes, timeouts, addresses)
//! - Detect directory overlaps that would make origins ambiguous
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ComposerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ComposerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ComposerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let sources = &config.sources;
    if sources.app_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("sources.app_dir", "must not be empty"));
    }
    if sources.override_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("sources.override_dir", "must not be empty"));
    }
    if sources.app_dir == sources.override_dir {
        errors.push(ValidationError::new(
            "sources.override_dir",
            "must differ from sources.app_dir",
        ));
    }
    if sources.extension.is_empty() || sources.extension.starts_with('.') {
        errors.push(ValidationError::new(
            "sources.extension",
            "must be a bare extension such as \"conf\"",
        ));
    }

    if config.output.bundle_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("output.bundle_path", "must not be empty"));
    }
    if config.output.bundle_path.starts_with(&config.output.staging_dir) {
        errors.push(ValidationError::new(
            "output.staging_dir",
            "must not contain the served bundle",
        ));
    }

    if config.runtime.enabled {
        if config.runtime.binary.trim().is_empty() {
            errors.push(ValidationError::new("runtime.binary", "must not be empty"));
        }
        if config.runtime.check_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "runtime.check_timeout_secs",
                "must be greater than zero",
            ));
        }
        if config.runtime.harness_path == config.runtime.core_config {
            errors.push(ValidationError::new(
                "runtime.harness_path",
                "must differ from runtime.core_config",
            ));
        }
    }

    let hardening = &config.hardening;
    if hardening.resolver.trim().is_empty() {
        errors.push(ValidationError::new("hardening.resolver", "must not be empty"));
    }
    let name = &hardening.fallback_name;
    if name.is_empty()
        || name.starts_with('@')
        || name.chars().any(|c| c.is_whitespace() || c == ';' || c == '{')
    {
        errors.push(ValidationError::new(
            "hardening.fallback_name",
            "must be a bare location name without '@' or whitespace",
        ));
    }
    if hardening.error_codes.is_empty() {
        errors.push(ValidationError::new("hardening.error_codes", "must not be empty"));
    }
    for code in &hardening.error_codes {
        if !(300..=599).contains(code) {
            errors.push(ValidationError::new(
                "hardening.error_codes",
                format!("{} is not a valid error_page status", code),
            ));
        }
    }

    for prefix in &config.reserved.prefixes {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::new(
                "reserved.prefixes",
                format!("{:?} must start with '/'", prefix),
            ));
        }
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("{:?} is not a socket address", config.admin.bind_address),
            ));
        }
        if !config.admin.base_path.starts_with('/') {
            errors.push(ValidationError::new("admin.base_path", "must start with '/'"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
