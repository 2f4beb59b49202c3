//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the composer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the composer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ComposerConfig {
    /// Where fragments are read from.
    pub sources: SourcesConfig,

    /// Where the bundle and its companion documents are written.
    pub output: OutputConfig,

    /// External proxy runtime (syntax check + hot reload).
    pub runtime: RuntimeConfig,

    /// Upstream hardening settings.
    pub hardening: HardeningConfig,

    /// Reserved path namespace.
    pub reserved: ReservedConfig,

    /// Re-scan triggers.
    pub schedule: ScheduleConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Fragment directories.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// App-owned fragments, one per backend application.
    pub app_dir: PathBuf,

    /// Proxy-owned fragments that outrank app fragments.
    pub override_dir: PathBuf,

    /// File extension a fragment must carry (without the dot).
    pub extension: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("/etc/devproxy/apps"),
            override_dir: PathBuf::from("/etc/devproxy/overrides"),
            extension: "conf".to_string(),
        }
    }
}

/// Output artifact locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// The bundle the runtime includes. Only the activation step writes here.
    pub bundle_path: PathBuf,

    /// Directory holding the candidate bundle while it is validated.
    pub staging_dir: PathBuf,

    /// Diagnostics document (JSON).
    pub diagnostics_path: PathBuf,

    /// Persisted resolution decisions (JSON).
    pub decisions_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bundle_path: PathBuf::from("/etc/nginx/conf.d/generated/apps.conf"),
            staging_dir: PathBuf::from("/var/lib/devproxy/staging"),
            diagnostics_path: PathBuf::from("/var/lib/devproxy/diagnostics.json"),
            decisions_path: PathBuf::from("/var/lib/devproxy/decisions.json"),
        }
    }
}

/// External runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When false, activation skips the syntax check and reload signal.
    pub enabled: bool,

    /// Runtime binary (e.g., "nginx").
    pub binary: String,

    /// Static core configuration that includes the served bundle.
    pub core_config: PathBuf,

    /// Scratch copy of the core configuration pointed at the candidate.
    pub harness_path: PathBuf,

    /// Syntax check timeout in seconds.
    pub check_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "nginx".to_string(),
            core_config: PathBuf::from("/etc/nginx/nginx.conf"),
            harness_path: PathBuf::from("/var/lib/devproxy/staging/nginx.check.conf"),
            check_timeout_secs: 10,
        }
    }
}

/// Upstream hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HardeningConfig {
    /// DNS resolver address injected into each hardened block.
    pub resolver: String,

    /// Resolver cache validity in seconds.
    pub resolver_valid_secs: u64,

    /// Name of the shared fallback location (without the `@`).
    pub fallback_name: String,

    /// Status codes routed to the fallback handler.
    pub error_codes: Vec<u16>,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            resolver: "127.0.0.11".to_string(),
            resolver_valid_secs: 10,
            fallback_name: "devproxy_fallback".to_string(),
            error_codes: vec![502, 503, 504],
        }
    }
}

/// Reserved namespace configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReservedConfig {
    /// Control-plane prefixes no fragment may claim. The root path is
    /// always reserved and need not be listed.
    pub prefixes: Vec<String>,
}

impl Default for ReservedConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["/devproxy/".to_string()],
        }
    }
}

/// Re-scan trigger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Periodic re-scan interval in seconds (0 disables).
    pub rescan_interval_secs: u64,

    /// Watch fragment directories and regenerate on change.
    pub watch_sources: bool,

    /// Quiet period before a burst of file events triggers a run.
    pub debounce_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rescan_interval_secs: 60,
            watch_sources: true,
            debounce_ms: 500,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Path prefix for every admin endpoint.
    pub base_path: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8090".to_string(),
            base_path: "/devproxy/api".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
        }
    }
}
