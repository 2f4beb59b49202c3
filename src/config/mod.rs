//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ComposerConfig (validated, immutable)
//!     → shared via Arc to the activation controller and admin API
//!
//! While running:
//!     watcher.rs detects fragment changes
//!     → debounced trigger sent to the regeneration loop
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ComposerConfig;
pub use schema::HardeningConfig;
pub use schema::OutputConfig;
pub use schema::RuntimeConfig;
pub use schema::SourcesConfig;
