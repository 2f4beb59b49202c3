//! Fragment sources.
//!
//! # Data Flow
//! ```text
//! apps/*.conf ──┐
//!               ├─→ loader.rs (read text + mtime) → SourceSnapshot
//! overrides/*.conf ┘
//!
//! admin API → install.rs (atomic write into apps/)
//! ```

pub mod install;
pub mod loader;
pub mod source;

pub use install::{install_fragment, InstallError};
pub use loader::load_snapshot;
pub use source::{FragmentSource, Origin, SourceId, SourceSnapshot};
