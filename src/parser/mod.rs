//! Location parsing subsystem.
//!
//! # Data Flow
//! ```text
//! FragmentSource.text
//!     → lexer.rs (words, braces, semicolons, comments)
//!     → location.rs (top-level location blocks, balanced bodies)
//!     → body.rs (tagged directives + opaque passthrough)
//!     → normalize.rs (grouping key, upstream extraction)
//!     → RouteRecord[] or Skipped(reason)
//! ```
//!
//! # Design Decisions
//! - Only the `location` subset of the nginx grammar is understood
//! - Nested `location` blocks are rejected
//! - Parsing is pure: no I/O, no shared state
//! - Renames splice the new pattern into the original text by byte span

pub mod body;
pub mod lexer;
pub mod location;
pub mod normalize;
pub mod rewrite;

pub use body::{Directive, LocationBody};
pub use location::{parse_fragment, ParseOutcome, ParseWarning, ParsedFragment, RouteRecord};
pub use normalize::{MatchType, UpstreamSpec};
pub use rewrite::{rename_location, RenameError};
