pub mod client;

pub use client::{ComposerClient, RenameRouteRequest, ResolveConflictRequest};
