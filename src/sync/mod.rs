//! # Conflict Resolution
//!
//! Collapses the conflict groups that replication leaves in the revision
//! store.
//!
//! ## Architecture
//!
//! - **Conflict Groups**: live leaves sharing one path id, two or more
//! - **Mergers**: per-type-tag functions turning a group into one revision
//! - **Resolver**: enumerates groups, merges each in its own store scope and
//!   reports what it could not merge
//!
//! The resolver only merges committed history, never reorders it, so it is
//! safe to run at any time: at startup, after each replication pull, or on
//! demand.

pub mod merger;
pub mod conflict_resolver;

pub use conflict_resolver::{ConflictResolver, ResolutionReport, UnresolvedConflict, UnresolvedReason};
pub use merger::{paragraph_merger, ConflictGroup, Merger};
