//! Parasync - Main Library
//!
//! Parasync keeps versioned paragraphs in sync: it stores every revision of
//! every paragraph, reconciles re-imported chapters against that history, and
//! collapses the conflicts replication leaves behind.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used across the crate
//!   - Paragraph revisions, candidates and content
//!   - Path bindings, store events
//!   - Configuration and error types
//!
//! - **`local_db`** - SQLite revision store
//!   - Append-only revision records with a head index
//!   - Atomic mutation scopes, replication ingress
//!   - Live chapter queries and path binding storage
//!
//! - **`import`** - Chapter re-import
//!   - Paragraph matcher (exact count, anchors, similarity links)
//!   - Reconciliation engine applying match plans atomically
//!
//! - **`sync`** - Conflict resolution
//!   - Conflict groups and per-type mergers
//!   - Conflict resolver
//!
//! # Usage
//!
//! ```rust,no_run
//! use parasync::import::ReconciliationEngine;
//! use parasync::local_db::RevisionStore;
//! use parasync::shared::{CandidateParagraph, EngineConfig, ParaContent};
//! use parasync::sync::ConflictResolver;
//!
//! # async fn example() -> parasync::shared::Result<()> {
//! let config = EngineConfig::default();
//! let store = RevisionStore::open(&config).await?;
//!
//! // Collapse conflicts pulled in by replication
//! let mut resolver = ConflictResolver::with_default_mergers(store.clone());
//! resolver.run().await?;
//!
//! // Re-import a chapter
//! let engine = ReconciliationEngine::new(store.clone(), &config);
//! let incoming = vec![CandidateParagraph::new(0, ParaContent::plain("In the beginning"))];
//! engine.reconcile("gen", 1, incoming, "importer").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The engine runs no workers of its own. `reconcile` and `run` must not be
//! called concurrently for the same chapter without outside serialization;
//! the store's compare-and-swap on `commit` (`StaleRevision`) is the only
//! guard it provides.
//!
//! # Error Handling
//!
//! Every fallible operation returns `shared::Result`, whose error type is
//! `shared::SyncError`. Configuration loading uses `shared::ConfigError`.

/// Shared types and data structures
pub mod shared;

/// SQLite revision store
pub mod local_db;

/// Chapter matching and reconciliation
pub mod import;

/// Conflict groups, mergers and the resolver
pub mod sync;
