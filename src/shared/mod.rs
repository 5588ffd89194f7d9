//! Shared Module
//!
//! This module contains the types shared by the revision store, the import
//! pipeline and the conflict resolver: the paragraph data model, path
//! bindings, change events, configuration and the error type.

/// Paragraph revisions and candidate paragraphs
pub mod paragraph;

/// Target-to-source path bindings
pub mod binding;

/// Store change events
pub mod event;

/// Shared error types
pub mod error;

/// Engine configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use paragraph::{
    CandidateParagraph, ContentElement, ParaContent, Paragraph, PathId, Placement, RevisionId,
    RevisionUpdate, SourceRange, PARAGRAPH_TYPE,
};
pub use binding::{PathBinding, PathLink};
pub use event::{StoreEvent, StoreEventType};
pub use error::{Result, SyncError};
pub use config::{AmbiguityPolicy, ConfigError, EngineConfig, EngineConfigBuilder, MatcherConfig, ReconcileConfig};
