//! Shared Error Types
//!
//! This module defines the error type returned by every fallible operation of
//! the revision store, the paragraph matcher, the reconciliation engine and the
//! conflict resolver.
//!
//! # Error Categories
//!
//! - `MatchFailure` - the residual matching pass rejected the import
//! - `StaleRevision` - a commit targeted a revision that is no longer a live leaf
//! - `StoreFailure` - the underlying SQLite storage failed; the scope rolled back
//! - Lookup and validation failures (`RevisionNotFound`, `PathAlreadyExists`,
//!   `ChapterConflicted`, `Serialization`, `Corrupt`)
//!
//! # Usage
//!
//! ```rust
//! use parasync::shared::error::SyncError;
//!
//! let error = SyncError::match_failure("incoming paragraph 3 links to 2 claimed paragraphs");
//! assert!(!error.is_retryable());
//! ```
//!
//! All errors are local to the operation that raised them.
use crate::shared::paragraph::{PathId, RevisionId};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the revision engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// The residual matching pass could not produce an acceptable plan
    #[error("Match failure: {reason}")]
    MatchFailure {
        /// Why the plan was rejected
        reason: String,
    },

    /// A commit lost the race for its target revision
    #[error("Stale revision {revision_id} on path {path_id}: it is no longer a live leaf")]
    StaleRevision {
        /// Revision the commit was aimed at
        revision_id: RevisionId,
        /// Path of that revision
        path_id: PathId,
    },

    /// Underlying storage I/O failed
    #[error("Store failure: {0}")]
    StoreFailure(#[from] sqlx::Error),

    /// No revision exists with this id
    #[error("Revision not found: {revision_id}")]
    RevisionNotFound {
        revision_id: RevisionId,
    },

    /// An insert tried to create a path that already has revisions
    #[error("Path already exists: {path_id}")]
    PathAlreadyExists {
        path_id: PathId,
    },

    /// The chapter still holds unresolved conflict groups
    #[error("Chapter {chapter_index} of book '{book_id}' has {} conflicted path(s)", paths.len())]
    ChapterConflicted {
        book_id: String,
        chapter_index: u32,
        paths: Vec<PathId>,
    },

    /// Paragraph content could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data does not decode into a valid record
    #[error("Corrupt record: {message}")]
    Corrupt {
        message: String,
    },
}

impl SyncError {
    /// Create a new match failure
    pub fn match_failure(reason: impl Into<String>) -> Self {
        Self::MatchFailure {
            reason: reason.into(),
        }
    }

    /// Create a new corrupt-record error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleRevision { .. } | Self::StoreFailure(_))
    }
}

impl From<uuid::Error> for SyncError {
    fn from(err: uuid::Error) -> Self {
        Self::corrupt(format!("invalid id: {}", err))
    }
}

impl From<chrono::ParseError> for SyncError {
    fn from(err: chrono::ParseError) -> Self {
        Self::corrupt(format!("invalid timestamp: {}", err))
    }
}

impl From<std::num::TryFromIntError> for SyncError {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::corrupt(format!("index out of range: {}", err))
    }
}
