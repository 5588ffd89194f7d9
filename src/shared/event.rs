//! Store Change Events
//!
//! Events published by the revision store after a mutation scope commits.
//! Subscribers (live chapter queries, UI data sources, reporting) use them to
//! know when to re-read a chapter. Events carry no paragraph data: readers
//! query the store for the current state.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of store change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreEventType {
    /// Local commits, inserts or deprecations
    ParagraphsChanged,
    /// Revisions admitted from replication
    RemoteRevisionsApplied,
    /// Conflict groups collapsed by the resolver
    ConflictsResolved,
}

/// Change notification for one chapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreEvent {
    pub event_type: StoreEventType,
    pub book_id: String,
    pub chapter_index: u32,
    /// When the scope committed
    pub timestamp: DateTime<Utc>,
}

impl StoreEvent {
    pub fn new(event_type: StoreEventType, book_id: impl Into<String>, chapter_index: u32) -> Self {
        Self {
            event_type,
            book_id: book_id.into(),
            chapter_index,
            timestamp: Utc::now(),
        }
    }

    /// Whether this event concerns the given chapter
    pub fn affects(&self, book_id: &str, chapter_index: u32) -> bool {
        self.book_id == book_id && self.chapter_index == chapter_index
    }
}
