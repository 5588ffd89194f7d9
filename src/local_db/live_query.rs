//! # Live Chapter Queries
//!
//! A [`LiveChapterQuery`] holds the live leaves of one chapter and re-reads
//! them whenever the store publishes an event for that chapter. UI data
//! sources either poll [`LiveChapterQuery::changed`] or consume the query as
//! a stream of snapshots.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use parasync::local_db::{LiveChapterQuery, RevisionStore};
//!
//! # async fn example() -> parasync::shared::Result<()> {
//! let store = RevisionStore::in_memory().await?;
//! let query = LiveChapterQuery::start(store, "gen", 1).await?;
//! let mut snapshots = Box::pin(query.into_stream());
//! while let Some(leaves) = snapshots.next().await {
//!     println!("{} paragraphs", leaves?.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::local_db::RevisionStore;
use crate::shared::paragraph::Paragraph;
use crate::shared::{Result, StoreEvent};
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};

/// Self-refreshing view of a chapter's live leaves
#[derive(Debug)]
pub struct LiveChapterQuery {
    store: RevisionStore,
    book_id: String,
    chapter_index: u32,
    receiver: broadcast::Receiver<StoreEvent>,
    rows: Vec<Paragraph>,
}

impl LiveChapterQuery {
    /// Subscribe to a chapter and load its current leaves
    pub async fn start(
        store: RevisionStore,
        book_id: impl Into<String>,
        chapter_index: u32,
    ) -> Result<Self> {
        // Subscribe before the first read so no commit falls between them
        let receiver = store.subscribe();
        let mut query = Self {
            store,
            book_id: book_id.into(),
            chapter_index,
            receiver,
            rows: Vec::new(),
        };
        query.refresh().await?;
        Ok(query)
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn chapter_index(&self) -> u32 {
        self.chapter_index
    }

    /// Latest snapshot
    pub fn rows(&self) -> &[Paragraph] {
        &self.rows
    }

    /// Re-read the chapter
    pub async fn refresh(&mut self) -> Result<&[Paragraph]> {
        self.rows = self.store.leaves(&self.book_id, self.chapter_index).await?;
        Ok(&self.rows)
    }

    /// Wait for the next change to this chapter and refresh
    ///
    /// Returns `false` once the store has been dropped.
    pub async fn changed(&mut self) -> Result<bool> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.affects(&self.book_id, self.chapter_index) => {
                    self.refresh().await?;
                    return Ok(true);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[STORE] Live query for {} {} lagged by {} events, refreshing",
                        self.book_id,
                        self.chapter_index,
                        skipped
                    );
                    self.refresh().await?;
                    return Ok(true);
                }
                Err(RecvError::Closed) => return Ok(false),
            }
        }
    }

    /// Stream of snapshots: the current one first, then one per change
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Paragraph>>> {
        stream::unfold((self, true), |(mut query, first)| async move {
            if first {
                let rows = query.rows.clone();
                return Some((Ok(rows), (query, false)));
            }
            match query.changed().await {
                Ok(true) => {
                    let rows = query.rows.clone();
                    Some((Ok(rows), (query, false)))
                }
                Ok(false) => None,
                Err(error) => Some((Err(error), (query, false))),
            }
        })
    }
}
