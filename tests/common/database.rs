//! Store fixtures and utilities
//!
//! Fresh in-memory stores per test, chapter seeding through the
//! reconciliation engine, and helpers that simulate replicated revisions.

use chrono::Utc;
use parasync::import::ReconciliationEngine;
use parasync::local_db::RevisionStore;
use parasync::shared::{CandidateParagraph, EngineConfig, ParaContent, Paragraph, RevisionId};

pub const BOOK: &str = "gen";
pub const CHAPTER: u32 = 1;

/// Create an empty in-memory store
pub async fn fresh_store() -> RevisionStore {
    RevisionStore::in_memory()
        .await
        .expect("Failed to create in-memory store")
}

/// Reconciliation engine with default settings
pub fn engine(store: &RevisionStore) -> ReconciliationEngine {
    ReconciliationEngine::new(store.clone(), &EngineConfig::default())
}

/// Candidates numbered by position
pub fn candidates(texts: &[&str]) -> Vec<CandidateParagraph> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| CandidateParagraph::new(i as u32, ParaContent::plain(*text)))
        .collect()
}

/// Import texts into an empty chapter and return its leaves
pub async fn seed_chapter(store: &RevisionStore, book_id: &str, chapter_index: u32, texts: &[&str]) -> Vec<Paragraph> {
    engine(store)
        .reconcile(book_id, chapter_index, candidates(texts), "seed")
        .await
        .expect("Failed to seed chapter");
    store
        .leaves(book_id, chapter_index)
        .await
        .expect("Failed to read leaves")
}

/// Plain text of each live leaf, in chapter order
pub async fn leaf_texts(store: &RevisionStore, book_id: &str, chapter_index: u32) -> Vec<String> {
    store
        .leaves(book_id, chapter_index)
        .await
        .expect("Failed to read leaves")
        .iter()
        .map(|p| p.content.text())
        .collect()
}

/// A revision another replica committed over `parent`
pub fn remote_revision(parent: &Paragraph, text: &str, creator_id: &str) -> Paragraph {
    Paragraph {
        id: RevisionId::new(),
        content: ParaContent::plain(text),
        creator_id: creator_id.to_string(),
        parent_id: Some(parent.id),
        created_at: Utc::now(),
        is_most_recent: true,
        is_deprecated: false,
        ..parent.clone()
    }
}

/// Commit locally over `base`, then replicate `remote_texts` over the same base
///
/// Leaves the path with `1 + remote_texts.len()` live leaves.
pub async fn make_conflict(store: &RevisionStore, base: &Paragraph, remote_texts: &[&str]) -> Vec<Paragraph> {
    let local = store
        .commit(base, ParaContent::plain("local edit"), "alice")
        .await
        .expect("Failed to commit locally");
    let remotes: Vec<Paragraph> = remote_texts
        .iter()
        .enumerate()
        .map(|(i, text)| remote_revision(base, text, &format!("peer-{}", i)))
        .collect();
    store
        .apply_remote(&remotes)
        .await
        .expect("Failed to apply remote revisions");

    let mut members = vec![local];
    members.extend(remotes);
    members
}
