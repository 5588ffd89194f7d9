//! Revision store tests
//!
//! Staleness detection, history retention, replication ingress, on-disk
//! persistence and live chapter queries.

use crate::common::*;
use futures_util::StreamExt;
use parasync::local_db::{LiveChapterQuery, RemoteOutcome, RevisionStore};
use parasync::shared::{EngineConfig, ParaContent, SyncError};
use chrono::TimeZone;
use chrono::Utc;
use parasync::sync::ConflictResolver;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_second_commit_over_same_revision_is_stale() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["original"]).await;
    let r = &seeded[0];

    let a = crate::assert_ok!(store.commit(r, ParaContent::plain("edit A"), "alice").await);
    let result = store.commit(r, ParaContent::plain("edit B"), "bob").await;
    crate::assert_err!(result, SyncError::StaleRevision { .. });

    // R is still in the history, and A is the head
    let history = store.history(r.path_id).await.unwrap();
    assert!(history.iter().any(|p| p.id == r.id));
    let head = store.most_recent(BOOK, CHAPTER, r.path_id).await.unwrap().unwrap();
    assert_eq!(head.id, a.id);
}

#[tokio::test]
async fn test_stale_error_is_retryable() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["original"]).await;
    store.commit(&seeded[0], ParaContent::plain("A"), "alice").await.unwrap();

    let error = store
        .commit(&seeded[0], ParaContent::plain("B"), "bob")
        .await
        .unwrap_err();
    assert!(error.is_retryable());

    // Retry against the current leaf
    let current = store
        .most_recent(BOOK, CHAPTER, seeded[0].path_id)
        .await
        .unwrap()
        .unwrap();
    store.commit(&current, ParaContent::plain("B"), "bob").await.unwrap();
}

#[tokio::test]
async fn test_history_keeps_every_revision_in_order() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["v1"]).await;
    let v2 = store.commit(&seeded[0], ParaContent::plain("v2"), "alice").await.unwrap();
    store.commit(&v2, ParaContent::plain("v3"), "alice").await.unwrap();

    let texts: Vec<String> = store
        .history(seeded[0].path_id)
        .await
        .unwrap()
        .iter()
        .map(|p| p.content.text())
        .collect();
    assert_eq!(texts, vec!["v1", "v2", "v3"]);
}

#[tokio::test]
async fn test_remote_batch_outcomes() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["base"]).await;

    let child = remote_revision(&seeded[0], "remote child", "bob");
    let outcomes = store.apply_remote(&[child.clone()]).await.unwrap();
    assert_eq!(outcomes, vec![RemoteOutcome::Inserted]);

    // The same revision arriving deprecated moves it forward
    let mut deprecated = child.clone();
    deprecated.is_deprecated = true;
    deprecated.is_most_recent = false;
    let outcomes = store
        .apply_remote(&[child.clone(), deprecated])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![RemoteOutcome::Unchanged, RemoteOutcome::Updated]);
    assert!(store.leaves(BOOK, CHAPTER).await.unwrap().is_empty());
}

/// Remote history `base -> first -> second`, where only `second` is a head
fn remote_chain(base: &parasync::shared::Paragraph) -> Vec<parasync::shared::Paragraph> {
    let mut first = remote_revision(base, "remote first", "bob");
    first.is_most_recent = false;
    let second = remote_revision(&first, "remote second", "bob");
    vec![first, second]
}

#[tokio::test]
async fn test_remote_chain_fast_forwards() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["base"]).await;
    let chain = remote_chain(&seeded[0]);

    store.apply_remote(&chain).await.unwrap();

    assert!(store.history_conflicts(BOOK).await.unwrap().is_empty());
    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["remote second"]);

    // Nothing to merge, so the remote edits survive a resolver run
    let mut resolver = ConflictResolver::with_default_mergers(store.clone());
    resolver.run().await.unwrap();
    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["remote second"]);
}

#[tokio::test]
async fn test_remote_chain_in_reverse_order_fast_forwards() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["base"]).await;
    let mut chain = remote_chain(&seeded[0]);
    chain.reverse();

    store.apply_remote(&chain).await.unwrap();

    assert!(store.history_conflicts(BOOK).await.unwrap().is_empty());
    let head = store
        .most_recent(BOOK, CHAPTER, seeded[0].path_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(head.id, chain[0].id);

    // The child already arrived, so a head flag on its parent is ignored
    let mut late = remote_revision(&seeded[0], "stale head", "carol");
    let child = remote_revision(&late, "child of stale head", "carol");
    store.apply_remote(&[child.clone()]).await.unwrap();
    late.is_most_recent = true;
    store.apply_remote(&[late.clone()]).await.unwrap();
    assert!(!store.revision(late.id).await.unwrap().unwrap().is_most_recent);
    assert!(store.revision(child.id).await.unwrap().unwrap().is_most_recent);
}

#[tokio::test]
async fn test_remote_timestamp_reads_back_exactly() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["base"]).await;

    let mut remote = remote_revision(&seeded[0], "remote", "bob");
    remote.created_at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    store.apply_remote(&[remote.clone()]).await.unwrap();

    let read = store.revision(remote.id).await.unwrap().unwrap();
    assert_eq!(read.created_at, remote.created_at);
    assert_eq!(read, remote);
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder()
        .database_path(dir.path().join("revisions.db"))
        .build()
        .unwrap();

    let before = {
        let store = RevisionStore::open(&config).await.unwrap();
        let leaves = seed_chapter(&store, BOOK, CHAPTER, &["kept", "on", "disk"]).await;
        store.pool().close().await;
        leaves
    };

    let store = RevisionStore::open(&config).await.unwrap();
    assert_eq!(store.leaves(BOOK, CHAPTER).await.unwrap(), before);
    assert_eq!(store.stats().await.unwrap().revision_count, 3);
}

#[tokio::test]
async fn test_stats_track_lifecycle() {
    let store = fresh_store().await;
    let seeded = seed_chapter(&store, BOOK, CHAPTER, &["a", "b"]).await;
    store.commit(&seeded[0], ParaContent::plain("a2"), "alice").await.unwrap();
    store.deprecate(seeded[1].id).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.revision_count, 3);
    assert_eq!(stats.live_leaf_count, 1);
    assert_eq!(stats.deprecated_count, 1);
    assert_eq!(stats.conflicted_path_count, 0);
}

#[tokio::test]
async fn test_live_query_follows_reconcile() {
    let store = fresh_store().await;
    let query = LiveChapterQuery::start(store.clone(), BOOK, CHAPTER).await.unwrap();
    let mut snapshots = Box::pin(query.into_stream());
    assert!(snapshots.next().await.unwrap().unwrap().is_empty());

    engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["a", "b"]), "bob")
        .await
        .unwrap();

    let rows = tokio::time::timeout(Duration::from_secs(1), snapshots.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let texts: Vec<String> = rows.iter().map(|p| p.content.text()).collect();
    assert_eq!(texts, vec!["a", "b"]);
}
