//! Chapter reconciliation tests
//!
//! Covers the exact-count, insert-only and delete-only cases, structural
//! edits handled by anchors and similarity links, and the conflicted-chapter
//! guard.

use crate::common::*;
use parasync::import::{ReconcileSummary, ReconciliationEngine};
use parasync::shared::{
    AmbiguityPolicy, CandidateParagraph, EngineConfig, ParaContent, StoreEventType, SyncError,
};
use parasync::sync::ConflictResolver;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_exact_count_commits_every_pair() {
    let store = fresh_store().await;
    let before = seed_chapter(&store, BOOK, CHAPTER, &["one", "two", "three"]).await;

    let summary = crate::assert_ok!(
        engine(&store)
            .reconcile(BOOK, CHAPTER, candidates(&["one", "two", "three"]), "bob")
            .await
    );
    assert_eq!(
        summary,
        ReconcileSummary {
            commits: 3,
            inserts: 0,
            deprecations: 0,
            skipped: 0
        }
    );

    for (old, text) in before.iter().zip(["one", "two", "three"]) {
        let head = store
            .most_recent(BOOK, CHAPTER, old.path_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.content, ParaContent::plain(text));
        assert_eq!(head.parent_id, Some(old.id));
        assert_eq!(head.creator_id, "bob");
    }
}

#[tokio::test]
async fn test_exact_count_applies_text_edits() {
    let store = fresh_store().await;
    let before = seed_chapter(&store, BOOK, CHAPTER, &["one", "two"]).await;

    engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["uno", "dos"]), "bob")
        .await
        .unwrap();

    let after = store.leaves(BOOK, CHAPTER).await.unwrap();
    let paths_before: Vec<_> = before.iter().map(|p| p.path_id).collect();
    let paths_after: Vec<_> = after.iter().map(|p| p.path_id).collect();
    assert_eq!(paths_after, paths_before);
    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["uno", "dos"]);
}

#[tokio::test]
async fn test_pure_insert() {
    let store = fresh_store().await;
    let summary = engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["a", "b", "c", "d"]), "bob")
        .await
        .unwrap();

    assert_eq!(summary.inserts, 4);
    assert_eq!(summary.commits, 0);
    assert_eq!(summary.deprecations, 0);
    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_pure_delete() {
    let store = fresh_store().await;
    let before = seed_chapter(&store, BOOK, CHAPTER, &["a", "b", "c"]).await;

    let summary = engine(&store)
        .reconcile(BOOK, CHAPTER, Vec::new(), "bob")
        .await
        .unwrap();

    assert_eq!(summary.deprecations, 3);
    assert_eq!(summary.commits, 0);
    assert_eq!(summary.inserts, 0);
    assert!(store.leaves(BOOK, CHAPTER).await.unwrap().is_empty());

    // History survives the deletion
    for old in &before {
        let revision = store.revision(old.id).await.unwrap().unwrap();
        assert!(revision.is_deprecated);
    }
}

#[tokio::test]
async fn test_empty_chapter_with_empty_input() {
    let store = fresh_store().await;
    let summary = engine(&store)
        .reconcile(BOOK, CHAPTER, Vec::new(), "bob")
        .await
        .unwrap();
    assert_eq!(summary, ReconcileSummary::default());
}

#[tokio::test]
async fn test_inserted_paragraph_renumbers_followers() {
    let store = fresh_store().await;
    let before = seed_chapter(&store, BOOK, CHAPTER, &["first", "second", "third"]).await;

    let summary = engine(&store)
        .reconcile(
            BOOK,
            CHAPTER,
            candidates(&["first", "a brand new paragraph", "second", "third"]),
            "bob",
        )
        .await
        .unwrap();
    assert_eq!(summary.commits, 3);
    assert_eq!(summary.inserts, 1);
    assert_eq!(summary.deprecations, 0);

    crate::assert_leaf_texts!(
        store,
        BOOK,
        CHAPTER,
        ["first", "a brand new paragraph", "second", "third"]
    );

    // "third" keeps its path and moves to index 3
    let third = store
        .most_recent(BOOK, CHAPTER, before[2].path_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third.index, 3);
}

#[tokio::test]
async fn test_split_paragraph_continues_first_half() {
    let store = fresh_store().await;
    let before = seed_chapter(&store, BOOK, CHAPTER, &["alpha beta gamma delta epsilon", "keep"]).await;

    let summary = engine(&store)
        .reconcile(
            BOOK,
            CHAPTER,
            candidates(&["alpha beta gamma delta", "alpha beta gamma delta epsilon zeta", "keep"]),
            "bob",
        )
        .await
        .unwrap();
    assert_eq!(summary.commits, 2);
    assert_eq!(summary.inserts, 1);
    assert_eq!(summary.deprecations, 0);

    let continued = store
        .most_recent(BOOK, CHAPTER, before[0].path_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(continued.content.text(), "alpha beta gamma delta");
    assert_eq!(continued.parent_id, Some(before[0].id));
}

#[tokio::test]
async fn test_merged_paragraphs_are_superseded() {
    let store = fresh_store().await;
    let before = seed_chapter(
        &store,
        BOOK,
        CHAPTER,
        &["alpha beta gamma", "alpha beta gamma delta", "keep"],
    )
    .await;

    let summary = engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["alpha beta gamma delta epsilon", "keep"]), "bob")
        .await
        .unwrap();
    assert_eq!(summary.commits, 1);
    assert_eq!(summary.inserts, 1);
    assert_eq!(summary.deprecations, 2);

    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["alpha beta gamma delta epsilon", "keep"]);
    for old in &before[..2] {
        assert!(store
            .most_recent(BOOK, CHAPTER, old.path_id)
            .await
            .unwrap()
            .is_none());
    }
}

#[tokio::test]
async fn test_unrelated_replacement_inserts_and_deprecates() {
    let store = fresh_store().await;
    seed_chapter(&store, BOOK, CHAPTER, &["keep", "obsolete paragraph"]).await;

    let summary = engine(&store)
        .reconcile(
            BOOK,
            CHAPTER,
            candidates(&["keep", "completely fresh wording", "and one more"]),
            "bob",
        )
        .await
        .unwrap();
    assert_eq!(summary.mutations(), 4);
    assert_eq!(summary.deprecations, 1);
    crate::assert_leaf_texts!(
        store,
        BOOK,
        CHAPTER,
        ["keep", "completely fresh wording", "and one more"]
    );
}

#[tokio::test]
async fn test_candidate_section_is_applied() {
    let store = fresh_store().await;
    seed_chapter(&store, BOOK, CHAPTER, &["heading text"]).await;

    let incoming = vec![CandidateParagraph::new(0, ParaContent::plain("heading text")).with_section(2)];
    engine(&store).reconcile(BOOK, CHAPTER, incoming, "bob").await.unwrap();

    let leaves = store.leaves(BOOK, CHAPTER).await.unwrap();
    assert_eq!(leaves[0].section_index, 2);
}

#[tokio::test]
async fn test_conflicted_chapter_is_rejected_until_resolved() {
    let store = fresh_store().await;
    let before = seed_chapter(&store, BOOK, CHAPTER, &["base", "other"]).await;
    make_conflict(&store, &before[0], &["remote edit"]).await;
    let leaves_before = store.leaves(BOOK, CHAPTER).await.unwrap();

    let result = engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["x", "y"]), "bob")
        .await;
    crate::assert_err!(result, SyncError::ChapterConflicted { .. });
    assert_eq!(store.leaves(BOOK, CHAPTER).await.unwrap(), leaves_before);

    let mut resolver = ConflictResolver::with_default_mergers(store.clone());
    assert_eq!(resolver.run().await.unwrap(), 1);

    engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["x", "y"]), "bob")
        .await
        .unwrap();
    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["x", "y"]);
}

#[tokio::test]
async fn test_conflicts_in_other_chapters_do_not_block() {
    let store = fresh_store().await;
    let other = seed_chapter(&store, BOOK, 2, &["elsewhere"]).await;
    make_conflict(&store, &other[0], &["remote"]).await;

    engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["fine"]), "bob")
        .await
        .unwrap();
    crate::assert_leaf_texts!(store, BOOK, CHAPTER, ["fine"]);
}

#[tokio::test]
async fn test_unchanged_reimport_is_noop_when_skipping() {
    let store = fresh_store().await;
    seed_chapter(&store, BOOK, CHAPTER, &["a", "b", "c"]).await;
    let revisions_before = store.stats().await.unwrap().revision_count;

    let config = EngineConfig::builder().commit_unchanged(false).build().unwrap();
    let summary = ReconciliationEngine::new(store.clone(), &config)
        .reconcile(BOOK, CHAPTER, candidates(&["a", "b", "c"]), "bob")
        .await
        .unwrap();

    assert_eq!(summary.mutations(), 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(store.stats().await.unwrap().revision_count, revisions_before);
}

#[tokio::test]
async fn test_rejected_ambiguity_leaves_chapter_alone() {
    let store = fresh_store().await;
    seed_chapter(
        &store,
        BOOK,
        CHAPTER,
        &["the quick brown fox jumps", "the quick brown fox leaps", "filler to change the count"],
    )
    .await;
    let before = store.leaves(BOOK, CHAPTER).await.unwrap();

    let config = EngineConfig::builder()
        .ambiguity(AmbiguityPolicy::Reject)
        .build()
        .unwrap();
    let result = ReconciliationEngine::new(store.clone(), &config)
        .reconcile(
            BOOK,
            CHAPTER,
            candidates(&["the quick brown fox runs", "the quick brown fox walks"]),
            "bob",
        )
        .await;

    crate::assert_err!(result, SyncError::MatchFailure { .. });
    assert_eq!(store.leaves(BOOK, CHAPTER).await.unwrap(), before);
}

#[tokio::test]
async fn test_reconcile_publishes_one_event() {
    let store = fresh_store().await;
    let mut events = store.subscribe();

    engine(&store)
        .reconcile(BOOK, CHAPTER, candidates(&["a", "b"]), "bob")
        .await
        .unwrap();

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, StoreEventType::ParagraphsChanged);
    assert!(event.affects(BOOK, CHAPTER));
    assert!(events.try_recv().is_err());
}
