//! # Chapter Reconciliation
//!
//! Applies a freshly parsed chapter to the revision store. The engine reads
//! the chapter's live leaves, asks the [`ParagraphMatcher`] for a plan, and
//! applies the resolved mutations inside one [`StoreScope`]: either the whole
//! chapter changes or nothing does.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parasync::import::ReconciliationEngine;
//! use parasync::local_db::RevisionStore;
//! use parasync::shared::{CandidateParagraph, EngineConfig, ParaContent};
//!
//! # async fn example() -> parasync::shared::Result<()> {
//! let store = RevisionStore::in_memory().await?;
//! let engine = ReconciliationEngine::new(store, &EngineConfig::default());
//!
//! let incoming = vec![CandidateParagraph::new(0, ParaContent::plain("In the beginning"))];
//! let summary = engine.reconcile("gen", 1, incoming, "importer").await?;
//! println!("{} inserted", summary.inserts);
//! # Ok(())
//! # }
//! ```

use crate::import::matcher::ParagraphMatcher;
use crate::import::plan::PlannedMutation;
use crate::local_db::{RevisionStore, StoreScope};
use crate::shared::config::{EngineConfig, ReconcileConfig};
use crate::shared::paragraph::{CandidateParagraph, PathId, Placement, RevisionUpdate};
use crate::shared::{Result, SyncError};
use serde::Serialize;

/// What one reconcile run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub commits: usize,
    pub inserts: usize,
    pub deprecations: usize,
    /// Matched pairs left alone because nothing changed
    pub skipped: usize,
}

impl ReconcileSummary {
    /// Number of store mutations applied
    pub fn mutations(&self) -> usize {
        self.commits + self.inserts + self.deprecations
    }
}

/// Re-import engine for whole chapters
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    store: RevisionStore,
    matcher: ParagraphMatcher,
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(store: RevisionStore, config: &EngineConfig) -> Self {
        Self {
            store,
            matcher: ParagraphMatcher::new(config.matcher.clone()),
            config: config.reconcile.clone(),
        }
    }

    pub fn with_matcher(store: RevisionStore, matcher: ParagraphMatcher, config: ReconcileConfig) -> Self {
        Self {
            store,
            matcher,
            config,
        }
    }

    pub fn store(&self) -> &RevisionStore {
        &self.store
    }

    /// Replace a chapter's paragraphs with `incoming`, keeping history
    ///
    /// On any error the scope is rolled back and the chapter is unchanged.
    pub async fn reconcile(
        &self,
        book_id: &str,
        chapter_index: u32,
        incoming: Vec<CandidateParagraph>,
        creator_id: &str,
    ) -> Result<ReconcileSummary> {
        tracing::info!(
            "[RECONCILE] Reconciling {} chapter {} with {} incoming paragraphs",
            book_id,
            chapter_index,
            incoming.len()
        );

        let mut scope = self.store.begin().await?;
        match self
            .apply(&mut scope, book_id, chapter_index, &incoming, creator_id)
            .await
        {
            Ok(summary) => {
                scope.finish().await?;
                tracing::info!(
                    "[RECONCILE] {} chapter {}: {} commits, {} inserts, {} deprecations, {} skipped",
                    book_id,
                    chapter_index,
                    summary.commits,
                    summary.inserts,
                    summary.deprecations,
                    summary.skipped
                );
                Ok(summary)
            }
            Err(error) => {
                tracing::warn!(
                    "[RECONCILE] {} chapter {} rejected after {} mutations: {}",
                    book_id,
                    chapter_index,
                    scope.mutation_count(),
                    error
                );
                if let Err(rollback_error) = scope.rollback().await {
                    tracing::error!("[RECONCILE] Rollback failed: {}", rollback_error);
                }
                Err(error)
            }
        }
    }

    async fn apply(
        &self,
        scope: &mut StoreScope,
        book_id: &str,
        chapter_index: u32,
        incoming: &[CandidateParagraph],
        creator_id: &str,
    ) -> Result<ReconcileSummary> {
        let leaves = scope.leaves(book_id, chapter_index).await?;

        if self.config.reject_conflicted_chapters {
            let conflicts = scope.chapter_conflicts(book_id, chapter_index).await?;
            if !conflicts.is_empty() {
                return Err(SyncError::ChapterConflicted {
                    book_id: book_id.to_string(),
                    chapter_index,
                    paths: conflicts.into_keys().collect(),
                });
            }
        }

        let plan = self.matcher.match_paragraphs(&leaves, incoming)?;
        let mut summary = ReconcileSummary::default();

        for mutation in plan.resolve() {
            match mutation {
                PlannedMutation::Commit { over, candidate } => {
                    if !self.config.commit_unchanged && over.same_payload_as(&candidate) {
                        summary.skipped += 1;
                        continue;
                    }
                    scope
                        .commit_with(&over, RevisionUpdate::from(&candidate), creator_id)
                        .await?;
                    summary.commits += 1;
                }
                PlannedMutation::Insert { candidate } => {
                    let placement = Placement {
                        book_id: book_id.to_string(),
                        chapter_index,
                        section_index: candidate.section_index,
                        index: candidate.index,
                    };
                    scope
                        .insert(&candidate, PathId::new(), placement, creator_id)
                        .await?;
                    summary.inserts += 1;
                }
                PlannedMutation::Deprecate { revision } => {
                    scope.deprecate(revision.id).await?;
                    summary.deprecations += 1;
                }
            }
        }

        Ok(summary)
    }
}
