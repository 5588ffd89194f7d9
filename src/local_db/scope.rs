//! # Mutation Scopes
//!
//! A [`StoreScope`] is one SQLite transaction over the revision store. All
//! writes of a reconcile run or of one resolved conflict group go through a
//! single scope, so readers see either every change or none of them.
//!
//! `commit` is the store's optimistic-concurrency guard: it removes the
//! predecessor's head row and requires that exactly that row existed. A second
//! commit over the same predecessor therefore fails with `StaleRevision`,
//! even though the predecessor is still in the history.
//!
//! Dropping a scope without calling [`StoreScope::finish`] rolls it back.

use crate::local_db::paragraphs::{
    fetch_book_conflicts, fetch_leaves, fetch_most_recent, fetch_path_history, fetch_revision,
    format_timestamp, now,
};
use crate::local_db::RevisionStore;
use crate::shared::paragraph::{
    CandidateParagraph, ParaContent, Paragraph, PathId, Placement, RevisionId, RevisionUpdate,
};
use crate::shared::{Result, StoreEvent, StoreEventType, SyncError};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::collections::BTreeMap;
use std::fmt;

/// What `apply_remote` did with a replicated revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Unknown revision, stored as received
    Inserted,
    /// Known revision, flags moved forward
    Updated,
    /// Known revision, nothing new
    Unchanged,
}

/// Atomic mutation scope over the revision store
pub struct StoreScope {
    store: RevisionStore,
    tx: Transaction<'static, Sqlite>,
    pending: Vec<(StoreEventType, String, u32)>,
    mutations: usize,
}

impl fmt::Debug for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreScope")
            .field("mutations", &self.mutations)
            .field("pending_events", &self.pending.len())
            .finish()
    }
}

impl StoreScope {
    pub(crate) async fn begin(store: RevisionStore) -> Result<Self> {
        let tx = store.pool.begin().await?;
        Ok(Self {
            store,
            tx,
            pending: Vec::new(),
            mutations: 0,
        })
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    fn touch(&mut self, event_type: StoreEventType, book_id: &str, chapter_index: u32) {
        self.mutations += 1;
        let already = self
            .pending
            .iter()
            .any(|(t, b, c)| *t == event_type && b == book_id && *c == chapter_index);
        if !already {
            self.pending.push((event_type, book_id.to_string(), chapter_index));
        }
    }

    /// Number of mutations applied so far in this scope
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub async fn revision(&mut self, revision_id: RevisionId) -> Result<Option<Paragraph>> {
        fetch_revision(self.conn(), revision_id).await
    }

    pub async fn most_recent(
        &mut self,
        book_id: &str,
        chapter_index: u32,
        path_id: PathId,
    ) -> Result<Option<Paragraph>> {
        fetch_most_recent(self.conn(), book_id, chapter_index, path_id).await
    }

    pub async fn leaves(&mut self, book_id: &str, chapter_index: u32) -> Result<Vec<Paragraph>> {
        fetch_leaves(self.conn(), book_id, chapter_index).await
    }

    /// Conflicted paths whose live leaves sit in the given chapter
    pub async fn chapter_conflicts(
        &mut self,
        book_id: &str,
        chapter_index: u32,
    ) -> Result<BTreeMap<PathId, Vec<Paragraph>>> {
        let mut conflicts = fetch_book_conflicts(self.conn(), book_id).await?;
        conflicts.retain(|_, group| group.iter().any(|p| p.chapter_index == chapter_index));
        Ok(conflicts)
    }

    /// Commit new content over a live leaf, keeping its placement
    pub async fn commit(
        &mut self,
        over: &Paragraph,
        content: ParaContent,
        creator_id: &str,
    ) -> Result<Paragraph> {
        let update = RevisionUpdate::content_only(over, content);
        self.commit_with(over, update, creator_id).await
    }

    /// Commit a new revision over a live leaf
    ///
    /// Fails with `StaleRevision` unless `over` is currently a head of its
    /// path; the check and the write happen in the same transaction.
    pub async fn commit_with(
        &mut self,
        over: &Paragraph,
        update: RevisionUpdate,
        creator_id: &str,
    ) -> Result<Paragraph> {
        self.store.check_fault()?;
        self.take_head(over).await?;

        let revision = Paragraph {
            id: RevisionId::new(),
            path_id: over.path_id,
            book_id: over.book_id.clone(),
            chapter_index: over.chapter_index,
            section_index: update.section_index,
            index: update.index,
            type_tag: over.type_tag.clone(),
            content: update.content,
            range: update.range,
            creator_id: creator_id.to_string(),
            parent_id: Some(over.id),
            created_at: now(),
            is_most_recent: true,
            is_deprecated: false,
        };
        insert_revision_row(self.conn(), &revision).await?;
        add_head(self.conn(), revision.path_id, revision.id).await?;

        tracing::debug!(
            "[STORE] Committed {} over {} on path {}",
            revision.id,
            over.id,
            revision.path_id
        );
        self.touch(StoreEventType::ParagraphsChanged, &revision.book_id, revision.chapter_index);
        Ok(revision)
    }

    /// Create a new path and its first revision
    pub async fn insert(
        &mut self,
        candidate: &CandidateParagraph,
        path_id: PathId,
        placement: Placement,
        creator_id: &str,
    ) -> Result<Paragraph> {
        self.store.check_fault()?;
        if path_exists(self.conn(), path_id).await? {
            return Err(SyncError::PathAlreadyExists { path_id });
        }

        let revision = Paragraph {
            id: RevisionId::new(),
            path_id,
            book_id: placement.book_id,
            chapter_index: placement.chapter_index,
            section_index: placement.section_index,
            index: placement.index,
            type_tag: candidate.type_tag.clone(),
            content: candidate.content.clone(),
            range: candidate.range,
            creator_id: creator_id.to_string(),
            parent_id: None,
            created_at: now(),
            is_most_recent: true,
            is_deprecated: false,
        };
        insert_revision_row(self.conn(), &revision).await?;
        add_head(self.conn(), revision.path_id, revision.id).await?;

        tracing::debug!("[STORE] Inserted path {} at index {}", path_id, revision.index);
        self.touch(StoreEventType::ParagraphsChanged, &revision.book_id, revision.chapter_index);
        Ok(revision)
    }

    /// Deprecate a revision; repeating the call is a no-op
    pub async fn deprecate(&mut self, revision_id: RevisionId) -> Result<()> {
        self.store.check_fault()?;
        let revision = fetch_revision(self.conn(), revision_id)
            .await?
            .ok_or(SyncError::RevisionNotFound { revision_id })?;
        if revision.is_deprecated {
            return Ok(());
        }

        mark_deprecated(self.conn(), revision_id).await?;
        tracing::debug!("[STORE] Deprecated {} on path {}", revision_id, revision.path_id);
        self.touch(StoreEventType::ParagraphsChanged, &revision.book_id, revision.chapter_index);
        Ok(())
    }

    /// Deprecate every revision of a path, returning how many were newly deprecated
    pub async fn deprecate_path(&mut self, path_id: PathId) -> Result<usize> {
        let history = fetch_path_history(self.conn(), path_id).await?;
        let mut deprecated = 0;
        for revision in history.iter().filter(|r| !r.is_deprecated) {
            self.deprecate(revision.id).await?;
            deprecated += 1;
        }
        Ok(deprecated)
    }

    /// Admit a revision produced by another replica
    ///
    /// Unknown revisions are stored with their own flags. Every stored
    /// revision supersedes its parent, and a revision that already has a
    /// stored child never becomes a head, so a chain of commits lands as a
    /// fast-forward in any arrival order. Known revisions only move forward:
    /// they can be deprecated or lose their head, never regain it.
    pub async fn apply_remote(&mut self, remote: &Paragraph) -> Result<RemoteOutcome> {
        self.store.check_fault()?;

        let outcome = match fetch_revision(self.conn(), remote.id).await? {
            None => {
                insert_revision_row(self.conn(), remote).await?;
                if let Some(parent_id) = remote.parent_id {
                    remove_head(self.conn(), remote.path_id, parent_id).await?;
                }
                if remote.is_deprecated {
                    mark_deprecated(self.conn(), remote.id).await?;
                } else if remote.is_most_recent && !has_children(self.conn(), remote.id).await? {
                    add_head(self.conn(), remote.path_id, remote.id).await?;
                }
                RemoteOutcome::Inserted
            }
            Some(local) => {
                let mut changed = false;
                if remote.is_deprecated && !local.is_deprecated {
                    mark_deprecated(self.conn(), local.id).await?;
                    changed = true;
                } else if !remote.is_most_recent && local.is_most_recent {
                    changed = remove_head(self.conn(), local.path_id, local.id).await? > 0;
                }
                if changed {
                    RemoteOutcome::Updated
                } else {
                    RemoteOutcome::Unchanged
                }
            }
        };

        if outcome != RemoteOutcome::Unchanged {
            self.touch(StoreEventType::RemoteRevisionsApplied, &remote.book_id, remote.chapter_index);
        }
        Ok(outcome)
    }

    /// Commit a merged revision over one member of a conflict group
    ///
    /// The merged value supplies content, placement and flags; identity and
    /// lineage come from `over`.
    pub(crate) async fn commit_merged(
        &mut self,
        over: &Paragraph,
        merged: &Paragraph,
    ) -> Result<Paragraph> {
        self.store.check_fault()?;
        self.take_head(over).await?;

        let revision = Paragraph {
            id: RevisionId::new(),
            path_id: over.path_id,
            book_id: over.book_id.clone(),
            chapter_index: over.chapter_index,
            section_index: merged.section_index,
            index: merged.index,
            type_tag: over.type_tag.clone(),
            content: merged.content.clone(),
            range: merged.range,
            creator_id: merged.creator_id.clone(),
            parent_id: Some(over.id),
            created_at: now(),
            is_most_recent: merged.is_most_recent && !merged.is_deprecated,
            is_deprecated: merged.is_deprecated,
        };
        insert_revision_row(self.conn(), &revision).await?;
        if revision.is_deprecated {
            mark_deprecated(self.conn(), revision.id).await?;
        } else if revision.is_most_recent {
            add_head(self.conn(), revision.path_id, revision.id).await?;
        }

        self.touch(StoreEventType::ConflictsResolved, &revision.book_id, revision.chapter_index);
        Ok(revision)
    }

    /// Remove `over` from the head index, failing if it is not a head
    async fn take_head(&mut self, over: &Paragraph) -> Result<()> {
        let removed = remove_head(self.conn(), over.path_id, over.id).await?;
        if removed == 1 {
            return Ok(());
        }
        if fetch_revision(self.conn(), over.id).await?.is_none() {
            return Err(SyncError::RevisionNotFound {
                revision_id: over.id,
            });
        }
        Err(SyncError::StaleRevision {
            revision_id: over.id,
            path_id: over.path_id,
        })
    }

    /// Commit the transaction and notify subscribers
    pub async fn finish(self) -> Result<()> {
        let Self {
            store,
            tx,
            pending,
            mutations,
        } = self;
        tx.commit().await?;

        if mutations > 0 {
            tracing::debug!("[STORE] Scope committed with {} mutations", mutations);
        }
        for (event_type, book_id, chapter_index) in pending {
            store.publish(StoreEvent::new(event_type, book_id, chapter_index));
        }
        Ok(())
    }

    /// Discard every change made in this scope
    pub async fn rollback(self) -> Result<()> {
        if self.mutations > 0 {
            tracing::debug!("[STORE] Rolling back {} mutations", self.mutations);
        }
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn insert_revision_row(conn: &mut SqliteConnection, revision: &Paragraph) -> Result<()> {
    let content = serde_json::to_string(&revision.content)?;
    sqlx::query(
        "INSERT INTO revisions (
            id, path_id, book_id, chapter_index, section_index, paragraph_index,
            type_tag, content, range_start, range_end, creator_id, parent_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(revision.id.to_string())
    .bind(revision.path_id.to_string())
    .bind(&revision.book_id)
    .bind(i64::from(revision.chapter_index))
    .bind(i64::from(revision.section_index))
    .bind(i64::from(revision.index))
    .bind(&revision.type_tag)
    .bind(content)
    .bind(revision.range.map(|r| i64::from(r.start)))
    .bind(revision.range.map(|r| i64::from(r.end)))
    .bind(&revision.creator_id)
    .bind(revision.parent_id.map(|id| id.to_string()))
    .bind(format_timestamp(&revision.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn add_head(conn: &mut SqliteConnection, path_id: PathId, revision_id: RevisionId) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO path_heads (path_id, revision_id) VALUES (?, ?)")
        .bind(path_id.to_string())
        .bind(revision_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn remove_head(
    conn: &mut SqliteConnection,
    path_id: PathId,
    revision_id: RevisionId,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM path_heads WHERE path_id = ? AND revision_id = ?")
        .bind(path_id.to_string())
        .bind(revision_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn mark_deprecated(conn: &mut SqliteConnection, revision_id: RevisionId) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO deprecations (revision_id, deprecated_at) VALUES (?, ?)")
        .bind(revision_id.to_string())
        .bind(format_timestamp(&now()))
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM path_heads WHERE revision_id = ?")
        .bind(revision_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn has_children(conn: &mut SqliteConnection, revision_id: RevisionId) -> Result<bool> {
    let (exists,): (i64,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM revisions WHERE parent_id = ?)")
        .bind(revision_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists != 0)
}

async fn path_exists(conn: &mut SqliteConnection, path_id: PathId) -> Result<bool> {
    let (exists,): (i64,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM revisions WHERE path_id = ?)")
        .bind(path_id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists != 0)
}

impl RevisionStore {
    /// Commit new content over a live leaf in its own scope
    pub async fn commit(
        &self,
        over: &Paragraph,
        content: ParaContent,
        creator_id: &str,
    ) -> Result<Paragraph> {
        let mut scope = self.begin().await?;
        let revision = scope.commit(over, content, creator_id).await?;
        scope.finish().await?;
        Ok(revision)
    }

    /// Commit a placement-aware update over a live leaf in its own scope
    pub async fn commit_with(
        &self,
        over: &Paragraph,
        update: RevisionUpdate,
        creator_id: &str,
    ) -> Result<Paragraph> {
        let mut scope = self.begin().await?;
        let revision = scope.commit_with(over, update, creator_id).await?;
        scope.finish().await?;
        Ok(revision)
    }

    /// Create a new path in its own scope
    pub async fn insert(
        &self,
        candidate: &CandidateParagraph,
        path_id: PathId,
        placement: Placement,
        creator_id: &str,
    ) -> Result<Paragraph> {
        let mut scope = self.begin().await?;
        let revision = scope.insert(candidate, path_id, placement, creator_id).await?;
        scope.finish().await?;
        Ok(revision)
    }

    /// Deprecate a revision in its own scope
    pub async fn deprecate(&self, revision_id: RevisionId) -> Result<()> {
        let mut scope = self.begin().await?;
        scope.deprecate(revision_id).await?;
        scope.finish().await
    }

    /// Deprecate a whole path in its own scope
    pub async fn deprecate_path(&self, path_id: PathId) -> Result<usize> {
        let mut scope = self.begin().await?;
        let count = scope.deprecate_path(path_id).await?;
        scope.finish().await?;
        Ok(count)
    }

    /// Admit a batch of replicated revisions atomically
    pub async fn apply_remote(&self, revisions: &[Paragraph]) -> Result<Vec<RemoteOutcome>> {
        let mut scope = self.begin().await?;
        let mut outcomes = Vec::with_capacity(revisions.len());
        for revision in revisions {
            outcomes.push(scope.apply_remote(revision).await?);
        }
        scope.finish().await?;
        tracing::info!("[STORE] Applied {} replicated revisions", revisions.len());
        Ok(outcomes)
    }
}
