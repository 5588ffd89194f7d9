//! # Conflict Resolution
//!
//! Collapses conflict groups left behind by replication. Merge policy is
//! registered per content type tag; groups without a registered merger are
//! reported as unresolved and retried on the next run.
//!
//! ## Features
//!
//! - **Per-type Mergers**: `add_merger(type_tag, fn)` before the first run
//! - **Atomic Groups**: each group is merged inside its own store scope
//! - **Isolation**: a failing group is reported and the run continues
//! - **Idempotence**: a run with no conflicts changes nothing and returns 0
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parasync::local_db::RevisionStore;
//! use parasync::sync::ConflictResolver;
//!
//! # async fn example() -> parasync::shared::Result<()> {
//! let store = RevisionStore::in_memory().await?;
//! let mut resolver = ConflictResolver::with_default_mergers(store);
//! let resolved = resolver.run().await?;
//! println!("Resolved {} conflicts, {} left", resolved, resolver.unresolved().len());
//! # Ok(())
//! # }
//! ```

use crate::local_db::RevisionStore;
use crate::shared::paragraph::{PathId, PARAGRAPH_TYPE};
use crate::shared::{Result, SyncError};
use crate::sync::merger::{paragraph_merger, ConflictGroup, Merger};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Why a conflict group was left alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum UnresolvedReason {
    /// No merger registered for the group's type tag
    NoMerger(String),
    /// Members disagree on their type tag
    MixedTypes(Vec<String>),
    /// A member stopped being a live leaf during the run
    Stale,
    /// The store failed while merging
    StoreFailure(String),
}

/// A conflict group the last run could not collapse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedConflict {
    pub path_id: PathId,
    pub book_id: String,
    pub chapter_index: u32,
    pub member_count: usize,
    pub reason: UnresolvedReason,
}

/// Outcome of one resolver run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub resolved: usize,
    pub unresolved: Vec<UnresolvedConflict>,
}

/// Conflict resolver over one revision store
pub struct ConflictResolver {
    store: RevisionStore,
    mergers: HashMap<String, Merger>,
    unresolved: Vec<UnresolvedConflict>,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.mergers.keys().collect();
        tags.sort();
        f.debug_struct("ConflictResolver")
            .field("mergers", &tags)
            .field("unresolved", &self.unresolved.len())
            .finish()
    }
}

impl ConflictResolver {
    /// Resolver with no mergers registered
    pub fn new(store: RevisionStore) -> Self {
        Self {
            store,
            mergers: HashMap::new(),
            unresolved: Vec::new(),
        }
    }

    /// Resolver with the built-in paragraph merger registered
    pub fn with_default_mergers(store: RevisionStore) -> Self {
        let mut resolver = Self::new(store);
        resolver.add_merger(PARAGRAPH_TYPE, paragraph_merger);
        resolver
    }

    /// Register or replace the merger for a type tag
    pub fn add_merger<F>(&mut self, type_tag: impl Into<String>, merger: F)
    where
        F: Fn(&ConflictGroup) -> crate::shared::Paragraph + Send + Sync + 'static,
    {
        let type_tag = type_tag.into();
        tracing::debug!("[RESOLVER] Registered merger for '{}'", type_tag);
        self.mergers.insert(type_tag, Arc::new(merger));
    }

    pub fn has_merger(&self, type_tag: &str) -> bool {
        self.mergers.contains_key(type_tag)
    }

    /// Conflicts the most recent run left unresolved
    pub fn unresolved(&self) -> &[UnresolvedConflict] {
        &self.unresolved
    }

    /// Resolve every conflict group, returning how many were collapsed
    pub async fn run(&mut self) -> Result<usize> {
        Ok(self.run_with_report().await?.resolved)
    }

    /// Resolve every conflict group and report what was left
    pub async fn run_with_report(&mut self) -> Result<ResolutionReport> {
        let conflicts = self.store.all_history_conflicts().await?;
        let mut report = ResolutionReport::default();

        if conflicts.is_empty() {
            tracing::debug!("[RESOLVER] No conflicts");
            self.unresolved.clear();
            return Ok(report);
        }
        tracing::info!("[RESOLVER] Resolving {} conflict groups", conflicts.len());

        for (path_id, members) in conflicts {
            let Some(group) = ConflictGroup::new(path_id, members) else {
                continue;
            };

            let merger = match group.shared_type_tag() {
                Some(tag) => match self.mergers.get(tag) {
                    Some(merger) => Arc::clone(merger),
                    None => {
                        report.unresolved.push(unresolved(&group, UnresolvedReason::NoMerger(tag.to_string())));
                        continue;
                    }
                },
                None => {
                    let mut tags: Vec<String> =
                        group.members().iter().map(|m| m.type_tag.clone()).collect();
                    tags.sort();
                    tags.dedup();
                    report.unresolved.push(unresolved(&group, UnresolvedReason::MixedTypes(tags)));
                    continue;
                }
            };

            match self.resolve_group(&group, &merger).await {
                Ok(()) => report.resolved += 1,
                Err(SyncError::StaleRevision { .. }) => {
                    report.unresolved.push(unresolved(&group, UnresolvedReason::Stale));
                }
                Err(error) => {
                    tracing::warn!("[RESOLVER] Failed to merge path {}: {}", path_id, error);
                    report
                        .unresolved
                        .push(unresolved(&group, UnresolvedReason::StoreFailure(error.to_string())));
                }
            }
        }

        for conflict in &report.unresolved {
            tracing::warn!(
                "[RESOLVER] Path {} in {} left unresolved: {:?}",
                conflict.path_id,
                conflict.book_id,
                conflict.reason
            );
        }
        tracing::info!(
            "[RESOLVER] Resolved {} groups, {} unresolved",
            report.resolved,
            report.unresolved.len()
        );

        self.unresolved = report.unresolved.clone();
        Ok(report)
    }

    /// Commit the merged value over the newest member and deprecate the others
    async fn resolve_group(&self, group: &ConflictGroup, merger: &Merger) -> Result<()> {
        let merged = merger(group);
        let latest = group.latest();

        let mut scope = self.store.begin().await?;
        let applied = async {
            let revision = scope.commit_merged(latest, &merged).await?;
            for member in group.members().iter().filter(|m| m.id != latest.id) {
                scope.deprecate(member.id).await?;
            }
            Ok::<_, SyncError>(revision)
        }
        .await;

        match applied {
            Ok(revision) => {
                scope.finish().await?;
                tracing::debug!(
                    "[RESOLVER] Merged {} revisions of path {} into {}",
                    group.len(),
                    group.path_id(),
                    revision.id
                );
                Ok(())
            }
            Err(error) => {
                if let Err(rollback_error) = scope.rollback().await {
                    tracing::error!("[RESOLVER] Rollback failed: {}", rollback_error);
                }
                Err(error)
            }
        }
    }
}

fn unresolved(group: &ConflictGroup, reason: UnresolvedReason) -> UnresolvedConflict {
    UnresolvedConflict {
        path_id: group.path_id(),
        book_id: group.book_id().to_string(),
        chapter_index: group.first().chapter_index,
        member_count: group.len(),
        reason,
    }
}
