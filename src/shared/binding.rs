//! Path Bindings
//!
//! A binding connects the paths of one document (the target, e.g. a
//! translation) to the paths of another (the source it was made from). The
//! relation is many-to-many: one target paragraph may render several source
//! paragraphs and the other way round. Bindings are not versioned.

use crate::shared::paragraph::PathId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One target-to-source path link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathLink {
    pub target: PathId,
    pub source: PathId,
}

/// Many-to-many path relation between two books
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathBinding {
    pub id: Uuid,
    pub target_book_id: String,
    pub source_book_id: String,
    pub links: Vec<PathLink>,
}

impl PathBinding {
    pub fn new(target_book_id: impl Into<String>, source_book_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_book_id: target_book_id.into(),
            source_book_id: source_book_id.into(),
            links: Vec::new(),
        }
    }

    /// Add a link; duplicates are ignored
    pub fn bind(&mut self, target: PathId, source: PathId) -> bool {
        let link = PathLink { target, source };
        if self.links.contains(&link) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Remove a link, returning whether it existed
    pub fn unbind(&mut self, target: PathId, source: PathId) -> bool {
        let before = self.links.len();
        self.links.retain(|l| !(l.target == target && l.source == source));
        self.links.len() != before
    }

    /// Source paths bound to a target path, in link order
    pub fn sources_for_target(&self, target: &PathId) -> Vec<PathId> {
        self.links
            .iter()
            .filter(|l| &l.target == target)
            .map(|l| l.source)
            .collect()
    }

    /// Target paths bound to a source path, in link order
    pub fn targets_for_source(&self, source: &PathId) -> Vec<PathId> {
        self.links
            .iter()
            .filter(|l| &l.source == source)
            .map(|l| l.target)
            .collect()
    }
}
