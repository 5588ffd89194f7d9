//! # Conflict Groups and Mergers
//!
//! A [`ConflictGroup`] is the set of live leaves one path ended up with after
//! replication. A [`Merger`] collapses a group into one representative
//! revision; the resolver commits that representative and deprecates the
//! rest of the group.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parasync::sync::{paragraph_merger, ConflictGroup};
//!
//! # fn example(group: ConflictGroup) {
//! let merged = paragraph_merger(&group);
//! assert!(merged.is_most_recent);
//! # }
//! ```

use crate::shared::paragraph::{Paragraph, PathId};
use std::sync::Arc;

/// Merge policy for one content type
pub type Merger = Arc<dyn Fn(&ConflictGroup) -> Paragraph + Send + Sync>;

/// Live leaves sharing one path id; always at least two
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictGroup {
    path_id: PathId,
    members: Vec<Paragraph>,
}

impl ConflictGroup {
    /// Build a group, or `None` when fewer than two members are given
    pub fn new(path_id: PathId, members: Vec<Paragraph>) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        Some(Self { path_id, members })
    }

    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    pub fn members(&self) -> &[Paragraph] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Never true; groups hold at least two members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn first(&self) -> &Paragraph {
        &self.members[0]
    }

    /// Book of the group's first member
    pub fn book_id(&self) -> &str {
        &self.first().book_id
    }

    /// Most recently created member; ties go to the later position
    pub fn latest(&self) -> &Paragraph {
        self.members
            .iter()
            .enumerate()
            .max_by_key(|(position, member)| (member.created_at, *position))
            .map(|(_, member)| member)
            .unwrap_or_else(|| self.first())
    }

    /// The type tag shared by every member, if they agree
    pub fn shared_type_tag(&self) -> Option<&str> {
        let tag = self.first().type_tag.as_str();
        self.members
            .iter()
            .all(|member| member.type_tag == tag)
            .then_some(tag)
    }
}

/// Default merge policy for paragraphs
///
/// The result is most-recent if any member is, deprecated only if every
/// member is, and takes all other fields from the first member.
pub fn paragraph_merger(group: &ConflictGroup) -> Paragraph {
    let mut merged = group.first().clone();
    merged.is_most_recent = group.members().iter().any(|m| m.is_most_recent);
    merged.is_deprecated = group.members().iter().all(|m| m.is_deprecated);
    merged
}
