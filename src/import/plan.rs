//! # Match Plans
//!
//! A [`MatchPlan`] is the matcher's output: a disjoint partition of the
//! existing leaves and the incoming candidates, plus the similarity links found
//! between the residual items. [`MatchPlan::resolve`] turns it into the ordered
//! list of store mutations the reconciliation engine applies.
//!
//! ## Resolution
//!
//! Confident single matches become commits. Each unmatched incoming item is
//! then resolved by the number of existing items linked to it:
//! - no links: insert as a new path
//! - one link to an unclaimed existing item: commit over it and claim it
//! - otherwise: insert as a new path and deprecate every linked existing
//!   item that is still unclaimed
//!
//! Existing items that end up neither committed over nor deprecated by a
//! link are deprecated last. An existing item is touched by at most one
//! mutation.

use crate::shared::paragraph::{CandidateParagraph, Paragraph};
use serde::Serialize;
use std::collections::HashSet;

/// A confident one-to-one correspondence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPair {
    /// Position of the existing leaf in the matcher's input
    pub existing_position: usize,
    /// Position of the candidate in the matcher's input
    pub incoming_position: usize,
    pub existing: Paragraph,
    pub incoming: CandidateParagraph,
}

/// Similarity link between two residual items
///
/// Indices point into [`MatchPlan::unmatched_existing`] and
/// [`MatchPlan::unmatched_incoming`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityLink {
    pub existing: usize,
    pub incoming: usize,
    pub score: f32,
}

/// Disjoint partition of one chapter's existing and incoming paragraphs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchPlan {
    pub single_matches: Vec<MatchedPair>,
    pub unmatched_existing: Vec<Paragraph>,
    pub unmatched_incoming: Vec<CandidateParagraph>,
    pub links: Vec<SimilarityLink>,
}

/// One store mutation derived from a plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedMutation {
    /// Commit the candidate over an existing live leaf
    Commit {
        over: Paragraph,
        candidate: CandidateParagraph,
    },
    /// Create a new path for the candidate
    Insert { candidate: CandidateParagraph },
    /// Deprecate an existing live leaf
    Deprecate { revision: Paragraph },
}

impl MatchPlan {
    /// Existing items linked to the given residual incoming item
    pub fn links_for_incoming(&self, incoming: usize) -> Vec<usize> {
        self.links
            .iter()
            .filter(|link| link.incoming == incoming)
            .map(|link| link.existing)
            .collect()
    }

    /// Incoming items linked to the given residual existing item
    pub fn links_for_existing(&self, existing: usize) -> Vec<usize> {
        self.links
            .iter()
            .filter(|link| link.existing == existing)
            .map(|link| link.incoming)
            .collect()
    }

    /// Apply the resolution policy, producing mutations in application order
    pub fn resolve(&self) -> Vec<PlannedMutation> {
        let mut mutations: Vec<PlannedMutation> = self
            .single_matches
            .iter()
            .map(|pair| PlannedMutation::Commit {
                over: pair.existing.clone(),
                candidate: pair.incoming.clone(),
            })
            .collect();

        let mut claimed: HashSet<usize> = HashSet::new();
        let mut superseded: Vec<usize> = Vec::new();

        for (incoming_index, candidate) in self.unmatched_incoming.iter().enumerate() {
            let mut linked = self.links_for_incoming(incoming_index);
            linked.sort_unstable();
            linked.dedup();

            match linked.as_slice() {
                [] => mutations.push(PlannedMutation::Insert {
                    candidate: candidate.clone(),
                }),
                [existing_index] if !claimed.contains(existing_index) => {
                    claimed.insert(*existing_index);
                    mutations.push(PlannedMutation::Commit {
                        over: self.unmatched_existing[*existing_index].clone(),
                        candidate: candidate.clone(),
                    });
                }
                _ => {
                    mutations.push(PlannedMutation::Insert {
                        candidate: candidate.clone(),
                    });
                    for &existing_index in linked.iter() {
                        if claimed.insert(existing_index) {
                            superseded.push(existing_index);
                        }
                    }
                }
            }
        }

        for existing_index in superseded {
            mutations.push(PlannedMutation::Deprecate {
                revision: self.unmatched_existing[existing_index].clone(),
            });
        }
        for (existing_index, revision) in self.unmatched_existing.iter().enumerate() {
            if !claimed.contains(&existing_index) {
                mutations.push(PlannedMutation::Deprecate {
                    revision: revision.clone(),
                });
            }
        }

        mutations
    }
}
