//! # Paragraph Matcher
//!
//! Decides which incoming paragraphs of a re-imported chapter correspond to
//! which existing live leaves. Matching runs in three stages, each working
//! only on what the previous stages left unmatched:
//!
//! 1. **Exact count**: equal lengths pair up by position.
//! 2. **Anchors**: an order-preserving scan pairs items with equal source
//!    ranges or equal content. Anchors never cross.
//! 3. **Residual links**: similarity links between the leftovers, possibly
//!    many-to-many, for [`MatchPlan::resolve`] to interpret.
//!
//! The matcher is pure: it reads its inputs and never touches the store.

use crate::import::plan::{MatchPlan, MatchedPair, SimilarityLink};
use crate::import::similarity::content_similarity;
use crate::shared::config::{AmbiguityPolicy, MatcherConfig};
use crate::shared::paragraph::{CandidateParagraph, Paragraph};
use crate::shared::{Result, SyncError};

/// Existing-to-incoming paragraph matcher
#[derive(Debug, Clone, Default)]
pub struct ParagraphMatcher {
    config: MatcherConfig,
}

impl ParagraphMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Partition `existing` and `incoming` into matches and leftovers
    ///
    /// Fails with `MatchFailure` when the residual links are tangled and the
    /// ambiguity policy is `Reject`.
    pub fn match_paragraphs(
        &self,
        existing: &[Paragraph],
        incoming: &[CandidateParagraph],
    ) -> Result<MatchPlan> {
        if existing.len() == incoming.len() {
            tracing::debug!("[MATCH] Equal counts ({}), pairing by position", existing.len());
            return Ok(pair_by_position(existing, incoming));
        }

        let mut plan = anchor_pass(existing, incoming);
        if !plan.unmatched_existing.is_empty() && !plan.unmatched_incoming.is_empty() {
            plan.links = self.residual_links(&plan.unmatched_existing, &plan.unmatched_incoming);
            if self.config.ambiguity == AmbiguityPolicy::Reject {
                check_ambiguity(&plan)?;
            }
        }

        tracing::debug!(
            "[MATCH] {} anchors, {} unmatched existing, {} unmatched incoming, {} links",
            plan.single_matches.len(),
            plan.unmatched_existing.len(),
            plan.unmatched_incoming.len(),
            plan.links.len()
        );
        Ok(plan)
    }

    fn residual_links(
        &self,
        existing: &[Paragraph],
        incoming: &[CandidateParagraph],
    ) -> Vec<SimilarityLink> {
        let mut links = Vec::new();
        for (incoming_index, candidate) in incoming.iter().enumerate() {
            for (existing_index, paragraph) in existing.iter().enumerate() {
                let score = content_similarity(&paragraph.content, &candidate.content);
                if score >= self.config.similarity_threshold {
                    links.push(SimilarityLink {
                        existing: existing_index,
                        incoming: incoming_index,
                        score,
                    });
                }
            }
        }
        links
    }
}

fn pair_by_position(existing: &[Paragraph], incoming: &[CandidateParagraph]) -> MatchPlan {
    MatchPlan {
        single_matches: existing
            .iter()
            .zip(incoming)
            .enumerate()
            .map(|(position, (paragraph, candidate))| MatchedPair {
                existing_position: position,
                incoming_position: position,
                existing: paragraph.clone(),
                incoming: candidate.clone(),
            })
            .collect(),
        ..Default::default()
    }
}

/// Equal source ranges or identical content
fn is_anchor(paragraph: &Paragraph, candidate: &CandidateParagraph) -> bool {
    let same_range = matches!(
        (paragraph.range, candidate.range),
        (Some(a), Some(b)) if a == b
    );
    same_range || paragraph.content == candidate.content
}

fn anchor_pass(existing: &[Paragraph], incoming: &[CandidateParagraph]) -> MatchPlan {
    let mut plan = MatchPlan::default();
    let mut cursor = 0;

    for (existing_position, paragraph) in existing.iter().enumerate() {
        let found = incoming[cursor..]
            .iter()
            .position(|candidate| is_anchor(paragraph, candidate))
            .map(|offset| cursor + offset);

        match found {
            Some(incoming_position) => {
                plan.unmatched_incoming
                    .extend(incoming[cursor..incoming_position].iter().cloned());
                plan.single_matches.push(MatchedPair {
                    existing_position,
                    incoming_position,
                    existing: paragraph.clone(),
                    incoming: incoming[incoming_position].clone(),
                });
                cursor = incoming_position + 1;
            }
            None => plan.unmatched_existing.push(paragraph.clone()),
        }
    }
    plan.unmatched_incoming
        .extend(incoming[cursor..].iter().cloned());
    plan
}

/// Reject links whose both ends carry other links too
///
/// Splits (one existing, many incoming) and merges (many existing, one
/// incoming) are fine; a link inside a many-to-many tangle is not.
fn check_ambiguity(plan: &MatchPlan) -> Result<()> {
    for link in &plan.links {
        let existing_degree = plan.links_for_existing(link.existing).len();
        let incoming_degree = plan.links_for_incoming(link.incoming).len();
        if existing_degree > 1 && incoming_degree > 1 {
            return Err(SyncError::match_failure(format!(
                "residual paragraph {} and incoming paragraph {} are both linked many-to-many",
                plan.unmatched_existing[link.existing].path_id,
                plan.unmatched_incoming[link.incoming].index
            )));
        }
    }
    Ok(())
}
