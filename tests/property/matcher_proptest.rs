//! Property-based tests for the paragraph matcher

use chrono::Utc;
use parasync::import::{ParagraphMatcher, PlannedMutation};
use parasync::shared::{CandidateParagraph, ParaContent, Paragraph, PathId, RevisionId, PARAGRAPH_TYPE};
use proptest::prelude::*;
use std::collections::HashSet;

fn existing(texts: &[String]) -> Vec<Paragraph> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Paragraph {
            id: RevisionId::new(),
            path_id: PathId::new(),
            book_id: "gen".to_string(),
            chapter_index: 1,
            section_index: 0,
            index: i as u32,
            type_tag: PARAGRAPH_TYPE.to_string(),
            content: ParaContent::plain(text.clone()),
            range: None,
            creator_id: "alice".to_string(),
            parent_id: None,
            created_at: Utc::now(),
            is_most_recent: true,
            is_deprecated: false,
        })
        .collect()
}

fn incoming(texts: &[String]) -> Vec<CandidateParagraph> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| CandidateParagraph::new(i as u32, ParaContent::plain(text.clone())))
        .collect()
}

/// Short texts over a small vocabulary so equal and similar texts are common
fn texts() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(vec!["alpha", "beta", "gamma", "delta"]), 1..4)
            .prop_map(|words| words.join(" ")),
        0..8,
    )
}

proptest! {
    #[test]
    fn test_single_matches_never_cross(old in texts(), new in texts()) {
        let existing = existing(&old);
        let incoming = incoming(&new);
        let plan = ParagraphMatcher::default().match_paragraphs(&existing, &incoming).unwrap();

        for a in &plan.single_matches {
            for b in &plan.single_matches {
                if a.existing_position < b.existing_position {
                    prop_assert!(a.incoming_position < b.incoming_position);
                }
            }
        }
    }

    #[test]
    fn test_plan_partitions_inputs(old in texts(), new in texts()) {
        let existing = existing(&old);
        let incoming = incoming(&new);
        let plan = ParagraphMatcher::default().match_paragraphs(&existing, &incoming).unwrap();

        prop_assert_eq!(plan.single_matches.len() + plan.unmatched_existing.len(), existing.len());
        prop_assert_eq!(plan.single_matches.len() + plan.unmatched_incoming.len(), incoming.len());

        let mut seen = HashSet::new();
        for id in plan
            .single_matches
            .iter()
            .map(|m| m.existing.id)
            .chain(plan.unmatched_existing.iter().map(|p| p.id))
        {
            prop_assert!(seen.insert(id));
        }

        let mut positions = HashSet::new();
        for m in &plan.single_matches {
            prop_assert!(positions.insert(m.incoming_position));
        }
    }

    #[test]
    fn test_resolution_accounts_for_everything(old in texts(), new in texts()) {
        let existing = existing(&old);
        let incoming = incoming(&new);
        let plan = ParagraphMatcher::default().match_paragraphs(&existing, &incoming).unwrap();
        let mutations = plan.resolve();

        let mut touched = HashSet::new();
        let mut placed = 0;
        for mutation in &mutations {
            match mutation {
                PlannedMutation::Commit { over, .. } => {
                    prop_assert!(touched.insert(over.id));
                    placed += 1;
                }
                PlannedMutation::Insert { .. } => placed += 1,
                PlannedMutation::Deprecate { revision } => {
                    prop_assert!(touched.insert(revision.id));
                }
            }
        }

        // Every candidate lands once and every existing leaf is handled once
        prop_assert_eq!(placed, incoming.len());
        prop_assert_eq!(touched.len(), existing.len());
    }
}
