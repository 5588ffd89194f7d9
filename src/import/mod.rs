//! # Chapter Import
//!
//! Matching and reconciliation of re-imported chapters.
//!
//! ## Key Components
//!
//! - `similarity.rs`: word-level text similarity
//! - `matcher.rs`: exact-count, anchor and residual matching stages
//! - `plan.rs`: match plans and their resolution into store mutations
//! - `reconciliation.rs`: atomic application of a plan to the store

pub mod similarity;
pub mod matcher;
pub mod plan;
pub mod reconciliation;

pub use matcher::ParagraphMatcher;
pub use plan::{MatchPlan, MatchedPair, PlannedMutation, SimilarityLink};
pub use reconciliation::{ReconcileSummary, ReconciliationEngine};
