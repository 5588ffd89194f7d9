//! Text similarity used by the residual matching pass.

use crate::shared::paragraph::ParaContent;
use similar::TextDiff;

/// Collapse whitespace and case so layout-only edits score as equal
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word-level similarity of two texts in `[0, 1]`
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let (a, b) = (normalize(a), normalize(b));
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    TextDiff::from_words(a.as_str(), b.as_str()).ratio()
}

/// Similarity of two paragraph contents, compared by their plain text
pub fn content_similarity(a: &ParaContent, b: &ParaContent) -> f32 {
    text_similarity(&a.text(), &b.text())
}
