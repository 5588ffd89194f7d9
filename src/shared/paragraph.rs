//! Paragraph Data Model
//!
//! Defines the revision record stored for every version of a logical paragraph,
//! the candidate paragraphs produced by an external parse pass, and the small
//! value types they share.
//!
//! A logical paragraph is identified by its [`PathId`]. Every edit creates a new
//! [`Paragraph`] revision on the same path, pointing back at its predecessor.
//! Revision records are never mutated in place: head and deprecation status are
//! derived by the store and filled into the `is_most_recent` / `is_deprecated`
//! flags when a record is read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type tag carried by ordinary paragraph revisions
pub const PARAGRAPH_TYPE: &str = "paragraph";

/// Default paragraph style for content produced without one
pub const NORMAL_STYLE: &str = "p";

/// Unique identifier of a single revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub Uuid);

impl RevisionId {
    /// Generate a fresh revision id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a revision id from its string form
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }
}

impl Default for RevisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable key shared by all revisions of the same logical paragraph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(pub Uuid);

impl PathId {
    /// Generate a fresh path id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a path id from its string form
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }
}

impl Default for PathId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Offset span of a paragraph within its source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// Inclusive start offset
    pub start: u32,
    /// Exclusive end offset
    pub end: u32,
}

impl SourceRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// One element of a paragraph's structured text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentElement {
    /// Running text with an optional character style
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        char_style: Option<String>,
    },
    /// Text belonging to a numbered verse
    Verse { number: String, text: String },
}

impl ContentElement {
    /// Plain text of the element
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text, .. } | Self::Verse { text, .. } => text,
        }
    }
}

/// Structured text payload of a paragraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParaContent {
    /// Paragraph style marker
    pub style: String,
    /// Ordered content elements
    pub elements: Vec<ContentElement>,
}

impl ParaContent {
    /// Content made of a single unstyled text element
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            style: NORMAL_STYLE.to_string(),
            elements: vec![ContentElement::Text {
                text: text.into(),
                char_style: None,
            }],
        }
    }

    /// Content made of numbered verses
    pub fn verses<I, N, T>(verses: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            style: NORMAL_STYLE.to_string(),
            elements: verses
                .into_iter()
                .map(|(number, text)| ContentElement::Verse {
                    number: number.into(),
                    text: text.into(),
                })
                .collect(),
        }
    }

    /// Plain-text rendering, elements separated by a single space
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .map(ContentElement::text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|e| e.text().trim().is_empty())
    }
}

impl Default for ParaContent {
    fn default() -> Self {
        Self {
            style: NORMAL_STYLE.to_string(),
            elements: Vec::new(),
        }
    }
}

/// Where a paragraph sits inside a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub book_id: String,
    pub chapter_index: u32,
    pub section_index: u32,
    pub index: u32,
}

/// A single revision of a logical paragraph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Revision-unique id
    pub id: RevisionId,
    /// Logical paragraph this revision belongs to
    pub path_id: PathId,
    pub book_id: String,
    pub chapter_index: u32,
    pub section_index: u32,
    /// Position within the chapter
    pub index: u32,
    /// Content type used to pick a merger
    pub type_tag: String,
    pub content: ParaContent,
    pub range: Option<SourceRange>,
    pub creator_id: String,
    /// Revision this one was committed over
    pub parent_id: Option<RevisionId>,
    pub created_at: DateTime<Utc>,
    /// Current head of its path's chain
    pub is_most_recent: bool,
    /// Permanently superseded or removed
    pub is_deprecated: bool,
}

impl Paragraph {
    /// A live leaf is a non-deprecated head revision
    pub fn is_live_leaf(&self) -> bool {
        self.is_most_recent && !self.is_deprecated
    }

    pub fn placement(&self) -> Placement {
        Placement {
            book_id: self.book_id.clone(),
            chapter_index: self.chapter_index,
            section_index: self.section_index,
            index: self.index,
        }
    }

    /// Whether the candidate would change nothing if committed over this revision
    pub fn same_payload_as(&self, candidate: &CandidateParagraph) -> bool {
        self.content == candidate.content
            && self.range == candidate.range
            && self.section_index == candidate.section_index
            && self.index == candidate.index
    }
}

/// A paragraph-shaped value from a parse pass, not yet admitted to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateParagraph {
    pub content: ParaContent,
    #[serde(default)]
    pub range: Option<SourceRange>,
    #[serde(default)]
    pub section_index: u32,
    /// Chapter-local position assigned by the producer
    pub index: u32,
    #[serde(default = "default_type_tag")]
    pub type_tag: String,
}

fn default_type_tag() -> String {
    PARAGRAPH_TYPE.to_string()
}

impl CandidateParagraph {
    pub fn new(index: u32, content: ParaContent) -> Self {
        Self {
            content,
            range: None,
            section_index: 0,
            index,
            type_tag: default_type_tag(),
        }
    }

    pub fn with_range(mut self, range: SourceRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_section(mut self, section_index: u32) -> Self {
        self.section_index = section_index;
        self
    }
}

/// Changes carried by a commit over an existing revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionUpdate {
    pub content: ParaContent,
    pub range: Option<SourceRange>,
    pub section_index: u32,
    pub index: u32,
}

impl RevisionUpdate {
    /// Keep the predecessor's placement and range, replace the content
    pub fn content_only(over: &Paragraph, content: ParaContent) -> Self {
        Self {
            content,
            range: over.range,
            section_index: over.section_index,
            index: over.index,
        }
    }
}

impl From<&CandidateParagraph> for RevisionUpdate {
    fn from(candidate: &CandidateParagraph) -> Self {
        Self {
            content: candidate.content.clone(),
            range: candidate.range,
            section_index: candidate.section_index,
            index: candidate.index,
        }
    }
}
