//! # Paragraph Queries
//!
//! Read access to the revision history. The helpers take a plain
//! `SqliteConnection` so that a [`StoreScope`](super::StoreScope) can run
//! them inside its transaction; the public methods on [`RevisionStore`] run
//! them on a pooled connection.
//!
//! Reads reflect the store as of the call. Two calls may observe different
//! states if a scope commits in between.

use crate::local_db::RevisionStore;
use crate::shared::paragraph::{ParaContent, Paragraph, PathId, RevisionId, SourceRange};
use crate::shared::Result;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;

/// Columns of a paragraph read, with derived head/deprecation flags
macro_rules! select_paragraphs {
    ($tail:literal) => {
        concat!(
            "SELECT r.id, r.path_id, r.book_id, r.chapter_index, r.section_index,
                    r.paragraph_index, r.type_tag, r.content, r.range_start, r.range_end,
                    r.creator_id, r.parent_id, r.created_at,
                    EXISTS (SELECT 1 FROM path_heads h WHERE h.revision_id = r.id) AS is_most_recent,
                    EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = r.id) AS is_deprecated
             FROM revisions r ",
            $tail
        )
    };
}

/// Storage form of revision timestamps; lexical order matches time order
///
/// Always nine fractional digits, so replicated timestamps read back exactly.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Current time at the precision the store keeps
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(9)
}

/// Decode one row selected with `select_paragraphs!`
pub(crate) fn paragraph_from_row(row: &SqliteRow) -> Result<Paragraph> {
    let id: String = row.try_get("id")?;
    let path_id: String = row.try_get("path_id")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let content: String = row.try_get("content")?;
    let created_at: String = row.try_get("created_at")?;

    let range_start: Option<i64> = row.try_get("range_start")?;
    let range_end: Option<i64> = row.try_get("range_end")?;
    let range = match (range_start, range_end) {
        (Some(start), Some(end)) => Some(SourceRange::new(u32::try_from(start)?, u32::try_from(end)?)),
        _ => None,
    };

    let is_most_recent: i64 = row.try_get("is_most_recent")?;
    let is_deprecated: i64 = row.try_get("is_deprecated")?;

    Ok(Paragraph {
        id: RevisionId::parse(&id)?,
        path_id: PathId::parse(&path_id)?,
        book_id: row.try_get("book_id")?,
        chapter_index: u32::try_from(row.try_get::<i64, _>("chapter_index")?)?,
        section_index: u32::try_from(row.try_get::<i64, _>("section_index")?)?,
        index: u32::try_from(row.try_get::<i64, _>("paragraph_index")?)?,
        type_tag: row.try_get("type_tag")?,
        content: serde_json::from_str::<ParaContent>(&content)?,
        range,
        creator_id: row.try_get("creator_id")?,
        parent_id: parent_id.as_deref().map(RevisionId::parse).transpose()?,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        is_most_recent: is_most_recent != 0,
        is_deprecated: is_deprecated != 0,
    })
}

fn decode_all(rows: &[SqliteRow]) -> Result<Vec<Paragraph>> {
    rows.iter().map(paragraph_from_row).collect()
}

fn group_by_path(paragraphs: Vec<Paragraph>) -> BTreeMap<PathId, Vec<Paragraph>> {
    let mut groups: BTreeMap<PathId, Vec<Paragraph>> = BTreeMap::new();
    for paragraph in paragraphs {
        groups.entry(paragraph.path_id).or_default().push(paragraph);
    }
    groups
}

pub(crate) async fn fetch_revision(
    conn: &mut SqliteConnection,
    revision_id: RevisionId,
) -> Result<Option<Paragraph>> {
    let row = sqlx::query(select_paragraphs!("WHERE r.id = ?"))
        .bind(revision_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(paragraph_from_row).transpose()
}

pub(crate) async fn fetch_most_recent(
    conn: &mut SqliteConnection,
    book_id: &str,
    chapter_index: u32,
    path_id: PathId,
) -> Result<Option<Paragraph>> {
    // With a conflicted path the newest live leaf answers
    let row = sqlx::query(select_paragraphs!(
        "WHERE r.book_id = ? AND r.chapter_index = ? AND r.path_id = ?
           AND EXISTS (SELECT 1 FROM path_heads h WHERE h.revision_id = r.id)
           AND NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = r.id)
         ORDER BY r.created_at DESC, r.seq DESC
         LIMIT 1"
    ))
    .bind(book_id)
    .bind(i64::from(chapter_index))
    .bind(path_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(paragraph_from_row).transpose()
}

pub(crate) async fn fetch_leaves(
    conn: &mut SqliteConnection,
    book_id: &str,
    chapter_index: u32,
) -> Result<Vec<Paragraph>> {
    let rows = sqlx::query(select_paragraphs!(
        "WHERE r.book_id = ? AND r.chapter_index = ?
           AND EXISTS (SELECT 1 FROM path_heads h WHERE h.revision_id = r.id)
           AND NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = r.id)
         ORDER BY r.paragraph_index, r.created_at, r.seq"
    ))
    .bind(book_id)
    .bind(i64::from(chapter_index))
    .fetch_all(&mut *conn)
    .await?;
    decode_all(&rows)
}

pub(crate) async fn fetch_path_history(
    conn: &mut SqliteConnection,
    path_id: PathId,
) -> Result<Vec<Paragraph>> {
    let rows = sqlx::query(select_paragraphs!("WHERE r.path_id = ? ORDER BY r.created_at, r.seq"))
        .bind(path_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    decode_all(&rows)
}

pub(crate) async fn fetch_book_conflicts(
    conn: &mut SqliteConnection,
    book_id: &str,
) -> Result<BTreeMap<PathId, Vec<Paragraph>>> {
    let rows = sqlx::query(select_paragraphs!(
        "WHERE r.book_id = ?
           AND EXISTS (SELECT 1 FROM path_heads h WHERE h.revision_id = r.id)
           AND NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = r.id)
           AND r.path_id IN (
               SELECT h.path_id FROM path_heads h
               WHERE NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = h.revision_id)
               GROUP BY h.path_id HAVING COUNT(*) > 1
           )
         ORDER BY r.path_id, r.created_at, r.seq"
    ))
    .bind(book_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(group_by_path(decode_all(&rows)?))
}

pub(crate) async fn fetch_all_conflicts(
    conn: &mut SqliteConnection,
) -> Result<BTreeMap<PathId, Vec<Paragraph>>> {
    let rows = sqlx::query(select_paragraphs!(
        "WHERE EXISTS (SELECT 1 FROM path_heads h WHERE h.revision_id = r.id)
           AND NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = r.id)
           AND r.path_id IN (
               SELECT h.path_id FROM path_heads h
               WHERE NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = h.revision_id)
               GROUP BY h.path_id HAVING COUNT(*) > 1
           )
         ORDER BY r.path_id, r.created_at, r.seq"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(group_by_path(decode_all(&rows)?))
}

impl RevisionStore {
    /// Look up a single revision by id, live or not
    pub async fn revision(&self, revision_id: RevisionId) -> Result<Option<Paragraph>> {
        let mut conn = self.pool.acquire().await?;
        fetch_revision(&mut conn, revision_id).await
    }

    /// The live leaf of a path, or `None` if the path has no live revision
    pub async fn most_recent(
        &self,
        book_id: &str,
        chapter_index: u32,
        path_id: PathId,
    ) -> Result<Option<Paragraph>> {
        let mut conn = self.pool.acquire().await?;
        fetch_most_recent(&mut conn, book_id, chapter_index, path_id).await
    }

    /// All live leaves of a chapter, ordered by paragraph index
    pub async fn leaves(&self, book_id: &str, chapter_index: u32) -> Result<Vec<Paragraph>> {
        let mut conn = self.pool.acquire().await?;
        fetch_leaves(&mut conn, book_id, chapter_index).await
    }

    /// Every revision of a path, oldest first
    pub async fn history(&self, path_id: PathId) -> Result<Vec<Paragraph>> {
        let mut conn = self.pool.acquire().await?;
        fetch_path_history(&mut conn, path_id).await
    }

    /// Paths of a book with more than one live leaf
    pub async fn history_conflicts(&self, book_id: &str) -> Result<BTreeMap<PathId, Vec<Paragraph>>> {
        let mut conn = self.pool.acquire().await?;
        fetch_book_conflicts(&mut conn, book_id).await
    }

    /// Conflicted paths across every book in the store
    pub async fn all_history_conflicts(&self) -> Result<BTreeMap<PathId, Vec<Paragraph>>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all_conflicts(&mut conn).await
    }
}
