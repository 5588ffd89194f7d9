//! # Path Binding Storage
//!
//! Persists [`PathBinding`]s and resolves a target paragraph to the current
//! revisions of the source paragraphs it is bound to.
//!
//! Bindings are not versioned: saving a binding replaces whatever was stored
//! for the same target/source book pair.

use crate::local_db::paragraphs::{fetch_most_recent, format_timestamp, now};
use crate::local_db::RevisionStore;
use crate::shared::binding::{PathBinding, PathLink};
use crate::shared::paragraph::{Paragraph, PathId};
use crate::shared::{Result, SyncError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

impl RevisionStore {
    /// Store a binding, replacing any binding between the same two books
    pub async fn save_binding(&self, binding: &PathBinding) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM path_binding_links WHERE binding_id IN (
                SELECT id FROM path_bindings WHERE id = ? OR (target_book_id = ? AND source_book_id = ?)
            )",
        )
        .bind(binding.id.to_string())
        .bind(&binding.target_book_id)
        .bind(&binding.source_book_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM path_bindings WHERE id = ? OR (target_book_id = ? AND source_book_id = ?)")
            .bind(binding.id.to_string())
            .bind(&binding.target_book_id)
            .bind(&binding.source_book_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO path_bindings (id, target_book_id, source_book_id, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(binding.id.to_string())
        .bind(&binding.target_book_id)
        .bind(&binding.source_book_id)
        .bind(format_timestamp(&now()))
        .execute(&mut *tx)
        .await?;

        for (position, link) in binding.links.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO path_binding_links (binding_id, position, target_path_id, source_path_id)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(binding.id.to_string())
            .bind(i64::try_from(position)?)
            .bind(link.target.to_string())
            .bind(link.source.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            "[STORE] Saved binding {} -> {} with {} links",
            binding.target_book_id,
            binding.source_book_id,
            binding.links.len()
        );
        Ok(())
    }

    /// The binding between a target book and a source book, if any
    pub async fn binding_for(
        &self,
        target_book_id: &str,
        source_book_id: &str,
    ) -> Result<Option<PathBinding>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT id, target_book_id, source_book_id FROM path_bindings
             WHERE target_book_id = ? AND source_book_id = ?",
        )
        .bind(target_book_id)
        .bind(source_book_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(load_binding(&mut conn, &row).await?)),
            None => Ok(None),
        }
    }

    /// Every binding whose target is the given book
    pub async fn bindings_for_target(&self, target_book_id: &str) -> Result<Vec<PathBinding>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            "SELECT id, target_book_id, source_book_id FROM path_bindings
             WHERE target_book_id = ?
             ORDER BY source_book_id",
        )
        .bind(target_book_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut bindings = Vec::with_capacity(rows.len());
        for row in &rows {
            bindings.push(load_binding(&mut conn, row).await?);
        }
        Ok(bindings)
    }

    /// Delete a binding and its links
    pub async fn delete_binding(&self, binding_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM path_binding_links WHERE binding_id = ?")
            .bind(binding_id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM path_bindings WHERE id = ?")
            .bind(binding_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Current source revisions bound to a target path
    ///
    /// Source paths without a live leaf in the chapter are skipped.
    pub async fn associated_sources(
        &self,
        binding: &PathBinding,
        chapter_index: u32,
        target_path: PathId,
    ) -> Result<Vec<Paragraph>> {
        let mut conn = self.pool.acquire().await?;
        let mut sources = Vec::new();
        for source_path in binding.sources_for_target(&target_path) {
            if let Some(paragraph) =
                fetch_most_recent(&mut conn, &binding.source_book_id, chapter_index, source_path)
                    .await?
            {
                sources.push(paragraph);
            }
        }
        Ok(sources)
    }
}

async fn load_binding(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<PathBinding> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)?;

    let link_rows = sqlx::query(
        "SELECT target_path_id, source_path_id FROM path_binding_links
         WHERE binding_id = ?
         ORDER BY position",
    )
    .bind(id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut links = Vec::with_capacity(link_rows.len());
    for link in &link_rows {
        let target: String = link.try_get("target_path_id")?;
        let source: String = link.try_get("source_path_id")?;
        links.push(PathLink {
            target: PathId::parse(&target)?,
            source: PathId::parse(&source)?,
        });
    }

    let binding = PathBinding {
        id,
        target_book_id: row.try_get("target_book_id")?,
        source_book_id: row.try_get("source_book_id")?,
        links,
    };
    if binding.target_book_id == binding.source_book_id {
        return Err(SyncError::corrupt(format!(
            "binding {} links book '{}' to itself",
            binding.id, binding.target_book_id
        )));
    }
    Ok(binding)
}
