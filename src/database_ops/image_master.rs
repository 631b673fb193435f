//! Paged reads (and optional write-back) against the image reference table.

use super::db::Db;
use crate::migration::traits::RecordSource;
use crate::migration::{PassKind, SourceRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

pub struct ImageTable {
    db: Db,
    table: String,
    source_pattern: String,
}

impl ImageTable {
    /// `table` must already be validated as a plain identifier.
    pub fn new(db: Db, table: impl Into<String>, source_pattern: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
            source_pattern: source_pattern.into(),
        }
    }
}

/// Row predicate of a pass. The source pass binds the URL pattern.
fn selection_filter(kind: PassKind) -> String {
    let column = kind.column();
    match kind {
        PassKind::ImagePath => format!("{column} IS NOT NULL"),
        PassKind::Source => format!("{column} IS NOT NULL AND {column} LIKE ?"),
    }
}

/// Page query for `kind`. Ordered by id so offsets stay stable between pages.
pub fn select_page_sql(table: &str, kind: PassKind) -> String {
    let column = kind.column();
    let filter = selection_filter(kind);
    format!(
        "SELECT CAST(id AS CHAR) AS id, {column} AS raw_path FROM {table} \
         WHERE {filter} ORDER BY id LIMIT ? OFFSET ?"
    )
}

pub fn update_column_sql(table: &str, kind: PassKind) -> String {
    format!("UPDATE {table} SET {} = ? WHERE id = ?", kind.column())
}

/// Whether `id` still matches the pass filter; the id is bound first.
pub fn still_selected_sql(table: &str, kind: PassKind) -> String {
    format!(
        "SELECT COUNT(*) FROM {table} WHERE id = ? AND {}",
        selection_filter(kind)
    )
}

#[async_trait]
impl RecordSource for ImageTable {
    async fn fetch_page(
        &self,
        kind: PassKind,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SourceRecord>> {
        let sql = select_page_sql(&self.table, kind);
        let mut query = sqlx::query(&sql);
        if kind == PassKind::Source {
            query = query.bind(&self.source_pattern);
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db.pool)
            .await
            .with_context(|| format!("fetching {kind} page at offset {offset}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let raw_path: Option<String> = row.try_get("raw_path")?;
            out.push(SourceRecord { id, raw_path });
        }
        debug!(pass = %kind, offset, limit, rows = out.len(), "page fetched");
        Ok(out)
    }

    async fn write_back(&self, kind: PassKind, id: &str, canonical_key: &str) -> Result<bool> {
        let sql = update_column_sql(&self.table, kind);
        let res = sqlx::query(&sql)
            .bind(canonical_key)
            .bind(id)
            .execute(&self.db.pool)
            .await
            .with_context(|| format!("updating {} for id={id}", kind.column()))?;

        let sql = still_selected_sql(&self.table, kind);
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(id);
        if kind == PassKind::Source {
            query = query.bind(&self.source_pattern);
        }
        let remaining = query
            .fetch_one(&self.db.pool)
            .await
            .with_context(|| format!("re-checking selection of id={id}"))?;
        debug!(
            pass = %kind,
            id,
            rows = res.rows_affected(),
            still_selected = remaining > 0,
            "write-back applied"
        );
        Ok(remaining > 0)
    }
}
