use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::FromRow;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use vitaledge_common::{Result, VectorDbError, VectorId};

use crate::store::MetadataStore;
use crate::types::{RecordMetadata, TagSet, VectorRecord};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS vectors (
        id INTEGER PRIMARY KEY,
        text TEXT NOT NULL,
        external_id TEXT UNIQUE,
        category TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tag TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vector_tags (
        vector_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        PRIMARY KEY (vector_id, tag_id),
        FOREIGN KEY (vector_id) REFERENCES vectors (id) ON DELETE CASCADE ON UPDATE CASCADE,
        FOREIGN KEY (tag_id) REFERENCES tags (id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_vectors_category ON vectors (category)",
];

#[derive(Debug, FromRow)]
struct RecordRow {
    id: i64,
    text: String,
    external_id: Option<String>,
    category: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self, tags: TagSet) -> Result<VectorRecord> {
        Ok(VectorRecord {
            id: from_db_id(self.id)?,
            text: self.text,
            external_id: self.external_id,
            category: self.category,
            tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SQLite-backed metadata store
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteMetadataStore {
    /// Open (creating if needed) the database at `path` and ensure the schema
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };

        info!(
            "Metadata store opened: {} - {} records",
            store.path.display(),
            store.count().await?
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn add_record(&self, id: VectorId, metadata: &RecordMetadata) -> Result<VectorRecord> {
        metadata.validate()?;
        let db_id = to_db_id(id)?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM vectors WHERE id = ?")
            .bind(db_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(VectorDbError::DuplicateId(id));
        }

        if let Some(external_id) = &metadata.external_id {
            let taken: Option<i64> =
                sqlx::query_scalar("SELECT id FROM vectors WHERE external_id = ?")
                    .bind(external_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if taken.is_some() {
                return Err(VectorDbError::DuplicateExternalId(external_id.clone()));
            }
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO vectors (id, text, external_id, category, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(db_id)
        .bind(&metadata.text)
        .bind(&metadata.external_id)
        .bind(&metadata.category)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, id, metadata))?;

        for tag in metadata.tags.iter() {
            sqlx::query("INSERT OR IGNORE INTO tags (tag) VALUES (?)")
                .bind(tag)
                .execute(&mut *tx)
                .await?;
            let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE tag = ?")
                .bind(tag)
                .fetch_one(&mut *tx)
                .await?;
            sqlx::query("INSERT OR IGNORE INTO vector_tags (vector_id, tag_id) VALUES (?, ?)")
                .bind(db_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }

        let record = fetch_record(&mut *tx, db_id)
            .await?
            .ok_or_else(|| VectorDbError::not_found(format!("record {}", id)))?;

        tx.commit().await?;

        debug!("Metadata record {} added ({} tags)", id, record.tags.len());
        Ok(record)
    }

    async fn get_record(&self, id: VectorId) -> Result<VectorRecord> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut *conn, to_db_id(id)?)
            .await?
            .ok_or_else(|| VectorDbError::not_found(format!("record {}", id)))
    }

    async fn list_records(&self, category: Option<&str>) -> Result<Vec<VectorRecord>> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<RecordRow> = match category {
            Some(category) => {
                sqlx::query_as(
                    "SELECT id, text, external_id, category, created_at, updated_at \
                     FROM vectors WHERE category = ? ORDER BY id",
                )
                .bind(category)
                .fetch_all(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, text, external_id, category, created_at, updated_at \
                     FROM vectors ORDER BY id",
                )
                .fetch_all(&mut *tx)
                .await?
            }
        };

        let links: Vec<(i64, String)> = sqlx::query_as(
            "SELECT vt.vector_id, t.tag FROM vector_tags vt JOIN tags t ON t.id = vt.tag_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut tags_by_id: HashMap<i64, TagSet> = HashMap::new();
        for (vector_id, tag) in links {
            tags_by_id.entry(vector_id).or_default().insert(tag);
        }

        rows.into_iter()
            .map(|row| {
                let tags = tags_by_id.remove(&row.id).unwrap_or_default();
                row.into_record(tags)
            })
            .collect()
    }

    async fn list_tags(&self) -> Result<BTreeSet<String>> {
        let tags: Vec<String> = sqlx::query_scalar("SELECT tag FROM tags ORDER BY tag")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags.into_iter().collect())
    }

    async fn delete_record(&self, id: VectorId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM vectors WHERE id = ?")
            .bind(to_db_id(id)?)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(VectorDbError::not_found(format!("record {}", id)));
        }

        tx.commit().await?;
        debug!("Metadata record {} deleted", id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn record_ids(&self) -> Result<Vec<VectorId>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM vectors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        ids.into_iter().map(from_db_id).collect()
    }

    async fn compact_ids(&self, removed: &[VectorId], moves: &[(VectorId, VectorId)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for &id in removed {
            let result = sqlx::query("DELETE FROM vectors WHERE id = ?")
                .bind(to_db_id(id)?)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(VectorDbError::not_found(format!("record {}", id)));
            }
        }

        // Ascending old ids: each target id is vacated before it is reused
        let mut moves = moves.to_vec();
        moves.sort_by_key(|&(old, _)| old);
        let renumbered = moves.iter().filter(|(old, new)| old != new).count();

        let now = Utc::now();
        for (old, new) in moves {
            if old == new {
                continue;
            }
            let result = sqlx::query("UPDATE vectors SET id = ?, updated_at = ? WHERE id = ?")
                .bind(to_db_id(new)?)
                .bind(now)
                .bind(to_db_id(old)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_renumber_error(e, new))?;
            if result.rows_affected() == 0 {
                return Err(VectorDbError::not_found(format!("record {}", old)));
            }
        }

        tx.commit().await?;
        info!(
            "Metadata ids compacted - {} removed, {} renumbered",
            removed.len(),
            renumbered
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vector_tags").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tags").execute(&mut *tx).await?;
        tx.commit().await?;

        info!("Metadata store cleared");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Metadata store closed: {}", self.path.display());
    }
}

async fn fetch_record(conn: &mut SqliteConnection, id: i64) -> Result<Option<VectorRecord>> {
    let row: Option<RecordRow> = sqlx::query_as(
        "SELECT id, text, external_id, category, created_at, updated_at \
         FROM vectors WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let tags: Vec<String> = sqlx::query_scalar(
        "SELECT t.tag FROM tags t JOIN vector_tags vt ON vt.tag_id = t.id \
         WHERE vt.vector_id = ? ORDER BY t.tag",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    row.into_record(tags.into_iter().collect()).map(Some)
}

fn map_insert_error(err: sqlx::Error, id: VectorId, metadata: &RecordMetadata) -> VectorDbError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            if db.message().contains("external_id") {
                return VectorDbError::DuplicateExternalId(
                    metadata.external_id.clone().unwrap_or_default(),
                );
            }
            return VectorDbError::DuplicateId(id);
        }
    }
    err.into()
}

fn map_renumber_error(err: sqlx::Error, new: VectorId) -> VectorDbError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return VectorDbError::DuplicateId(new);
        }
    }
    err.into()
}

fn to_db_id(id: VectorId) -> Result<i64> {
    i64::try_from(id).map_err(|_| VectorDbError::invalid_input(format!("id {} out of range", id)))
}

fn from_db_id(id: i64) -> Result<VectorId> {
    VectorId::try_from(id).map_err(|_| anyhow::anyhow!("negative id {} in metadata store", id).into())
}
