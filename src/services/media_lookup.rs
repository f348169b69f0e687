//! Resolving a public media id to a stored file.
//!
//! The database layout mirrors what an upload pipeline would leave behind:
//! one `media` row per file, with the payload path relative to the storage
//! root (absolute paths are used as-is).

use crate::{errors::StoreError, models::media::MediaRecord};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Read-only access to media records.
#[async_trait]
pub trait MediaLookup: Send + Sync {
    /// `Ok(None)` when no record exists for `id`.
    async fn find(&self, id: Uuid) -> Result<Option<MediaRecord>, StoreError>;

    /// Cheap backend health check used by the readiness probe.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// `MediaLookup` over the `media` table.
#[derive(Clone)]
pub struct SqliteMediaLookup {
    db: Arc<SqlitePool>,
    storage_dir: PathBuf,
}

#[derive(FromRow, Debug)]
struct MediaRow {
    id: Uuid,
    disk_path: String,
    mime_type: Option<String>,
    file_name: String,
}

impl SqliteMediaLookup {
    pub fn new(db: Arc<SqlitePool>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            storage_dir: storage_dir.into(),
        }
    }

    fn resolve_path(&self, disk_path: &str) -> PathBuf {
        let path = Path::new(disk_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.storage_dir.join(path)
        }
    }
}

#[async_trait]
impl MediaLookup for SqliteMediaLookup {
    async fn find(&self, id: Uuid) -> Result<Option<MediaRecord>, StoreError> {
        let row = sqlx::query_as::<_, MediaRow>(
            "SELECT id, disk_path, mime_type, file_name FROM media WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|row| {
            debug!(media_id = %row.id, "resolved media record");
            MediaRecord {
                id: row.id,
                path: self.resolve_path(&row.disk_path),
                mime_type: row
                    .mime_type
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_MIME.into()),
                file_name: row.file_name,
            }
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        fs::metadata(&self.storage_dir).await?;
        Ok(())
    }
}

/// A fixed set of records assembled before the server starts.
#[derive(Clone, Debug, Default)]
pub struct MemoryMediaLookup {
    records: HashMap<Uuid, MediaRecord>,
}

impl MemoryMediaLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, record: MediaRecord) -> Self {
        self.records.insert(record.id, record);
        self
    }
}

#[async_trait]
impl MediaLookup for MemoryMediaLookup {
    async fn find(&self, id: Uuid) -> Result<Option<MediaRecord>, StoreError> {
        Ok(self.records.get(&id).cloned())
    }
}
