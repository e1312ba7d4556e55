//! Version-aware processing cache.
//!
//! A document is skipped only when everything still holds: the cached version
//! matches the discovered one, the raw artifact on disk re-hashes to the
//! recorded SHA-256, and the store still has the document with at least one
//! chunk and a vector per chunk. Any doubt means reprocess.

use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::debug;

use crate::acquire;
use crate::error::PipelineError;
use crate::models::{CacheEntry, PaperMeta};
use crate::store::ContentStore;

#[derive(Clone)]
pub struct Cache {
    pool: SqlitePool,
}

impl Cache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn lookup(
        &self,
        source_type: &str,
        source_id: &str,
    ) -> Result<Option<CacheEntry>, PipelineError> {
        let row = sqlx::query(
            "SELECT * FROM cache_entries WHERE source_type = ? AND source_id = ?",
        )
        .bind(source_type)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CacheEntry {
            source_type: r.get("source_type"),
            source_id: r.get("source_id"),
            version: r.get("version"),
            content_hash_sha256: r.get("content_hash_sha256"),
            document_id: r.get("document_id"),
            output_location: r.get("output_location"),
            last_processed_at: r.get("last_processed_at"),
        }))
    }

    /// Decide whether `meta` needs a full processing pass.
    pub async fn should_process(
        &self,
        store: &ContentStore,
        meta: &PaperMeta,
    ) -> Result<bool, PipelineError> {
        let entry = match self.lookup(&meta.source_type, &meta.source_id).await? {
            Some(entry) => entry,
            None => return Ok(true),
        };

        if entry.version != meta.version {
            debug!(
                source_id = %meta.source_id,
                cached = %entry.version,
                discovered = %meta.version,
                "version changed, reprocessing"
            );
            return Ok(true);
        }

        // The raw artifact must still exist and re-hash to the recorded
        // digest; a corrupted or missing file invalidates the cache hit.
        let path = Path::new(&entry.output_location);
        let raw = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!(source_id = %meta.source_id, "raw artifact missing, reprocessing");
                return Ok(true);
            }
        };
        let (sha256, _) = acquire::hash_pair(&raw);
        if sha256 != entry.content_hash_sha256 {
            debug!(source_id = %meta.source_id, "raw artifact hash mismatch, reprocessing");
            return Ok(true);
        }

        let doc = store.get_document(&entry.document_id).await?;
        if doc.is_none() {
            return Ok(true);
        }
        let chunk_count = store.chunk_count(&entry.document_id).await?;
        if chunk_count == 0 {
            return Ok(true);
        }

        // Chunks without full vector coverage mean encoding never finished;
        // the pipeline will resume it rather than skip.
        let vector_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE document_id = ?")
                .bind(&entry.document_id)
                .fetch_one(&self.pool)
                .await?;
        if vector_count < chunk_count {
            debug!(
                source_id = %meta.source_id,
                vector_count,
                chunk_count,
                "vector coverage incomplete, reprocessing"
            );
            return Ok(true);
        }

        Ok(false)
    }

    pub async fn record(&self, entry: &CacheEntry) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (source_type, source_id, version, content_hash_sha256,
                document_id, output_location, last_processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_type, source_id) DO UPDATE SET
                version = excluded.version,
                content_hash_sha256 = excluded.content_hash_sha256,
                document_id = excluded.document_id,
                output_location = excluded.output_location,
                last_processed_at = excluded.last_processed_at
            "#,
        )
        .bind(&entry.source_type)
        .bind(&entry.source_id)
        .bind(&entry.version)
        .bind(&entry.content_hash_sha256)
        .bind(&entry.document_id)
        .bind(&entry.output_location)
        .bind(entry.last_processed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
