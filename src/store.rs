//! Content store: the durable source of truth for all text.
//!
//! Documents are upserted keyed on `(source_type, source_id)`; chunks are
//! replaced transactionally per document, so readers never observe a mixed
//! old/new chunk set. The vector index holds no text — everything retrievable
//! must be reconstructable from here.

use sqlx::{Row, SqlitePool};

use crate::error::PipelineError;
use crate::models::{Chunk, ChunkType, Document};

/// Per-document row for catalog generation.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub document_id: String,
    pub source_type: String,
    pub title: String,
    pub chunk_count: i64,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a document. A second write with the same `(source_type,
    /// source_id)` updates in place; `created_at` is preserved.
    pub async fn put_document(&self, doc: &Document) -> Result<(), PipelineError> {
        let authors_json = match &doc.authors {
            Some(authors) => Some(
                serde_json::to_string(authors)
                    .map_err(|e| PipelineError::Storage(e.to_string()))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_type, source_id, version, title, source_url,
                license, authors_json, content_hash_sha256, content_hash_sha512,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_type, source_id) DO UPDATE SET
                version = excluded.version,
                title = excluded.title,
                source_url = excluded.source_url,
                license = excluded.license,
                authors_json = excluded.authors_json,
                content_hash_sha256 = excluded.content_hash_sha256,
                content_hash_sha512 = excluded.content_hash_sha512,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source_type)
        .bind(&doc.source_id)
        .bind(&doc.version)
        .bind(&doc.title)
        .bind(&doc.source_url)
        .bind(&doc.license)
        .bind(&authors_json)
        .bind(&doc.content_hash_sha256)
        .bind(&doc.content_hash_sha512)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the document's chunk set transactionally. Either every chunk
    /// of the new generation lands and the old generation is gone, or nothing
    /// changes. Returns the IDs of the replaced chunks so the caller can
    /// evict them from the vector index.
    pub async fn put_chunks(
        &self,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<Vec<String>, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let old_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ?")
                .bind(document_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let section_path_json = serde_json::to_string(&chunk.section_path)
                .map_err(|e| PipelineError::Storage(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, position_in_doc, total_chunks, text,
                    token_count, section_path_json, overlap_start, overlap_end,
                    chunk_type, oversized)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.position_in_doc)
            .bind(chunk.total_chunks)
            .bind(&chunk.text)
            .bind(chunk.token_count)
            .bind(&section_path_json)
            .bind(chunk.overlap_start)
            .bind(chunk.overlap_end)
            .bind(chunk.chunk_type.as_str())
            .bind(chunk.oversized as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(old_ids)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, PipelineError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_document(&r)).transpose()
    }

    pub async fn get_document_by_source(
        &self,
        source_type: &str,
        source_id: &str,
    ) -> Result<Option<Document>, PipelineError> {
        let row = sqlx::query("SELECT * FROM documents WHERE source_type = ? AND source_id = ?")
            .bind(source_type)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_document(&r)).transpose()
    }

    /// All chunks of a document in position order.
    pub async fn get_chunks_by_document(&self, id: &str) -> Result<Vec<Chunk>, PipelineError> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY position_in_doc ASC")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    /// Fetch chunks by ID in arbitrary order. Missing IDs are simply absent
    /// from the result.
    pub async fn chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, PipelineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM chunks WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_chunk).collect()
    }

    pub async fn chunk_count(&self, document_id: &str) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete a document and all of its chunks. Returns the deleted chunk IDs
    /// for vector-index eviction.
    pub async fn delete_document(&self, id: &str) -> Result<Vec<String>, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let chunk_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(chunk_ids)
    }

    pub async fn document_count(&self) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn total_chunk_count(&self) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One summary row per document, for the persisted catalog.
    pub async fn document_summaries(&self) -> Result<Vec<DocumentSummary>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.source_type, d.title, d.created_at, COUNT(c.id) AS chunk_count
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            GROUP BY d.id
            ORDER BY d.created_at ASC, d.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentSummary {
                document_id: row.get("id"),
                source_type: row.get("source_type"),
                title: row.get("title"),
                chunk_count: row.get("chunk_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, PipelineError> {
    let authors_json: Option<String> = row.get("authors_json");
    let authors = match authors_json {
        Some(json) => {
            Some(serde_json::from_str(&json).map_err(|e| PipelineError::Storage(e.to_string()))?)
        }
        None => None,
    };

    Ok(Document {
        id: row.get("id"),
        source_type: row.get("source_type"),
        source_id: row.get("source_id"),
        version: row.get("version"),
        title: row.get("title"),
        source_url: row.get("source_url"),
        license: row.get("license"),
        authors,
        content_hash_sha256: row.get("content_hash_sha256"),
        content_hash_sha512: row.get("content_hash_sha512"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, PipelineError> {
    let section_path_json: String = row.get("section_path_json");
    let section_path: Vec<String> = serde_json::from_str(&section_path_json)
        .map_err(|e| PipelineError::Storage(e.to_string()))?;
    let chunk_type: String = row.get("chunk_type");
    let oversized: i64 = row.get("oversized");

    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        position_in_doc: row.get("position_in_doc"),
        total_chunks: row.get("total_chunks"),
        text: row.get("text"),
        token_count: row.get("token_count"),
        section_path,
        overlap_start: row.get("overlap_start"),
        overlap_end: row.get("overlap_end"),
        chunk_type: ChunkType::parse(&chunk_type),
        oversized: oversized != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, ContentStore) {
        let tmp = TempDir::new().unwrap();
        let config = crate::config::DbConfig {
            path: tmp.path().join("test.sqlite"),
        };
        let pool = crate::db::connect(&config, 2).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, ContentStore::new(pool))
    }

    fn sample_document(id: &str, source_id: &str, version: &str) -> Document {
        Document {
            id: id.to_string(),
            source_type: "arxiv".to_string(),
            source_id: source_id.to_string(),
            version: version.to_string(),
            title: "Sample Paper".to_string(),
            source_url: Some("http://example.org/abs/1".to_string()),
            license: None,
            authors: Some(vec!["Ada Lovelace".to_string()]),
            content_hash_sha256: "aa".repeat(32),
            content_hash_sha512: "bb".repeat(64),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    fn sample_chunk(id: &str, document_id: &str, position: i64) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: document_id.to_string(),
            position_in_doc: position,
            total_chunks: 2,
            text: format!("chunk {position} text"),
            token_count: 3,
            section_path: vec!["Introduction".to_string()],
            overlap_start: 0,
            overlap_end: 0,
            chunk_type: ChunkType::Text,
            oversized: false,
        }
    }

    #[tokio::test]
    async fn document_roundtrip_preserves_fields() {
        let (_tmp, store) = test_store().await;
        let doc = sample_document("d1", "2101.00001", "v1");
        store.put_document(&doc).await.unwrap();

        let loaded = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(loaded.source_id, "2101.00001");
        assert_eq!(loaded.authors, Some(vec!["Ada Lovelace".to_string()]));
        assert_eq!(loaded.content_hash_sha256, doc.content_hash_sha256);
        assert_eq!(loaded.content_hash_sha512, doc.content_hash_sha512);
    }

    #[tokio::test]
    async fn second_put_updates_in_place() {
        let (_tmp, store) = test_store().await;
        store
            .put_document(&sample_document("d1", "2101.00001", "v1"))
            .await
            .unwrap();

        let mut v2 = sample_document("d1", "2101.00001", "v2");
        v2.title = "Sample Paper (revised)".to_string();
        store.put_document(&v2).await.unwrap();

        assert_eq!(store.document_count().await.unwrap(), 1);
        let loaded = store
            .get_document_by_source("arxiv", "2101.00001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.version, "v2");
        assert_eq!(loaded.title, "Sample Paper (revised)");
    }

    #[tokio::test]
    async fn put_chunks_replaces_old_generation() {
        let (_tmp, store) = test_store().await;
        store
            .put_document(&sample_document("d1", "2101.00001", "v1"))
            .await
            .unwrap();

        let gen1 = vec![sample_chunk("c1", "d1", 0), sample_chunk("c2", "d1", 1)];
        let replaced = store.put_chunks("d1", &gen1).await.unwrap();
        assert!(replaced.is_empty());

        let gen2 = vec![sample_chunk("c3", "d1", 0)];
        let replaced = store.put_chunks("d1", &gen2).await.unwrap();
        assert_eq!(replaced.len(), 2);
        assert!(replaced.contains(&"c1".to_string()));
        assert!(replaced.contains(&"c2".to_string()));

        let chunks = store.get_chunks_by_document("d1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "c3");
    }

    #[tokio::test]
    async fn chunks_come_back_in_position_order() {
        let (_tmp, store) = test_store().await;
        store
            .put_document(&sample_document("d1", "2101.00001", "v1"))
            .await
            .unwrap();

        let chunks = vec![
            sample_chunk("c2", "d1", 1),
            sample_chunk("c0", "d1", 0),
            sample_chunk("c4", "d1", 2),
        ];
        store.put_chunks("d1", &chunks).await.unwrap();

        let loaded = store.get_chunks_by_document("d1").await.unwrap();
        let positions: Vec<i64> = loaded.iter().map(|c| c.position_in_doc).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn delete_cascades_to_chunks() {
        let (_tmp, store) = test_store().await;
        store
            .put_document(&sample_document("d1", "2101.00001", "v1"))
            .await
            .unwrap();
        store
            .put_chunks("d1", &[sample_chunk("c1", "d1", 0)])
            .await
            .unwrap();

        let deleted = store.delete_document("d1").await.unwrap();
        assert_eq!(deleted, vec!["c1".to_string()]);
        assert!(store.get_document("d1").await.unwrap().is_none());
        assert_eq!(store.chunk_count("d1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chunks_by_ids_skips_missing() {
        let (_tmp, store) = test_store().await;
        store
            .put_document(&sample_document("d1", "2101.00001", "v1"))
            .await
            .unwrap();
        store
            .put_chunks("d1", &[sample_chunk("c1", "d1", 0)])
            .await
            .unwrap();

        let found = store
            .chunks_by_ids(&["c1".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c1");
    }

    #[tokio::test]
    async fn summaries_count_chunks_per_document() {
        let (_tmp, store) = test_store().await;
        store
            .put_document(&sample_document("d1", "2101.00001", "v1"))
            .await
            .unwrap();
        store
            .put_chunks(
                "d1",
                &[sample_chunk("c1", "d1", 0), sample_chunk("c2", "d1", 1)],
            )
            .await
            .unwrap();

        let summaries = store.document_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].chunk_count, 2);
        assert_eq!(summaries[0].title, "Sample Paper");
    }
}
