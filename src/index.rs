//! Vector index: embeddings plus opaque identifiers, never text.
//!
//! Query results are `(chunk_id, score)` pairs; resolving them to text goes
//! through the decoder and the content store. The SQLite implementation
//! scans brute force with cosine similarity, which is adequate at corpus
//! sizes where one process ingests and queries.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub source_type: String,
    pub section_path: String,
    pub vector: Vec<f32>,
}

/// Optional metadata constraints on a query.
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub document_id: Option<String>,
    pub source_type: Option<String>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), PipelineError>;

    /// Top `top_k` most similar chunk IDs with scores, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<(String, f32)>, PipelineError>;

    async fn delete(&self, chunk_ids: &[String]) -> Result<(), PipelineError>;

    async fn count(&self) -> Result<u64, PipelineError>;

    async fn count_for_document(&self, document_id: &str) -> Result<u64, PipelineError>;
}

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO vectors (chunk_id, document_id, source_type, section_path, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    source_type = excluded.source_type,
                    section_path = excluded.section_path,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.chunk_id)
            .bind(&record.document_id)
            .bind(&record.source_type)
            .bind(&record.section_path)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&IndexFilter>,
    ) -> Result<Vec<(String, f32)>, PipelineError> {
        let mut sql = String::from("SELECT chunk_id, embedding FROM vectors WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();
        if let Some(f) = filter {
            if let Some(doc) = &f.document_id {
                sql.push_str(" AND document_id = ?");
                binds.push(doc.clone());
            }
            if let Some(st) = &f.source_type {
                sql.push_str(" AND source_type = ?");
                binds.push(st.clone());
            }
        }

        let mut query = sqlx::query(&sql);
        for b in &binds {
            query = query.bind(b);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut scored: Vec<(String, f32)> = rows
            .iter()
            .map(|row| {
                let id: String = row.get("chunk_id");
                let blob: Vec<u8> = row.get("embedding");
                (id, cosine_similarity(vector, &blob_to_vec(&blob)))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<(), PipelineError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!("DELETE FROM vectors WHERE chunk_id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in chunk_ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_for_document(&self, document_id: &str) -> Result<u64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
