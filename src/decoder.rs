//! Chunk ID to content resolution.
//!
//! Retrieval hands back opaque chunk IDs; this is the single path from those
//! IDs to text and provenance, backed by the content store alone.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::models::Chunk;
use crate::store::ContentStore;

/// Resolved chunk with the provenance a consumer needs to cite it.
#[derive(Debug, Clone)]
pub struct ChunkContent {
    pub chunk_id: String,
    pub document_id: String,
    pub position_in_doc: i64,
    pub total_chunks: i64,
    pub section_path: Vec<String>,
    pub text: String,
}

pub struct Decoder {
    store: ContentStore,
}

impl Decoder {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }

    /// Resolve `chunk_ids` in order. An unknown ID yields `None` at its
    /// position rather than failing the whole lookup.
    pub async fn lookup(
        &self,
        chunk_ids: &[String],
    ) -> Result<Vec<Option<ChunkContent>>, PipelineError> {
        let found = self.store.chunks_by_ids(chunk_ids).await?;
        let mut by_id: HashMap<String, Chunk> =
            found.into_iter().map(|c| (c.id.clone(), c)).collect();

        Ok(chunk_ids
            .iter()
            .map(|id| {
                by_id.remove(id).map(|c| ChunkContent {
                    chunk_id: c.id,
                    document_id: c.document_id,
                    position_in_doc: c.position_in_doc,
                    total_chunks: c.total_chunks,
                    section_path: c.section_path,
                    text: c.text,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::{ChunkType, Document};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Decoder, ContentStore) {
        let tmp = TempDir::new().unwrap();
        let config = crate::config::DbConfig {
            path: tmp.path().join("test.sqlite"),
        };
        let pool = crate::db::connect(&config, 2).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let store = ContentStore::new(pool);
        (tmp, Decoder::new(store.clone()), store)
    }

    async fn seed(store: &ContentStore) {
        store
            .put_document(&Document {
                id: "d1".to_string(),
                source_type: "arxiv".to_string(),
                source_id: "2101.00001".to_string(),
                version: "v1".to_string(),
                title: "Sample".to_string(),
                source_url: None,
                license: None,
                authors: None,
                content_hash_sha256: "aa".repeat(32),
                content_hash_sha512: "bb".repeat(64),
                created_at: 1,
                updated_at: 1,
            })
            .await
            .unwrap();

        let chunk = |id: &str, pos: i64, text: &str| crate::models::Chunk {
            id: id.to_string(),
            document_id: "d1".to_string(),
            position_in_doc: pos,
            total_chunks: 2,
            text: text.to_string(),
            token_count: 2,
            section_path: vec!["Intro".to_string()],
            overlap_start: 0,
            overlap_end: 0,
            chunk_type: ChunkType::Text,
            oversized: false,
        };
        store
            .put_chunks("d1", &[chunk("c1", 0, "first text"), chunk("c2", 1, "second text")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lookup_preserves_request_order() {
        let (_tmp, decoder, store) = setup().await;
        seed(&store).await;

        let resolved = decoder
            .lookup(&["c2".to_string(), "c1".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].as_ref().unwrap().text, "second text");
        assert_eq!(resolved[1].as_ref().unwrap().text, "first text");
        assert_eq!(resolved[0].as_ref().unwrap().section_path, vec!["Intro"]);
    }

    #[tokio::test]
    async fn unknown_ids_resolve_to_none() {
        let (_tmp, decoder, store) = setup().await;
        seed(&store).await;

        let resolved = decoder
            .lookup(&["ghost".to_string(), "c1".to_string()])
            .await
            .unwrap();
        assert!(resolved[0].is_none());
        assert!(resolved[1].is_some());
    }
}
