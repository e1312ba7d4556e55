//! Persisted collection catalog.
//!
//! `catalog.json` in the output directory summarizes what the store holds,
//! rewritten at the end of every collection run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PipelineError;
use crate::store::ContentStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub document_id: String,
    pub source_type: String,
    pub title: String,
    pub chunk_count: i64,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub generated_at: String,
    pub total_documents: usize,
    pub total_chunks: i64,
    pub documents: Vec<CatalogEntry>,
}

pub async fn build_catalog(store: &ContentStore) -> Result<Catalog, PipelineError> {
    let summaries = store.document_summaries().await?;
    let total_chunks = summaries.iter().map(|s| s.chunk_count).sum();

    Ok(Catalog {
        generated_at: Utc::now().to_rfc3339(),
        total_documents: summaries.len(),
        total_chunks,
        documents: summaries
            .into_iter()
            .map(|s| CatalogEntry {
                document_id: s.document_id,
                source_type: s.source_type,
                title: s.title,
                chunk_count: s.chunk_count,
                created_at: s.created_at,
            })
            .collect(),
    })
}

pub async fn write_catalog(store: &ContentStore, path: &Path) -> Result<Catalog, PipelineError> {
    let catalog = build_catalog(store).await?;
    let json = serde_json::to_string_pretty(&catalog)
        .map_err(|e| PipelineError::Storage(e.to_string()))?;
    std::fs::write(path, json)
        .map_err(|e| PipelineError::Storage(format!("write catalog: {e}")))?;
    Ok(catalog)
}
