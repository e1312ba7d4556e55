//! Core data models used throughout litharvest.
//!
//! These types represent the documents, chunks, cache entries, and vector
//! records that flow through the acquisition and indexing pipeline.

use serde::{Deserialize, Serialize};

/// Metadata for one scholarly document discovered at the remote source,
/// before any bytes have been fetched.
#[derive(Debug, Clone)]
pub struct PaperMeta {
    pub source_type: String,
    /// Source-native identifier, e.g. an arXiv paper number.
    pub source_id: String,
    /// Source-native version tag (`"v2"`); may be empty.
    pub version: String,
    pub title: String,
    pub pdf_url: String,
    pub license: Option<String>,
    pub authors: Vec<String>,
}

/// One acquired source artifact, stored durably in the content store.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable UUID derived deterministically from `(source_type, source_id)`,
    /// so re-discovery of the same source never mints a new ID.
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub version: String,
    pub title: String,
    pub source_url: Option<String>,
    pub license: Option<String>,
    /// Author list; inclusion is gated by configuration.
    pub authors: Option<Vec<String>>,
    pub content_hash_sha256: String,
    pub content_hash_sha512: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Classification of a chunk's dominant content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Table,
    Equation,
    Mixed,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Text => "text",
            ChunkType::Table => "table",
            ChunkType::Equation => "equation",
            ChunkType::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> ChunkType {
        match s {
            "table" => ChunkType::Table,
            "equation" => ChunkType::Equation,
            "mixed" => ChunkType::Mixed,
            _ => ChunkType::Text,
        }
    }
}

/// One retrievable unit of text. Immutable once written; replaced en masse
/// when the owning document is reprocessed.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// UUID unique per chunk instance. Regeneration issues new IDs.
    pub id: String,
    pub document_id: String,
    /// 0-based, strictly increasing within the document.
    pub position_in_doc: i64,
    /// Snapshot of the document's chunk count at generation time.
    pub total_chunks: i64,
    /// Verbatim chunk content — the only authoritative copy.
    pub text: String,
    pub token_count: i64,
    /// Ordered list of enclosing heading titles.
    pub section_path: Vec<String>,
    /// Tokens shared with the previous chunk.
    pub overlap_start: i64,
    /// Tokens shared with the next chunk.
    pub overlap_end: i64,
    pub chunk_type: ChunkType,
    /// Set when an atomic block forced `token_count` past the configured
    /// chunk size.
    pub oversized: bool,
}

impl Chunk {
    pub fn has_overlap_previous(&self) -> bool {
        self.overlap_start > 0
    }

    pub fn has_overlap_next(&self) -> bool {
        self.overlap_end > 0
    }
}

/// Per-source record used to decide whether reprocessing is necessary.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub source_type: String,
    pub source_id: String,
    pub version: String,
    pub content_hash_sha256: String,
    pub document_id: String,
    /// Path of the raw artifact persisted at acquisition time; re-hashed on
    /// cache checks instead of re-fetching.
    pub output_location: String,
    pub last_processed_at: i64,
}
