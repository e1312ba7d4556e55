use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Documents: one row per acquired source artifact.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            version TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL,
            source_url TEXT,
            license TEXT,
            authors_json TEXT,
            content_hash_sha256 TEXT NOT NULL,
            content_hash_sha512 TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source_type, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks: the canonical text store. Replaced as a whole generation when
    // the owning document is reprocessed.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            position_in_doc INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            text TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            section_path_json TEXT NOT NULL DEFAULT '[]',
            overlap_start INTEGER NOT NULL DEFAULT 0,
            overlap_end INTEGER NOT NULL DEFAULT 0,
            chunk_type TEXT NOT NULL DEFAULT 'text',
            oversized INTEGER NOT NULL DEFAULT 0,
            UNIQUE(document_id, position_in_doc),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cache entries: reprocess-or-skip decisions, one per source artifact.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            version TEXT NOT NULL,
            content_hash_sha256 TEXT NOT NULL,
            document_id TEXT NOT NULL,
            output_location TEXT NOT NULL,
            last_processed_at INTEGER NOT NULL,
            PRIMARY KEY (source_type, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vector index: opaque identifiers and filter metadata only, never text.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            section_path TEXT NOT NULL DEFAULT '',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_document_id ON vectors(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_type, source_id)")
        .execute(pool)
        .await?;

    Ok(())
}
