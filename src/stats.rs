//! Collection status overview.
//!
//! Quick summary of what's in the store and the index: document counts,
//! chunk counts, vector coverage, per-document breakdown. Used by
//! `lith status` to confirm collection runs landed.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::index::{SqliteVectorIndex, VectorIndex};
use crate::store::ContentStore;

pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db, 2).await?;
    let store = ContentStore::new(pool.clone());
    let index = SqliteVectorIndex::new(pool.clone());

    let total_docs = store.document_count().await?;
    let total_chunks = store.total_chunk_count().await?;
    let total_vectors = index.count().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Collection status");
    println!("=================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!();
    println!("  Documents:  {total_docs}");
    println!("  Chunks:     {total_chunks}");
    println!(
        "  Vectors:    {} / {} ({}%)",
        total_vectors,
        total_chunks,
        if total_chunks > 0 {
            (total_vectors as i64 * 100) / total_chunks
        } else {
            0
        }
    );

    let summaries = store.document_summaries().await?;
    if !summaries.is_empty() {
        println!();
        println!("  Per document:");
        for s in summaries {
            let indexed = index.count_for_document(&s.document_id).await?;
            println!(
                "    {} — {} chunks, {} vectors ({})",
                truncate(&s.title, 60),
                s.chunk_count,
                indexed,
                s.source_type
            );
        }
    }

    pool.close().await;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
