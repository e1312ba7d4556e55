//! Semantic search over the indexed collection.
//!
//! The query string is embedded with the same encoder that embedded the
//! chunks, matched against the vector index, and the winning chunk IDs are
//! resolved to text through the decoder. Used by `lith search`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::decoder::Decoder;
use crate::encoder::create_encoder;
use crate::index::{IndexFilter, SqliteVectorIndex, VectorIndex};
use crate::store::ContentStore;

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: usize,
    document: Option<String>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(&config.db, 2).await?;
    let store = ContentStore::new(pool.clone());
    let index = SqliteVectorIndex::new(pool.clone());
    let encoder = create_encoder(&config.encoder)?;
    let decoder = Decoder::new(store.clone());

    let query_vectors = encoder.embed(&[query.to_string()]).await?;
    let filter = document.map(|id| IndexFilter {
        document_id: Some(id),
        source_type: None,
    });
    let hits = index
        .query(&query_vectors[0], top_k, filter.as_ref())
        .await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
    let resolved = decoder.lookup(&ids).await?;

    println!("Results for \"{query}\":");
    println!();
    for ((chunk_id, score), content) in hits.iter().zip(resolved) {
        match content {
            Some(content) => {
                let title = store
                    .get_document(&content.document_id)
                    .await?
                    .map(|d| d.title)
                    .unwrap_or_else(|| content.document_id.clone());
                let section = if content.section_path.is_empty() {
                    String::from("(no section)")
                } else {
                    content.section_path.join(" > ")
                };
                println!(
                    "  [{score:.4}] {title} — {section} (chunk {}/{})",
                    content.position_in_doc + 1,
                    content.total_chunks
                );
                println!("      {}", preview(&content.text, 200));
            }
            None => {
                // Index entry with no stored chunk: stale vector.
                println!("  [{score:.4}] {chunk_id} (missing from content store)");
            }
        }
        println!();
    }

    pool.close().await;
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}...")
}
