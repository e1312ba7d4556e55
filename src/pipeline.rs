//! Collection orchestrator.
//!
//! Drives each discovered document through acquisition, rendering, filtering,
//! chunking, and encoding, with bounded parallelism and a per-document
//! deadline. One document failing never stops the run; the failure is logged
//! with the stage it died in and the run moves on.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::acquire::Acquirer;
use crate::cache::Cache;
use crate::catalog;
use crate::chunker::{chunk_markdown, ChunkerOptions};
use crate::config::Config;
use crate::db;
use crate::encoder::{create_encoder, Encoder};
use crate::error::PipelineError;
use crate::filter::filter_sections;
use crate::index::{SqliteVectorIndex, VectorIndex, VectorRecord};
use crate::migrate;
use crate::models::{CacheEntry, Chunk, Document, PaperMeta};
use crate::proclog::ProcessingLog;
use crate::render::{HttpRenderer, Renderer};
use crate::source::SourceClient;
use crate::store::ContentStore;

/// Where in the pipeline a document currently is, or where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovered,
    Acquiring,
    Rendering,
    Filtering,
    Chunking,
    Encoding,
    Indexed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::Acquiring => "acquiring",
            Stage::Rendering => "rendering",
            Stage::Filtering => "filtering",
            Stage::Chunking => "chunking",
            Stage::Encoding => "encoding",
            Stage::Indexed => "indexed",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub indexed: usize,
    pub failed: usize,
    pub chunks_written: u64,
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    store: ContentStore,
    cache: Cache,
    index: Arc<dyn VectorIndex>,
    encoder: Arc<dyn Encoder>,
    renderer: Arc<dyn Renderer>,
    acquirer: Arc<Acquirer>,
    source: Arc<SourceClient>,
    log: Arc<ProcessingLog>,
    output_dir: PathBuf,
}

impl Pipeline {
    pub async fn new(
        config: Config,
        output_dir_override: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let output_dir = output_dir_override.unwrap_or_else(|| config.output.dir.clone());
        std::fs::create_dir_all(output_dir.join("raw"))?;

        let pool = db::connect(&config.db, config.pipeline.concurrency as u32 + 2).await?;
        migrate::run_migrations(&pool).await?;

        let store = ContentStore::new(pool.clone());
        let cache = Cache::new(pool.clone());
        let index: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(pool));
        let encoder = create_encoder(&config.encoder)?;
        let renderer: Arc<dyn Renderer> = Arc::new(HttpRenderer::new(&config.renderer)?);
        let acquirer = Arc::new(Acquirer::new(&config.acquisition)?);
        let source = Arc::new(SourceClient::new(
            &config.source,
            Duration::from_secs(config.acquisition.timeout_secs),
        )?);
        let log = Arc::new(ProcessingLog::open(
            &output_dir.join("processing.log.jsonl"),
        )?);

        Ok(Self {
            config: Arc::new(config),
            store,
            cache,
            index,
            encoder,
            renderer,
            acquirer,
            source,
            log,
            output_dir,
        })
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Run a full collection pass. Discovery failure aborts the run; any
    /// per-document failure is recorded and skipped past.
    pub async fn run(
        &self,
        query: &str,
        limit: Option<usize>,
        no_cache: bool,
    ) -> anyhow::Result<RunSummary> {
        let query = if query.is_empty() {
            self.config.source.query.as_str()
        } else {
            query
        };

        let run_id = Uuid::new_v4().to_string();
        let mut papers = self
            .source
            .discover(query, self.config.source.max_results)
            .await?;
        if let Some(limit) = limit {
            papers.truncate(limit);
        }

        let mut summary = RunSummary {
            discovered: papers.len(),
            ..RunSummary::default()
        };
        self.log.info(
            &run_id,
            "pipeline",
            &format!("discovered {} documents for query '{query}'", papers.len()),
        );

        let mut worklist = Vec::new();
        for paper in papers {
            if !no_cache && !self.cache.should_process(&self.store, &paper).await? {
                summary.skipped += 1;
                self.log.info(
                    &document_id_for(&paper.source_type, &paper.source_id),
                    "pipeline",
                    &format!("{} {} unchanged, skipping", paper.source_id, paper.version),
                );
                continue;
            }
            worklist.push(paper);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.concurrency));
        let deadline = Duration::from_secs(self.config.pipeline.document_deadline_secs);
        let mut tasks: JoinSet<(PaperMeta, Result<u64, (Stage, PipelineError)>)> = JoinSet::new();

        for paper in worklist {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let stage = Mutex::new(Stage::Discovered);
                let outcome = match tokio::time::timeout(
                    deadline,
                    pipeline.process_document(&paper, &stage),
                )
                .await
                {
                    Ok(result) => result,
                    // Attribute the timeout to whatever stage was running
                    // when the budget ran out.
                    Err(_) => Err((
                        read_stage(&stage),
                        PipelineError::DeadlineExceeded(deadline),
                    )),
                };
                (paper, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (paper, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "document task panicked");
                    summary.failed += 1;
                    continue;
                }
            };
            let doc_id = document_id_for(&paper.source_type, &paper.source_id);
            match outcome {
                Ok(chunks) => {
                    summary.indexed += 1;
                    summary.chunks_written += chunks;
                }
                Err((stage, e)) => {
                    summary.failed += 1;
                    self.log.error(
                        &doc_id,
                        stage.as_str(),
                        &format!("{}: {e}", paper.source_id),
                        e.code(),
                        "document marked failed",
                    );
                    warn!(
                        source_id = %paper.source_id,
                        stage = stage.as_str(),
                        error = %e,
                        "document failed"
                    );
                }
            }
        }

        catalog::write_catalog(&self.store, &self.output_dir.join("catalog.json")).await?;

        info!(
            discovered = summary.discovered,
            skipped = summary.skipped,
            indexed = summary.indexed,
            failed = summary.failed,
            chunks = summary.chunks_written,
            "collection run complete"
        );
        self.log.info(
            &run_id,
            "pipeline",
            &format!(
                "run complete: {} indexed, {} skipped, {} failed",
                summary.indexed, summary.skipped, summary.failed
            ),
        );

        Ok(summary)
    }

    /// Process one document end to end. Returns the number of chunks written,
    /// or the failing stage with its error. `stage` tracks the stage in
    /// progress so a deadline timeout can name it.
    async fn process_document(
        &self,
        paper: &PaperMeta,
        stage: &Mutex<Stage>,
    ) -> Result<u64, (Stage, PipelineError)> {
        let doc_id = document_id_for(&paper.source_type, &paper.source_id);

        if let Some(resumed) = self
            .try_resume_encoding(&doc_id, paper, stage)
            .await
            .map_err(|e| (Stage::Encoding, e))?
        {
            return Ok(resumed);
        }

        set_stage(stage, Stage::Acquiring);
        self.log
            .info(&doc_id, Stage::Acquiring.as_str(), &format!("fetching {}", paper.pdf_url));
        let acquired = self
            .acquirer
            .acquire(&paper.pdf_url)
            .await
            .map_err(|e| (Stage::Acquiring, e))?;

        let raw_path = self
            .output_dir
            .join("raw")
            .join(format!("{}.pdf", sanitize_filename(&paper.source_id)));
        std::fs::write(&raw_path, &acquired.bytes)
            .map_err(|e| (Stage::Acquiring, PipelineError::Storage(e.to_string())))?;

        set_stage(stage, Stage::Rendering);
        let rendered = self
            .renderer
            .render(&acquired.bytes, "pdf")
            .await
            .map_err(|e| (Stage::Rendering, e))?;
        for warning in &rendered.warnings {
            self.log.warning(&doc_id, Stage::Rendering.as_str(), warning);
        }

        set_stage(stage, Stage::Filtering);
        let filtered = filter_sections(
            &rendered.markdown,
            &self.config.filter.exclude_sections,
        );
        for warning in &filtered.warnings {
            self.log.warning(&doc_id, Stage::Filtering.as_str(), warning);
        }

        set_stage(stage, Stage::Chunking);
        let opts = ChunkerOptions::from(&self.config.chunking);
        let chunks = chunk_markdown(&doc_id, &filtered.markdown, &opts, self.encoder.as_ref())
            .await
            .map_err(|e| (Stage::Chunking, e))?;
        if chunks.is_empty() {
            return Err((
                Stage::Chunking,
                PipelineError::ValidationFailed("document produced no chunks".into()),
            ));
        }

        set_stage(stage, Stage::Encoding);
        let now = Utc::now().timestamp();
        let document = Document {
            id: doc_id.clone(),
            source_type: paper.source_type.clone(),
            source_id: paper.source_id.clone(),
            version: paper.version.clone(),
            title: paper.title.clone(),
            source_url: Some(paper.pdf_url.clone()),
            license: paper.license.clone(),
            authors: if self.config.source.include_authors {
                Some(paper.authors.clone())
            } else {
                None
            },
            content_hash_sha256: acquired.sha256.clone(),
            content_hash_sha512: acquired.sha512.clone(),
            created_at: now,
            updated_at: now,
        };

        self.store
            .put_document(&document)
            .await
            .map_err(|e| (Stage::Encoding, e))?;
        let old_chunk_ids = self
            .store
            .put_chunks(&doc_id, &chunks)
            .await
            .map_err(|e| (Stage::Encoding, e))?;
        self.index
            .delete(&old_chunk_ids)
            .await
            .map_err(|e| (Stage::Encoding, e))?;

        self.encode_and_index(&doc_id, &paper.source_type, &chunks)
            .await
            .map_err(|e| (Stage::Encoding, e))?;

        self.cache
            .record(&CacheEntry {
                source_type: paper.source_type.clone(),
                source_id: paper.source_id.clone(),
                version: paper.version.clone(),
                content_hash_sha256: acquired.sha256,
                document_id: doc_id.clone(),
                output_location: raw_path.to_string_lossy().into_owned(),
                last_processed_at: now,
            })
            .await
            .map_err(|e| (Stage::Encoding, e))?;

        self.log.info(
            &doc_id,
            Stage::Indexed.as_str(),
            &format!("{} {}: {} chunks indexed", paper.source_id, paper.version, chunks.len()),
        );
        Ok(chunks.len() as u64)
    }

    /// If the store already holds this version's chunks but the index is
    /// missing vectors (a crash between store commit and index write), redo
    /// only the encoding step.
    async fn try_resume_encoding(
        &self,
        doc_id: &str,
        paper: &PaperMeta,
        stage: &Mutex<Stage>,
    ) -> Result<Option<u64>, PipelineError> {
        let existing = match self.store.get_document(doc_id).await? {
            Some(doc) if doc.version == paper.version => doc,
            _ => return Ok(None),
        };

        let chunk_count = self.store.chunk_count(doc_id).await?;
        if chunk_count == 0 {
            return Ok(None);
        }
        let indexed = self.index.count_for_document(doc_id).await?;
        if indexed as i64 >= chunk_count {
            return Ok(None);
        }

        set_stage(stage, Stage::Encoding);
        self.log.info(
            doc_id,
            Stage::Encoding.as_str(),
            &format!(
                "resuming encoding for {}: {indexed} of {chunk_count} vectors present",
                paper.source_id
            ),
        );

        let chunks = self.store.get_chunks_by_document(doc_id).await?;
        self.encode_and_index(doc_id, &paper.source_type, &chunks)
            .await?;

        if let Some(mut entry) = self.cache.lookup(&paper.source_type, &paper.source_id).await? {
            entry.last_processed_at = Utc::now().timestamp();
            self.cache.record(&entry).await?;
        } else {
            self.cache
                .record(&CacheEntry {
                    source_type: paper.source_type.clone(),
                    source_id: paper.source_id.clone(),
                    version: existing.version.clone(),
                    content_hash_sha256: existing.content_hash_sha256.clone(),
                    document_id: doc_id.to_string(),
                    output_location: self
                        .output_dir
                        .join("raw")
                        .join(format!("{}.pdf", sanitize_filename(&paper.source_id)))
                        .to_string_lossy()
                        .into_owned(),
                    last_processed_at: Utc::now().timestamp(),
                })
                .await?;
        }

        Ok(Some(chunk_count as u64))
    }

    /// Embed chunks in batches and upsert their vectors. The index stores
    /// identifiers and filter metadata only.
    async fn encode_and_index(
        &self,
        document_id: &str,
        source_type: &str,
        chunks: &[Chunk],
    ) -> Result<(), PipelineError> {
        for batch in chunks.chunks(self.config.encoder.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.encoder.embed(&texts).await?;

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord {
                    chunk_id: chunk.id.clone(),
                    document_id: document_id.to_string(),
                    source_type: source_type.to_string(),
                    section_path: chunk.section_path.join(" > "),
                    vector,
                })
                .collect();
            self.index.upsert(&records).await?;
        }
        Ok(())
    }
}

fn set_stage(cell: &Mutex<Stage>, stage: Stage) {
    let mut guard = match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = stage;
}

fn read_stage(cell: &Mutex<Stage>) -> Stage {
    match cell.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Deterministic document ID: the same source artifact always maps to the
/// same UUID, across runs and machines.
pub fn document_id_for(source_type: &str, source_id: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{source_type}:{source_id}").as_bytes(),
    )
    .to_string()
}

fn sanitize_filename(source_id: &str) -> String {
    source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_deterministic() {
        let a = document_id_for("arxiv", "2101.00001");
        let b = document_id_for("arxiv", "2101.00001");
        assert_eq!(a, b);
        assert_ne!(a, document_id_for("arxiv", "2101.00002"));
        assert_ne!(a, document_id_for("biorxiv", "2101.00001"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("2101.00001"), "2101.00001");
        assert_eq!(sanitize_filename("cond-mat/0001001"), "cond-mat_0001001");
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::Acquiring.as_str(), "acquiring");
        assert_eq!(Stage::Indexed.as_str(), "indexed");
    }

    #[test]
    fn stage_cell_tracks_last_entered_stage() {
        let cell = Mutex::new(Stage::Discovered);
        assert_eq!(read_stage(&cell), Stage::Discovered);
        set_stage(&cell, Stage::Rendering);
        set_stage(&cell, Stage::Chunking);
        assert_eq!(read_stage(&cell), Stage::Chunking);
    }
}
