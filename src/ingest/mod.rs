// Ingestion module
// Reads a source document, chunks it and writes embedded chunks to the store in rate-limited batches


use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::RagError;
use crate::chunker::{Chunk, ChunkingConfig, chunk_document};
use crate::database::sqlite::models::IngestCounts;
use crate::database::{DocumentStore, NewDocument};
use crate::embeddings::Embedder;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Chunks embedded and inserted concurrently
    pub batch_size: usize,
    /// Pause between batches, in milliseconds
    pub batch_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            batch_delay_ms: 500,
        }
    }
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub total_chunks: usize,
    pub success_count: usize,
    pub error_count: usize,
}

impl From<IngestReport> for IngestCounts {
    #[inline]
    fn from(report: IngestReport) -> Self {
        let clamp = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Self {
            total_chunks: clamp(report.total_chunks),
            success_count: clamp(report.success_count),
            error_count: clamp(report.error_count),
        }
    }
}

/// Replaces the store contents with the chunks of one document
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    config: IngestConfig,
    progress: Option<ProgressBar>,
}

impl Ingestor {
    #[inline]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking,
            config,
            progress: None,
        }
    }

    /// Report per-chunk progress on `progress`; its length is set when chunking finishes
    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Read, chunk and store the document at `path`
    #[inline]
    pub async fn ingest(&self, path: &Path) -> crate::Result<IngestReport> {
        let text = read_document(path).await?;
        info!("Read {} characters from {}", text.len(), path.display());
        self.ingest_text(&text).await
    }

    #[inline]
    pub async fn ingest_text(&self, text: &str) -> crate::Result<IngestReport> {
        let chunks = chunk_document(text, &self.chunking);
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(
                "document produced no chunks".to_string(),
            ));
        }
        self.ingest_chunks(chunks).await
    }

    /// Clear the store, then embed and insert `chunks` batch by batch.
    ///
    /// Failures of individual chunks are logged and counted; only a failure
    /// to clear the store aborts the run.
    #[inline]
    pub async fn ingest_chunks(&self, chunks: Vec<Chunk>) -> crate::Result<IngestReport> {
        let mut report = IngestReport {
            total_chunks: chunks.len(),
            ..IngestReport::default()
        };

        self.store
            .delete_all()
            .await
            .map_err(|e| RagError::Database(format!("Failed to clear document store: {:#}", e)))?;
        info!("Cleared document store, ingesting {} chunks", chunks.len());

        if let Some(progress) = &self.progress {
            progress.set_length(chunks.len() as u64);
        }

        let batch_size = self.config.batch_size.max(1);
        let batch_count = chunks.len().div_ceil(batch_size);

        for (batch_number, batch) in chunks.chunks(batch_size).enumerate() {
            let results = join_all(batch.iter().map(|chunk| self.store_chunk(chunk))).await;

            for (chunk, result) in batch.iter().zip(results) {
                match result {
                    Ok(id) => {
                        debug!("Stored chunk {} as {}", chunk.metadata.chunk_index, id);
                        report.success_count += 1;
                    }
                    Err(e) => {
                        warn!("Failed to store chunk {}: {:#}", chunk.metadata.chunk_index, e);
                        report.error_count += 1;
                    }
                }
            }

            if let Some(progress) = &self.progress {
                progress.inc(batch.len() as u64);
            }

            if batch_number + 1 < batch_count && self.config.batch_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        info!(
            "Ingestion finished: {} stored, {} failed",
            report.success_count, report.error_count
        );
        Ok(report)
    }

    async fn store_chunk(&self, chunk: &Chunk) -> anyhow::Result<String> {
        let embedding = self
            .embedder
            .embed(&chunk.content)
            .await
            .context("Failed to embed chunk")?;

        self.store
            .insert(NewDocument {
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            })
            .await
            .context("Failed to insert chunk")
    }
}

/// Chunk the document at `path` without touching any collaborator
#[inline]
pub async fn preview(path: &Path, chunking: &ChunkingConfig) -> crate::Result<Vec<Chunk>> {
    let text = read_document(path).await?;
    Ok(chunk_document(&text, chunking))
}

/// Text of a source document; `.pdf` files go through text extraction
#[inline]
pub async fn read_document(path: &Path) -> crate::Result<String> {
    if is_pdf(path) {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
            .await
            .context("PDF extraction task failed")?
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;
        return Ok(text);
    }

    Ok(tokio::fs::read_to_string(path).await?)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
