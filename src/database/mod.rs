// Database module
// LanceDB holds the chunk vectors behind the DocumentStore trait; SQLite keeps the ingestion ledger

#[cfg(test)]
mod tests;

pub mod lancedb;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;

use crate::chunker::ChunkMetadata;

pub use self::lancedb::VectorStore;
pub use sqlite::Database;

/// A chunk ready to be written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A chunk as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A stored chunk paired with a rank score.
///
/// `similarity` is only comparable with other scores from the same
/// retrieval call; it is not a calibrated probability.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedMatch {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub similarity: f32,
}

impl RetrievedMatch {
    #[inline]
    pub fn scored(document: StoredDocument, similarity: f32) -> Self {
        Self {
            id: document.id,
            content: document.content,
            metadata: document.metadata,
            similarity,
        }
    }
}

/// Row filter for [`DocumentStore::sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFilter {
    Any,
    HasProgramName,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store one chunk and return its id
    async fn insert(&self, document: NewDocument) -> Result<String>;

    /// Rank stored chunks by embedding similarity blended with keyword
    /// overlap against `query_text`, keeping scores at or above `threshold`
    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedMatch>>;

    /// Chunks whose content contains any of `keywords`
    async fn text_search(&self, keywords: &[String], limit: usize) -> Result<Vec<StoredDocument>>;

    /// Arbitrary chunks matching `filter`
    async fn sample(&self, limit: usize, filter: SampleFilter) -> Result<Vec<StoredDocument>>;

    async fn delete_all(&self) -> Result<()>;

    async fn count(&self) -> Result<u64>;
}

/// Lowercased alphanumeric tokens of at least two characters, deduplicated
#[inline]
pub fn query_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .unique()
        .collect()
}

/// Fraction of `tokens` that occur in `content`
#[inline]
pub fn token_overlap(content: &str, tokens: &[String]) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let hits = tokens.iter().filter(|t| content.contains(t.as_str())).count();
    hits as f32 / tokens.len() as f32
}

/// Cosine similarity of two vectors, zero for mismatched or degenerate input
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Hybrid score used by the stores: `(1 - w) * cosine + w * overlap`
#[inline]
pub fn hybrid_score(cosine: f32, overlap: f32, keyword_weight: f32) -> f32 {
    (1.0 - keyword_weight) * cosine + keyword_weight * overlap
}
