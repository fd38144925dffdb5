// In-memory collaborators for unit tests

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use futures::StreamExt;

use crate::chunker::{ChunkMetadata, ChunkType};
use crate::database::{
    DocumentStore, NewDocument, RetrievedMatch, SampleFilter, StoredDocument, cosine_similarity,
    hybrid_score, query_tokens, token_overlap,
};
use crate::embeddings::{Embedder, LanguageModel, Prompt, TokenStream};

const HASH_DIMENSION: usize = 64;

/// Program chunk metadata with the given name and code
pub fn program_metadata(name: Option<&str>, code: Option<&str>, index: u32) -> ChunkMetadata {
    ChunkMetadata {
        program_name: name.map(str::to_string),
        program_code: code.map(str::to_string),
        institution: None,
        section: None,
        chunk_type: ChunkType::Program,
        chunk_index: index,
    }
}

pub fn retrieved(id: &str, content: &str, similarity: f32) -> RetrievedMatch {
    RetrievedMatch {
        id: id.to_string(),
        content: content.to_string(),
        metadata: program_metadata(None, None, 0),
        similarity,
    }
}

/// Vector store kept in a `Vec`, scoring like the LanceDB store
pub struct MemoryStore {
    documents: Mutex<Vec<(StoredDocument, Vec<f32>)>>,
    keyword_weight: f32,
    fail_inserts_containing: Option<String>,
    fail_hybrid_queries: Vec<String>,
    hybrid_queries: Mutex<Vec<String>>,
    text_searches: Mutex<Vec<Vec<String>>>,
    next_id: Mutex<u64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            keyword_weight: 0.3,
            fail_inserts_containing: None,
            fail_hybrid_queries: Vec::new(),
            hybrid_queries: Mutex::new(Vec::new()),
            text_searches: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts whose content contains `marker` fail
    pub fn failing_inserts_containing(mut self, marker: &str) -> Self {
        self.fail_inserts_containing = Some(marker.to_string());
        self
    }

    /// Hybrid searches for exactly `query_text` fail
    pub fn failing_hybrid_query(mut self, query_text: &str) -> Self {
        self.fail_hybrid_queries.push(query_text.to_string());
        self
    }

    pub fn seed(&self, id: &str, content: &str, metadata: ChunkMetadata, embedding: Vec<f32>) {
        self.documents.lock().expect("store lock").push((
            StoredDocument {
                id: id.to_string(),
                content: content.to_string(),
                metadata,
            },
            embedding,
        ));
    }

    pub fn documents(&self) -> Vec<StoredDocument> {
        self.documents
            .lock()
            .expect("store lock")
            .iter()
            .map(|(doc, _)| doc.clone())
            .collect()
    }

    pub fn hybrid_queries(&self) -> Vec<String> {
        self.hybrid_queries.lock().expect("store lock").clone()
    }

    pub fn text_searches(&self) -> Vec<Vec<String>> {
        self.text_searches.lock().expect("store lock").clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, document: NewDocument) -> Result<String> {
        if self
            .fail_inserts_containing
            .as_deref()
            .is_some_and(|marker| document.content.contains(marker))
        {
            bail!("insert rejected for chunk {}", document.metadata.chunk_index);
        }

        let id = {
            let mut next_id = self.next_id.lock().expect("id lock");
            *next_id += 1;
            format!("doc-{}", *next_id)
        };
        self.seed(&id, &document.content, document.metadata, document.embedding);
        Ok(id)
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedMatch>> {
        self.hybrid_queries
            .lock()
            .expect("store lock")
            .push(query_text.to_string());

        if self.fail_hybrid_queries.iter().any(|q| q == query_text) {
            bail!("hybrid search unavailable for '{}'", query_text);
        }

        let tokens = query_tokens(query_text);
        let mut matches: Vec<RetrievedMatch> = self
            .documents
            .lock()
            .expect("store lock")
            .iter()
            .map(|(doc, embedding)| {
                let score = hybrid_score(
                    cosine_similarity(query_embedding, embedding),
                    token_overlap(&doc.content, &tokens),
                    self.keyword_weight,
                );
                RetrievedMatch::scored(doc.clone(), score)
            })
            .filter(|m| m.similarity >= threshold)
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn text_search(&self, keywords: &[String], limit: usize) -> Result<Vec<StoredDocument>> {
        self.text_searches
            .lock()
            .expect("store lock")
            .push(keywords.to_vec());

        Ok(self
            .documents()
            .into_iter()
            .filter(|doc| keywords.iter().any(|k| doc.content.contains(k.as_str())))
            .take(limit)
            .collect())
    }

    async fn sample(&self, limit: usize, filter: SampleFilter) -> Result<Vec<StoredDocument>> {
        Ok(self
            .documents()
            .into_iter()
            .filter(|doc| match filter {
                SampleFilter::Any => true,
                SampleFilter::HasProgramName => doc.metadata.program_name.is_some(),
            })
            .take(limit)
            .collect())
    }

    async fn delete_all(&self) -> Result<()> {
        self.documents.lock().expect("store lock").clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.documents.lock().expect("store lock").len() as u64)
    }
}

/// Deterministic bag-of-words embedder
#[derive(Default)]
pub struct HashEmbedder {
    fail_all: bool,
    fail_containing: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_containing: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("embedder lock").clone()
    }

    /// The vector `embed` would return, computed synchronously
    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; HASH_DIMENSION];
        for token in query_tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() % HASH_DIMENSION as u64) as usize;
            vector[slot] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls
            .lock()
            .expect("embedder lock")
            .push(text.to_string());

        if self.fail_all {
            bail!("embedding service unavailable");
        }
        if self
            .fail_containing
            .as_deref()
            .is_some_and(|marker| text.contains(marker))
        {
            bail!("embedding rejected");
        }
        Ok(Self::vector(text))
    }
}

/// Language model returning canned output
#[derive(Default)]
pub struct ScriptedModel {
    completion: Option<String>,
    tokens: Vec<String>,
    stream_error: Option<String>,
    fail_stream_start: bool,
    token_delay: Duration,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    /// `complete` answers with `completion`; `complete` fails when unset
    pub fn completing(completion: &str) -> Self {
        Self {
            completion: Some(completion.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_tokens(mut self, tokens: &[&str]) -> Self {
        self.tokens = tokens.iter().map(|t| (*t).to_string()).collect();
        self
    }

    /// The stream yields this error after its tokens
    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    pub fn with_failing_stream_start(mut self) -> Self {
        self.fail_stream_start = true;
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().expect("model lock").clone()
    }

    fn record(&self, prompt: &Prompt) {
        self.prompts
            .lock()
            .expect("model lock")
            .push(prompt.clone());
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.record(prompt);
        self.completion
            .clone()
            .ok_or_else(|| anyhow!("model unavailable"))
    }

    async fn stream(&self, prompt: &Prompt) -> Result<TokenStream> {
        self.record(prompt);
        if self.fail_stream_start {
            bail!("model unavailable");
        }

        let mut items: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.stream_error {
            items.push(Err(anyhow!(message.clone())));
        }

        let delay = self.token_delay;
        Ok(futures::stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }
}
