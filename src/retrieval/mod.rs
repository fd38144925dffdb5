// Retrieval module
// Runs the search strategies in priority order, merges their candidates by id and re-ranks the result


pub mod analyzer;
pub mod strategies;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::RagError;
use crate::database::{DocumentStore, RetrievedMatch};
use crate::embeddings::Embedder;

pub use analyzer::{QueryAnalysis, QueryAnalyzer};
pub use strategies::{SearchContext, SearchStrategy, default_strategies};

/// Thresholds and limits for the search strategies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Alternate phrasings searched per question
    pub max_phrasings: usize,
    pub semantic_threshold: f32,
    pub semantic_limit: usize,
    pub code_threshold: f32,
    pub code_limit: usize,
    /// Below this many matches the institution and keyword strategies run
    pub min_matches: usize,
    /// Strategies stop once this many matches have been merged
    pub sufficient_matches: usize,
    pub keyword_limit: usize,
    /// Fixed similarity assigned to keyword matches
    pub keyword_score: f32,
    /// General questions with fewer matches than this get a diverse sample
    pub sample_trigger: usize,
    pub sample_limit: usize,
    /// Fixed similarity assigned to sampled chunks
    pub sample_score: f32,
    /// Matches handed to the answer synthesizer
    pub context_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_phrasings: 3,
            semantic_threshold: 0.1,
            semantic_limit: 10,
            code_threshold: 0.01,
            code_limit: 8,
            min_matches: 5,
            sufficient_matches: 15,
            keyword_limit: 10,
            keyword_score: 0.5,
            sample_trigger: 3,
            sample_limit: 8,
            sample_score: 0.3,
            context_cap: 12,
        }
    }
}

pub struct RetrievalEngine {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
    strategies: Vec<Box<dyn SearchStrategy>>,
}

impl RetrievalEngine {
    #[inline]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self::with_strategies(store, embedder, config, default_strategies())
    }

    #[inline]
    pub fn with_strategies(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
        strategies: Vec<Box<dyn SearchStrategy>>,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            strategies,
        }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Ranked, id-unique matches for `question`, at most `context_cap` long.
    ///
    /// Only a failure to embed the primary phrasing is an error; failing
    /// strategies are logged and contribute nothing. No matches at all is an
    /// empty vector.
    #[inline]
    pub async fn retrieve(
        &self,
        question: &str,
        analysis: &QueryAnalysis,
    ) -> crate::Result<Vec<RetrievedMatch>> {
        let primary_query = analysis
            .search_phrasings()
            .into_iter()
            .next()
            .unwrap_or_else(|| question.to_string());

        let primary_embedding = self
            .embedder
            .embed(&primary_query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let context = SearchContext {
            analysis,
            primary_query: &primary_query,
            primary_embedding: &primary_embedding,
            store: self.store.as_ref(),
            embedder: self.embedder.as_ref(),
            config: &self.config,
        };

        let mut merged = Vec::new();
        let mut seen = HashSet::new();

        for strategy in &self.strategies {
            if merged.len() >= self.config.sufficient_matches {
                debug!("{} matches merged, skipping remaining strategies", merged.len());
                break;
            }
            if !strategy.applies(&context, merged.len()) {
                continue;
            }

            let candidates = match strategy.propose(&context).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Strategy {} failed: {:#}", strategy.name(), e);
                    continue;
                }
            };
            let added = merge_matches(&mut merged, &mut seen, candidates);
            debug!("Strategy {} added {} matches", strategy.name(), added);
        }

        let ranked = rerank(merged, analysis.program.as_deref(), self.config.context_cap);
        info!("Retrieved {} matches for question", ranked.len());
        Ok(ranked)
    }
}

/// Append candidates whose id has not been seen; earlier matches keep their score.
/// Returns how many were added.
#[inline]
pub fn merge_matches(
    merged: &mut Vec<RetrievedMatch>,
    seen: &mut HashSet<String>,
    candidates: Vec<RetrievedMatch>,
) -> usize {
    let before = merged.len();
    for candidate in candidates {
        if seen.insert(candidate.id.clone()) {
            merged.push(candidate);
        }
    }
    merged.len() - before
}

/// Matches mentioning `program` verbatim first, then by similarity descending;
/// truncated to `cap`. The sort is stable so ties keep merge order.
#[inline]
pub fn rerank(
    mut matches: Vec<RetrievedMatch>,
    program: Option<&str>,
    cap: usize,
) -> Vec<RetrievedMatch> {
    let mentions =
        |m: &RetrievedMatch| program.is_some_and(|name| m.content.contains(name));

    matches.sort_by(|a, b| {
        mentions(b)
            .cmp(&mentions(a))
            .then_with(|| b.similarity.total_cmp(&a.similarity))
    });
    matches.truncate(cap);
    matches
}
