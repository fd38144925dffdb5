// Search strategies
// Each strategy proposes candidate matches; the engine folds them in priority order

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use itertools::Itertools;
use tracing::warn;

use super::RetrievalConfig;
use super::analyzer::QueryAnalysis;
use crate::database::{DocumentStore, RetrievedMatch, SampleFilter};
use crate::embeddings::Embedder;

/// Everything a strategy may consult for one retrieval call
pub struct SearchContext<'a> {
    pub analysis: &'a QueryAnalysis,
    /// Highest-priority phrasing, already embedded
    pub primary_query: &'a str,
    pub primary_embedding: &'a [f32],
    pub store: &'a dyn DocumentStore,
    pub embedder: &'a dyn Embedder,
    pub config: &'a RetrievalConfig,
}

impl SearchContext<'_> {
    async fn embed_and_search(
        &self,
        text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedMatch>> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .with_context(|| format!("Failed to embed '{}'", text))?;
        self.store
            .hybrid_search(&embedding, text, threshold, limit)
            .await
    }
}

#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the strategy should run given `accumulated` merged matches so far
    fn applies(&self, context: &SearchContext<'_>, accumulated: usize) -> bool;

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>>;
}

/// The six strategies in priority order
#[inline]
pub fn default_strategies() -> Vec<Box<dyn SearchStrategy>> {
    vec![
        Box::new(MultiPhrasing),
        Box::new(ProgramName),
        Box::new(ProgramCode),
        Box::new(Institution),
        Box::new(KeywordText),
        Box::new(DiverseSample),
    ]
}

/// Semantic search on each analyzer phrasing, issued concurrently
pub struct MultiPhrasing;

#[async_trait]
impl SearchStrategy for MultiPhrasing {
    fn name(&self) -> &'static str {
        "multi-phrasing"
    }

    fn applies(&self, _context: &SearchContext<'_>, _accumulated: usize) -> bool {
        true
    }

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>> {
        let config = context.config;
        let mut phrasings = context.analysis.search_phrasings();
        if phrasings.is_empty() {
            phrasings.push(context.primary_query.to_string());
        }
        phrasings.truncate(config.max_phrasings);

        let searches = phrasings.iter().map(|phrasing| async move {
            let result = if phrasing == context.primary_query {
                context
                    .store
                    .hybrid_search(
                        context.primary_embedding,
                        phrasing,
                        config.semantic_threshold,
                        config.semantic_limit,
                    )
                    .await
            } else {
                context
                    .embed_and_search(phrasing, config.semantic_threshold, config.semantic_limit)
                    .await
            };
            (phrasing, result)
        });

        let mut matches = Vec::new();
        for (phrasing, result) in join_all(searches).await {
            match result {
                Ok(found) => matches.extend(found),
                Err(e) => warn!("Search for phrasing '{}' failed: {:#}", phrasing, e),
            }
        }
        Ok(matches)
    }
}

/// Semantic search on the extracted program name alone
pub struct ProgramName;

#[async_trait]
impl SearchStrategy for ProgramName {
    fn name(&self) -> &'static str {
        "program-name"
    }

    fn applies(&self, context: &SearchContext<'_>, _accumulated: usize) -> bool {
        context
            .analysis
            .program
            .as_deref()
            .is_some_and(|program| program != context.primary_query.trim())
    }

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>> {
        let Some(program) = context.analysis.program.as_deref() else {
            return Ok(Vec::new());
        };
        context
            .embed_and_search(
                program,
                context.config.semantic_threshold,
                context.config.semantic_limit,
            )
            .await
    }
}

/// Search on the program code with a very low threshold, relying on the
/// store's keyword signal
pub struct ProgramCode;

#[async_trait]
impl SearchStrategy for ProgramCode {
    fn name(&self) -> &'static str {
        "program-code"
    }

    fn applies(&self, context: &SearchContext<'_>, _accumulated: usize) -> bool {
        context.analysis.code.is_some()
    }

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>> {
        let Some(code) = context.analysis.code.as_deref() else {
            return Ok(Vec::new());
        };
        context
            .embed_and_search(code, context.config.code_threshold, context.config.code_limit)
            .await
    }
}

/// Search on the institution name while matches are scarce
pub struct Institution;

#[async_trait]
impl SearchStrategy for Institution {
    fn name(&self) -> &'static str {
        "institution"
    }

    fn applies(&self, context: &SearchContext<'_>, accumulated: usize) -> bool {
        context.analysis.university.is_some() && accumulated < context.config.min_matches
    }

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>> {
        let Some(university) = context.analysis.university.as_deref() else {
            return Ok(Vec::new());
        };
        context
            .embed_and_search(
                university,
                context.config.semantic_threshold,
                context.config.semantic_limit,
            )
            .await
    }
}

/// Substring match on keywords and the program name, bypassing embeddings.
/// Matches carry the fixed `keyword_score`.
pub struct KeywordText;

impl KeywordText {
    fn terms(analysis: &QueryAnalysis) -> Vec<String> {
        analysis
            .keywords
            .iter()
            .chain(&analysis.program)
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .unique()
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl SearchStrategy for KeywordText {
    fn name(&self) -> &'static str {
        "keyword-text"
    }

    fn applies(&self, context: &SearchContext<'_>, accumulated: usize) -> bool {
        accumulated < context.config.min_matches && !Self::terms(context.analysis).is_empty()
    }

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>> {
        let terms = Self::terms(context.analysis);
        let documents = context
            .store
            .text_search(&terms, context.config.keyword_limit)
            .await?;
        Ok(documents
            .into_iter()
            .map(|doc| RetrievedMatch::scored(doc, context.config.keyword_score))
            .collect())
    }
}

/// Arbitrary program chunks for general questions that found almost nothing.
/// Matches carry the fixed `sample_score`.
pub struct DiverseSample;

#[async_trait]
impl SearchStrategy for DiverseSample {
    fn name(&self) -> &'static str {
        "diverse-sample"
    }

    fn applies(&self, context: &SearchContext<'_>, accumulated: usize) -> bool {
        context.analysis.is_general_question && accumulated < context.config.sample_trigger
    }

    async fn propose(&self, context: &SearchContext<'_>) -> Result<Vec<RetrievedMatch>> {
        let documents = context
            .store
            .sample(context.config.sample_limit, SampleFilter::HasProgramName)
            .await?;
        Ok(documents
            .into_iter()
            .map(|doc| RetrievedMatch::scored(doc, context.config.sample_score))
            .collect())
    }
}
