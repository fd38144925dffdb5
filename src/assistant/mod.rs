// Online question answering
// Analyze, retrieve and synthesize behind one entry point, plus chat sessions with a single in-flight answer


use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::RagError;
use crate::answer::{AnswerStream, AnswerSynthesizer};
use crate::config::Config;
use crate::database::{DocumentStore, RetrievedMatch};
use crate::embeddings::{Embedder, LanguageModel};
use crate::retrieval::{QueryAnalysis, QueryAnalyzer, RetrievalEngine};

pub struct Assistant {
    analyzer: QueryAnalyzer,
    engine: RetrievalEngine,
    synthesizer: AnswerSynthesizer,
}

impl Assistant {
    #[inline]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        config: &Config,
    ) -> Self {
        Self {
            analyzer: QueryAnalyzer::new(Arc::clone(&model)),
            engine: RetrievalEngine::new(store, embedder, config.retrieval.clone()),
            synthesizer: AnswerSynthesizer::new(model, config.answer.clone()),
        }
    }

    /// Analyze and retrieve without generating an answer
    #[inline]
    pub async fn search(
        &self,
        question: &str,
    ) -> crate::Result<(QueryAnalysis, Vec<RetrievedMatch>)> {
        let question = validate_question(question)?;
        let analysis = self.analyzer.analyze(question).await;
        debug!("Analyzed question: {:?}", analysis);
        let matches = self.engine.retrieve(question, &analysis).await?;
        Ok((analysis, matches))
    }

    /// Answer `question` as a stream of events
    #[inline]
    pub async fn ask(&self, question: &str) -> crate::Result<AnswerStream> {
        let (_, matches) = self.search(question).await?;
        info!("Answering with {} supporting matches", matches.len());
        Ok(self.synthesizer.synthesize(question.trim(), &matches))
    }

    #[inline]
    pub fn session(&self) -> ChatSession<'_> {
        ChatSession {
            assistant: self,
            in_flight: None,
        }
    }
}

/// A conversation with at most one answer being generated at a time
pub struct ChatSession<'a> {
    assistant: &'a Assistant,
    in_flight: Option<AbortHandle>,
}

impl ChatSession<'_> {
    /// Cancel any answer still being generated, then ask `question`
    #[inline]
    pub async fn ask(&mut self, question: &str) -> crate::Result<AnswerStream> {
        self.cancel();
        let stream = self.assistant.ask(question).await?;
        self.in_flight = Some(stream.abort_handle());
        Ok(stream)
    }

    #[inline]
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if !handle.is_finished() {
                debug!("Cancelling in-flight answer");
            }
            handle.abort();
        }
    }
}

fn validate_question(question: &str) -> crate::Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidInput("question is empty".to_string()));
    }
    Ok(trimmed)
}
