// Answer synthesis module
// Streams the model's answer as ordered events: sources, chunks, then done or error


pub mod context;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error};

use crate::chunker::ChunkMetadata;
use crate::database::RetrievedMatch;
use crate::embeddings::{LanguageModel, Prompt};

pub use context::{NO_INFORMATION, format_context};

/// Shown to the user when answer generation fails
pub const ANSWER_FAILURE_MESSAGE: &str =
    "عذراً، حدث خطأ أثناء معالجة سؤالك. يرجى المحاولة مرة أخرى.";

const SYSTEM_TEMPLATE: &str = "\
أنت مساعد متخصص في الإجابة عن أسئلة القبول في برامج مؤسسات التعليم العالي.
أجب باللغة العربية اعتماداً فقط على المعلومات الواردة في السياق أدناه.
إذا لم يتضمن السياق الإجابة فاذكر ذلك بوضوح ولا تخمن.
اذكر اسم البرنامج ورمزه والمؤسسة التعليمية عند الإشارة إلى أي برنامج.

السياق:
{context}";

const QUESTION_TEMPLATE: &str = "السؤال: {question}";

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnswerConfig {
    /// Characters of chunk content kept in a source preview
    pub source_preview_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            source_preview_chars: 200,
        }
    }
}

/// A retrieved chunk as shown alongside the answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePreview {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub similarity: f32,
}

impl SourcePreview {
    #[inline]
    pub fn from_match(m: &RetrievedMatch, preview_chars: usize) -> Self {
        Self {
            id: m.id.clone(),
            content: truncate_preview(&m.content, preview_chars),
            metadata: m.metadata.clone(),
            similarity: m.similarity,
        }
    }
}

/// Events of one answer, in order: `Sources`, any number of `Chunk`, then
/// exactly one of `Done` or `Error`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AnswerEvent {
    Sources(Vec<SourcePreview>),
    Chunk(String),
    Done,
    Error(String),
}

/// Receiving side of an answer being generated.
///
/// Dropping the stream aborts generation along with the model call.
pub struct AnswerStream {
    receiver: mpsc::Receiver<AnswerEvent>,
    task: JoinHandle<()>,
}

impl AnswerStream {
    /// Handle that stops generation without consuming the stream
    #[inline]
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    #[inline]
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Stream for AnswerStream {
    type Item = AnswerEvent;

    #[inline]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for AnswerStream {
    #[inline]
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    config: AnswerConfig,
}

impl AnswerSynthesizer {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>, config: AnswerConfig) -> Self {
        Self { model, config }
    }

    /// Fill the system and question templates
    #[inline]
    pub fn build_prompt(question: &str, context: &str) -> Prompt {
        Prompt::new(QUESTION_TEMPLATE.replace("{question}", question))
            .with_system(SYSTEM_TEMPLATE.replace("{context}", context))
    }

    /// Start generating an answer grounded on `matches`.
    ///
    /// Must be called within a Tokio runtime; generation runs on a spawned task.
    #[inline]
    pub fn synthesize(&self, question: &str, matches: &[RetrievedMatch]) -> AnswerStream {
        let sources = matches
            .iter()
            .map(|m| SourcePreview::from_match(m, self.config.source_preview_chars))
            .collect();
        let prompt = Self::build_prompt(question, &format_context(matches));
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(run_generation(Arc::clone(&self.model), prompt, sources, sender));

        AnswerStream { receiver, task }
    }
}

async fn run_generation(
    model: Arc<dyn LanguageModel>,
    prompt: Prompt,
    sources: Vec<SourcePreview>,
    sender: mpsc::Sender<AnswerEvent>,
) {
    if sender.send(AnswerEvent::Sources(sources)).await.is_err() {
        return;
    }

    let mut tokens = match model.stream(&prompt).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("Failed to start answer generation: {:#}", e);
            let _ = sender
                .send(AnswerEvent::Error(ANSWER_FAILURE_MESSAGE.to_string()))
                .await;
            return;
        }
    };

    while let Some(token) = tokens.next().await {
        match token {
            Ok(text) => {
                if text.is_empty() {
                    continue;
                }
                if sender.send(AnswerEvent::Chunk(text)).await.is_err() {
                    debug!("Answer receiver dropped, stopping generation");
                    return;
                }
            }
            Err(e) => {
                error!("Answer generation failed mid-stream: {:#}", e);
                let _ = sender
                    .send(AnswerEvent::Error(ANSWER_FAILURE_MESSAGE.to_string()))
                    .await;
                return;
            }
        }
    }

    let _ = sender.send(AnswerEvent::Done).await;
}

/// First `max_chars` characters of `content`, with an ellipsis when cut
#[inline]
pub fn truncate_preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut preview = content.get(..cut).unwrap_or(content).to_string();
            preview.push_str("...");
            preview
        }
        None => content.to_string(),
    }
}
