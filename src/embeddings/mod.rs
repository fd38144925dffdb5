// Embedding and language model collaborators
// The pipeline only sees these traits so the Ollama client can be swapped for fakes

pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use ollama::OllamaClient;

/// Incremental text deltas produced by a streaming completion.
/// Dropping the stream aborts the underlying model call.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A prompt sent to the language model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    #[inline]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    #[inline]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Compute the embedding vector for `text`
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run the prompt to completion and return the whole answer
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Start a streaming completion
    async fn stream(&self, prompt: &Prompt) -> Result<TokenStream>;
}
