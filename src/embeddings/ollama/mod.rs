
use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Embedder, LanguageModel, Prompt, TokenStream};
use crate::config::OllamaConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    chat_model: String,
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
    /// Longest silence tolerated between two streamed tokens
    stream_idle_timeout: Duration,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let timeout = Duration::from_secs(config.timeout_seconds);

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            agent: build_agent(timeout),
            stream_agent: build_stream_agent(timeout),
            stream_idle_timeout: timeout,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.stream_agent = build_stream_agent(timeout);
        self.stream_idle_timeout = timeout;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Test connection to Ollama server and verify both models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping().context("Server ping failed")?;
        self.validate_models().context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.chat_model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build ping URL")?;

        debug!("Pinging Ollama server at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to ping Ollama server")?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that the configured embedding and chat models are available
    #[inline]
    pub fn validate_models(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;
        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();

        for model in [&self.embedding_model, &self.chat_model] {
            debug!("Validating model: {}", model);
            if !available.contains(&model.as_str()) {
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    model,
                    available
                ));
            }
        }

        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate the embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        let embedding = embed_response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding response contained no vectors"))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Run a non-streaming generation and return the full response text
    #[inline]
    pub fn generate(&self, prompt: &Prompt) -> Result<String> {
        let request_json = serde_json::to_string(&self.generate_request(prompt, false))
            .context("Failed to serialize generate request")?;
        let url = self.generate_url()?;

        debug!("Generating completion with model {}", self.chat_model);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate completion")?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generate response")?;

        if let Some(message) = response.error {
            return Err(anyhow::anyhow!("Ollama returned an error: {}", message));
        }

        Ok(response.response)
    }

    /// Open a streaming generation and return the raw NDJSON body reader.
    /// Not retried: a stream cannot be resumed once tokens were handed out.
    fn open_generation_stream(&self, prompt: &Prompt) -> Result<impl Read + Send + 'static> {
        let request_json = serde_json::to_string(&self.generate_request(prompt, true))
            .context("Failed to serialize generate request")?;
        let url = self.generate_url()?;

        debug!("Opening streaming completion with model {}", self.chat_model);

        let response = self
            .stream_agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| anyhow::anyhow!("Failed to start streaming completion: {}", e))?;

        Ok(response.into_body().into_reader())
    }

    fn generate_request(&self, prompt: &Prompt, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: self.chat_model.clone(),
            prompt: prompt.user.clone(),
            system: prompt.system.clone(),
            stream,
        }
    }

    fn generate_url(&self) -> Result<Url> {
        self.base_url
            .join("/api/generate")
            .context("Failed to build generate URL")
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Streams may run far longer than any single request, so only connecting
/// and the wait for the first response are bounded here. Gaps between tokens
/// are bounded by the consumer.
fn build_stream_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_connect(Some(timeout))
        .timeout_recv_response(Some(timeout))
        .build()
        .into()
}

/// Read NDJSON generation lines and forward each token to `sender`.
/// Returns as soon as the receiving side is gone, which drops the reader and
/// closes the HTTP connection.
fn forward_stream_lines<R: Read>(reader: R, sender: &mpsc::Sender<Result<String>>) {
    for line in BufReader::new(reader).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = sender.blocking_send(Err(anyhow::anyhow!("Failed to read stream: {}", e)));
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let chunk: GenerateResponse = match serde_json::from_str(&line) {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = sender.blocking_send(Err(anyhow::anyhow!(
                    "Failed to parse stream chunk: {}",
                    e
                )));
                return;
            }
        };

        if let Some(message) = chunk.error {
            let _ = sender.blocking_send(Err(anyhow::anyhow!("Ollama returned an error: {}", message)));
            return;
        }

        if !chunk.response.is_empty() && sender.blocking_send(Ok(chunk.response)).is_err() {
            debug!("Stream receiver dropped, aborting generation");
            return;
        }

        if chunk.done {
            return;
        }
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.generate_embedding(&text))
            .await
            .context("Embedding task panicked")?
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let client = self.clone();
        let prompt = prompt.clone();
        tokio::task::spawn_blocking(move || client.generate(&prompt))
            .await
            .context("Generation task panicked")?
    }

    async fn stream(&self, prompt: &Prompt) -> Result<TokenStream> {
        let client = self.clone();
        let prompt = prompt.clone();
        let reader = tokio::task::spawn_blocking(move || client.open_generation_stream(&prompt))
            .await
            .context("Streaming task panicked")??;

        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || forward_stream_lines(reader, &sender));

        let idle_timeout = self.stream_idle_timeout;
        Ok(Box::pin(stream::unfold(Some(receiver), move |state| async move {
            let mut receiver = state?;
            match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                Ok(item) => item.map(|item| (item, Some(receiver))),
                Err(_) => {
                    warn!("No tokens received for {:?}, abandoning generation", idle_timeout);
                    let error = anyhow::anyhow!("No tokens received for {:?}", idle_timeout);
                    Some((Err(error), None))
                }
            }
        })))
    }
}
