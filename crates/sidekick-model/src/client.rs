//! HTTP client for llama-server's native completion API.

use serde::{Deserialize, Serialize};

use crate::engine::SamplingOptions;
use crate::error::ModelError;
use crate::DEFAULT_PORT;

/// Marker that ends a Gemma turn; generation stops there.
pub const END_OF_TURN: &str = "<end_of_turn>";

/// Client for communicating with llama-server.
pub struct LlamaCppClient {
    client: reqwest::Client,
    base_url: String,
}

/// Raw-prompt completion request for `/completion`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_k: u32,
    seed: u64,
    stop: Vec<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
    #[allow(dead_code)]
    #[serde(default)]
    stop: bool,
}

impl LlamaCppClient {
    /// Create a new client with default URL (localhost:11436).
    pub fn new() -> Self {
        Self::with_port(DEFAULT_PORT)
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a new client with a custom port on localhost.
    pub fn with_port(port: u16) -> Self {
        Self::with_url(format!("http://127.0.0.1:{}", port))
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is running and healthy.
    ///
    /// llama-server answers 503 while the model is still loading.
    pub async fn check_health(&self) -> Result<(), ModelError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ModelError::ServerNotRunning(self.base_url.clone())
                } else {
                    ModelError::Http(e)
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ModelError::ServerNotRunning(self.base_url.clone()))
        }
    }

    /// Run a single completion over an already templated prompt.
    pub async fn complete(
        &self,
        prompt: &str,
        options: &SamplingOptions,
    ) -> Result<String, ModelError> {
        let request = CompletionRequest {
            prompt,
            n_predict: options.max_tokens,
            temperature: options.temperature,
            top_k: options.top_k,
            seed: options.seed,
            stop: vec![END_OF_TURN],
            stream: false,
        };

        let url = format!("{}/completion", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ModelError::ServerNotRunning(self.base_url.clone())
                } else {
                    ModelError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(&format!("{}: {}", status, text)));
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion.content)
    }
}

impl Default for LlamaCppClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocation failures get their own variant so callers can suggest a
/// shorter question instead of a generic retry.
fn classify_error(message: &str) -> ModelError {
    let lower = message.to_lowercase();
    if lower.contains("out of memory")
        || lower.contains("failed to allocate")
        || (lower.contains("alloc") && lower.contains("memory"))
    {
        ModelError::OutOfMemory(message.to_string())
    } else {
        ModelError::Api(message.to_string())
    }
}
