//! The inference runtime seam.
//!
//! Everything above this module talks to a model through
//! [`InferenceEngine`]; only [`LlamaCppLoader`] knows that the runtime is a
//! llama-server child process.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ModelError;
use crate::paths::llama_server_path;
use crate::server::{resident_memory, LlamaCppServer};
use crate::DEFAULT_PORT;

/// Where the model's layers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    Gpu,
    Cpu,
}

impl Accelerator {
    /// Number of layers to offload to the GPU.
    pub fn gpu_layers(self) -> u32 {
        match self {
            Accelerator::Gpu => 999,
            Accelerator::Cpu => 0,
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::Gpu => write!(f, "GPU"),
            Accelerator::Cpu => write!(f, "CPU"),
        }
    }
}

/// Options fixed at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound on generated tokens per request.
    pub max_tokens: u32,
    /// Context window in tokens.
    pub ctx_size: u32,
    /// Loopback port the runtime listens on.
    pub port: u16,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            ctx_size: 4096,
            port: DEFAULT_PORT,
        }
    }
}

/// Per-request sampling options.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub seed: u64,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.3,
            top_k: 40,
            seed: 42,
        }
    }
}

/// A loaded model that can answer prompts.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generate a completion for an already templated prompt.
    async fn generate(&self, prompt: &str, options: &SamplingOptions)
        -> Result<String, ModelError>;

    /// Where the model ended up running.
    fn accelerator(&self) -> Accelerator;

    /// Resident memory of the runtime, when known.
    fn memory_usage_bytes(&self) -> Option<u64>;

    /// Release the model.
    fn shutdown(&mut self) -> Result<(), ModelError>;
}

/// Loads model files into an [`InferenceEngine`].
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(
        &self,
        model_path: &Path,
        accelerator: Accelerator,
        options: &EngineOptions,
    ) -> Result<Box<dyn InferenceEngine>, ModelError>;
}

/// Launches llama-server for each load.
pub struct LlamaCppLoader {
    binary: PathBuf,
    ready_timeout: Duration,
}

impl LlamaCppLoader {
    pub fn new() -> Self {
        Self {
            binary: llama_server_path(),
            ready_timeout: Duration::from_secs(120),
        }
    }

    /// Use a specific llama-server binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// How long a freshly started server may take to pass its health check.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

impl Default for LlamaCppLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineLoader for LlamaCppLoader {
    async fn load(
        &self,
        model_path: &Path,
        accelerator: Accelerator,
        options: &EngineOptions,
    ) -> Result<Box<dyn InferenceEngine>, ModelError> {
        let mut server =
            LlamaCppServer::new(model_path, options.clone()).with_binary(&self.binary);
        server.start(accelerator)?;
        // On error the server is dropped here, which stops the child.
        server.wait_ready(self.ready_timeout).await?;

        Ok(Box::new(LlamaCppEngine {
            client: server.client(),
            server,
            accelerator,
        }))
    }
}

/// A model served by a running llama-server.
pub struct LlamaCppEngine {
    server: LlamaCppServer,
    client: crate::client::LlamaCppClient,
    accelerator: Accelerator,
}

#[async_trait]
impl InferenceEngine for LlamaCppEngine {
    async fn generate(
        &self,
        prompt: &str,
        options: &SamplingOptions,
    ) -> Result<String, ModelError> {
        self.client.complete(prompt, options).await
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    fn memory_usage_bytes(&self) -> Option<u64> {
        self.server.pid().and_then(resident_memory)
    }

    fn shutdown(&mut self) -> Result<(), ModelError> {
        self.server.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_values() {
        let sampling = SamplingOptions::default();
        assert_eq!(sampling.max_tokens, 512);
        assert_eq!(sampling.top_k, 40);
        assert_eq!(sampling.seed, 42);
        assert!((sampling.temperature - 0.3).abs() < f32::EPSILON);

        let engine = EngineOptions::default();
        assert_eq!(engine.port, DEFAULT_PORT);
    }

    #[test]
    fn test_accelerator_display() {
        assert_eq!(Accelerator::Gpu.to_string(), "GPU");
        assert_eq!(Accelerator::Cpu.gpu_layers(), 0);
    }

    #[tokio::test]
    async fn test_loader_reports_missing_binary() {
        let loader = LlamaCppLoader::new().with_binary("/no/such/llama-server");
        let result = loader
            .load(
                Path::new("model.gguf"),
                Accelerator::Cpu,
                &EngineOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(ModelError::ServerBinaryNotFound(_))));
    }
}
