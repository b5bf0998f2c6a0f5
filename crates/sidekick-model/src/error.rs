//! Error types for model serving.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while acquiring, loading or running a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inference server returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// Inference server is not running or not reachable.
    #[error("Inference server not running at {0}")]
    ServerNotRunning(String),

    /// Inference server failed to start.
    #[error("Failed to start inference server: {0}")]
    ServerStartFailed(String),

    /// Inference server process exited unexpectedly.
    #[error("Inference server process died: {0}")]
    ServerDied(String),

    /// Timeout waiting for the inference server to answer its health check.
    #[error("Timeout waiting for inference server to become ready")]
    ServerStartTimeout,

    /// llama-server binary not found.
    #[error("llama-server binary not found at {0}. Set SIDEKICK_LLAMA_SERVER or install it there")]
    ServerBinaryNotFound(String),

    /// Model not found locally.
    #[error("Model '{0}' not found. Download it with: sidekick model pull")]
    ModelNotFound(String),

    /// Model download failed.
    #[error("Failed to download model: {0}")]
    DownloadFailed(String),

    /// No bytes arrived for longer than the idle timeout.
    #[error("Download stalled: no data received for {0:?}")]
    DownloadStalled(Duration),

    /// Checksum verification failed.
    #[error("Model checksum mismatch. Expected: {expected}, got: {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The model file failed the validity heuristic.
    #[error("Model file {0} is corrupted. Please try again")]
    CorruptModel(String),

    /// Generation was requested before the model finished loading.
    #[error("Model is not ready")]
    NotReady,

    /// Model loading did not finish in time.
    #[error("Model loading timed out after {0:?}")]
    LoadTimeout(Duration),

    /// Generation did not finish in time.
    #[error("Response generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// The runtime could not allocate memory for the request.
    #[error("Out of memory during generation: {0}")]
    OutOfMemory(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
