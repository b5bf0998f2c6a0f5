//! Local model serving for sidekick.
//!
//! This crate owns everything between "the user wants to chat" and "a
//! llama.cpp server is answering prompts": fetching and caching the model
//! artifact, checking that the cached file looks sane, starting the
//! inference server with GPU or CPU offload, and wrapping generation calls
//! with timeouts.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ModelService │-->│ ModelManager │-->│   validate   │   │ llama-server │
//! │  (lifecycle) │   │  (download)  │   │  (heuristic) │   │   process    │
//! └──────┬───────┘   └──────────────┘   └──────────────┘   └──────▲───────┘
//!        │                                                        │
//!        └──────────> EngineLoader / InferenceEngine ─────────────┘
//! ```

mod client;
mod engine;
mod error;
mod model;
pub mod paths;
mod progress;
mod server;
mod service;
pub mod validate;

pub use client::LlamaCppClient;
pub use engine::{
    Accelerator, EngineLoader, EngineOptions, InferenceEngine, LlamaCppEngine, LlamaCppLoader,
    SamplingOptions,
};
pub use error::ModelError;
pub use model::{ModelInfo, ModelManager};
pub use progress::{download_percent, Progress, ProgressFn};
pub use server::LlamaCppServer;
pub use service::{ModelService, ServiceConfig, ServiceConfigBuilder};
pub use validate::{validate_model_file, Validation};

/// Default port for the local llama-server instance.
pub const DEFAULT_PORT: u16 = 11436;

/// Default model name.
pub const DEFAULT_MODEL_NAME: &str = "gemma-3n-e2b-it";

/// Default model filename.
pub const DEFAULT_MODEL_FILENAME: &str = "gemma-3n-E2B-it-Q4_K_M.gguf";

/// Default download location for the model artifact.
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/unsloth/gemma-3n-E2B-it-GGUF/resolve/main/gemma-3n-E2B-it-Q4_K_M.gguf";

/// User agent sent with model downloads.
pub const USER_AGENT: &str = concat!("sidekick/", env!("CARGO_PKG_VERSION"));
