//! Model lifecycle: acquire, load, generate, shut down.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::engine::{
    Accelerator, EngineLoader, EngineOptions, InferenceEngine, LlamaCppLoader, SamplingOptions,
};
use crate::error::ModelError;
use crate::model::{ModelInfo, ModelManager, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::progress::{report, Progress, ProgressFn};

/// Configuration for the model service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Which model to serve and where to fetch it.
    pub model: ModelInfo,
    /// Bearer token for the model host.
    pub hf_token: Option<String>,
    /// Override for the models directory.
    pub models_dir: Option<PathBuf>,
    /// Load-time options.
    pub engine: EngineOptions,
    /// Per-request options.
    pub sampling: SamplingOptions,
    /// Try a GPU load before falling back to CPU.
    pub prefer_gpu: bool,
    /// Idle timeout between download chunks.
    pub download_timeout: Duration,
    /// Budget for loading the model, GPU attempt and CPU fallback included.
    pub load_timeout: Duration,
    /// Budget for a single response.
    pub response_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: ModelManager::default_model(),
            hf_token: None,
            models_dir: None,
            engine: EngineOptions::default(),
            sampling: SamplingOptions::default(),
            prefer_gpu: true,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            load_timeout: Duration::from_secs(120),
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SIDEKICK_MODEL_URL") {
            if let Some(filename) = url.rsplit('/').next().filter(|f| !f.is_empty()) {
                config.model.filename = filename.to_string();
            }
            config.model.url = url;
        }

        if let Ok(filename) = std::env::var("SIDEKICK_MODEL_FILE") {
            config.model.filename = filename;
        }

        config.hf_token = std::env::var("HF_TOKEN")
            .or_else(|_| std::env::var("HUGGING_FACE_HUB_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty());

        if let Some(port) = env_parse("SIDEKICK_PORT") {
            config.engine.port = port;
        }

        if let Some(max_tokens) = env_parse("SIDEKICK_MAX_TOKENS") {
            config.engine.max_tokens = max_tokens;
            config.sampling.max_tokens = max_tokens;
        }

        if let Some(temperature) = env_parse("SIDEKICK_TEMPERATURE") {
            config.sampling.temperature = temperature;
        }

        if let Some(top_k) = env_parse("SIDEKICK_TOP_K") {
            config.sampling.top_k = top_k;
        }

        if let Some(seed) = env_parse("SIDEKICK_SEED") {
            config.sampling.seed = seed;
        }

        config.prefer_gpu = !std::env::var("SIDEKICK_CPU_ONLY")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        config
    }

    /// Create a builder for configuration.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builder for service configuration.
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Start from an existing configuration, e.g. [`ServiceConfig::from_env`].
    pub fn from_config(config: ServiceConfig) -> Self {
        Self { config }
    }

    pub fn model(mut self, model: ModelInfo) -> Self {
        self.config.model = model;
        self
    }

    pub fn hf_token(mut self, token: impl Into<String>) -> Self {
        self.config.hf_token = Some(token.into());
        self
    }

    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.models_dir = Some(dir.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.engine.port = port;
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.engine.max_tokens = tokens;
        self.config.sampling.max_tokens = tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.sampling.temperature = temperature;
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.config.sampling.top_k = top_k;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.sampling.seed = seed;
        self
    }

    pub fn prefer_gpu(mut self, prefer_gpu: bool) -> Self {
        self.config.prefer_gpu = prefer_gpu;
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout;
        self
    }

    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.config.load_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

/// Owns the model from first download to shutdown.
pub struct ModelService {
    config: ServiceConfig,
    manager: ModelManager,
    loader: Box<dyn EngineLoader>,
    engine: Option<Box<dyn InferenceEngine>>,
    initialized: bool,
    initialization_error: Option<String>,
    progress: Arc<Mutex<Progress>>,
    on_progress: Option<ProgressFn>,
}

impl ModelService {
    /// Create a service backed by llama-server.
    pub fn new(config: ServiceConfig) -> Self {
        let loader = LlamaCppLoader::new().with_ready_timeout(config.load_timeout);
        Self::with_loader(config, Box::new(loader))
    }

    /// Create a service with a custom engine loader.
    pub fn with_loader(config: ServiceConfig, loader: Box<dyn EngineLoader>) -> Self {
        let mut manager = ModelManager::new()
            .with_token(config.hf_token.clone())
            .with_download_timeout(config.download_timeout);
        if let Some(dir) = &config.models_dir {
            manager = manager.with_models_dir(dir);
        }

        Self {
            config,
            manager,
            loader,
            engine: None,
            initialized: false,
            initialization_error: None,
            progress: Arc::new(Mutex::new(Progress::default())),
            on_progress: None,
        }
    }

    /// Register a callback for setup progress.
    pub fn set_progress_callback(&mut self, callback: Option<ProgressFn>) {
        self.on_progress = callback;
    }

    /// Make the model available and load it.
    ///
    /// Never fails loudly: the outcome is the return value, the reason is in
    /// [`ModelService::initialization_error`].
    pub async fn initialize(&mut self) -> bool {
        info!("Starting model initialization");
        self.update_progress(0, "Checking for model...");

        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.shutdown() {
                warn!("Error releasing previous engine: {}", e);
            }
        }
        self.initialized = false;

        let model_path = match self.acquire_model().await {
            Ok(path) => path,
            Err(e) => {
                error!("Model setup failed: {}", e);
                self.initialization_error = Some(format!("Failed to obtain model: {}", e));
                self.update_progress(0, "Model setup failed");
                return false;
            }
        };

        self.update_progress(70, "Loading model into memory...");
        info!("Loading model: {}", model_path.display());

        let budget = self.config.load_timeout;
        let loaded = tokio::time::timeout(budget, self.load_engine(&model_path)).await;

        match loaded {
            Ok(Ok(engine)) => {
                info!("Model running on {}", engine.accelerator());
                self.engine = Some(engine);
                self.update_progress(90, "Finalizing setup...");
                self.initialized = true;
                self.initialization_error = None;
                self.update_progress(100, "Model ready!");
                info!("Model service fully initialized");
                true
            }
            Ok(Err(e)) => {
                error!("Model load failed: {}", e);
                self.fail_load();
                false
            }
            Err(_) => {
                error!("{}", ModelError::LoadTimeout(budget));
                self.fail_load();
                false
            }
        }
    }

    async fn acquire_model(&self) -> Result<PathBuf, ModelError> {
        let sink = self.progress_sink();
        self.manager
            .ensure_available(&self.config.model, Some(&sink))
            .await
    }

    /// Records progress locally, then forwards it to the registered callback.
    fn progress_sink(&self) -> ProgressFn {
        let state = self.progress.clone();
        let forward = self.on_progress.clone();
        Arc::new(move |progress: &Progress| {
            if let Ok(mut current) = state.lock() {
                *current = progress.clone();
            }
            if let Some(callback) = &forward {
                callback(progress);
            }
        })
    }

    async fn load_engine(
        &self,
        model_path: &Path,
    ) -> Result<Box<dyn InferenceEngine>, ModelError> {
        let options = self.config.engine.clone();

        if self.config.prefer_gpu {
            self.update_progress(80, "Enabling GPU acceleration...");
            match self
                .loader
                .load(model_path, Accelerator::Gpu, &options)
                .await
            {
                Ok(engine) => {
                    info!("GPU acceleration enabled");
                    return Ok(engine);
                }
                Err(e) => {
                    warn!("GPU unavailable, using CPU: {}", e);
                }
            }
        }

        self.update_progress(80, "Using CPU processing...");
        self.loader.load(model_path, Accelerator::Cpu, &options).await
    }

    fn fail_load(&mut self) {
        self.initialization_error = Some("Model initialization timed out or failed".to_string());
        self.update_progress(0, "Initialization failed");
    }

    /// Run one generation over a templated prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let engine = match (&self.engine, self.initialized) {
            (Some(engine), true) => engine,
            _ => return Err(ModelError::NotReady),
        };

        let start = Instant::now();
        let budget = self.config.response_timeout;

        let response = tokio::time::timeout(budget, engine.generate(prompt, &self.config.sampling))
            .await
            .map_err(|_| ModelError::GenerationTimeout(budget))??;

        debug!(
            "Model responded in {}ms, length: {}",
            start.elapsed().as_millis(),
            response.chars().count()
        );

        Ok(response)
    }

    fn update_progress(&self, percent: u32, status: &str) {
        report(Some(&self.progress_sink()), percent, status);
    }

    pub fn progress(&self) -> Progress {
        self.progress
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn status(&self) -> String {
        self.progress().status().to_string()
    }

    pub fn initialization_error(&self) -> Option<&str> {
        self.initialization_error.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    /// Accelerator of the loaded engine.
    pub fn accelerator(&self) -> Option<Accelerator> {
        self.engine.as_ref().map(|e| e.accelerator())
    }

    /// Human-readable memory footprint of the runtime.
    pub fn memory_usage(&self) -> String {
        match self.engine.as_ref().and_then(|e| e.memory_usage_bytes()) {
            Some(bytes) => format!("Memory: {}MB", bytes / 1024 / 1024),
            None => "Memory: unknown".to_string(),
        }
    }

    /// Release the model. Errors are logged, never returned.
    pub fn shutdown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            match engine.shutdown() {
                Ok(()) => info!("Model service shutdown complete"),
                Err(e) => error!("Error shutting down service: {}", e),
            }
        }
        self.initialized = false;
    }
}

impl Drop for ModelService {
    fn drop(&mut self) {
        self.shutdown();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeLoader;
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn cached_model_config() -> (TempDir, ServiceConfig) {
        let dir = tempdir().unwrap();
        let model = ModelManager::default_model();
        std::fs::write(dir.path().join(&model.filename), b"GGUF-test").unwrap();
        let config = ServiceConfig::builder()
            .models_dir(dir.path())
            .model(ModelInfo {
                // Unroutable: the cache must be used.
                url: "http://127.0.0.1:9/model.gguf".to_string(),
                ..model
            })
            .build();
        (dir, config)
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServiceConfig::builder()
            .port(9000)
            .max_tokens(64)
            .top_k(1)
            .prefer_gpu(false)
            .response_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(config.engine.port, 9000);
        assert_eq!(config.engine.max_tokens, 64);
        assert_eq!(config.sampling.max_tokens, 64);
        assert_eq!(config.sampling.top_k, 1);
        assert!(!config.prefer_gpu);
        assert_eq!(config.response_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_default_timeouts() {
        let config = ServiceConfig::default();
        assert_eq!(config.download_timeout, Duration::from_secs(300));
        assert_eq!(config.load_timeout, Duration::from_secs(120));
        assert_eq!(config.response_timeout, Duration::from_secs(30));
        assert!(config.prefer_gpu);
    }

    #[tokio::test]
    async fn test_generate_before_initialize() {
        let (_dir, config) = cached_model_config();
        let service = ModelService::with_loader(config, Box::new(FakeLoader::replying("x")));
        assert!(matches!(
            service.generate("hi").await,
            Err(ModelError::NotReady)
        ));
        assert_eq!(service.status(), "Initializing...");
    }

    #[tokio::test]
    async fn test_initialize_with_cached_model_on_gpu() {
        let (_dir, config) = cached_model_config();
        let loader = FakeLoader::replying("Hello there, friend.");
        let attempts = loader.attempts.clone();
        let mut service = ModelService::with_loader(config, Box::new(loader));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        service.set_progress_callback(Some(Arc::new(move |p: &Progress| {
            sink.lock().unwrap().push(p.percent())
        })));

        assert!(service.initialize().await);
        assert!(service.is_ready());
        assert_eq!(service.accelerator(), Some(Accelerator::Gpu));
        assert_eq!(attempts.lock().unwrap().as_slice(), &[Accelerator::Gpu]);
        assert_eq!(*seen.lock().unwrap(), vec![0, 60, 70, 80, 90, 100]);
        assert_eq!(service.progress().percent(), 100);
        assert_eq!(service.memory_usage(), "Memory: 256MB");

        let reply = service.generate("prompt").await.unwrap();
        assert_eq!(reply, "Hello there, friend.");
    }

    #[tokio::test]
    async fn test_gpu_failure_falls_back_to_cpu() {
        let (_dir, config) = cached_model_config();
        let mut loader = FakeLoader::replying("ok");
        loader.gpu_works = false;
        let attempts = loader.attempts.clone();
        let mut service = ModelService::with_loader(config, Box::new(loader));

        assert!(service.initialize().await);
        assert_eq!(service.accelerator(), Some(Accelerator::Cpu));
        assert_eq!(
            attempts.lock().unwrap().as_slice(),
            &[Accelerator::Gpu, Accelerator::Cpu]
        );
    }

    #[tokio::test]
    async fn test_cpu_only_skips_gpu() {
        let (_dir, mut config) = cached_model_config();
        config.prefer_gpu = false;
        let loader = FakeLoader::replying("ok");
        let attempts = loader.attempts.clone();
        let mut service = ModelService::with_loader(config, Box::new(loader));

        assert!(service.initialize().await);
        assert_eq!(attempts.lock().unwrap().as_slice(), &[Accelerator::Cpu]);
    }

    #[tokio::test]
    async fn test_load_timeout() {
        let (_dir, mut config) = cached_model_config();
        config.load_timeout = Duration::from_millis(20);
        let mut loader = FakeLoader::replying("ok");
        loader.load_delay = Duration::from_secs(5);
        let mut service = ModelService::with_loader(config, Box::new(loader));

        assert!(!service.initialize().await);
        assert!(!service.is_ready());
        assert_eq!(
            service.initialization_error(),
            Some("Model initialization timed out or failed")
        );
        assert_eq!(service.progress().percent(), 0);
        assert_eq!(service.status(), "Initialization failed");
    }

    #[tokio::test]
    async fn test_missing_model_fails_setup() {
        let dir = tempdir().unwrap();
        let config = ServiceConfig::builder()
            .models_dir(dir.path())
            .model(ModelInfo {
                url: "http://127.0.0.1:9/model.gguf".to_string(),
                ..ModelManager::default_model()
            })
            .build();
        let mut service = ModelService::with_loader(config, Box::new(FakeLoader::replying("x")));

        assert!(!service.initialize().await);
        assert!(service
            .initialization_error()
            .unwrap()
            .starts_with("Failed to obtain model"));
        assert_eq!(service.status(), "Model setup failed");
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let (_dir, mut config) = cached_model_config();
        config.response_timeout = Duration::from_millis(20);
        let mut loader = FakeLoader::replying("slow");
        loader.reply_delay = Duration::from_secs(5);
        let mut service = ModelService::with_loader(config, Box::new(loader));

        assert!(service.initialize().await);
        assert!(matches!(
            service.generate("hi").await,
            Err(ModelError::GenerationTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_clears_ready() {
        let (_dir, config) = cached_model_config();
        let mut service = ModelService::with_loader(config, Box::new(FakeLoader::replying("x")));
        assert!(service.initialize().await);

        service.shutdown();
        assert!(!service.is_ready());
        assert_eq!(service.memory_usage(), "Memory: unknown");
        assert!(matches!(
            service.generate("hi").await,
            Err(ModelError::NotReady)
        ));
    }
}
