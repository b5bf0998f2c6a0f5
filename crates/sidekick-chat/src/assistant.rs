//! Assistant - the main entry point for chatting with the local model.

use tracing::{debug, error, info, warn};

use sidekick_model::{ModelError, ModelService, ProgressFn, ServiceConfig};

use crate::clean::clean_response;
use crate::config::ChatConfig;
use crate::fallback::fallback_response;
use crate::history::History;
use crate::prompt::build_prompt;

/// Wraps a [`ModelService`] with conversation history and retry bookkeeping.
pub struct Assistant {
    config: ChatConfig,
    service: ModelService,
    history: History,
    initialization_attempts: u32,
    ready: bool,
}

impl Assistant {
    /// Create an assistant backed by llama-server.
    pub fn new(config: ChatConfig, service_config: ServiceConfig) -> Self {
        Self::with_service(config, ModelService::new(service_config))
    }

    /// Create an assistant around an existing model service.
    pub fn with_service(config: ChatConfig, service: ModelService) -> Self {
        let history = History::new(config.max_history);
        Self {
            config,
            service,
            history,
            initialization_attempts: 0,
            ready: false,
        }
    }

    /// Forward setup progress to `callback`.
    pub fn set_progress_callback(&mut self, callback: Option<ProgressFn>) {
        self.service.set_progress_callback(callback);
    }

    /// Bring the model up. Counts against the attempt budget.
    pub async fn initialize(&mut self) -> bool {
        if !self.can_retry() {
            warn!(
                "Not initializing: {} attempts already used",
                self.initialization_attempts
            );
            return false;
        }

        self.initialization_attempts += 1;
        info!(
            "Initializing assistant (attempt {})",
            self.initialization_attempts
        );

        self.ready = self.service.initialize().await;

        if self.ready {
            info!("Assistant ready! {}", self.service.memory_usage());
        } else {
            error!(
                "Assistant initialization failed: {}",
                self.service
                    .initialization_error()
                    .unwrap_or("unknown error")
            );
        }

        self.ready
    }

    /// Answer a message. Always returns something displayable.
    pub async fn send_message(&mut self, message: &str) -> String {
        debug!("Processing request: {}", preview(message, 50));

        if !self.ready {
            return fallback_response(message, &self.status_message());
        }

        // The current turn is quoted as context as well as asked.
        self.history.push_user(message);
        let prompt = build_prompt(message, self.history.entries(), self.config.context_entries);

        let reply = match self.service.generate(&prompt).await {
            Ok(raw) => {
                let reply = clean_response(&raw, message);
                debug!("Final response length: {}", reply.chars().count());
                reply
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                error_reply(&e).to_string()
            }
        };

        self.history.push_assistant(&reply);
        reply
    }

    /// Explanation appended to fallback replies.
    fn status_message(&self) -> String {
        if self.initialization_attempts >= self.config.max_init_attempts {
            "Please restart the assistant to retry initialization.".to_string()
        } else if let Some(error) = self.service.initialization_error() {
            format!("Initialization issue: {}", preview(error, 80))
        } else {
            "Please try again in a moment.".to_string()
        }
    }

    /// One-line status for display.
    pub fn status(&self) -> String {
        if self.ready {
            format!("System Assistant Ready • {}", self.service.memory_usage())
        } else if let Some(error) = self.service.initialization_error() {
            format!("Error: {}", error)
        } else {
            format!(
                "Loading AI Model... (attempt {}/{})",
                self.initialization_attempts, self.config.max_init_attempts
            )
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn can_retry(&self) -> bool {
        self.initialization_attempts < self.config.max_init_attempts
    }

    pub fn initialization_attempts(&self) -> u32 {
        self.initialization_attempts
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn service(&self) -> &ModelService {
        &self.service
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn shutdown(&mut self) {
        self.service.shutdown();
        self.ready = false;
        self.history.clear();
    }
}

/// User-facing text for a failed generation.
pub fn error_reply(error: &ModelError) -> &'static str {
    match error {
        ModelError::GenerationTimeout(_) => {
            "Response generation timed out. Please try a shorter question."
        }
        ModelError::OutOfMemory(_) => {
            "Response too complex for device memory. Try a simpler question."
        }
        ModelError::NotReady => {
            "AI model not ready. Please wait for initialization to complete."
        }
        _ => "I encountered an issue generating a response. Please try rephrasing.",
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use sidekick_model::{
        Accelerator, EngineLoader, EngineOptions, InferenceEngine, ModelError, ModelInfo,
        ModelManager, ModelService, SamplingOptions, ServiceConfig,
    };
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Replies from a script; the last entry repeats.
    pub(crate) struct ScriptedEngine {
        replies: Vec<Result<String, String>>,
        prompts: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    #[async_trait]
    impl InferenceEngine for ScriptedEngine {
        async fn generate(
            &self,
            prompt: &str,
            _options: &SamplingOptions,
        ) -> Result<String, ModelError> {
            let index = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len() - 1
            };
            tokio::time::sleep(self.delay).await;
            let reply = self
                .replies
                .get(index)
                .or_else(|| self.replies.last())
                .cloned()
                .unwrap_or_else(|| Ok(String::new()));
            reply.map_err(ModelError::OutOfMemory)
        }

        fn accelerator(&self) -> Accelerator {
            Accelerator::Cpu
        }

        fn memory_usage_bytes(&self) -> Option<u64> {
            Some(512 * 1024 * 1024)
        }

        fn shutdown(&mut self) -> Result<(), ModelError> {
            Ok(())
        }
    }

    pub(crate) struct ScriptedLoader {
        pub replies: Vec<Result<String, String>>,
        pub prompts: Arc<Mutex<Vec<String>>>,
        pub fail: bool,
        pub gpu_fails: bool,
        pub delay: Duration,
    }

    impl ScriptedLoader {
        pub(crate) fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(|r| Ok(r.to_string())).collect(),
                prompts: Arc::default(),
                fail: false,
                gpu_fails: false,
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(&[])
            }
        }
    }

    #[async_trait]
    impl EngineLoader for ScriptedLoader {
        async fn load(
            &self,
            _model_path: &Path,
            accelerator: Accelerator,
            _options: &EngineOptions,
        ) -> Result<Box<dyn InferenceEngine>, ModelError> {
            if self.fail || (self.gpu_fails && accelerator == Accelerator::Gpu) {
                return Err(ModelError::ServerStartFailed("scripted".to_string()));
            }
            Ok(Box::new(ScriptedEngine {
                replies: self.replies.clone(),
                prompts: self.prompts.clone(),
                delay: self.delay,
            }))
        }
    }

    /// A model service over a cached dummy model.
    pub(crate) fn service(loader: ScriptedLoader) -> (TempDir, ModelService) {
        service_with(loader, |config| config)
    }

    pub(crate) fn service_with(
        loader: ScriptedLoader,
        tweak: impl FnOnce(ServiceConfig) -> ServiceConfig,
    ) -> (TempDir, ModelService) {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelManager::default_model();
        std::fs::write(dir.path().join(&model.filename), b"GGUF-test").unwrap();
        let config = ServiceConfig::builder()
            .models_dir(dir.path())
            .model(ModelInfo {
                url: "http://127.0.0.1:9/model.gguf".to_string(),
                ..model
            })
            .build();
        let service = ModelService::with_loader(tweak(config), Box::new(loader));
        (dir, service)
    }
}
