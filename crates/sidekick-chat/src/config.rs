//! Chat configuration.

/// Configuration for the chat layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// History entries kept in memory (one per user or assistant turn).
    pub max_history: usize,
    /// Most recent history entries quoted in the prompt.
    pub context_entries: usize,
    /// Initialization attempts before the assistant gives up.
    pub max_init_attempts: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            // Last 3 exchanges
            max_history: 6,
            context_entries: 4,
            max_init_attempts: 3,
        }
    }
}

impl ChatConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_history = std::env::var("SIDEKICK_HISTORY_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_history);

        let context_entries = std::env::var("SIDEKICK_CONTEXT_ENTRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.context_entries);

        let max_init_attempts = std::env::var("SIDEKICK_MAX_INIT_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_init_attempts);

        Self {
            max_history,
            context_entries,
            max_init_attempts,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }
}

/// Builder for chat configuration.
#[derive(Debug, Default)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn max_history(mut self, entries: usize) -> Self {
        self.config.max_history = entries;
        self
    }

    pub fn context_entries(mut self, entries: usize) -> Self {
        self.config.context_entries = entries;
        self
    }

    pub fn max_init_attempts(mut self, attempts: u32) -> Self {
        self.config.max_init_attempts = attempts;
        self
    }

    pub fn build(self) -> ChatConfig {
        self.config
    }
}
