//! Visible chat state for a front end.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use sidekick_model::{Progress, ProgressFn};

use crate::assistant::Assistant;
use crate::error::ChatError;
use crate::message::ChatMessage;

const WELCOME: &str = "Hello! I'm powered by a local Gemma model. How can I help you today?";
const TYPING: &str = "AI is thinking...";
const READY: &str = "Model ready! How can I help you?";

/// Messages produced by progress callbacks while `initialize` runs.
type Pending = Arc<Mutex<Vec<ChatMessage>>>;

/// The conversation as a user sees it, plus loading and status flags.
pub struct ChatSession {
    assistant: Assistant,
    messages: Vec<ChatMessage>,
    loading: bool,
    initialized: bool,
    status: String,
    progress_messages: Option<Pending>,
}

impl ChatSession {
    pub fn new(assistant: Assistant) -> Self {
        Self {
            assistant,
            messages: Vec::new(),
            loading: false,
            initialized: false,
            status: "Initializing...".to_string(),
            progress_messages: None,
        }
    }

    /// Like [`ChatSession::new`], but setup progress is also posted into the
    /// conversation.
    pub fn with_progress_messages(assistant: Assistant) -> Self {
        let mut session = Self::new(assistant);
        session.progress_messages = Some(Arc::default());
        session.set_progress_callback(None);
        session
    }

    /// Register an extra progress observer, such as a terminal progress bar.
    pub fn set_progress_callback(&mut self, callback: Option<ProgressFn>) {
        let combined: Option<ProgressFn> = match (self.progress_messages.clone(), callback) {
            (None, callback) => callback,
            (Some(pending), callback) => {
                let last = Mutex::new(None::<Progress>);
                Some(Arc::new(move |progress: &Progress| {
                    post_progress(&pending, &last, progress);
                    if let Some(callback) = &callback {
                        callback(progress);
                    }
                }))
            }
        };
        self.assistant.set_progress_callback(combined);
    }

    /// Bring the assistant up and greet the user, or explain the failure.
    pub async fn initialize(&mut self) -> bool {
        self.status = "Loading AI model...".to_string();
        self.loading = true;

        let ready = self.assistant.initialize().await;
        self.drain_progress_messages();

        self.initialized = ready;
        self.loading = false;
        if ready {
            self.status = "AI ready!".to_string();
            self.messages.push(ChatMessage::assistant(WELCOME));
            info!("Chat session ready");
        } else {
            self.status = self.assistant.status();
            self.messages.push(ChatMessage::assistant(format!(
                "I'm having trouble starting up. {}",
                self.status
            )));
        }
        ready
    }

    /// Post a user message and wait for the reply.
    ///
    /// Blank input is ignored and yields `None`.
    pub async fn send(&mut self, text: &str) -> Option<String> {
        let message = self.start_turn(text)?;
        Some(self.finish_turn(&message).await)
    }

    /// Record the user's message and show the typing placeholder.
    ///
    /// Returns the trimmed message to answer, or `None` for blank input.
    pub fn start_turn(&mut self, text: &str) -> Option<String> {
        let message = text.trim();
        if message.is_empty() {
            return None;
        }

        self.messages.push(ChatMessage::user(message));
        self.messages.push(ChatMessage::typing(TYPING));
        self.loading = true;
        Some(message.to_string())
    }

    /// Generate the reply for a started turn and swap it in for the
    /// placeholder.
    pub async fn finish_turn(&mut self, message: &str) -> String {
        let reply = self.assistant.send_message(message).await;

        self.messages.retain(|m| !m.is_typing);
        self.messages.push(ChatMessage::assistant(reply.clone()));
        self.loading = false;
        debug!("Turn complete, {} messages", self.messages.len());
        reply
    }

    /// Try to initialize again, if the attempt budget allows.
    pub async fn retry_initialization(&mut self) -> bool {
        if !self.assistant.can_retry() {
            self.status = self.assistant.status();
            return false;
        }
        self.initialize().await
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    /// Forget the conversation, both visible messages and model context.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.assistant.clear_history();
    }

    pub fn shutdown(&mut self) {
        self.assistant.shutdown();
        self.initialized = false;
        self.loading = false;
    }

    /// The conversation as pretty-printed JSON, placeholders excluded.
    pub fn export_transcript(&self) -> Result<String, ChatError> {
        let messages: Vec<&ChatMessage> = self.messages.iter().filter(|m| !m.is_typing).collect();
        Ok(serde_json::to_string_pretty(&messages)?)
    }

    pub fn save_transcript(&self, path: &Path) -> Result<(), ChatError> {
        std::fs::write(path, self.export_transcript()?)?;
        info!("Saved transcript to {}", path.display());
        Ok(())
    }

    fn drain_progress_messages(&mut self) {
        if let Some(pending) = &self.progress_messages {
            if let Ok(mut pending) = pending.lock() {
                self.messages.append(&mut pending);
            }
        }
    }
}

/// Percentages reported while the model file is downloading.
const DOWNLOAD_BAND: std::ops::Range<u8> = 10..60;

/// Queue a conversation message for a progress step.
///
/// 0% steps are not posted. Repeats are dropped, and inside the download
/// band only the first update per percentage is kept.
fn post_progress(pending: &Pending, last: &Mutex<Option<Progress>>, progress: &Progress) {
    let percent = progress.percent();
    if percent == 0 {
        return;
    }

    if let Ok(mut last) = last.lock() {
        if let Some(previous) = last.as_ref() {
            let same_download_step =
                previous.percent() == percent && DOWNLOAD_BAND.contains(&percent);
            if previous == progress || same_download_step {
                return;
            }
        }
        *last = Some(progress.clone());
    }

    let text = if progress.percent() == 100 {
        READY.to_string()
    } else {
        format!(
            "Setting up AI: {} ({}%)",
            progress.status(),
            progress.percent()
        )
    };

    if let Ok(mut pending) = pending.lock() {
        pending.push(ChatMessage::assistant(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::testing::{service, ScriptedLoader};
    use crate::config::ChatConfig;

    fn session(loader: ScriptedLoader) -> (tempfile::TempDir, ChatSession) {
        let (dir, service) = service(loader);
        let assistant = Assistant::with_service(ChatConfig::default(), service);
        (dir, ChatSession::new(assistant))
    }

    fn texts(session: &ChatSession) -> Vec<&str> {
        session.messages().iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_initialize_adds_welcome() {
        let (_dir, mut session) = session(ScriptedLoader::new(&["unused reply"]));
        assert!(session.initialize().await);

        assert!(session.is_initialized());
        assert!(!session.is_loading());
        assert_eq!(session.status(), "AI ready!");
        assert_eq!(texts(&session), vec![WELCOME]);
    }

    #[tokio::test]
    async fn test_failed_initialize_explains() {
        let (_dir, mut session) = session(ScriptedLoader::failing());
        assert!(!session.initialize().await);

        assert_eq!(
            session.status(),
            "Error: Model initialization timed out or failed"
        );
        assert_eq!(
            texts(&session),
            vec!["I'm having trouble starting up. Error: Model initialization timed out or failed"]
        );
    }

    #[tokio::test]
    async fn test_send_replaces_typing_placeholder() {
        let (_dir, mut session) = session(ScriptedLoader::new(&["Four is the answer"]));
        session.initialize().await;

        let message = session.start_turn("  what is 2+2?  ").unwrap();
        assert_eq!(message, "what is 2+2?");
        assert!(session.is_loading());
        assert!(session.messages().last().unwrap().is_typing);

        let reply = session.finish_turn(&message).await;
        assert_eq!(reply, "Four is the answer.");
        assert!(!session.is_loading());
        assert_eq!(
            texts(&session),
            vec![WELCOME, "what is 2+2?", "Four is the answer."]
        );
        assert!(session.messages().iter().all(|m| !m.is_typing));
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let (_dir, mut session) = session(ScriptedLoader::new(&["unused reply"]));
        assert_eq!(session.send("   \n").await, None);
        assert!(session.messages().is_empty());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_send_before_ready_uses_fallback() {
        let (_dir, mut session) = session(ScriptedLoader::new(&["unused reply"]));
        let reply = session.send("can you help?").await.unwrap();
        assert!(reply.starts_with("I'm here to help"));
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_progress_messages() {
        let (_dir, service) = service(ScriptedLoader::new(&["unused reply"]));
        let assistant = Assistant::with_service(ChatConfig::default(), service);
        let mut session = ChatSession::with_progress_messages(assistant);

        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        session.set_progress_callback(Some(Arc::new(move |p: &Progress| {
            sink.lock().unwrap().push(p.percent());
        })));

        assert!(session.initialize().await);

        assert_eq!(
            texts(&session),
            vec![
                "Setting up AI: Found valid cached model (60%)",
                "Setting up AI: Loading model into memory... (70%)",
                "Setting up AI: Enabling GPU acceleration... (80%)",
                "Setting up AI: Finalizing setup... (90%)",
                READY,
                WELCOME,
            ]
        );
        // The observer still sees every step, 0% included.
        let observed = observed.lock().unwrap();
        assert_eq!(observed.first(), Some(&0));
        assert_eq!(observed.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_progress_messages_show_cpu_fallback() {
        let mut loader = ScriptedLoader::new(&["unused reply"]);
        loader.gpu_fails = true;
        let (_dir, service) = service(loader);
        let assistant = Assistant::with_service(ChatConfig::default(), service);
        let mut session = ChatSession::with_progress_messages(assistant);

        assert!(session.initialize().await);

        let texts = texts(&session);
        let gpu = texts
            .iter()
            .position(|t| *t == "Setting up AI: Enabling GPU acceleration... (80%)")
            .unwrap();
        assert_eq!(texts[gpu + 1], "Setting up AI: Using CPU processing... (80%)");
        assert_eq!(texts[gpu + 2], "Setting up AI: Finalizing setup... (90%)");
    }

    #[tokio::test]
    async fn test_failed_setup_posts_no_zero_percent_steps() {
        let (_dir, service) = service(ScriptedLoader::failing());
        let assistant = Assistant::with_service(ChatConfig::default(), service);
        let mut session = ChatSession::with_progress_messages(assistant);

        assert!(!session.initialize().await);

        let texts = texts(&session);
        assert!(texts.iter().all(|t| !t.contains("(0%)")));
        assert!(texts.contains(&"Setting up AI: Using CPU processing... (80%)"));
        assert!(texts
            .last()
            .unwrap()
            .starts_with("I'm having trouble starting up."));
    }

    #[test]
    fn test_download_updates_collapse_per_percent() {
        let pending: Pending = Arc::default();
        let last = Mutex::new(None);

        post_progress(&pending, &last, &Progress::new(20, "Downloaded 1MB / 50MB"));
        post_progress(&pending, &last, &Progress::new(20, "Downloaded 2MB / 50MB"));
        post_progress(&pending, &last, &Progress::new(21, "Downloaded 3MB / 50MB"));

        let pending = pending.lock().unwrap();
        let texts: Vec<&str> = pending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Setting up AI: Downloaded 1MB / 50MB (20%)",
                "Setting up AI: Downloaded 3MB / 50MB (21%)",
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_respects_budget() {
        let (_dir, service) = service(ScriptedLoader::failing());
        let config = ChatConfig::builder().max_init_attempts(1).build();
        let mut session = ChatSession::new(Assistant::with_service(config, service));

        assert!(!session.initialize().await);
        assert!(!session.retry_initialization().await);
        assert_eq!(session.assistant().initialization_attempts(), 1);
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_export_and_clear() {
        let (dir, mut session) = session(ScriptedLoader::new(&["Paris is the capital."]));
        session.initialize().await;
        session.send("capital of France?").await;

        let json = session.export_transcript().unwrap();
        let parsed: Vec<ChatMessage> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed[1].is_from_user);

        let path = dir.path().join("transcript.json");
        session.save_transcript(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), json);

        session.clear();
        assert!(session.messages().is_empty());
        assert!(session.assistant().history().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown() {
        let (_dir, mut session) = session(ScriptedLoader::new(&["unused reply"]));
        session.initialize().await;
        session.shutdown();
        assert!(!session.is_initialized());
        assert!(!session.assistant().is_ready());
    }
}
