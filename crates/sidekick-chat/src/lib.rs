//! # sidekick chat
//!
//! Turns a loaded model into a conversational assistant.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   ChatSession   │ --> │    Assistant    │ --> │  ModelService   │
//! │ (visible state) │     │ (history/retry) │     │ (sidekick-model)│
//! └─────────────────┘     └────────┬────────┘     └─────────────────┘
//!                                  │
//!                     ┌────────────┴─────────────┐
//!                     │ prompt · clean · fallback│
//!                     └──────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use sidekick_chat::{Assistant, ChatConfig, ChatSession};
//! use sidekick_model::ServiceConfig;
//!
//! let assistant = Assistant::new(ChatConfig::from_env(), ServiceConfig::from_env());
//! let mut session = ChatSession::new(assistant);
//! session.initialize().await;
//! let reply = session.send("What's a good name for a cat?").await;
//! ```

mod assistant;
pub mod clean;
mod config;
mod error;
pub mod fallback;
mod history;
mod message;
pub mod prompt;
mod session;

pub use assistant::{error_reply, Assistant};
pub use config::{ChatConfig, ChatConfigBuilder};
pub use error::ChatError;
pub use history::History;
pub use message::ChatMessage;
pub use session::ChatSession;

// Re-export model types callers need alongside the chat layer
pub use sidekick_model::{
    paths as model_paths, Accelerator, ModelError, ModelInfo, ModelManager, ModelService,
    Progress, ProgressFn, ServiceConfig, DEFAULT_PORT,
};
