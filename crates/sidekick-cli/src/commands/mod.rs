//! CLI commands.

pub mod ask;
pub mod chat;
pub mod info;
pub mod model;

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sidekick_chat::{Assistant, ChatConfig, Progress, ProgressFn};
use sidekick_model::{ServiceConfig, ServiceConfigBuilder};

use crate::RuntimeArgs;

/// Service configuration from the environment, with CLI overrides applied.
pub(crate) fn service_config(runtime: &RuntimeArgs) -> ServiceConfig {
    let mut builder = ServiceConfigBuilder::from_config(ServiceConfig::from_env());
    if runtime.cpu {
        builder = builder.prefer_gpu(false);
    }
    if let Some(port) = runtime.port {
        builder = builder.port(port);
    }
    builder.build()
}

pub(crate) fn assistant(runtime: &RuntimeArgs) -> Assistant {
    Assistant::new(ChatConfig::from_env(), service_config(runtime))
}

/// A 0..=100 bar driven by setup progress.
pub(crate) fn setup_progress() -> (ProgressBar, ProgressFn) {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let bar = pb.clone();
    let callback: ProgressFn = Arc::new(move |progress: &Progress| {
        bar.set_position(u64::from(progress.percent()));
        bar.set_message(progress.status().to_string());
    });
    (pb, callback)
}

/// Spinner shown while a reply is generated.
pub(crate) fn thinking_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
