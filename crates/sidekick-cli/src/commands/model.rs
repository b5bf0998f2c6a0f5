//! Model management commands.

use std::path::Path;

use sidekick_chat::{model_paths, ModelManager, DEFAULT_PORT};
use sidekick_model::{validate_model_file, ServiceConfig};

use super::setup_progress;

fn manager(config: &ServiceConfig) -> ModelManager {
    let manager = ModelManager::new()
        .with_token(config.hf_token.clone())
        .with_download_timeout(config.download_timeout);
    match &config.models_dir {
        Some(dir) => manager.with_models_dir(dir),
        None => manager,
    }
}

/// List installed models.
pub(crate) fn list() -> miette::Result<()> {
    let config = ServiceConfig::from_env();
    let manager = manager(&config);
    let models = manager
        .list_installed()
        .map_err(|e| miette::miette!("Failed to list models: {}", e))?;

    if models.is_empty() {
        println!("No models installed.");
        println!();
        println!("To install the default model, run:");
        println!("  sidekick model pull");
        return Ok(());
    }

    println!("Installed models:");
    for model in models {
        println!("  - {}", model);
    }

    println!();
    println!("Models directory: {}", manager.models_dir().display());

    Ok(())
}

/// Download the configured model, or install one from a local file.
pub(crate) async fn pull(path: Option<&Path>) -> miette::Result<()> {
    let config = ServiceConfig::from_env();
    let manager = manager(&config);

    model_paths::ensure_dirs()
        .map_err(|e| miette::miette!("Failed to create data directories: {}", e))?;

    if let Some(source_path) = path {
        if !source_path.exists() {
            return Err(miette::miette!("File not found: {}", source_path.display()));
        }

        let ext = source_path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("gguf" | "task" | "bin")) {
            return Err(miette::miette!(
                "Expected a .gguf, .task or .bin file, got: {}",
                source_path.display()
            ));
        }

        println!("Installing model from: {}", source_path.display());
        let dest = manager
            .install_from_path(source_path)
            .map_err(|e| miette::miette!("Failed to install model: {}", e))?;

        println!("Model installed to: {}", dest.display());
        return Ok(());
    }

    let model = &config.model;
    if manager.is_installed(&model.filename) {
        println!("Model '{}' is already installed.", model.name);
        return Ok(());
    }

    println!("Downloading model: {}", model.name);
    println!("From: {}", model.url);
    println!("This may take a while depending on your connection...");
    println!();

    let (pb, callback) = setup_progress();
    match manager.download(model, Some(&callback)).await {
        Ok(path) => {
            pb.finish_with_message("Download complete");
            println!();
            println!("Model downloaded successfully!");
            println!("Location: {}", path.display());
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Download failed");
            Err(miette::miette!("Failed to download model: {}", e))
        }
    }
}

/// Show information about models and paths.
pub(crate) fn info() -> miette::Result<()> {
    let config = ServiceConfig::from_env();
    let manager = manager(&config);

    println!("sidekick Model Configuration");
    println!("============================");
    println!();
    println!("Data directory:   {}", model_paths::data_dir().display());
    println!("Models directory: {}", manager.models_dir().display());
    println!("Binaries:         {}", model_paths::bin_dir().display());
    println!();

    let server = model_paths::llama_server_path();
    println!("Server binary:    {}", server.display());
    println!("  Exists: {}", server.exists());
    println!();

    let model = &config.model;
    println!("Model:            {}", model.filename);
    println!("  Source: {}", model.url);
    println!("  Token:  {}", if config.hf_token.is_some() { "set" } else { "not set" });
    match manager.get_model_path(&model.filename) {
        Some(path) => match validate_model_file(&path) {
            Ok(check) => {
                println!("  Installed: yes ({} MB)", check.size / 1024 / 1024);
                println!(
                    "  Looks valid: {} (signature {:?})",
                    check.valid, check.signature
                );
            }
            Err(e) => println!("  Installed: yes (unreadable: {})", e),
        },
        None => println!("  Installed: no"),
    }
    println!();

    println!("Port:             {}", config.engine.port);
    if config.engine.port != DEFAULT_PORT {
        println!("  (default {})", DEFAULT_PORT);
    }
    println!("Acceleration:     {}", if config.prefer_gpu { "GPU, CPU fallback" } else { "CPU only" });
    println!(
        "Sampling:         max_tokens={} temperature={} top_k={} seed={}",
        config.sampling.max_tokens,
        config.sampling.temperature,
        config.sampling.top_k,
        config.sampling.seed
    );

    Ok(())
}

/// Remove an installed model.
pub(crate) fn remove(file: Option<&str>) -> miette::Result<()> {
    let config = ServiceConfig::from_env();
    let manager = manager(&config);
    let requested = file.unwrap_or(config.model.filename.as_str());

    let filename = manager
        .resolve_installed(requested)
        .ok_or_else(|| miette::miette!("Model not installed: {}", requested))?;

    manager
        .remove(&filename)
        .map_err(|e| miette::miette!("Failed to remove model: {}", e))?;
    println!("Removed {}", filename);

    Ok(())
}
