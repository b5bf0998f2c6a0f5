//! Path utilities for sidekick data directories.

use std::path::PathBuf;

/// Get the sidekick data directory.
///
/// `SIDEKICK_HOME` wins when set; otherwise `~/.sidekick/`. Falls back to a
/// relative `.sidekick` when no home directory can be determined.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("SIDEKICK_HOME") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".sidekick"))
        .unwrap_or_else(|| PathBuf::from(".sidekick"))
}

/// Get the models directory (`<data>/models/`).
pub fn models_dir() -> PathBuf {
    data_dir().join("models")
}

/// Get the bin directory (`<data>/bin/`).
pub fn bin_dir() -> PathBuf {
    data_dir().join("bin")
}

/// Get the path to the llama-server binary.
pub fn llama_server_path() -> PathBuf {
    if let Some(path) = std::env::var_os("SIDEKICK_LLAMA_SERVER") {
        return PathBuf::from(path);
    }

    let binary_name = if cfg!(target_os = "windows") {
        "llama-server.exe"
    } else {
        "llama-server"
    };
    bin_dir().join(binary_name)
}

/// Get the path to a model file.
pub fn model_path(filename: &str) -> PathBuf {
    models_dir().join(filename)
}

/// Ensure the sidekick data directories exist.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir())?;
    std::fs::create_dir_all(models_dir())?;
    std::fs::create_dir_all(bin_dir())?;
    Ok(())
}
