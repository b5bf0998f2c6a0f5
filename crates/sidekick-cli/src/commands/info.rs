//! Info command - show information about the sidekick installation.

use sidekick_chat::{model_paths, ModelManager};

pub(crate) fn run() -> miette::Result<()> {
    println!("sidekick - local AI assistant");
    println!("=============================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Components:");
    println!("  sidekick-model - Model download, validation and llama.cpp serving");
    println!("  sidekick-chat  - Prompting, history, response cleanup and chat state");
    println!("  sidekick-cli   - This command-line interface");
    println!();

    let model = ModelManager::default_model();
    println!("Runtime:");
    println!("  Inference: llama.cpp server ({})", model_paths::llama_server_path().display());
    println!("  Model:     {} ({})", model.name, model.filename);
    println!("  Data:      {}", model_paths::data_dir().display());
    println!();

    println!("Environment:");
    println!("  SIDEKICK_HOME         Data directory");
    println!("  SIDEKICK_LLAMA_SERVER Path to the llama-server binary");
    println!("  SIDEKICK_MODEL_URL    Model download URL");
    println!("  SIDEKICK_MODEL_FILE   Model filename");
    println!("  HF_TOKEN              Token for gated model downloads");
    println!("  SIDEKICK_CPU_ONLY     Skip GPU offload");
    println!();

    println!("Run `sidekick chat` to start a conversation.");

    Ok(())
}
