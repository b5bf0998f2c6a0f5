//! Ask command - answer one question and exit.

use sidekick_chat::ChatSession;

use super::{assistant, setup_progress, thinking_spinner};
use crate::RuntimeArgs;

pub(crate) async fn run(message: &str, runtime: &RuntimeArgs, json: bool) -> miette::Result<()> {
    if message.trim().is_empty() {
        return Err(miette::miette!("Nothing to ask: the message is empty"));
    }

    let mut session = ChatSession::new(assistant(runtime));

    let (pb, callback) = setup_progress();
    session.set_progress_callback(Some(callback));
    let ready = session.initialize().await;
    if ready {
        pb.finish_and_clear();
    } else {
        pb.abandon_with_message(session.status().to_string());
    }

    let spinner = thinking_spinner("AI is thinking...");
    let reply = session.send(message).await.unwrap_or_default();
    spinner.finish_and_clear();

    if json {
        let output = serde_json::json!({
            "reply": reply,
            "ready": ready,
            "status": session.assistant().status(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)
                .map_err(|e| miette::miette!("Failed to encode reply: {}", e))?
        );
    } else {
        println!("{}", reply);
    }

    session.shutdown();

    if ready {
        Ok(())
    } else {
        Err(miette::miette!(
            "Model unavailable: {}",
            session.assistant().status()
        ))
    }
}
