//! Interactive chat REPL.

use std::io::Write;
use std::path::Path;

use sidekick_chat::ChatSession;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{assistant, setup_progress, thinking_spinner};
use crate::RuntimeArgs;

const HELP: &str = "\
Commands:
  /help         Show this help
  /clear        Forget the conversation
  /status       Show assistant status
  /retry        Retry model initialization
  /save <file>  Save the transcript as JSON
  /quit         Exit";

pub(crate) async fn run(runtime: &RuntimeArgs) -> miette::Result<()> {
    let mut session = ChatSession::new(assistant(runtime));

    println!("Starting sidekick...");
    initialize(&mut session, false).await;
    print_last_reply(&session);
    println!("Type /help for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => return Err(miette::miette!("Failed to read input: {}", e)),
        };
        let input = line.trim();

        if let Some(command) = input.strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));

            match name {
                "help" => println!("{}", HELP),
                "quit" | "exit" => break,
                "clear" => {
                    session.clear();
                    println!("Conversation cleared.");
                }
                "status" => {
                    println!("{}", session.assistant().status());
                    println!("Model: {}", session.assistant().service().status());
                }
                "retry" => {
                    if !session.assistant().can_retry() {
                        println!("{}", session.assistant().status());
                        println!("No attempts left. Restart sidekick to try again.");
                    } else {
                        initialize(&mut session, true).await;
                        print_last_reply(&session);
                    }
                }
                "save" => save(&session, arg),
                _ => println!("Unknown command: /{}. Type /help for commands.", name),
            }
            println!();
            continue;
        }

        let Some(message) = session.start_turn(input) else {
            continue;
        };

        let spinner = thinking_spinner("AI is thinking...");
        let reply = session.finish_turn(&message).await;
        spinner.finish_and_clear();

        println!("{}\n", reply);
    }

    session.shutdown();
    println!("Goodbye!");
    Ok(())
}

async fn initialize(session: &mut ChatSession, retry: bool) -> bool {
    let (pb, callback) = setup_progress();
    session.set_progress_callback(Some(callback));

    let ready = if retry {
        session.retry_initialization().await
    } else {
        session.initialize().await
    };

    if ready {
        pb.finish_with_message("Model ready!");
    } else {
        pb.abandon_with_message(session.status().to_string());
    }
    session.set_progress_callback(None);
    ready
}

fn print_last_reply(session: &ChatSession) {
    if let Some(message) = session.messages().last() {
        println!("{}\n", message.text);
    }
}

fn save(session: &ChatSession, file: &str) {
    if file.is_empty() {
        println!("Usage: /save <file>");
        return;
    }
    match session.save_transcript(Path::new(file)) {
        Ok(()) => println!("Transcript saved to {}", file),
        Err(e) => println!("Failed to save transcript: {}", e),
    }
}

fn prompt() -> miette::Result<()> {
    print!("> ");
    std::io::stdout()
        .flush()
        .map_err(|e| miette::miette!("Failed to write prompt: {}", e))
}
