//! Prompt templating for Gemma instruction-tuned models.

/// Instruction prepended to every user turn.
pub const SYSTEM_INSTRUCTION: &str =
    "You are an intelligent AI assistant. Be helpful, accurate, and conversational.";

/// Build a single-turn Gemma prompt, quoting the tail of `history` as context.
///
/// Only the last `context_entries` history lines are included.
pub fn build_prompt(user_message: &str, history: &[String], context_entries: usize) -> String {
    let recent = &history[history.len().saturating_sub(context_entries)..];

    let context = if recent.is_empty() {
        String::new()
    } else {
        format!("Previous conversation:\n{}\n\n", recent.join("\n"))
    };

    format!(
        "<start_of_turn>user\n{}\n\n{}{}<end_of_turn>\n<start_of_turn>model\n",
        SYSTEM_INSTRUCTION, context, user_message
    )
}
