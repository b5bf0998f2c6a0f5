//! Post-processing of raw model output.
//!
//! Small models echo role labels and run long; the reply shown to the user
//! is trimmed of those artifacts and cut back to whole sentences.

/// Replies shorter than this are treated as empty.
const MIN_REPLY_CHARS: usize = 10;

/// Replies longer than this get truncated.
const MAX_REPLY_CHARS: usize = 800;

/// Target length after truncation.
const TRUNCATE_TO_CHARS: usize = 750;

/// Shown when the model produced nothing usable.
pub const EMPTY_REPLY: &str =
    "I need more context to provide a helpful response. Could you elaborate?";

const END_OF_TURN: &str = "<end_of_turn>";

/// Clean a raw completion for display.
pub fn clean_response(response: &str, original_message: &str) -> String {
    let mut cleaned = response.trim();
    if let Some(stripped) = cleaned.strip_suffix(END_OF_TURN) {
        cleaned = stripped.trim_end();
    }

    let echoed_message = format!("{}:", original_message);
    let prefixes = [
        "<start_of_turn>model",
        "</start_of_turn>",
        "Assistant:",
        "AI:",
        "Response:",
        "Answer:",
        echoed_message.as_str(),
        "User:",
        "System:",
        "model",
    ];

    // Only the first matching label is removed.
    if let Some(rest) = prefixes
        .iter()
        .find_map(|prefix| strip_prefix_ignore_case(cleaned, prefix))
    {
        cleaned = rest.trim();
    }

    if cleaned.trim().is_empty() || cleaned.chars().count() < MIN_REPLY_CHARS {
        return EMPTY_REPLY.to_string();
    }

    let mut cleaned = if cleaned.chars().count() > MAX_REPLY_CHARS {
        truncate_to_sentences(cleaned)
    } else {
        cleaned.to_string()
    };

    if !cleaned.ends_with(&['.', '!', '?'][..]) && cleaned.chars().count() < TRUNCATE_TO_CHARS {
        cleaned.push('.');
    }

    cleaned
}

/// Keep whole `". "`-separated sentences up to the truncation target.
fn truncate_to_sentences(text: &str) -> String {
    let mut result = String::new();
    let mut result_chars = 0;

    for sentence in text.split(". ") {
        let sentence_chars = sentence.chars().count();
        if result_chars + sentence_chars + 2 > TRUNCATE_TO_CHARS {
            break;
        }
        if !result.is_empty() {
            result.push_str(". ");
            result_chars += 2;
        }
        result.push_str(sentence);
        result_chars += sentence_chars;
    }

    if result.is_empty() {
        let mut head: String = text.chars().take(TRUNCATE_TO_CHARS).collect();
        head.push_str("...");
        head
    } else {
        if !result.ends_with('.') {
            result.push('.');
        }
        result
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let end = chars.next().map(|(i, _)| i).unwrap_or(text.len());
    Some(&text[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_role_label() {
        assert_eq!(
            clean_response("  Assistant: Paris is the capital of France.  ", "q"),
            "Paris is the capital of France."
        );
        assert_eq!(
            clean_response("answer: forty two is the answer", "q"),
            "forty two is the answer."
        );
    }

    #[test]
    fn test_strips_only_first_label() {
        assert_eq!(
            clean_response("<start_of_turn>model\nAI: Sure thing, here it is!", "q"),
            "AI: Sure thing, here it is!"
        );
    }

    #[test]
    fn test_strips_echoed_question() {
        assert_eq!(
            clean_response("What is 2+2?: The result is four!", "What is 2+2?"),
            "The result is four!"
        );
    }

    #[test]
    fn test_strips_trailing_end_of_turn() {
        assert_eq!(
            clean_response("Glad to help with that!<end_of_turn>", "q"),
            "Glad to help with that!"
        );
    }

    #[test]
    fn test_short_or_empty_reply() {
        assert_eq!(clean_response("   ", "q"), EMPTY_REPLY);
        assert_eq!(clean_response("Answer: ok", "q"), EMPTY_REPLY);
        assert_eq!(clean_response("model", "q"), EMPTY_REPLY);
    }

    #[test]
    fn test_adds_terminal_period() {
        assert_eq!(
            clean_response("Rust has no garbage collector", "q"),
            "Rust has no garbage collector."
        );
        assert_eq!(clean_response("Is that all you need?", "q"), "Is that all you need?");
    }

    #[test]
    fn test_long_reply_is_cut_at_sentence_boundary() {
        let sentence = "This sentence is exactly fifty characters long now";
        assert_eq!(sentence.chars().count(), 50);
        let raw = vec![sentence; 20].join(". ");
        assert!(raw.chars().count() > MAX_REPLY_CHARS);

        let cleaned = clean_response(&raw, "q");
        // 14 sentences of 50 chars joined by ". " is 726 chars; a 15th would exceed 750.
        assert_eq!(cleaned.chars().count(), 14 * 50 + 13 * 2 + 1);
        assert!(cleaned.ends_with("long now."));
    }

    #[test]
    fn test_long_reply_without_sentences_is_cut_hard() {
        let raw = "x".repeat(900);
        let cleaned = clean_response(&raw, "q");
        assert_eq!(cleaned.chars().count(), 753);
        assert!(cleaned.ends_with("..."));
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        let raw = "é".repeat(700);
        // 700 chars is under the truncation threshold even though it is 1400 bytes.
        assert_eq!(clean_response(&raw, "q").chars().count(), 701);
    }

    #[test]
    fn test_strip_prefix_ignore_case() {
        assert_eq!(strip_prefix_ignore_case("USER: hi", "User:"), Some(" hi"));
        assert_eq!(strip_prefix_ignore_case("Us", "User:"), None);
        assert_eq!(strip_prefix_ignore_case("model", "model"), Some(""));
    }
}
