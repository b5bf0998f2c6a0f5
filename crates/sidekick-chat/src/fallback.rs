//! Canned replies used while the model is unavailable.

/// Pick a reply for `message` without a model.
///
/// `status` explains why the model is unavailable and is appended to the
/// generic reply.
pub fn fallback_response(message: &str, status: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("hello") || lower.contains("hi") {
        "Hello! I'm your system-wide AI assistant. I'm starting up and will be ready shortly."
            .to_string()
    } else if lower.contains("help") {
        "I'm here to help with questions, tasks, and information. Currently initializing my AI capabilities."
            .to_string()
    } else if lower.contains("code") || lower.contains("program") {
        "I can help with coding and programming once I'm fully loaded. Please wait a moment."
            .to_string()
    } else if lower.contains("write") || lower.contains("create") {
        "I'll be able to help you write and create content as soon as I'm ready.".to_string()
    } else if lower.chars().count() > 100 {
        "I see you have a detailed request. Please give me a moment to initialize so I can provide a comprehensive response."
            .to_string()
    } else {
        format!("I'm getting ready to assist you. {}", status)
    }
}
