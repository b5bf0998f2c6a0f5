use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single entry in the visible conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub is_from_user: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Placeholder shown while a reply is being generated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_typing: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true, false)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false, false)
    }

    pub fn typing(text: impl Into<String>) -> Self {
        Self::new(text, false, true)
    }

    fn new(text: impl Into<String>, is_from_user: bool, is_typing: bool) -> Self {
        Self {
            text: text.into(),
            is_from_user,
            timestamp: now_millis(),
            is_typing,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let user = ChatMessage::user("hi");
        assert!(user.is_from_user && !user.is_typing);
        assert!(user.timestamp > 0);

        let typing = ChatMessage::typing("...");
        assert!(!typing.is_from_user && typing.is_typing);
    }

    #[test]
    fn test_typing_flag_omitted_when_false() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert!(json.get("is_typing").is_none());
        assert_eq!(json["is_from_user"], false);
    }
}
