//! Rendered and recorded messages

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// What a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    ToolUse,
    ToolResult,
    File,
    Data,
}

/// A single message, as produced by a renderer or a model client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub kind: MessageKind,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role,
            kind,
            content: content.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        debug!("Message::system: called");
        Self::new(Role::System, MessageKind::Text, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self::new(Role::User, MessageKind::Text, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self::new(Role::Assistant, MessageKind::Text, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults_to_text() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg, Message::user("hi"));
    }

    #[test]
    fn test_serialization_shape() {
        let msg = Message::new(Role::Assistant, MessageKind::ToolUse, "{}");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","kind":"tool_use","content":"{}"}"#);
    }
}
