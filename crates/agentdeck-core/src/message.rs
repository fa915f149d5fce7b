//! Conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Text shown when a turn could not be answered.
pub const GENERIC_FAILURE_TEXT: &str = "Sorry, an error occurred.";
/// Text shown when the credential is missing or was rejected.
pub const AUTH_FAILURE_TEXT: &str = "Your session has expired. Please sign in again.";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Structured payload; for assistant turns this is the backend's answer
    /// object as received.
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A user turn carrying `{"text": query}`.
    #[must_use]
    pub fn user(query: &str) -> Self {
        Self {
            role: Role::User,
            content: json!({ "text": query }),
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn carrying a backend payload.
    #[must_use]
    pub fn assistant(payload: Value) -> Self {
        Self {
            role: Role::Assistant,
            content: payload,
            timestamp: Utc::now(),
        }
    }

    /// Synthesized answer standing in for a failed turn.
    #[must_use]
    pub fn failure(text: &str) -> Self {
        Self::assistant(json!({ "type": "answer", "text": text }))
    }

    /// The `text` field of the payload, if present.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(Value::as_str)
    }
}
