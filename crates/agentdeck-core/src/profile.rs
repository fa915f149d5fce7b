//! Backend-facing configuration documents.
//!
//! These are name-addressed: nothing here refers to an editor node id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing root of the assistant system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorProfile {
    pub name: String,
    pub model: String,
    pub persona: String,
    #[serde(rename = "supervisor_system_message")]
    pub system_message: String,
}

/// A tool an assistant may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    /// Always structured; text forms are parsed before reaching this type.
    pub params_schema: Value,
}

/// One assistant and its bound tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub name: String,
    pub system_message: String,
    #[serde(default)]
    pub tasks: Vec<ToolSpec>,
}

/// Assistant roster document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantsConfig {
    #[serde(default)]
    pub assistants: Vec<AssistantConfig>,
}
