//! Core traits for the request gateway and the interactive channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    credential::Credential,
    error::ClientError,
    profile::{AssistantsConfig, SupervisorProfile},
};

/// Response `type` that asks the client to upgrade to a channel.
pub const INTERACTIVE_SESSION_START: &str = "interactive_session_start";

/// Which agents should handle an ask call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSelector {
    /// Restrict routing to these assistants, by name.
    Assistants(Vec<String>),
    /// Talk to one saved agent, by id.
    Agent(String),
}

/// Body of the ask call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(rename = "lang")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl AskRequest {
    /// Build a request, spreading the selector onto its wire field.
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        language: impl Into<String>,
        session_id: Option<String>,
        selector: Option<&AgentSelector>,
    ) -> Self {
        let (assistants, agent_id) = match selector {
            Some(AgentSelector::Assistants(names)) => (Some(names.clone()), None),
            Some(AgentSelector::Agent(id)) => (None, Some(id.clone())),
            None => (None, None),
        };
        Self {
            query: query.into(),
            language: language.into(),
            session_id,
            assistants,
            agent_id,
        }
    }
}

/// Interpreted ask-call response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskResponse {
    /// The backend answered directly; the payload goes to the transcript.
    Answer(Value),
    /// The backend wants to continue over an interactive channel.
    InteractiveStart { session_id: String },
}

impl AskResponse {
    /// Interpret a decoded response body.
    ///
    /// # Errors
    /// Returns `Protocol` if the body is not an object, or is an upgrade
    /// signal without a usable session id.
    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        let Some(obj) = value.as_object() else {
            return Err(ClientError::Protocol(format!(
                "expected an object response, got {value}"
            )));
        };

        if obj.get("type").and_then(Value::as_str) != Some(INTERACTIVE_SESSION_START) {
            return Ok(Self::Answer(value));
        }

        match obj.get("session_id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => Ok(Self::InteractiveStart {
                session_id: id.to_string(),
            }),
            _ => Err(ClientError::Protocol(
                "interactive session start without a session_id".into(),
            )),
        }
    }
}

/// Issues the ask call.
#[async_trait]
pub trait AskGateway: Send + Sync {
    /// Ask a question.
    async fn ask(&self, request: &AskRequest) -> Result<AskResponse, ClientError>;
}

/// Persists and fetches configuration documents.
#[async_trait]
pub trait ConfigGateway: Send + Sync {
    /// Save the supervisor profile.
    async fn save_supervisor_profile(&self, profile: &SupervisorProfile) -> Result<(), ClientError>;

    /// Save the assistant roster.
    async fn save_assistants_config(&self, config: &AssistantsConfig) -> Result<(), ClientError>;

    /// Fetch the saved supervisor profile.
    async fn fetch_supervisor_profile(&self) -> Result<SupervisorProfile, ClientError>;

    /// Fetch the saved assistant roster.
    async fn fetch_assistants_config(&self) -> Result<AssistantsConfig, ClientError>;
}

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closing,
    Closed,
}

/// Why a channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called on this side.
    Local,
    /// The remote side closed the connection.
    Remote,
    /// The transport failed.
    Error(String),
}

/// Inbound channel event, delivered in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// One inbound frame, shaped like a direct-answer payload.
    Frame(Value),
    /// A frame that could not be decoded.
    Malformed(String),
    /// Fired exactly once per channel lifetime; nothing follows it.
    Closed(CloseReason),
}

/// An open interactive channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Session this channel is scoped to.
    fn session_id(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ChannelState;

    /// Write one outbound text frame.
    ///
    /// # Errors
    /// Returns `NotReady` if the channel is not open, or `Transport` if the
    /// write fails.
    async fn send(&self, text: &str) -> Result<(), ClientError>;

    /// Close the channel. Closing an already-closed channel is a no-op.
    async fn close(&self);
}

/// A freshly opened channel and its ordered event stream.
pub struct OpenedChannel {
    pub channel: Arc<dyn Channel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens interactive channels.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel for `session_id`.
    ///
    /// # Errors
    /// Implementations fail with `Auth` before any network attempt when the
    /// credential is unusable, and with `Auth(Rejected)` when the server
    /// refuses it during the handshake.
    async fn open(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<OpenedChannel, ClientError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_absent_fields() {
        let req = AskRequest::new("hello", "en", None, None);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({ "query": "hello", "lang": "en" }));
    }

    #[test]
    fn request_spreads_selector() {
        let by_name = AskRequest::new(
            "q",
            "en",
            Some("abc".into()),
            Some(&AgentSelector::Assistants(vec!["Support".into()])),
        );
        let value = serde_json::to_value(&by_name).unwrap();
        assert_eq!(value["session_id"], "abc");
        assert_eq!(value["assistants"], json!(["Support"]));
        assert!(value.get("agent_id").is_none());

        let by_id = AskRequest::new("q", "en", None, Some(&AgentSelector::Agent("7".into())));
        let value = serde_json::to_value(&by_id).unwrap();
        assert_eq!(value["agent_id"], "7");
        assert!(value.get("assistants").is_none());
    }

    #[test]
    fn direct_answer_is_kept_whole() {
        let body = json!({ "type": "answer", "text": "hi", "sources": [] });
        let parsed = AskResponse::from_value(body.clone()).unwrap();
        assert_eq!(parsed, AskResponse::Answer(body));
    }

    #[test]
    fn upgrade_signal_is_recognized() {
        let body = json!({ "type": INTERACTIVE_SESSION_START, "session_id": "abc" });
        let parsed = AskResponse::from_value(body).unwrap();
        assert_eq!(
            parsed,
            AskResponse::InteractiveStart {
                session_id: "abc".into()
            }
        );
    }

    #[test]
    fn upgrade_without_session_is_protocol_error() {
        let err =
            AskResponse::from_value(json!({ "type": INTERACTIVE_SESSION_START })).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn non_object_is_protocol_error() {
        let err = AskResponse::from_value(json!(["not", "an", "answer"])).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
