//! Core abstractions for the agentdeck console client.
//!
//! This crate provides the fundamental building blocks:
//! - `Transcript` - Append-only chat history with live broadcast
//! - `ChatMessage` - A single conversation turn
//! - `ClientConfig` - Base URL, language and endpoint paths in one place
//! - `Credential` / `CredentialProvider` - Bearer credential access
//! - Gateway and channel traits the session engine is written against

pub mod config;
pub mod credential;
pub mod error;
pub mod message;
pub mod profile;
pub mod traits;
pub mod transcript;

pub use config::{ClientConfig, Endpoints};
pub use credential::{Credential, CredentialProvider, MemoryCredentials};
pub use error::{AuthError, ClientError, ConfigError};
pub use message::{AUTH_FAILURE_TEXT, ChatMessage, GENERIC_FAILURE_TEXT, Role};
pub use profile::{AssistantConfig, AssistantsConfig, SupervisorProfile, ToolSpec};
pub use traits::{
    AgentSelector, AskGateway, AskRequest, AskResponse, Channel, ChannelConnector, ChannelEvent,
    ChannelState, CloseReason, ConfigGateway, OpenedChannel,
};
pub use transcript::{Transcript, TranscriptEvent};
