//! Error taxonomy shared by the gateway, the channel and the session engine.

use thiserror::Error;

/// Credential failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable credential was available; nothing was sent.
    #[error("No usable credential available")]
    Missing,
    /// The server refused the credential (401/403).
    #[error("Credential rejected by server")]
    Rejected,
}

/// Error from a call against the remote service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Channel is not open")]
    NotReady,
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Whether this error should force the credential back to absent.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Map an HTTP status onto the taxonomy.
    ///
    /// 401 and 403 become [`AuthError::Rejected`]; everything else keeps the
    /// status and body for display.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Auth(AuthError::Rejected),
            _ => Self::Http { status, body },
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
