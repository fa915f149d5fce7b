//! Client configuration.
//!
//! One struct carries the service base URL, the conversation language and
//! every endpoint path; it is passed explicitly to the request gateway and
//! the channel connector.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{credential::Credential, error::ConfigError};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "AGENTDECK_API_BASE_URL";
/// Environment variable overriding the language.
pub const ENV_LANGUAGE: &str = "AGENTDECK_LANG";
/// Environment variable overriding the request timeout (seconds).
pub const ENV_TIMEOUT: &str = "AGENTDECK_REQUEST_TIMEOUT_SECS";

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub ask: String,
    pub channel: String,
    pub save_supervisor_profile: String,
    pub save_assistants_config: String,
    pub get_supervisor_profile: String,
    pub get_assistants_config: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ask: "/api/ask".into(),
            channel: "/ws".into(),
            save_supervisor_profile: "/api/save-supervisor-profile".into(),
            save_assistants_config: "/api/save-assistants-config".into(),
            get_supervisor_profile: "/api/get-supervisor-profile".into(),
            get_assistants_config: "/api/get-assistants-config".into(),
        }
    }
}

/// Fully-resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service base URL (`http` or `https`).
    pub api_base_url: String,
    /// Language tag sent with every ask call.
    pub language: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.into(),
            language: DEFAULT_LANGUAGE.into(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Create a config for `base_url` with default paths.
    ///
    /// # Errors
    /// Returns error if the URL does not parse or is not http(s).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            api_base_url: base_url.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns error if an override is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each override key.
    ///
    /// # Errors
    /// Returns error if an override is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.api_base_url = base.trim().to_string();
        }
        if let Some(lang) = lookup(ENV_LANGUAGE).filter(|v| !v.trim().is_empty()) {
            config.language = lang.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            config.request_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_TIMEOUT.to_string(),
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the base URL is usable.
    ///
    /// # Errors
    /// Returns error if the URL does not parse or is not http(s).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.api_base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {e}", self.api_base_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL for an endpoint path.
    ///
    /// The path is appended to the base URL, so a base with a path prefix
    /// keeps it.
    ///
    /// # Errors
    /// Returns error if the combined URL does not parse.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let base = self.api_base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{base}/{path}: {e}")))
    }

    /// URL of the interactive channel for `session_id`.
    ///
    /// The credential travels as a query parameter because the channel
    /// transport cannot carry custom headers at connect time.
    ///
    /// # Errors
    /// Returns error if the base URL is malformed or not http(s).
    pub fn channel_url(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<Url, ConfigError> {
        let mut url = self.endpoint(&self.endpoints.channel)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(scheme.to_string()))?;
        url.query_pairs_mut()
            .append_pair("session_id", session_id)
            .append_pair("token", credential.expose());
        Ok(url)
    }
}
