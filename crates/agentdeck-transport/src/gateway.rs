//! HTTP request gateway.

use std::sync::Arc;

use agentdeck_core::{
    AskGateway, AskRequest, AskResponse, AssistantsConfig, AuthError, ClientConfig, ClientError,
    ConfigGateway, Credential, CredentialProvider, SupervisorProfile,
};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::protocol::decode_body;

/// Issues authenticated request/response calls against the service.
///
/// Every call reads the credential first and fails with
/// [`AuthError::Missing`] before touching the network when there is none.
/// A 401/403 answer clears the stored credential.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpGateway {
    /// Create a gateway.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the HTTP client cannot be
    /// built.
    pub fn new(
        config: Arc<ClientConfig>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// The configuration this gateway was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn bearer(&self) -> Result<Credential, ClientError> {
        self.credentials.get().ok_or(ClientError::Auth(AuthError::Missing))
    }

    async fn post_json<T>(&self, path: &str, body: &T) -> Result<Value, ClientError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let credential = self.bearer()?;
        let url = self.config.endpoint(path)?;
        tracing::debug!(%url, "POST");
        let request = self
            .client
            .post(url)
            .bearer_auth(credential.expose())
            .json(body);
        self.execute(request, path).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let credential = self.bearer()?;
        let url = self.config.endpoint(path)?;
        tracing::debug!(%url, "GET");
        let request = self.client.get(url).bearer_auth(credential.expose());
        let value = self.execute(request, path).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Protocol(format!("unexpected response from {path}: {e}")))
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<Value, ClientError> {
        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            let err = ClientError::from_status(status.as_u16(), body);
            if err.is_auth() {
                tracing::warn!(path, %status, "Credential rejected, clearing");
                self.credentials.clear();
            } else {
                tracing::warn!(path, %status, "Request failed");
            }
            return Err(err);
        }

        decode_body(&body)
    }
}

fn transport_error(e: &reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Transport("request timed out".into())
    } else {
        ClientError::Transport(e.to_string())
    }
}

#[async_trait]
impl AskGateway for HttpGateway {
    async fn ask(&self, request: &AskRequest) -> Result<AskResponse, ClientError> {
        let body = self.post_json(&self.config.endpoints.ask, request).await?;
        AskResponse::from_value(body)
    }
}

#[async_trait]
impl ConfigGateway for HttpGateway {
    async fn save_supervisor_profile(
        &self,
        profile: &SupervisorProfile,
    ) -> Result<(), ClientError> {
        self.post_json(&self.config.endpoints.save_supervisor_profile, profile).await.map(drop)
    }

    async fn save_assistants_config(&self, config: &AssistantsConfig) -> Result<(), ClientError> {
        self.post_json(&self.config.endpoints.save_assistants_config, config).await.map(drop)
    }

    async fn fetch_supervisor_profile(&self) -> Result<SupervisorProfile, ClientError> {
        self.get_json(&self.config.endpoints.get_supervisor_profile).await
    }

    async fn fetch_assistants_config(&self) -> Result<AssistantsConfig, ClientError> {
        self.get_json(&self.config.endpoints.get_assistants_config).await
    }
}
