mod endpoints;
mod error;
pub mod model;
pub mod send_message_output;

use std::time::Duration;

pub use endpoints::Endpoint;
pub use error::ApiClientError;
use reqwest::StatusCode;
use tracing::{
    debug,
    error,
    info,
};

use crate::api_client::model::{
    ChatRequest,
    DeleteConversationResponse,
    HistoryEntry,
};
use crate::api_client::send_message_output::SendMessageOutput;
use crate::database::settings::{
    Setting,
    Settings,
};

const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(60 * 5);
const CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(10);

/// HTTP client for the chat backend.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl ApiClient {
    pub fn new(endpoint: Endpoint, timeout: Option<Duration>) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT_DURATION)
            .read_timeout(timeout.unwrap_or(DEFAULT_TIMEOUT_DURATION))
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// Builds a client from the command line override and the persisted settings.
    pub fn from_settings(endpoint: Option<&str>, settings: &Settings) -> Result<Self, ApiClientError> {
        let endpoint = Endpoint::load(endpoint, settings)?;
        let timeout = settings
            .get_int(Setting::ApiTimeout)
            .and_then(|secs| u64::try_from(secs).ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Self::new(endpoint, timeout)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Sends a user message and returns the streamed reply once the headers arrived.
    ///
    /// A non-success status is reported as an error before any of the body is read.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<SendMessageOutput, ApiClientError> {
        let url = self.endpoint.chat_url(conversation_id)?;
        debug!(%url, "sending chat message");

        let response = self.client.post(url).json(&ChatRequest::user(content)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "chat request failed");
            return Err(ApiClientError::Status { status, body });
        }

        let output = SendMessageOutput::Http(response);
        info!(request_id = ?output.request_id(), "chat response stream opened");
        Ok(output)
    }

    /// Fetches the history the backend keeps for a conversation.
    pub async fn get_history(&self, conversation_id: &str) -> Result<Vec<HistoryEntry>, ApiClientError> {
        let url = self.endpoint.chat_url(conversation_id)?;
        let response = self.client.get(url).send().await?;
        let response = Self::check_status(conversation_id, response).await?;
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<DeleteConversationResponse, ApiClientError> {
        let url = self.endpoint.chat_url(conversation_id)?;
        let response = self.client.delete(url).send().await?;
        let response = Self::check_status(conversation_id, response).await?;
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    async fn check_status(conversation_id: &str, response: reqwest::Response) -> Result<reqwest::Response, ApiClientError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ApiClientError::ConversationNotFound(conversation_id.to_owned())),
            status => Err(ApiClientError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
