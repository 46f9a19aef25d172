use tracing::debug;
use url::Url;

use super::ApiClientError;
use crate::database::settings::{
    Setting,
    Settings,
};
use crate::util::DEFAULT_ENDPOINT;
use crate::util::env_var::GRACII_ENDPOINT;

/// Base address of the chat backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self, ApiClientError> {
        let url = Url::parse(endpoint).map_err(|source| ApiClientError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            source,
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ApiClientError::UnsupportedScheme(endpoint.to_owned()));
        }

        Ok(Self { url })
    }

    /// Resolves the endpoint from, in order: the command line, the `GRACII_ENDPOINT` environment
    /// variable, the `api.endpoint` setting, and finally the default local backend.
    pub fn load(flag: Option<&str>, settings: &Settings) -> Result<Self, ApiClientError> {
        Self::resolve(flag, std::env::var(GRACII_ENDPOINT).ok().as_deref(), settings)
    }

    fn resolve(flag: Option<&str>, env: Option<&str>, settings: &Settings) -> Result<Self, ApiClientError> {
        let setting = settings.get_string(Setting::ApiEndpoint);
        let (source, endpoint) = match (flag, env, setting.as_deref()) {
            (Some(flag), _, _) => ("flag", flag),
            (None, Some(env), _) if !env.trim().is_empty() => ("env", env),
            (None, _, Some(setting)) => ("setting", setting),
            _ => ("default", DEFAULT_ENDPOINT),
        };
        debug!(source, endpoint, "resolved chat endpoint");
        Self::parse(endpoint.trim())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `{endpoint}/chat/{conversation_id}`
    pub fn chat_url(&self, conversation_id: &str) -> Result<Url, ApiClientError> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiClientError::UnsupportedScheme(self.url.to_string()))?
            .pop_if_empty()
            .push("chat")
            .push(conversation_id);
        Ok(url)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint must be a valid url"),
        }
    }
}
