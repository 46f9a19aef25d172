use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("invalid endpoint `{endpoint}`: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported endpoint `{0}`: only http and https are supported")]
    UnsupportedScheme(String),

    /// The backend answered with a non-success status code.
    #[error("the backend responded with status {status}")]
    Status { status: StatusCode, body: String },

    #[error("conversation `{0}` was not found")]
    ConversationNotFound(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The response body ended abnormally after streaming had started.
    #[error("the response stream was interrupted: {0}")]
    StreamInterrupted(String),
}

impl ApiClientError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiClientError::Status { status, .. } => Some(status.as_u16()),
            ApiClientError::ConversationNotFound(_) => Some(StatusCode::NOT_FOUND.as_u16()),
            ApiClientError::Reqwest(err) => err.status().map(|status| status.as_u16()),
            ApiClientError::InvalidEndpoint { .. }
            | ApiClientError::UnsupportedScheme(_)
            | ApiClientError::Json(_)
            | ApiClientError::StreamInterrupted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = ApiClientError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".into(),
        };
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.to_string(), "the backend responded with status 500 Internal Server Error");

        let err = ApiClientError::ConversationNotFound("abc".into());
        assert_eq!(err.status_code(), Some(404));

        let err = ApiClientError::StreamInterrupted("reset".into());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_invalid_endpoint_source() {
        use std::error::Error as _;

        let source = url::Url::parse("not a url").unwrap_err();
        let err = ApiClientError::InvalidEndpoint {
            endpoint: "not a url".into(),
            source,
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("invalid endpoint `not a url`"));
    }
}
