use bytes::Bytes;
use tracing::trace;

use super::ApiClientError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// The streamed body of a chat request.
///
/// Chunks are handed out exactly as the transport delivers them; decoding happens in the
/// response parser.
#[derive(Debug)]
pub enum SendMessageOutput {
    Http(reqwest::Response),
    /// Pre-recorded chunks, consumed front to back.
    Mock(std::vec::IntoIter<Result<Bytes, ApiClientError>>),
}

impl SendMessageOutput {
    pub fn mock<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::mock_results(chunks.into_iter().map(|chunk| Ok(chunk.into())).collect())
    }

    pub fn mock_results(chunks: Vec<Result<Bytes, ApiClientError>>) -> Self {
        Self::Mock(chunks.into_iter())
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            SendMessageOutput::Http(response) => response
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok()),
            SendMessageOutput::Mock(_) => None,
        }
    }

    /// Returns the next chunk of the body, or [None] once the body is exhausted.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, ApiClientError> {
        match self {
            SendMessageOutput::Http(response) => {
                let chunk = response.chunk().await?;
                trace!(len = chunk.as_ref().map(Bytes::len), "received chunk");
                Ok(chunk)
            },
            SendMessageOutput::Mock(chunks) => chunks.next().transpose(),
        }
    }
}
