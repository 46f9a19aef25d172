use serde::{
    Deserialize,
    Serialize,
};

/// Body of `POST /chat/{conversation_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest<'a> {
    pub content: &'a str,
    pub role: &'static str,
}

impl<'a> ChatRequest<'a> {
    pub fn user(content: &'a str) -> Self {
        Self { content, role: "user" }
    }
}

/// One entry of the history kept by the backend.
///
/// The backend stores model-native message blocks, so content is either plain text or a list of
/// structured blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: serde_json::Value,
}

impl HistoryEntry {
    /// Flattens the content into displayable text.
    pub fn text(&self) -> String {
        match &self.content {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Array(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    serde_json::Value::String(text) => Some(text.clone()),
                    serde_json::Value::Object(map) => map.get("text").and_then(|t| t.as_str()).map(str::to_string),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteConversationResponse {
    pub status: String,
    pub conversation_id: String,
}
