use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

use super::consts::END_TURN_MARKER;

/// Identifier of a message, unique and strictly increasing within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Bot => f.write_str("bot"),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !value
}

/// A single entry of the conversation.
///
/// Bot messages are mutated by the stream ingestion routine while their turn is in flight and
/// frozen afterwards. User messages never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// Set while the backend reports an ongoing tool invocation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub tool_use: bool,
    /// Set once a tool invocation finished and content resumed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub tool_done: bool,
    /// Set between the end of a tool invocation and the next content token.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_thinking: bool,
}

impl Message {
    pub fn new_user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            tool_use: false,
            tool_done: false,
            is_thinking: false,
        }
    }

    pub fn new_bot(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Bot,
            content: content.into(),
            tool_use: false,
            tool_done: false,
            is_thinking: false,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.role == Role::Bot
    }

    /// The content as it should be shown, with the end of turn sentinel removed.
    pub fn display_content(&self) -> String {
        strip_end_turn(&self.content)
    }

    /// The content placed on the clipboard by the copy action.
    pub fn copy_text(&self) -> String {
        strip_end_turn(&self.content).trim().to_string()
    }
}

/// Removes the first occurrence of the end of turn sentinel.
pub fn strip_end_turn(content: &str) -> String {
    content.replacen(END_TURN_MARKER, "", 1)
}
