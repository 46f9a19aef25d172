use tracing::{
    debug,
    warn,
};
use uuid::Uuid;

use super::message::{
    Message,
    MessageId,
    Role,
};

/// Ordered, append-only record of one chat session.
///
/// A single conversation id correlates every request sent to the backend during the session.
#[derive(Debug, Clone)]
pub struct Conversation {
    conversation_id: Uuid,
    messages: Vec<Message>,
    next_message_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(conversation_id: Uuid) -> Self {
        debug!(%conversation_id, "starting conversation");
        Self {
            conversation_id,
            messages: Vec::new(),
            next_message_id: 1,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        let id = self.next_id();
        self.messages.push(Message::new_user(id, content));
        id
    }

    pub fn push_bot(&mut self, content: impl Into<String>) -> MessageId {
        let id = self.next_id();
        self.messages.push(Message::new_bot(id, content));
        id
    }

    /// Applies `f` to the message with the given id.
    ///
    /// Returns the updated message, or [None] when no such message exists.
    pub fn update(&mut self, id: MessageId, f: impl FnOnce(&mut Message)) -> Option<&Message> {
        // Ids are strictly increasing, so the position can be found by binary search.
        match self.messages.binary_search_by_key(&id, |m| m.id) {
            Ok(idx) => {
                let message = &mut self.messages[idx];
                let role = message.role;
                f(message);
                debug_assert_eq!(role, message.role, "the role of a message must never change");
                Some(&self.messages[idx])
            },
            Err(_) => {
                warn!(%id, "attempted to update a message that does not exist");
                None
            },
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|idx| &self.messages[idx])
    }

    pub fn last_bot_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Bot)
    }

    fn next_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        id
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
