//! Conversation state: ordered messages with a single leading system message.
//!
//! A `Conversation` is owned by its caller and passed explicitly to every call;
//! there is no process-wide session. At most one turn may be pending at a time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message in API shape (`{"role", "content", "name"?}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a participant name (charged separately by the token accountant).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Errors from turn bookkeeping.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error("A response is still being generated for this conversation")]
    TurnInProgress,
    #[error("No turn is pending")]
    NoTurnPending,
}

/// Ordered message history for one chat session.
#[derive(Clone, Debug)]
pub struct Conversation {
    id: Uuid,
    messages: Vec<Message>,
    pending_turn: bool,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            pending_turn: false,
        }
    }

    pub fn with_system(content: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.messages.push(Message::system(content));
        conv
    }

    /// Identifier used to tag log lines for this conversation.
    pub fn id(&self) -> Uuid {
        self.id
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

    pub fn system(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Rewrite the system message in place, or insert one at position 0.
    pub fn set_system(&mut self, content: impl Into<String>) {
        let content = content.into();
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = content,
            _ => self.messages.insert(0, Message::system(content)),
        }
    }

    pub fn is_turn_pending(&self) -> bool {
        self.pending_turn
    }

    /// Append the user's message and mark a turn as in flight.
    pub fn begin_turn(&mut self, content: impl Into<String>) -> Result<(), ConversationError> {
        if self.pending_turn {
            return Err(ConversationError::TurnInProgress);
        }
        self.messages.push(Message::user(content));
        self.pending_turn = true;
        Ok(())
    }

    /// Append the assistant reply and close the pending turn.
    pub fn commit_assistant(&mut self, content: impl Into<String>) -> Result<(), ConversationError> {
        if !self.pending_turn {
            return Err(ConversationError::NoTurnPending);
        }
        self.messages.push(Message::assistant(content));
        self.pending_turn = false;
        Ok(())
    }

    /// Drop the pending turn, restoring history to its state before `begin_turn`.
    pub fn abandon_turn(&mut self) {
        if !self.pending_turn {
            return;
        }
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop();
        }
        self.pending_turn = false;
    }

    /// Remove everything except the system message.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
        self.pending_turn = false;
    }
}
