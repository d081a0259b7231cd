//! In-memory chat history for one conversation.
//!
//! The log is append-only: messages are never reordered, mutated or removed,
//! and every session starts with exactly one system message. Nothing here is
//! persisted; the history lives and dies with the session object.

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry in the conversation log. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered, append-only conversation log.
///
/// Not internally synchronized; callers that share a session across tasks
/// must wrap it in a lock.
#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Create a session seeded with the system instruction.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::System,
                content: system_prompt.into(),
            }],
        }
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    /// A stable read view of the log, in insertion order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
