//! Append-only conversation log shared between the orchestrator and the
//! model lifecycle manager.

pub mod models;

pub use models::{Message, MessageId, Role};

use crate::error::{AssistError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// System preamble every conversation starts with
pub const DEFAULT_PREAMBLE: &str = "You are a caring sexual and reproductive health and rights \
assistant for people in Liberia. Answer in short, simple sentences that someone with little \
schooling can follow. Avoid medical jargon, be respectful and culturally sensitive, and when a \
question involves a health risk, say clearly what the person should do next, including visiting \
a health clinic.";

/// Ordered message log starting with a fixed system preamble
#[derive(Debug, Clone)]
pub struct Conversation {
    preamble: String,
    messages: Vec<Message>,
    epoch: u64,
}

impl Conversation {
    pub fn new(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        Self {
            messages: vec![Message::system(preamble.clone())],
            preamble,
            epoch: 0,
        }
    }

    /// Append a new message and return its id
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        let message = Message::new(role, content);
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Replace a message wholesale, keeping its id and position
    ///
    /// Used to resolve a pending placeholder without duplicating the id.
    pub fn resolve(&mut self, id: MessageId, content: impl Into<String>) -> Result<()> {
        let slot = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AssistError::InvalidArgument(format!("unknown message id {}", id)))?;
        *slot = Message {
            id,
            role: slot.role,
            content: content.into(),
        };
        Ok(())
    }

    /// Drop everything but the system preamble
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::system(self.preamble.clone()));
        self.epoch += 1;
    }

    /// Incremented on every reset; lets in-flight turns detect that their
    /// history was discarded underneath them.
    pub fn epoch(&self) -> u64 {
        self.epoch
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
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}

/// Cloneable handle to a conversation
///
/// Critical sections are short and never span an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedConversation {
    inner: Arc<Mutex<Conversation>>,
}

impl SharedConversation {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conversation)),
        }
    }

    /// Append and return `(id, epoch, snapshot)` atomically
    pub fn append_and_snapshot(&self, role: Role, content: impl Into<String>) -> (MessageId, u64, Vec<Message>) {
        let mut conversation = self.inner.lock();
        let id = conversation.append(role, content);
        (id, conversation.epoch(), conversation.messages().to_vec())
    }

    /// Append only if no reset happened since `epoch`
    pub fn append_if_epoch(&self, epoch: u64, role: Role, content: impl Into<String>) -> Option<MessageId> {
        let mut conversation = self.inner.lock();
        if conversation.epoch() != epoch {
            return None;
        }
        Some(conversation.append(role, content))
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().messages().to_vec()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch()
    }

    /// Run a closure with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        f(&mut *self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_starts_with_preamble() {
        let conversation = Conversation::new("be brief");
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages()[0].content, "be brief");
    }

    #[test]
    fn test_append_preserves_order_and_unique_ids() {
        let mut conversation = Conversation::default();
        conversation.append(Role::User, "hi");
        conversation.append(Role::Assistant, "hello");
        conversation.append(Role::User, "what is HIV?");

        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);

        let ids: HashSet<MessageId> = conversation.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), conversation.len());
    }

    #[test]
    fn test_resolve_replaces_without_duplicating() {
        let mut conversation = Conversation::default();
        let pending = conversation.append(Role::Assistant, "Typing...");
        conversation.resolve(pending, "Condoms prevent HIV.").unwrap();

        assert_eq!(conversation.len(), 2);
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.id, pending);
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Condoms prevent HIV.");

        assert!(conversation.resolve(MessageId::new(), "x").is_err());
    }

    #[test]
    fn test_reset_keeps_preamble_and_bumps_epoch() {
        let mut conversation = Conversation::new("preamble");
        conversation.append(Role::User, "hi");
        conversation.reset();

        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].content, "preamble");
        assert_eq!(conversation.epoch(), 1);
    }

    #[test]
    fn test_append_if_epoch_skips_after_reset() {
        let shared = SharedConversation::default();
        let (_, epoch, snapshot) = shared.append_and_snapshot(Role::User, "question");
        assert_eq!(snapshot.len(), 2);

        shared.reset();
        assert!(shared.append_if_epoch(epoch, Role::Assistant, "late answer").is_none());
        assert_eq!(shared.snapshot().len(), 1);

        let current = shared.epoch();
        assert!(shared.append_if_epoch(current, Role::Assistant, "fresh").is_some());
    }
}
