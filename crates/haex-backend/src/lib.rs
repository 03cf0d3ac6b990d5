//! The backend seam of the chat core.
//!
//! [`ChatBackend`] is the full set of operations the chat stores need from
//! the hosted data service: scoped fetches, row inserts/deletes, and
//! per-topic push feeds. The stores never talk to a transport directly —
//! they hold an `Arc<dyn ChatBackend>` injected at construction.
//!
//! [`memory::MemoryBackend`] is an in-process implementation used by the
//! demo binary and the integration tests.

pub mod memory;
mod topic;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use haex_types::events::{ChannelChange, MessageChange, ReactionChange, ThreadChange, TypingEvent};
use haex_types::models::{Channel, Message, Reaction, ThreadReply};

/// A live change feed. Dropping the receiver is the unsubscribe.
pub type Feed<T> = broadcast::Receiver<T>;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Transient transport or service failure; fetches may be retried.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The referenced row does not exist.
    #[error("row not found: {0}")]
    NotFound(Uuid),

    /// Unique (message, user, emoji) constraint violation on reaction
    /// insert. Informational, not destructive.
    #[error("reaction already recorded")]
    DuplicateReaction,

    /// The service refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Insert payload for a channel message. `client_ref` is generated by the
/// sending store and echoed back on the created row so the optimistic entry
/// can be settled without comparing content.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub client_ref: Uuid,
}

/// Insert payload for a thread reply.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub message_id: Uuid,
    pub author_id: Uuid,
    pub reply: String,
}

/// Everything the chat core consumes from the hosted data service.
///
/// Fetches return hydrated rows (author join resolved); push feeds for
/// messages and replies carry bare ids and callers hydrate through the
/// by-id fetches before merging.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    // Channels
    async fn fetch_channels(&self, scope_id: Uuid) -> Result<Vec<Channel>, BackendError>;
    async fn subscribe_channel_changes(&self, scope_id: Uuid) -> Feed<ChannelChange>;

    // Messages
    /// Most recent `limit` messages, newest first.
    async fn fetch_messages(
        &self,
        channel_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, BackendError>;
    async fn fetch_message_by_id(&self, id: Uuid) -> Result<Message, BackendError>;
    async fn insert_message(&self, new: NewMessage) -> Result<Message, BackendError>;
    async fn subscribe_message_changes(&self, channel_id: Uuid) -> Feed<MessageChange>;

    // Typing
    async fn broadcast_typing(&self, event: TypingEvent) -> Result<(), BackendError>;
    async fn subscribe_typing(&self, channel_id: Uuid) -> Feed<TypingEvent>;

    // Reactions
    async fn fetch_reactions(&self, message_id: Uuid) -> Result<Vec<Reaction>, BackendError>;
    async fn insert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<Reaction, BackendError>;
    async fn delete_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(), BackendError>;
    async fn subscribe_reaction_changes(&self, message_id: Uuid) -> Feed<ReactionChange>;

    // Threads
    /// All replies under one parent, oldest first.
    async fn fetch_thread_replies(
        &self,
        message_id: Uuid,
    ) -> Result<Vec<ThreadReply>, BackendError>;
    async fn fetch_thread_reply_by_id(&self, id: Uuid) -> Result<ThreadReply, BackendError>;
    async fn insert_thread_reply(&self, new: NewReply) -> Result<ThreadReply, BackendError>;
    async fn subscribe_thread_changes(&self, message_id: Uuid) -> Feed<ThreadChange>;
    async fn count_thread_replies(&self, message_id: Uuid) -> Result<u64, BackendError>;
}
