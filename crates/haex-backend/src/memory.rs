use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

use async_trait::async_trait;
use std::collections::HashMap;

use haex_types::events::{ChannelChange, MessageChange, ReactionChange, ThreadChange, TypingEvent};
use haex_types::models::{Author, Channel, Message, Reaction, ThreadReply};

use crate::topic::Topics;
use crate::{BackendError, ChatBackend, Feed, NewMessage, NewReply};

/// In-process reference backend: plain row vectors plus per-topic broadcast
/// fan-out. Stands in for the hosted data service in the demo binary and in
/// the integration tests; every trait method behaves like the real service
/// contract (scoped fetches, unique-reaction constraint, id-only push
/// notifications for messages and replies).
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    profiles: RwLock<HashMap<Uuid, Author>>,
    channels: RwLock<Vec<Channel>>,
    messages: RwLock<Vec<Message>>,
    reactions: RwLock<Vec<Reaction>>,
    replies: RwLock<Vec<ThreadReply>>,

    // keyed by scope_id
    channel_topics: Topics<ChannelChange>,
    // keyed by channel_id
    message_topics: Topics<MessageChange>,
    typing_topics: Topics<TypingEvent>,
    // keyed by message_id
    reaction_topics: Topics<ReactionChange>,
    thread_topics: Topics<ThreadChange>,

    fail_next_message_insert: AtomicBool,
    fail_next_reply_insert: AtomicBool,
    message_insert_gate: RwLock<Option<Arc<Notify>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                profiles: RwLock::new(HashMap::new()),
                channels: RwLock::new(Vec::new()),
                messages: RwLock::new(Vec::new()),
                reactions: RwLock::new(Vec::new()),
                replies: RwLock::new(Vec::new()),
                channel_topics: Topics::new(),
                message_topics: Topics::new(),
                typing_topics: Topics::new(),
                reaction_topics: Topics::new(),
                thread_topics: Topics::new(),
                fail_next_message_insert: AtomicBool::new(false),
                fail_next_reply_insert: AtomicBool::new(false),
                message_insert_gate: RwLock::new(None),
            }),
        }
    }

    /// Register or replace a profile row used for author hydration.
    pub async fn upsert_profile(&self, author: Author) {
        self.inner.profiles.write().await.insert(author.id, author);
    }

    /// Create a channel in a scope and notify channel-list subscribers.
    pub async fn create_channel(
        &self,
        scope_id: Uuid,
        name: &str,
        category: &str,
        description: Option<String>,
        is_public: bool,
    ) -> Channel {
        let now = Utc::now();
        let channel = Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            category: category.to_string(),
            is_public,
            member_count: 0,
            scope_id,
            created_at: now,
            updated_at: now,
        };
        self.inner.channels.write().await.push(channel.clone());
        self.inner
            .channel_topics
            .publish(scope_id, ChannelChange::Inserted { id: channel.id })
            .await;
        channel
    }

    /// Seed a committed message with an explicit timestamp. Notifies
    /// subscribers like any other insert.
    pub async fn seed_message(
        &self,
        channel_id: Uuid,
        author_id: Uuid,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message, BackendError> {
        let scope_id = self.channel_scope(channel_id).await?;
        let row = Message {
            id: Uuid::new_v4(),
            channel_id,
            author_id,
            content: content.to_string(),
            scope_id,
            client_ref: None,
            created_at,
            updated_at: created_at,
            author: None,
        };
        self.inner.messages.write().await.push(row.clone());
        self.inner
            .message_topics
            .publish(channel_id, MessageChange::Inserted { id: row.id })
            .await;
        self.hydrate_message(row).await
    }

    /// Remove a message and notify subscribers. Moderation happens outside
    /// the chat core, so this is not part of the trait.
    pub async fn delete_message(&self, id: Uuid) {
        let channel_id = {
            let mut messages = self.inner.messages.write().await;
            let before = messages.len();
            let channel_id = messages.iter().find(|m| m.id == id).map(|m| m.channel_id);
            messages.retain(|m| m.id != id);
            if messages.len() == before {
                return;
            }
            channel_id
        };
        if let Some(channel_id) = channel_id {
            self.inner
                .message_topics
                .publish(channel_id, MessageChange::Deleted { id })
                .await;
        }
    }

    /// The next `insert_message` call fails with a transient error.
    pub fn fail_next_message_insert(&self) {
        self.inner
            .fail_next_message_insert
            .store(true, Ordering::SeqCst);
    }

    /// The next `insert_thread_reply` call fails with a transient error.
    pub fn fail_next_reply_insert(&self) {
        self.inner
            .fail_next_reply_insert
            .store(true, Ordering::SeqCst);
    }

    /// The next `insert_message` call blocks until the returned handle is
    /// notified. Lets callers observe in-flight state deterministically.
    pub async fn hold_next_message_insert(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.inner.message_insert_gate.write().await = Some(Arc::clone(&gate));
        gate
    }

    async fn channel_scope(&self, channel_id: Uuid) -> Result<Uuid, BackendError> {
        self.inner
            .channels
            .read()
            .await
            .iter()
            .find(|c| c.id == channel_id)
            .map(|c| c.scope_id)
            .ok_or(BackendError::NotFound(channel_id))
    }

    async fn hydrate_message(&self, mut row: Message) -> Result<Message, BackendError> {
        row.author = self.inner.profiles.read().await.get(&row.author_id).cloned();
        Ok(row)
    }

    async fn hydrate_reply(&self, mut row: ThreadReply) -> Result<ThreadReply, BackendError> {
        row.author = self.inner.profiles.read().await.get(&row.author_id).cloned();
        Ok(row)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn fetch_channels(&self, scope_id: Uuid) -> Result<Vec<Channel>, BackendError> {
        let mut rows: Vec<Channel> = self
            .inner
            .channels
            .read()
            .await
            .iter()
            .filter(|c| c.scope_id == scope_id && c.is_public)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.category.as_str(), a.name.as_str()).cmp(&(b.category.as_str(), b.name.as_str())));
        Ok(rows)
    }

    async fn subscribe_channel_changes(&self, scope_id: Uuid) -> Feed<ChannelChange> {
        self.inner.channel_topics.subscribe(scope_id).await
    }

    async fn fetch_messages(
        &self,
        channel_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, BackendError> {
        let mut rows: Vec<Message> = self
            .inner
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        // Newest first, bounded window
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.truncate(limit);

        let mut hydrated = Vec::with_capacity(rows.len());
        for row in rows {
            hydrated.push(self.hydrate_message(row).await?);
        }
        Ok(hydrated)
    }

    async fn fetch_message_by_id(&self, id: Uuid) -> Result<Message, BackendError> {
        let row = self
            .inner
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(BackendError::NotFound(id))?;
        self.hydrate_message(row).await
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message, BackendError> {
        let gate = self.inner.message_insert_gate.write().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self
            .inner
            .fail_next_message_insert
            .swap(false, Ordering::SeqCst)
        {
            return Err(BackendError::Unavailable("injected insert failure".into()));
        }

        let scope_id = self.channel_scope(new.channel_id).await?;
        if !self.inner.profiles.read().await.contains_key(&new.author_id) {
            return Err(BackendError::Rejected(format!(
                "unknown author profile {}",
                new.author_id
            )));
        }

        let now = Utc::now();
        let row = Message {
            id: Uuid::new_v4(),
            channel_id: new.channel_id,
            author_id: new.author_id,
            content: new.content,
            scope_id,
            client_ref: Some(new.client_ref),
            created_at: now,
            updated_at: now,
            author: None,
        };
        self.inner.messages.write().await.push(row.clone());
        debug!("message {} inserted into channel {}", row.id, row.channel_id);

        self.inner
            .message_topics
            .publish(new.channel_id, MessageChange::Inserted { id: row.id })
            .await;
        self.hydrate_message(row).await
    }

    async fn subscribe_message_changes(&self, channel_id: Uuid) -> Feed<MessageChange> {
        self.inner.message_topics.subscribe(channel_id).await
    }

    async fn broadcast_typing(&self, event: TypingEvent) -> Result<(), BackendError> {
        let channel_id = event.channel_id();
        self.inner.typing_topics.publish(channel_id, event).await;
        Ok(())
    }

    async fn subscribe_typing(&self, channel_id: Uuid) -> Feed<TypingEvent> {
        self.inner.typing_topics.subscribe(channel_id).await
    }

    async fn fetch_reactions(&self, message_id: Uuid) -> Result<Vec<Reaction>, BackendError> {
        let mut rows: Vec<Reaction> = self
            .inner
            .reactions
            .read()
            .await
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn insert_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<Reaction, BackendError> {
        let mut reactions = self.inner.reactions.write().await;
        let duplicate = reactions
            .iter()
            .any(|r| r.message_id == message_id && r.user_id == user_id && r.emoji == emoji);
        if duplicate {
            return Err(BackendError::DuplicateReaction);
        }

        let row = Reaction {
            id: Uuid::new_v4(),
            message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        };
        reactions.push(row.clone());
        drop(reactions);

        self.inner
            .reaction_topics
            .publish(message_id, ReactionChange::Inserted(row.clone()))
            .await;
        Ok(row)
    }

    async fn delete_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(), BackendError> {
        let removed = {
            let mut reactions = self.inner.reactions.write().await;
            let before = reactions.len();
            reactions.retain(|r| {
                !(r.message_id == message_id && r.user_id == user_id && r.emoji == emoji)
            });
            reactions.len() != before
        };

        if removed {
            self.inner
                .reaction_topics
                .publish(
                    message_id,
                    ReactionChange::Deleted {
                        message_id,
                        user_id,
                        emoji: emoji.to_string(),
                    },
                )
                .await;
        }
        Ok(())
    }

    async fn subscribe_reaction_changes(&self, message_id: Uuid) -> Feed<ReactionChange> {
        self.inner.reaction_topics.subscribe(message_id).await
    }

    async fn fetch_thread_replies(
        &self,
        message_id: Uuid,
    ) -> Result<Vec<ThreadReply>, BackendError> {
        let mut rows: Vec<ThreadReply> = self
            .inner
            .replies
            .read()
            .await
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));

        let mut hydrated = Vec::with_capacity(rows.len());
        for row in rows {
            hydrated.push(self.hydrate_reply(row).await?);
        }
        Ok(hydrated)
    }

    async fn fetch_thread_reply_by_id(&self, id: Uuid) -> Result<ThreadReply, BackendError> {
        let row = self
            .inner
            .replies
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(BackendError::NotFound(id))?;
        self.hydrate_reply(row).await
    }

    async fn insert_thread_reply(&self, new: NewReply) -> Result<ThreadReply, BackendError> {
        if self
            .inner
            .fail_next_reply_insert
            .swap(false, Ordering::SeqCst)
        {
            return Err(BackendError::Unavailable("injected insert failure".into()));
        }

        let parent_exists = self
            .inner
            .messages
            .read()
            .await
            .iter()
            .any(|m| m.id == new.message_id);
        if !parent_exists {
            return Err(BackendError::NotFound(new.message_id));
        }

        let now = Utc::now();
        let row = ThreadReply {
            id: Uuid::new_v4(),
            message_id: new.message_id,
            author_id: new.author_id,
            reply: new.reply,
            created_at: now,
            updated_at: now,
            author: None,
        };
        self.inner.replies.write().await.push(row.clone());

        self.inner
            .thread_topics
            .publish(new.message_id, ThreadChange::Inserted { id: row.id })
            .await;
        self.hydrate_reply(row).await
    }

    async fn subscribe_thread_changes(&self, message_id: Uuid) -> Feed<ThreadChange> {
        self.inner.thread_topics.subscribe(message_id).await
    }

    async fn count_thread_replies(&self, message_id: Uuid) -> Result<u64, BackendError> {
        let count = self
            .inner
            .replies
            .read()
            .await
            .iter()
            .filter(|r| r.message_id == message_id)
            .count();
        Ok(count as u64)
    }
}
