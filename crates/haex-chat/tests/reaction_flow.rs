mod support;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use uuid::Uuid;

use haex_backend::{BackendError, ChatBackend, Feed, NewMessage, NewReply};
use haex_chat::{ChatClient, ChatConfig, NoticeLevel, ReactionCount, ReactionLedger};
use haex_types::events::{ChannelChange, MessageChange, ReactionChange, ThreadChange, TypingEvent};
use haex_types::models::{Channel, Message, Reaction, ThreadReply};
use haex_types::session::Session;

use support::{client, eventually, fixture, session};

#[tokio::test]
async fn toggle_twice_returns_to_original_state() {
    let fx = fixture().await;
    let msg = fx
        .backend
        .seed_message(fx.channel.id, fx.alice.id, "great point", Utc::now())
        .await
        .unwrap();

    let client = client(&fx);
    let ledger = ReactionLedger::open(&client, &session(&fx, &fx.alice), msg.id).await;
    assert!(ledger.counts().is_empty());

    ledger.toggle("👍").await.unwrap();
    assert_eq!(
        ledger.counts(),
        vec![ReactionCount {
            emoji: "👍".into(),
            count: 1,
            viewer_reacted: true
        }]
    );

    ledger.toggle("👍").await.unwrap();
    assert!(ledger.counts().is_empty());
}

#[tokio::test]
async fn other_sessions_converge_on_the_same_counts() {
    let fx = fixture().await;
    let msg = fx
        .backend
        .seed_message(fx.channel.id, fx.alice.id, "poll results are up", Utc::now())
        .await
        .unwrap();

    let alice_ledger = ReactionLedger::open(&client(&fx), &session(&fx, &fx.alice), msg.id).await;
    let bob_ledger = ReactionLedger::open(&client(&fx), &session(&fx, &fx.bob), msg.id).await;
    let mut bob_watch = bob_ledger.watch();

    alice_ledger.toggle("🔥").await.unwrap();
    eventually(&mut bob_watch, |counts| {
        counts == &[ReactionCount {
            emoji: "🔥".into(),
            count: 1,
            viewer_reacted: false,
        }]
    })
    .await;

    bob_ledger.toggle("🔥").await.unwrap();
    let mut alice_watch = alice_ledger.watch();
    eventually(&mut alice_watch, |counts| {
        counts == &[ReactionCount {
            emoji: "🔥".into(),
            count: 2,
            viewer_reacted: true,
        }]
    })
    .await;
}

#[tokio::test]
async fn duplicate_race_leaves_exactly_one_row() {
    let fx = fixture().await;
    let msg = fx
        .backend
        .seed_message(fx.channel.id, fx.alice.id, "hot take", Utc::now())
        .await
        .unwrap();

    let ledger = ReactionLedger::open(&client(&fx), &session(&fx, &fx.alice), msg.id).await;
    ledger.toggle("🔥").await.unwrap();

    // A second session racing the same toggle hits the uniqueness constraint.
    let second = fx.backend.insert_reaction(msg.id, fx.alice.id, "🔥").await;
    assert!(matches!(second, Err(BackendError::DuplicateReaction)));
    assert_eq!(fx.backend.fetch_reactions(msg.id).await.unwrap().len(), 1);
}

/// Backend stub whose reaction insert always reports the uniqueness
/// violation, standing in for a session with a stale local cache.
struct AlwaysDuplicate {
    feed: broadcast::Sender<ReactionChange>,
}

#[async_trait]
impl ChatBackend for AlwaysDuplicate {
    async fn fetch_channels(&self, _scope_id: Uuid) -> Result<Vec<Channel>, BackendError> {
        unimplemented!()
    }
    async fn subscribe_channel_changes(&self, _scope_id: Uuid) -> Feed<ChannelChange> {
        unimplemented!()
    }
    async fn fetch_messages(
        &self,
        _channel_id: Uuid,
        _limit: usize,
    ) -> Result<Vec<Message>, BackendError> {
        unimplemented!()
    }
    async fn fetch_message_by_id(&self, _id: Uuid) -> Result<Message, BackendError> {
        unimplemented!()
    }
    async fn insert_message(&self, _new: NewMessage) -> Result<Message, BackendError> {
        unimplemented!()
    }
    async fn subscribe_message_changes(&self, _channel_id: Uuid) -> Feed<MessageChange> {
        unimplemented!()
    }
    async fn broadcast_typing(&self, _event: TypingEvent) -> Result<(), BackendError> {
        unimplemented!()
    }
    async fn subscribe_typing(&self, _channel_id: Uuid) -> Feed<TypingEvent> {
        unimplemented!()
    }
    async fn fetch_reactions(&self, _message_id: Uuid) -> Result<Vec<Reaction>, BackendError> {
        Ok(Vec::new())
    }
    async fn insert_reaction(
        &self,
        _message_id: Uuid,
        _user_id: Uuid,
        _emoji: &str,
    ) -> Result<Reaction, BackendError> {
        Err(BackendError::DuplicateReaction)
    }
    async fn delete_reaction(
        &self,
        _message_id: Uuid,
        _user_id: Uuid,
        _emoji: &str,
    ) -> Result<(), BackendError> {
        unimplemented!()
    }
    async fn subscribe_reaction_changes(&self, _message_id: Uuid) -> Feed<ReactionChange> {
        self.feed.subscribe()
    }
    async fn fetch_thread_replies(
        &self,
        _message_id: Uuid,
    ) -> Result<Vec<ThreadReply>, BackendError> {
        unimplemented!()
    }
    async fn fetch_thread_reply_by_id(&self, _id: Uuid) -> Result<ThreadReply, BackendError> {
        unimplemented!()
    }
    async fn insert_thread_reply(&self, _new: NewReply) -> Result<ThreadReply, BackendError> {
        unimplemented!()
    }
    async fn subscribe_thread_changes(&self, _message_id: Uuid) -> Feed<ThreadChange> {
        unimplemented!()
    }
    async fn count_thread_replies(&self, _message_id: Uuid) -> Result<u64, BackendError> {
        unimplemented!()
    }
}

#[tokio::test]
async fn losing_the_toggle_race_is_informational_not_fatal() {
    let fx = fixture().await;
    let (feed, _keepalive) = broadcast::channel(8);
    let keepalive = feed.clone();
    let client = ChatClient::new(Arc::new(AlwaysDuplicate { feed }), ChatConfig::default());
    let mut notices = client.notices();

    let ledger = ReactionLedger::open(
        &client,
        &Session::authenticated(fx.alice.clone(), fx.scope.clone()),
        Uuid::new_v4(),
    )
    .await;

    // Stale cache says "not reacted yet", so the toggle tries an insert.
    ledger.toggle("👍").await.unwrap();

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.title, "Already reacted");
    assert!(notices.try_recv().is_err());
    drop(keepalive);
}
