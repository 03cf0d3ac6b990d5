use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use haex_backend::{BackendError, ChatBackend, NewReply};
use haex_types::events::ThreadChange;
use haex_types::models::{Author, ThreadReply};
use haex_types::session::Session;

use crate::fetch::fetch_with_retry;
use crate::notify::Notifier;
use crate::state::LoadState;
use crate::{ChatClient, SendError};

/// Live reply stream under one parent message.
///
/// Same reconciliation pattern as the channel feed, minus the optimistic
/// echo: the thread panel is secondary UI where awaiting the insert (with
/// a spinner) is acceptable, so replies appear only once confirmed.
pub struct ThreadStore {
    backend: Arc<dyn ChatBackend>,
    notifier: Notifier,
    session: Session,
    message_id: Uuid,
    send_timeout: Duration,
    replies: Arc<Mutex<Vec<ThreadReply>>>,
    feed_tx: Arc<watch::Sender<LoadState<Vec<ThreadReply>>>>,
    in_flight: AtomicUsize,
    feed_task: JoinHandle<()>,
}

impl ThreadStore {
    pub async fn open(client: &ChatClient, session: &Session, message_id: Uuid) -> Self {
        let backend = client.backend();
        let config = client.config().clone();

        let mut feed = backend.subscribe_thread_changes(message_id).await;
        let (feed_tx, _) = watch::channel(LoadState::Loading);
        let feed_tx = Arc::new(feed_tx);
        let replies = Arc::new(Mutex::new(Vec::new()));

        match fetch_with_retry("thread replies", config.fetch_attempts, || {
            backend.fetch_thread_replies(message_id)
        })
        .await
        {
            Ok(fetched) => {
                let mut replies = replies.lock().await;
                *replies = fetched;
                feed_tx.send_replace(LoadState::from_rows(replies.clone()));
            }
            Err(err) => {
                warn!("thread replies for message {message_id} failed to load: {err}");
                feed_tx.send_replace(LoadState::Error(err.to_string()));
            }
        }

        let feed_task = tokio::spawn({
            let backend = Arc::clone(&backend);
            let replies = Arc::clone(&replies);
            let feed_tx = Arc::clone(&feed_tx);
            async move {
                loop {
                    match feed.recv().await {
                        Ok(ThreadChange::Inserted { id }) => {
                            match backend.fetch_thread_reply_by_id(id).await {
                                // Replies for other parents never cross over.
                                Ok(row) if row.message_id == message_id => {
                                    let mut replies = replies.lock().await;
                                    merge_reply(&mut replies, row);
                                    feed_tx.send_replace(LoadState::from_rows(replies.clone()));
                                }
                                Ok(_) => {}
                                Err(err) => warn!("could not hydrate reply {id}: {err}"),
                            }
                        }
                        Ok(ThreadChange::Deleted { id }) => {
                            let mut replies = replies.lock().await;
                            replies.retain(|r| r.id != id);
                            feed_tx.send_replace(LoadState::from_rows(replies.clone()));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("thread feed for message {message_id} lagged by {skipped} events");
                        }
                        Err(RecvError::Closed) => {
                            warn!("thread feed for message {message_id} closed; live updates stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            backend,
            notifier: client.notifier(),
            session: session.clone(),
            message_id,
            send_timeout: config.send_timeout,
            replies,
            feed_tx,
            in_flight: AtomicUsize::new(0),
            feed_task,
        }
    }

    /// Posts a reply and awaits confirmation. No local echo; failures are
    /// surfaced as a notice and never retried automatically.
    pub async fn send_reply(&self, text: &str) -> Result<(), SendError> {
        let reply = text.trim();
        if reply.is_empty() {
            return Ok(());
        }

        let Some(viewer) = self.session.viewer() else {
            self.notifier
                .error("Failed to send reply", "You must be signed in to post");
            return Err(SendError::NotAuthenticated);
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(
            self.send_timeout,
            self.backend.insert_thread_reply(NewReply {
                message_id: self.message_id,
                author_id: viewer.id,
                reply: reply.to_string(),
            }),
        )
        .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let err = match result {
            Ok(Ok(row)) => {
                let mut replies = self.replies.lock().await;
                merge_reply(&mut replies, row);
                self.feed_tx
                    .send_replace(LoadState::from_rows(replies.clone()));
                self.notifier
                    .info("Reply sent", "Your reply has been posted");
                return Ok(());
            }
            Ok(Err(err)) => SendError::Backend(err),
            Err(_) => SendError::TimedOut,
        };

        self.notifier.error("Failed to send reply", &err.to_string());
        Err(err)
    }

    pub fn replies(&self) -> LoadState<Vec<ThreadReply>> {
        self.feed_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LoadState<Vec<ThreadReply>>> {
        self.feed_tx.subscribe()
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// The author of the viewer's session, if signed in. Convenience for
    /// composer UIs.
    pub fn viewer(&self) -> Option<&Author> {
        self.session.viewer()
    }
}

impl Drop for ThreadStore {
    fn drop(&mut self) {
        self.feed_task.abort();
    }
}

/// Dedupe by id, insert, and keep chronological order.
fn merge_reply(replies: &mut Vec<ThreadReply>, row: ThreadReply) {
    if replies.iter().any(|r| r.id == row.id) {
        return;
    }
    replies.push(row);
    replies.sort_by_key(|r| (r.created_at, r.id));
}

/// Reply count for a list-view badge, without loading reply bodies.
pub async fn thread_count(client: &ChatClient, message_id: Uuid) -> Result<u64, BackendError> {
    client.backend().count_thread_replies(message_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reply_row(message_id: Uuid, text: &str) -> ThreadReply {
        let now = Utc::now();
        ThreadReply {
            id: Uuid::new_v4(),
            message_id,
            author_id: Uuid::new_v4(),
            reply: text.to_string(),
            created_at: now,
            updated_at: now,
            author: None,
        }
    }

    #[test]
    fn merge_dedupes_by_id() {
        let parent = Uuid::new_v4();
        let mut replies = Vec::new();
        let row = reply_row(parent, "first");
        merge_reply(&mut replies, row.clone());
        merge_reply(&mut replies, row);
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn merge_keeps_chronological_order() {
        let parent = Uuid::new_v4();
        let mut replies = Vec::new();
        let mut late = reply_row(parent, "late");
        late.created_at = late.created_at + chrono::Duration::seconds(10);
        let early = reply_row(parent, "early");

        merge_reply(&mut replies, late);
        merge_reply(&mut replies, early);
        assert_eq!(replies[0].reply, "early");
        assert_eq!(replies[1].reply, "late");
    }
}
