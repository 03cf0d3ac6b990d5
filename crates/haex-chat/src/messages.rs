use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use haex_backend::{ChatBackend, NewMessage};
use haex_types::events::MessageChange;
use haex_types::models::{Message, OptimisticMessage};
use haex_types::session::Session;

use crate::fetch::fetch_with_retry;
use crate::notify::Notifier;
use crate::state::LoadState;
use crate::{ChatClient, SendError};

/// One row of the displayed feed: a server-confirmed message or a
/// still-pending local echo.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Committed(Message),
    Pending(OptimisticMessage),
}

impl ChannelMessage {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Committed(m) => m.created_at,
            Self::Pending(m) => m.created_at,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Committed(m) => &m.content,
            Self::Pending(m) => &m.content,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Stable id for list rendering: the row id once committed, the
    /// `temp-<millis>` placeholder while pending.
    pub fn display_id(&self) -> String {
        match self {
            Self::Committed(m) => m.id.to_string(),
            Self::Pending(m) => m.display_id(),
        }
    }
}

/// Pure reconciliation state for one channel: confirmed rows plus pending
/// optimistic entries. Every mutation leaves the union view sorted
/// ascending by creation timestamp.
#[derive(Default)]
struct Ledger {
    committed: Vec<Message>,
    optimistic: Vec<OptimisticMessage>,
}

impl Ledger {
    /// Installs the initial window. The backend returns it newest first;
    /// the view is chronological, so reverse here.
    fn set_history(&mut self, newest_first: Vec<Message>) {
        let mut rows = newest_first;
        rows.reverse();
        rows.sort_by_key(|m| (m.created_at, m.id));
        self.committed = rows;
    }

    /// Merges a confirmed row. Duplicates (same id) are dropped; a row
    /// carrying a client ref settles the matching optimistic entry.
    fn apply_insert(&mut self, row: Message) {
        if self.committed.iter().any(|m| m.id == row.id) {
            debug!("message {} already present, skipping", row.id);
            return;
        }
        if let Some(client_ref) = row.client_ref {
            self.optimistic.retain(|o| o.client_ref != client_ref);
        }
        self.committed.push(row);
        self.committed.sort_by_key(|m| (m.created_at, m.id));
    }

    /// Replaces the matching row in place. Unknown ids are ignored — an
    /// update for a row outside the loaded window has nothing to patch.
    fn apply_update(&mut self, row: Message) {
        if let Some(slot) = self.committed.iter_mut().find(|m| m.id == row.id) {
            *slot = row;
            self.committed.sort_by_key(|m| (m.created_at, m.id));
        }
    }

    fn apply_delete(&mut self, id: Uuid) {
        self.committed.retain(|m| m.id != id);
    }

    fn push_optimistic(&mut self, entry: OptimisticMessage) {
        self.optimistic.push(entry);
    }

    /// Removes the optimistic entry for one send, whether it converged or
    /// failed.
    fn settle(&mut self, client_ref: Uuid) {
        self.optimistic.retain(|o| o.client_ref != client_ref);
    }

    /// Union of confirmed and pending entries, sorted ascending by
    /// creation timestamp. The sort is stable and confirmed rows come
    /// first, so a pending entry never jumps ahead of a confirmed message
    /// with the same timestamp.
    fn view(&self) -> Vec<ChannelMessage> {
        let mut rows: Vec<ChannelMessage> = self
            .committed
            .iter()
            .cloned()
            .map(ChannelMessage::Committed)
            .chain(self.optimistic.iter().cloned().map(ChannelMessage::Pending))
            .collect();
        rows.sort_by_key(|m| m.created_at());
        rows
    }
}

/// Live message feed for one channel: bounded history window, optimistic
/// send echo, and reconciliation of the change subscription.
///
/// One store owns one channel view; dropping it tears the subscription
/// down. Open the store for the next channel only after dropping the
/// previous one so events are never delivered twice.
pub struct MessageStore {
    backend: Arc<dyn ChatBackend>,
    notifier: Notifier,
    session: Session,
    channel_id: Uuid,
    send_timeout: Duration,
    ledger: Arc<Mutex<Ledger>>,
    feed_tx: Arc<watch::Sender<LoadState<Vec<ChannelMessage>>>>,
    in_flight: AtomicUsize,
    feed_task: JoinHandle<()>,
}

impl MessageStore {
    pub async fn open(client: &ChatClient, session: &Session, channel_id: Uuid) -> Self {
        let backend = client.backend();
        let config = client.config().clone();

        // Subscribe before the initial fetch so no insert can land in the
        // gap between the two.
        let mut feed = backend.subscribe_message_changes(channel_id).await;

        let (feed_tx, _) = watch::channel(LoadState::Loading);
        let feed_tx = Arc::new(feed_tx);
        let ledger = Arc::new(Mutex::new(Ledger::default()));

        match fetch_with_retry("message history", config.fetch_attempts, || {
            backend.fetch_messages(channel_id, config.history_limit)
        })
        .await
        {
            Ok(newest_first) => {
                let mut ledger = ledger.lock().await;
                ledger.set_history(newest_first);
                feed_tx.send_replace(LoadState::from_rows(ledger.view()));
            }
            Err(err) => {
                warn!("message history for channel {channel_id} failed to load: {err}");
                feed_tx.send_replace(LoadState::Error(err.to_string()));
            }
        }

        let feed_task = tokio::spawn({
            let backend = Arc::clone(&backend);
            let ledger = Arc::clone(&ledger);
            let feed_tx = Arc::clone(&feed_tx);
            async move {
                loop {
                    match feed.recv().await {
                        Ok(MessageChange::Inserted { id }) => {
                            // Hydrate first so an author-less row is never shown.
                            match backend.fetch_message_by_id(id).await {
                                Ok(row) if row.channel_id == channel_id => {
                                    let mut ledger = ledger.lock().await;
                                    ledger.apply_insert(row);
                                    feed_tx.send_replace(LoadState::from_rows(ledger.view()));
                                }
                                Ok(_) => {}
                                Err(err) => warn!("could not hydrate message {id}: {err}"),
                            }
                        }
                        Ok(MessageChange::Updated { id }) => match backend
                            .fetch_message_by_id(id)
                            .await
                        {
                            Ok(row) if row.channel_id == channel_id => {
                                let mut ledger = ledger.lock().await;
                                ledger.apply_update(row);
                                feed_tx.send_replace(LoadState::from_rows(ledger.view()));
                            }
                            Ok(_) => {}
                            Err(err) => warn!("could not hydrate updated message {id}: {err}"),
                        },
                        Ok(MessageChange::Deleted { id }) => {
                            let mut ledger = ledger.lock().await;
                            ledger.apply_delete(id);
                            feed_tx.send_replace(LoadState::from_rows(ledger.view()));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("message feed for channel {channel_id} lagged by {skipped} events");
                        }
                        Err(RecvError::Closed) => {
                            warn!("message feed for channel {channel_id} closed; live updates stopped");
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
            channel_id,
            send_timeout: config.send_timeout,
            ledger,
            feed_tx,
            in_flight: AtomicUsize::new(0),
            feed_task,
        }
    }

    /// Sends a message with an immediate local echo. The echo either
    /// converges to the confirmed row or is rolled back on failure; a
    /// failed send is never retried automatically.
    pub async fn send(&self, content: &str) -> Result<(), SendError> {
        let text = content.trim();
        if text.is_empty() {
            return Ok(());
        }

        let Some(viewer) = self.session.viewer() else {
            self.notifier
                .error("Failed to send message", "You must be signed in to post");
            return Err(SendError::NotAuthenticated);
        };

        let client_ref = Uuid::new_v4();
        let entry = OptimisticMessage {
            client_ref,
            channel_id: self.channel_id,
            author: viewer.clone(),
            content: text.to_string(),
            created_at: Utc::now(),
        };
        {
            let mut ledger = self.ledger.lock().await;
            ledger.push_optimistic(entry);
            self.feed_tx
                .send_replace(LoadState::from_rows(ledger.view()));
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(
            self.send_timeout,
            self.backend.insert_message(NewMessage {
                channel_id: self.channel_id,
                author_id: viewer.id,
                content: text.to_string(),
                client_ref,
            }),
        )
        .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let err = match result {
            Ok(Ok(row)) => {
                // The subscription may already have delivered the row;
                // both paths settle by client ref and dedupe by id.
                let mut ledger = self.ledger.lock().await;
                ledger.settle(client_ref);
                ledger.apply_insert(row);
                self.feed_tx
                    .send_replace(LoadState::from_rows(ledger.view()));
                return Ok(());
            }
            Ok(Err(err)) => SendError::Backend(err),
            Err(_) => SendError::TimedOut,
        };

        {
            let mut ledger = self.ledger.lock().await;
            ledger.settle(client_ref);
            self.feed_tx
                .send_replace(LoadState::from_rows(ledger.view()));
        }
        self.notifier
            .error("Failed to send message", &err.to_string());
        Err(err)
    }

    /// Current union view, always sorted ascending by creation timestamp.
    pub fn messages(&self) -> LoadState<Vec<ChannelMessage>> {
        self.feed_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LoadState<Vec<ChannelMessage>>> {
        self.feed_tx.subscribe()
    }

    /// True while at least one send is in flight.
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }
}

impl Drop for MessageStore {
    fn drop(&mut self) {
        self.feed_task.abort();
    }
}
