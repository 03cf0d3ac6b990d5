use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use haex_backend::{BackendError, ChatBackend};
use haex_types::events::ReactionChange;
use haex_types::models::{Author, Reaction};
use haex_types::session::Session;

use crate::fetch::fetch_with_retry;
use crate::notify::Notifier;
use crate::{ChatClient, SendError};

/// One emoji's aggregate for a message, reduced from the flat row set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: usize,
    pub viewer_reacted: bool,
}

/// Per-emoji reduction over the live row set. First-seen emoji order is
/// preserved; no server-side aggregate is consulted.
fn reduce_counts(rows: &[Reaction], viewer_id: Option<Uuid>) -> Vec<ReactionCount> {
    let mut counts: Vec<ReactionCount> = Vec::new();
    for row in rows {
        let viewer_reacted = viewer_id == Some(row.user_id);
        match counts.iter_mut().find(|c| c.emoji == row.emoji) {
            Some(entry) => {
                entry.count += 1;
                if viewer_reacted {
                    entry.viewer_reacted = true;
                }
            }
            None => counts.push(ReactionCount {
                emoji: row.emoji.clone(),
                count: 1,
                viewer_reacted,
            }),
        }
    }
    counts
}

/// Live reaction multiset for one message with optimistic toggling.
///
/// The toggle decision (insert vs delete) is made from the locally cached
/// row set; a uniqueness violation from a racing insert is reported as an
/// informational "already reacted" notice, never a hard failure.
pub struct ReactionLedger {
    backend: Arc<dyn ChatBackend>,
    notifier: Notifier,
    viewer: Option<Author>,
    message_id: Uuid,
    rows: Arc<Mutex<Vec<Reaction>>>,
    feed_tx: Arc<watch::Sender<Vec<ReactionCount>>>,
    feed_task: JoinHandle<()>,
}

impl ReactionLedger {
    pub async fn open(client: &ChatClient, session: &Session, message_id: Uuid) -> Self {
        let backend = client.backend();
        let viewer = session.viewer().cloned();
        let viewer_id = viewer.as_ref().map(|v| v.id);

        let mut feed = backend.subscribe_reaction_changes(message_id).await;
        let (feed_tx, _) = watch::channel(Vec::new());
        let feed_tx = Arc::new(feed_tx);
        let rows = Arc::new(Mutex::new(Vec::new()));

        match fetch_with_retry("reactions", client.config().fetch_attempts, || {
            backend.fetch_reactions(message_id)
        })
        .await
        {
            Ok(fetched) => {
                let mut rows = rows.lock().await;
                *rows = fetched;
                feed_tx.send_replace(reduce_counts(&rows, viewer_id));
            }
            // Reaction badges degrade to zero counts on a failed load; the
            // subscription will still fill them in as rows change.
            Err(err) => warn!("reactions for message {message_id} failed to load: {err}"),
        }

        let feed_task = tokio::spawn({
            let rows = Arc::clone(&rows);
            let feed_tx = Arc::clone(&feed_tx);
            async move {
                loop {
                    match feed.recv().await {
                        Ok(ReactionChange::Inserted(row)) if row.message_id == message_id => {
                            let mut rows = rows.lock().await;
                            if !rows.iter().any(|r| r.id == row.id) {
                                rows.push(row);
                                feed_tx.send_replace(reduce_counts(&rows, viewer_id));
                            }
                        }
                        Ok(ReactionChange::Deleted {
                            message_id: event_message,
                            user_id,
                            emoji,
                        }) if event_message == message_id => {
                            let mut rows = rows.lock().await;
                            let before = rows.len();
                            rows.retain(|r| !(r.user_id == user_id && r.emoji == emoji));
                            if rows.len() != before {
                                feed_tx.send_replace(reduce_counts(&rows, viewer_id));
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("reaction feed for message {message_id} lagged by {skipped} events");
                        }
                        Err(RecvError::Closed) => {
                            warn!("reaction feed for message {message_id} closed");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            backend,
            notifier: client.notifier(),
            viewer,
            message_id,
            rows,
            feed_tx,
            feed_task,
        }
    }

    /// Adds the viewer's reaction if absent, removes it if present.
    pub async fn toggle(&self, emoji: &str) -> Result<(), SendError> {
        let Some(viewer) = &self.viewer else {
            self.notifier
                .error("Failed to update reaction", "You must be signed in to react");
            return Err(SendError::NotAuthenticated);
        };

        let already_reacted = self
            .rows
            .lock()
            .await
            .iter()
            .any(|r| r.user_id == viewer.id && r.emoji == emoji);

        if already_reacted {
            match self
                .backend
                .delete_reaction(self.message_id, viewer.id, emoji)
                .await
            {
                Ok(()) => {
                    let mut rows = self.rows.lock().await;
                    rows.retain(|r| !(r.user_id == viewer.id && r.emoji == emoji));
                    self.feed_tx
                        .send_replace(reduce_counts(&rows, Some(viewer.id)));
                    Ok(())
                }
                Err(err) => {
                    self.notifier
                        .error("Failed to remove reaction", &err.to_string());
                    Err(err.into())
                }
            }
        } else {
            match self
                .backend
                .insert_reaction(self.message_id, viewer.id, emoji)
                .await
            {
                Ok(row) => {
                    let mut rows = self.rows.lock().await;
                    if !rows.iter().any(|r| r.id == row.id) {
                        rows.push(row);
                    }
                    self.feed_tx
                        .send_replace(reduce_counts(&rows, Some(viewer.id)));
                    Ok(())
                }
                // Lost the race against another toggle for the same triple;
                // the row exists, so there is nothing to roll back.
                Err(BackendError::DuplicateReaction) => {
                    self.notifier.info(
                        "Already reacted",
                        "You have already reacted to this message",
                    );
                    Ok(())
                }
                Err(err) => {
                    self.notifier
                        .error("Failed to add reaction", &err.to_string());
                    Err(err.into())
                }
            }
        }
    }

    /// Current per-emoji aggregates.
    pub fn counts(&self) -> Vec<ReactionCount> {
        self.feed_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<ReactionCount>> {
        self.feed_tx.subscribe()
    }
}

impl Drop for ReactionLedger {
    fn drop(&mut self) {
        self.feed_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(user_id: Uuid, emoji: &str) -> Reaction {
        Reaction {
            id: Uuid::new_v4(),
            message_id: Uuid::new_v4(),
            user_id,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_group_by_emoji_in_first_seen_order() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rows = vec![row(other, "🔥"), row(me, "👍"), row(me, "🔥")];

        let counts = reduce_counts(&rows, Some(me));
        assert_eq!(
            counts,
            vec![
                ReactionCount {
                    emoji: "🔥".into(),
                    count: 2,
                    viewer_reacted: true
                },
                ReactionCount {
                    emoji: "👍".into(),
                    count: 1,
                    viewer_reacted: true
                },
            ]
        );
    }

    #[test]
    fn anonymous_viewer_never_shows_as_reacted() {
        let rows = vec![row(Uuid::new_v4(), "👍")];
        let counts = reduce_counts(&rows, None);
        assert!(!counts[0].viewer_reacted);
    }

    #[test]
    fn empty_rows_reduce_to_no_counts() {
        assert!(reduce_counts(&[], Some(Uuid::new_v4())).is_empty());
    }
}
