use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use haex_backend::ChatBackend;
use haex_types::models::Channel;
use haex_types::session::Session;

use crate::ChatClient;
use crate::fetch::fetch_with_retry;
use crate::state::LoadState;

/// Channels with no category are grouped under this key.
const DEFAULT_CATEGORY: &str = "general";

/// Live channel list for one scope, ordered by (category, name).
///
/// Channel lists are small and low-churn, so any change notification
/// invalidates the whole list and refetches it — no incremental patching.
pub struct ChannelDirectory {
    feed_tx: Arc<watch::Sender<LoadState<Vec<Channel>>>>,
    feed_task: JoinHandle<()>,
}

impl ChannelDirectory {
    pub async fn open(client: &ChatClient, session: &Session) -> Self {
        let backend = client.backend();
        let scope_id = session.scope().id;
        let attempts = client.config().fetch_attempts;

        let mut feed = backend.subscribe_channel_changes(scope_id).await;
        let (feed_tx, _) = watch::channel(LoadState::Loading);
        let feed_tx = Arc::new(feed_tx);

        refresh(&*backend, scope_id, attempts, &feed_tx).await;

        let feed_task = tokio::spawn({
            let backend = Arc::clone(&backend);
            let feed_tx = Arc::clone(&feed_tx);
            async move {
                loop {
                    match feed.recv().await {
                        Ok(change) => {
                            debug!("channel list for scope {scope_id} invalidated: {change:?}");
                            refresh(&*backend, scope_id, attempts, &feed_tx).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("channel feed for scope {scope_id} lagged by {skipped} events");
                            refresh(&*backend, scope_id, attempts, &feed_tx).await;
                        }
                        Err(RecvError::Closed) => {
                            warn!("channel feed for scope {scope_id} closed; live updates stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self { feed_tx, feed_task }
    }

    pub fn channels(&self) -> LoadState<Vec<Channel>> {
        self.feed_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LoadState<Vec<Channel>>> {
        self.feed_tx.subscribe()
    }

    /// Pure client-side grouping of the current list.
    pub fn by_category(&self) -> BTreeMap<String, Vec<Channel>> {
        group_by_category(self.feed_tx.borrow().rows())
    }
}

impl Drop for ChannelDirectory {
    fn drop(&mut self) {
        self.feed_task.abort();
    }
}

async fn refresh(
    backend: &dyn ChatBackend,
    scope_id: Uuid,
    attempts: u32,
    feed_tx: &watch::Sender<LoadState<Vec<Channel>>>,
) {
    match fetch_with_retry("channel list", attempts, || backend.fetch_channels(scope_id)).await {
        Ok(rows) => feed_tx.send_replace(LoadState::from_rows(rows)),
        Err(err) => {
            warn!("channel list for scope {scope_id} failed to load: {err}");
            feed_tx.send_replace(LoadState::Error(err.to_string()))
        }
    };
}

fn group_by_category(channels: &[Channel]) -> BTreeMap<String, Vec<Channel>> {
    let mut grouped: BTreeMap<String, Vec<Channel>> = BTreeMap::new();
    for channel in channels {
        let category = if channel.category.trim().is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            channel.category.clone()
        };
        grouped.entry(category).or_default().push(channel.clone());
    }
    grouped
}
