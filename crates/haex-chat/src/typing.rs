use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use haex_backend::ChatBackend;
use haex_types::events::TypingEvent;
use haex_types::models::{Author, TypingSignal};
use haex_types::session::Session;

use crate::ChatClient;

struct RosterEntry {
    signal: TypingSignal,
    /// Receive time on the local monotonic clock; the broadcast timestamp
    /// is display-only and not trusted for expiry.
    seen: Instant,
}

struct PresenceInner {
    backend: Arc<dyn ChatBackend>,
    channel_id: Uuid,
    viewer: Option<Author>,
    /// Whether the local viewer is currently marked as typing.
    typing: AtomicBool,
    roster: Mutex<HashMap<Uuid, RosterEntry>>,
    feed_tx: watch::Sender<Vec<TypingSignal>>,
}

impl PresenceInner {
    fn publish(&self, roster: &HashMap<Uuid, RosterEntry>) {
        let mut list: Vec<TypingSignal> = roster.values().map(|e| e.signal.clone()).collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        self.feed_tx.send_replace(list);
    }

    async fn broadcast_stop(&self) {
        let Some(viewer) = &self.viewer else { return };
        let event = TypingEvent::Stopped {
            user_id: viewer.id,
            channel_id: self.channel_id,
        };
        if let Err(err) = self.backend.broadcast_typing(event).await {
            warn!("typing stop broadcast failed: {err}");
        }
    }
}

/// Ephemeral typing indicator for one channel.
///
/// Sender side: [`start_typing`](Self::start_typing) is called on every
/// keystroke; each call refreshes the broadcast and re-arms a self-stop
/// timer, so a sender who goes quiet stops announcing on their own.
/// Receiver side: entries not refreshed within the expiry window are
/// purged by a periodic sweep, which tolerates lost stop broadcasts.
pub struct TypingPresence {
    inner: Arc<PresenceInner>,
    self_timeout: Duration,
    self_timer: Mutex<Option<JoinHandle<()>>>,
    feed_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
}

impl TypingPresence {
    pub async fn open(client: &ChatClient, session: &Session, channel_id: Uuid) -> Self {
        let backend = client.backend();
        let config = client.config().clone();
        let mut feed = backend.subscribe_typing(channel_id).await;

        let (feed_tx, _) = watch::channel(Vec::new());
        let inner = Arc::new(PresenceInner {
            backend,
            channel_id,
            viewer: session.viewer().cloned(),
            typing: AtomicBool::new(false),
            roster: Mutex::new(HashMap::new()),
            feed_tx,
        });

        let feed_task = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                loop {
                    match feed.recv().await {
                        Ok(TypingEvent::Started(signal)) if signal.channel_id == channel_id => {
                            // Our own echo comes back too; only others are listed.
                            if inner.viewer.as_ref().is_some_and(|v| v.id == signal.user_id) {
                                continue;
                            }
                            let mut roster = inner.roster.lock().await;
                            roster.insert(
                                signal.user_id,
                                RosterEntry {
                                    signal,
                                    seen: Instant::now(),
                                },
                            );
                            inner.publish(&roster);
                        }
                        Ok(TypingEvent::Stopped {
                            user_id,
                            channel_id: event_channel,
                        }) if event_channel == channel_id => {
                            let mut roster = inner.roster.lock().await;
                            if roster.remove(&user_id).is_some() {
                                inner.publish(&roster);
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("typing feed for channel {channel_id} lagged by {skipped} events");
                        }
                        Err(RecvError::Closed) => {
                            warn!("typing feed for channel {channel_id} closed");
                            break;
                        }
                    }
                }
            }
        });

        let sweep_task = tokio::spawn({
            let inner = Arc::clone(&inner);
            let expiry = config.typing_expiry;
            let mut tick = tokio::time::interval(config.typing_sweep_interval);
            async move {
                loop {
                    tick.tick().await;
                    let mut roster = inner.roster.lock().await;
                    let before = roster.len();
                    roster.retain(|_, entry| entry.seen.elapsed() < expiry);
                    if roster.len() != before {
                        inner.publish(&roster);
                    }
                }
            }
        });

        Self {
            inner,
            self_timeout: config.typing_self_timeout,
            self_timer: Mutex::new(None),
            feed_task,
            sweep_task,
        }
    }

    /// Announces (or refreshes) the viewer's typing state and re-arms the
    /// self-stop timer. Call on every keystroke that leaves the composer
    /// non-empty. No-op for anonymous sessions.
    pub async fn start_typing(&self) {
        let Some(viewer) = &self.inner.viewer else {
            return;
        };

        self.inner.typing.store(true, Ordering::SeqCst);
        let signal = TypingSignal {
            user_id: viewer.id,
            username: viewer.username.clone(),
            role: viewer.role.clone(),
            channel_id: self.inner.channel_id,
            last_typed: Utc::now(),
        };
        if let Err(err) = self
            .inner
            .backend
            .broadcast_typing(TypingEvent::Started(signal))
            .await
        {
            warn!("typing start broadcast failed: {err}");
        }

        // Re-arm: quiet for the timeout means an automatic stop.
        let handle = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            let timeout = self.self_timeout;
            async move {
                tokio::time::sleep(timeout).await;
                if inner.typing.swap(false, Ordering::SeqCst) {
                    inner.broadcast_stop().await;
                }
            }
        });
        if let Some(previous) = self.self_timer.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Explicitly clears the viewer's typing state (send button, composer
    /// emptied, channel left).
    pub async fn stop_typing(&self) {
        if let Some(timer) = self.self_timer.lock().await.take() {
            timer.abort();
        }
        if self.inner.typing.swap(false, Ordering::SeqCst) {
            self.inner.broadcast_stop().await;
        }
    }

    /// Other users currently typing in this channel, sorted by username.
    pub fn typing_users(&self) -> Vec<TypingSignal> {
        self.inner.feed_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<TypingSignal>> {
        self.inner.feed_tx.subscribe()
    }

    /// Deterministic teardown: broadcasts a stop if the viewer was
    /// mid-typing, then drops the subscription.
    pub async fn close(self) {
        self.stop_typing().await;
    }
}

impl Drop for TypingPresence {
    fn drop(&mut self) {
        self.feed_task.abort();
        self.sweep_task.abort();
        if let Ok(mut timer) = self.self_timer.try_lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
        // Last-resort stop broadcast when dropped mid-typing without close().
        if self.inner.typing.swap(false, Ordering::SeqCst) {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move { inner.broadcast_stop().await });
            }
        }
    }
}
