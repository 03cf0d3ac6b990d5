//! Client-side state layer for the Housing Authority Exchange chat.
//!
//! Each store wraps one live query plus its change subscription and keeps a
//! reconciled view on a `watch` channel: [`ChannelDirectory`] for the
//! scoped channel list, [`MessageStore`] for one channel's history with
//! optimistic send echo, [`TypingPresence`] for ephemeral typing signals,
//! [`ReactionLedger`] for per-message emoji counts, and [`ThreadStore`]
//! for reply streams. Stores are handed a [`ChatClient`] (backend handle,
//! notifier, config) and a [`Session`](haex_types::Session) explicitly —
//! there is no ambient client or current-user lookup anywhere in here.

pub mod config;
pub mod directory;
pub mod messages;
pub mod notify;
pub mod reactions;
pub mod state;
pub mod threads;
pub mod typing;

mod fetch;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use haex_backend::{BackendError, ChatBackend};

pub use config::ChatConfig;
pub use directory::ChannelDirectory;
pub use messages::{ChannelMessage, MessageStore};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use reactions::{ReactionCount, ReactionLedger};
pub use state::LoadState;
pub use threads::{ThreadStore, thread_count};
pub use typing::TypingPresence;

/// Failure of a user-initiated write (message, reply, or reaction toggle).
/// Always paired with a [`Notice`]; never retried automatically.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("not signed in")]
    NotAuthenticated,

    #[error("request timed out")]
    TimedOut,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Injected handle bundling everything a store needs: the backend, the
/// notice fan-out, and the tunables. Cheap to clone.
#[derive(Clone)]
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
    notifier: Notifier,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>, config: ChatConfig) -> Self {
        Self {
            backend,
            notifier: Notifier::new(),
            config,
        }
    }

    /// Stream of user-facing notices raised by any store opened from this
    /// client.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub(crate) fn backend(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.backend)
    }

    pub(crate) fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }
}
