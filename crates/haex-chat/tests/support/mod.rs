#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use haex_backend::memory::MemoryBackend;
use haex_chat::{ChatClient, ChatConfig};
use haex_types::models::{Author, Channel, Scope};
use haex_types::session::Session;

pub struct Fixture {
    pub backend: MemoryBackend,
    pub scope: Scope,
    pub alice: Author,
    pub bob: Author,
    pub channel: Channel,
}

pub async fn fixture() -> Fixture {
    let backend = MemoryBackend::new();
    let scope = Scope {
        id: Uuid::new_v4(),
        name: "Riverbend Housing Authority".into(),
    };
    let alice = Author::new(Uuid::new_v4(), "aharper", "director", "Pacific Northwest").unwrap();
    let bob = Author::new(Uuid::new_v4(), "bcole", "case manager", "Pacific Northwest").unwrap();
    backend.upsert_profile(alice.clone()).await;
    backend.upsert_profile(bob.clone()).await;
    let channel = backend
        .create_channel(scope.id, "general-discussion", "community", None, true)
        .await;
    Fixture {
        backend,
        scope,
        alice,
        bob,
        channel,
    }
}

pub fn client(fixture: &Fixture) -> ChatClient {
    client_with(fixture, ChatConfig::default())
}

pub fn client_with(fixture: &Fixture, config: ChatConfig) -> ChatClient {
    ChatClient::new(Arc::new(fixture.backend.clone()), config)
}

pub fn session(fixture: &Fixture, author: &Author) -> Session {
    Session::authenticated(author.clone(), fixture.scope.clone())
}

/// Waits (bounded) for a watch channel to satisfy a predicate.
pub async fn eventually<T, F>(rx: &mut watch::Receiver<T>, mut pred: F)
where
    F: FnMut(&T) -> bool,
{
    let outcome = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if pred(&rx.borrow_and_update()) {
                return;
            }
            rx.changed().await.expect("watch channel closed");
        }
    })
    .await;
    outcome.expect("condition not met within 2s");
}
