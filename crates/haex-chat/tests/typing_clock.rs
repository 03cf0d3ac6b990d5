mod support;

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use haex_backend::ChatBackend;
use haex_types::events::TypingEvent;
use haex_types::models::{Author, TypingSignal};

use haex_chat::TypingPresence;
use support::{Fixture, client, fixture, session};

/// Lets spawned feed and sweep tasks run to quiescence under the paused
/// clock without advancing it.
async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}

fn started(author: &Author, channel_id: Uuid) -> TypingEvent {
    TypingEvent::Started(TypingSignal {
        user_id: author.id,
        username: author.username.clone(),
        role: author.role.clone(),
        channel_id,
        last_typed: Utc::now(),
    })
}

async fn observer(fx: &Fixture) -> TypingPresence {
    TypingPresence::open(&client(fx), &session(fx, &fx.bob), fx.channel.id).await
}

#[tokio::test(start_paused = true)]
async fn stale_entries_expire_without_a_stop_broadcast() {
    let fx = fixture().await;
    let presence = observer(&fx).await;

    fx.backend
        .broadcast_typing(started(&fx.alice, fx.channel.id))
        .await
        .unwrap();
    settle().await;
    assert_eq!(presence.typing_users().len(), 1);

    tokio::time::advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(presence.typing_users().len(), 1, "still fresh at 4s");

    tokio::time::advance(Duration::from_millis(1600)).await;
    settle().await;
    assert!(presence.typing_users().is_empty(), "expired past 5s");
}

#[tokio::test(start_paused = true)]
async fn refreshed_entries_never_expire() {
    let fx = fixture().await;
    let presence = observer(&fx).await;

    for _ in 0..5 {
        fx.backend
            .broadcast_typing(started(&fx.alice, fx.channel.id))
            .await
            .unwrap();
        settle().await;
        assert_eq!(presence.typing_users().len(), 1);
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(presence.typing_users().len(), 1);
    }

    // Quiet now; the sweep catches up.
    tokio::time::advance(Duration::from_secs(6)).await;
    settle().await;
    assert!(presence.typing_users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sender_stops_announcing_after_going_quiet() {
    let fx = fixture().await;
    let alice_presence =
        TypingPresence::open(&client(&fx), &session(&fx, &fx.alice), fx.channel.id).await;
    let bob_presence = observer(&fx).await;

    alice_presence.start_typing().await;
    settle().await;
    assert_eq!(bob_presence.typing_users().len(), 1);
    assert_eq!(bob_presence.typing_users()[0].username, "aharper");

    tokio::time::advance(Duration::from_millis(3100)).await;
    settle().await;
    assert!(bob_presence.typing_users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn each_keystroke_rearms_the_self_stop_timer() {
    let fx = fixture().await;
    let alice_presence =
        TypingPresence::open(&client(&fx), &session(&fx, &fx.alice), fx.channel.id).await;
    let bob_presence = observer(&fx).await;

    alice_presence.start_typing().await;
    settle().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;

    // Another keystroke inside the window restarts the countdown.
    alice_presence.start_typing().await;
    settle().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(
        bob_presence.typing_users().len(),
        1,
        "4s after the first keystroke, 2s after the last"
    );

    tokio::time::advance(Duration::from_millis(1500)).await;
    settle().await;
    assert!(bob_presence.typing_users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn explicit_stop_clears_immediately() {
    let fx = fixture().await;
    let alice_presence =
        TypingPresence::open(&client(&fx), &session(&fx, &fx.alice), fx.channel.id).await;
    let bob_presence = observer(&fx).await;

    alice_presence.start_typing().await;
    settle().await;
    assert_eq!(bob_presence.typing_users().len(), 1);

    alice_presence.stop_typing().await;
    settle().await;
    assert!(bob_presence.typing_users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_broadcasts_a_final_stop() {
    let fx = fixture().await;
    let alice_presence =
        TypingPresence::open(&client(&fx), &session(&fx, &fx.alice), fx.channel.id).await;
    let bob_presence = observer(&fx).await;

    alice_presence.start_typing().await;
    settle().await;
    assert_eq!(bob_presence.typing_users().len(), 1);

    alice_presence.close().await;
    settle().await;
    assert!(bob_presence.typing_users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn own_echo_is_not_listed() {
    let fx = fixture().await;
    let alice_presence =
        TypingPresence::open(&client(&fx), &session(&fx, &fx.alice), fx.channel.id).await;

    alice_presence.start_typing().await;
    settle().await;
    assert!(alice_presence.typing_users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn signals_from_other_channels_are_ignored() {
    let fx = fixture().await;
    let other = fx
        .backend
        .create_channel(fx.scope.id, "side-channel", "community", None, true)
        .await;
    let presence = observer(&fx).await;

    fx.backend
        .broadcast_typing(started(&fx.alice, other.id))
        .await
        .unwrap();
    settle().await;
    assert!(presence.typing_users().is_empty());
}
