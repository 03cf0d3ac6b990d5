use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use haex_backend::memory::MemoryBackend;
use haex_chat::{
    ChannelDirectory, ChatClient, ChatConfig, MessageStore, ReactionLedger, ThreadStore,
    TypingPresence, thread_count,
};
use haex_types::models::{Author, Scope};
use haex_types::session::Session;

/// Two-session walkthrough of the chat layer against the in-process
/// backend: channel listing, optimistic send, typing, reactions, threads.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haex=debug".into()),
        )
        .init();

    let backend = MemoryBackend::new();
    let scope = Scope {
        id: Uuid::new_v4(),
        name: "Riverbend Housing Authority".into(),
    };
    let maria = Author::new(Uuid::new_v4(), "mreyes", "director", "Pacific Northwest")?;
    let devon = Author::new(Uuid::new_v4(), "dthomas", "case manager", "Pacific Northwest")?;
    backend.upsert_profile(maria.clone()).await;
    backend.upsert_profile(devon.clone()).await;

    backend
        .create_channel(scope.id, "general-discussion", "community", None, true)
        .await;
    let programs = backend
        .create_channel(
            scope.id,
            "voucher-programs",
            "programs",
            Some("HCV and project-based voucher questions".into()),
            true,
        )
        .await;

    let config = ChatConfig::from_env();
    let maria_client = ChatClient::new(Arc::new(backend.clone()), config.clone());
    let devon_client = ChatClient::new(Arc::new(backend.clone()), config);
    let maria_session = Session::authenticated(maria, scope.clone());
    let devon_session = Session::authenticated(devon, scope);

    let directory = ChannelDirectory::open(&devon_client, &devon_session).await;
    for (category, channels) in directory.by_category() {
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        info!("category {category}: {names:?}");
    }

    let maria_store = MessageStore::open(&maria_client, &maria_session, programs.id).await;
    let devon_store = MessageStore::open(&devon_client, &devon_session, programs.id).await;

    let maria_typing = TypingPresence::open(&maria_client, &maria_session, programs.id).await;
    let devon_typing = TypingPresence::open(&devon_client, &devon_session, programs.id).await;

    maria_typing.start_typing().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    for signal in devon_typing.typing_users() {
        info!("{} ({}) is typing", signal.username, signal.role);
    }

    maria_store
        .send("Waitlist for the HCV program reopens Monday at 9am.")
        .await?;
    maria_typing.close().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let announcement = devon_store
        .messages()
        .rows()
        .first()
        .map(|m| m.content().to_string())
        .unwrap_or_default();
    info!("devon sees: {announcement}");

    let parent = match devon_store.messages().rows().first() {
        Some(haex_chat::ChannelMessage::Committed(m)) => m.clone(),
        _ => anyhow::bail!("announcement did not commit"),
    };

    let ledger = ReactionLedger::open(&devon_client, &devon_session, parent.id).await;
    ledger.toggle("👍").await?;
    for count in ledger.counts() {
        info!("{} x{}", count.emoji, count.count);
    }

    let thread = ThreadStore::open(&devon_client, &devon_session, parent.id).await;
    thread
        .send_reply("Will the portal open at the same time?")
        .await?;
    info!(
        "thread under {} has {} replies as of {}",
        parent.id,
        thread_count(&devon_client, parent.id).await?,
        Utc::now().format("%H:%M:%S")
    );

    devon_typing.close().await;
    Ok(())
}
