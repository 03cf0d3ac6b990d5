use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A profile record that failed validation at the data-access boundary.
#[derive(Debug, Error)]
#[error("invalid author record: {0}")]
pub struct InvalidAuthor(pub String);

/// Display fields joined onto messages and replies.
///
/// Always constructed through [`Author::new`] so nothing downstream has to
/// re-check what came off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub region: String,
}

impl Author {
    /// Validates profile fields coming from the backend join. An empty
    /// username is rejected; an empty role falls back to the platform
    /// default the same way the profile table does.
    pub fn new(
        id: Uuid,
        username: impl Into<String>,
        role: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, InvalidAuthor> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return Err(InvalidAuthor(format!("empty username for profile {id}")));
        }
        let role = role.into();
        let role = if role.trim().is_empty() { "member".to_string() } else { role };
        Ok(Self {
            id,
            username,
            role,
            region: region.into(),
        })
    }
}

/// A housing authority — the tenant boundary every chat query is filtered by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Free-text grouping key; empty means "general".
    pub category: String,
    pub is_public: bool,
    /// Denormalized counter maintained by membership actions, re-read here.
    pub member_count: u32,
    pub scope_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A committed channel message. Content is immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub scope_id: Uuid,
    /// Echo of the client-generated reference from the originating send.
    /// Used to settle the matching optimistic entry; `None` on rows that
    /// arrived from other sessions.
    pub client_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Hydrated profile join. Present on rows fetched through the hydration
    /// paths; raw change notifications never carry it.
    pub author: Option<Author>,
}

/// A client-only shadow of a message between "send requested" and
/// "send acknowledged or failed". Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticMessage {
    /// Client-generated reference carried through the insert round trip.
    pub client_ref: Uuid,
    pub channel_id: Uuid,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl OptimisticMessage {
    /// Temporary display id shown by the UI until the real row arrives.
    pub fn display_id(&self) -> String {
        format!("temp-{}", self.created_at.timestamp_millis())
    }
}

/// One (message, user, emoji) reaction row. The triple is unique server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// A reply in the secondary stream attached to a parent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReply {
    pub id: Uuid,
    /// Parent message id.
    pub message_id: Uuid,
    pub author_id: Uuid,
    pub reply: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<Author>,
}

/// Ephemeral "user is typing" signal. Broadcast, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
    pub channel_id: Uuid,
    pub last_typed: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_rejects_empty_username() {
        let err = Author::new(Uuid::new_v4(), "   ", "member", "Northwest");
        assert!(err.is_err());
    }

    #[test]
    fn author_defaults_blank_role() {
        let author = Author::new(Uuid::new_v4(), "dthomas", "", "Gulf Coast").unwrap();
        assert_eq!(author.role, "member");
    }

    #[test]
    fn author_trims_username() {
        let author = Author::new(Uuid::new_v4(), " mreyes ", "director", "").unwrap();
        assert_eq!(author.username, "mreyes");
    }
}
