use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Reaction, TypingSignal};

/// Change notification for the channel collection of one scope.
///
/// Channel payloads are not carried: the directory invalidates and refetches
/// the whole list on any of these, so the id is all a consumer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelChange {
    Inserted { id: Uuid },
    Updated { id: Uuid },
    Deleted { id: Uuid },
}

/// Change notification for the message collection of one channel.
///
/// Insert and update notifications carry only the row id; consumers hydrate
/// the full row (with author fields) before merging so an incomplete record
/// is never displayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessageChange {
    Inserted { id: Uuid },
    Updated { id: Uuid },
    Deleted { id: Uuid },
}

/// Change notification for the reaction set of one message. Reaction rows
/// are small and have no join data, so inserts carry the full row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReactionChange {
    Inserted(Reaction),
    Deleted {
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },
}

/// Change notification for the reply stream of one parent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ThreadChange {
    Inserted { id: Uuid },
    Deleted { id: Uuid },
}

/// Ephemeral typing broadcast for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TypingEvent {
    Started(TypingSignal),
    Stopped { user_id: Uuid, channel_id: Uuid },
}

impl TypingEvent {
    pub fn channel_id(&self) -> Uuid {
        match self {
            Self::Started(signal) => signal.channel_id,
            Self::Stopped { channel_id, .. } => *channel_id,
        }
    }
}
