pub mod events;
pub mod models;
pub mod session;

pub use events::{ChannelChange, MessageChange, ReactionChange, ThreadChange, TypingEvent};
pub use models::{
    Author, Channel, InvalidAuthor, Message, OptimisticMessage, Reaction, Scope, ThreadReply,
    TypingSignal,
};
pub use session::Session;
