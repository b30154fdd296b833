//! Two-party, subject-scoped conversations with a durable message log.

mod entities;
mod errors;
mod store;

pub use entities::{Conversation, ConversationWithMessages, IdeaSummary, Message, Participant};
pub use errors::{ChatError, ChatResult};
pub use store::ConversationStore;
