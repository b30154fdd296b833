//! Domain entities exposed by the conversation store.
//!
//! Rowids stay internal; only cuid2 public identifiers and rfc3339
//! timestamps cross the API boundary.

use serde::Serialize;

/// One of the exactly two identities bound to a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub display_name: Option<String>,
    pub role: String,
}

/// Summary of the listing a conversation is about. Immutable after creation.
#[derive(Debug, Clone, Serialize)]
pub struct IdeaSummary {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub title: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub participants: Vec<Participant>,
    pub idea: IdeaSummary,
    pub created_at: String,
    pub last_activity_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
}

/// A conversation hydrated with its full ordered message log.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}
