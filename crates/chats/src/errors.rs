//! Error taxonomy for the conversation store.

use thiserror::Error;

/// Result type alias for conversation store operations
pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("user not found: {id}")]
    UserNotFound { id: String },

    #[error("idea not found: {id}")]
    IdeaNotFound { id: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ChatError {
    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::ConversationNotFound { id: id.into() }
    }

    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::UserNotFound { id: id.into() }
    }

    pub fn idea_not_found(id: impl Into<String>) -> Self {
        Self::IdeaNotFound { id: id.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
