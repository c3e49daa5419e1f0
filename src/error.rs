use thiserror::Error;

use crate::models::{ConversationId, MessageId};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    #[error("not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
