use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ChatServiceError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("cannot start a conversation with yourself")]
    SelfConversation,
    #[error("party identifier must not be empty")]
    InvalidParty,
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error("not a participant of conversation {0}")]
    NotParticipant(Uuid),
    #[error("message body is empty")]
    EmptyMessage,
    #[error("conversation could not be created: {0}")]
    ConversationCreation(String),
    #[error("chat store unavailable: {0}")]
    TransientStore(String),
    #[error("live feed unavailable: {0}")]
    Subscription(String),
}

impl ChatServiceError {
    /// Retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatServiceError::TransientStore(_) | ChatServiceError::Subscription(_)
        )
    }
}

impl From<StoreError> for ChatServiceError {
    fn from(err: StoreError) -> Self {
        ChatServiceError::TransientStore(err.to_string())
    }
}

pub type ChatServiceResult<T> = Result<T, ChatServiceError>;
