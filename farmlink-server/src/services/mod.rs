pub mod conversation_service;
pub mod error;
pub mod message_service;

use std::{future::Future, time::Duration};

use shared::models::{Conversation, PartyId};
use tracing::warn;
use uuid::Uuid;

use crate::store::{ChatStore, StoreResult};
pub use conversation_service::{ConversationService, Resolution};
pub use error::{ChatServiceError, ChatServiceResult};
pub use message_service::{MessageService, MessageSettings};

/// Runs one store call under `limit`. A timeout becomes a retryable
/// [`ChatServiceError::TransientStore`]; the store's own result is returned
/// untouched so callers can still inspect conflicts.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> ChatServiceResult<StoreResult<T>>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        metrics::counter!("farmlink_store_timeouts_total", "operation" => operation).increment(1);
        warn!(operation, timeout_ms = limit.as_millis(), "store call timed out");
        ChatServiceError::TransientStore(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))
    })
}

/// Loads a conversation and checks `caller` is one of its parties.
pub(crate) async fn conversation_for_party(
    store: &dyn ChatStore,
    limit: Duration,
    caller: &PartyId,
    conversation_id: Uuid,
) -> ChatServiceResult<Conversation> {
    if caller.is_blank() {
        return Err(ChatServiceError::Unauthenticated);
    }
    let conversation = bounded(limit, "conversation", store.conversation(conversation_id))
        .await??
        .ok_or(ChatServiceError::ConversationNotFound(conversation_id))?;
    if !conversation.has_party(caller) {
        return Err(ChatServiceError::NotParticipant(conversation_id));
    }
    Ok(conversation)
}

#[cfg(test)]
mod test_support;
