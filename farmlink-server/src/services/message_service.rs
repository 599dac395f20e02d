//! Message delivery.
//!
//! A send validates, persists the message, then refreshes the parent
//! conversation's preview. The refresh is best effort: once the message row
//! exists the send has succeeded, whatever happens to the preview.

use std::{fmt, sync::Arc, time::Duration};

use shared::{
    config::server::ChatConfig,
    models::{Message, PartyId, normalize_body, preview_of},
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{ChatServiceError, ChatServiceResult, bounded, conversation_for_party};
use crate::{
    realtime::{ChangeFeed, Subscription},
    store::{ChatStore, NewMessage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSettings {
    pub preview_max_chars: usize,
    pub store_timeout: Duration,
}

impl From<&ChatConfig> for MessageSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            preview_max_chars: config.preview_max_chars,
            store_timeout: config.store_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    feed: ChangeFeed,
    settings: MessageSettings,
}

impl fmt::Debug for MessageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageService")
            .field("feed", &self.feed)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MessageService {
    pub fn new(store: Arc<dyn ChatStore>, feed: ChangeFeed, settings: MessageSettings) -> Self {
        Self {
            store,
            feed,
            settings,
        }
    }

    /// Persists one message from `sender` into `conversation_id`.
    ///
    /// # Errors
    /// * [`ChatServiceError::Unauthenticated`] when `sender` is not `caller`.
    /// * [`ChatServiceError::EmptyMessage`] when the trimmed body is empty.
    /// * [`ChatServiceError::ConversationNotFound`] / [`ChatServiceError::NotParticipant`].
    /// * [`ChatServiceError::TransientStore`] when the store fails or a call
    ///   exceeds the configured timeout.
    #[instrument(name = "chat.send_message", skip(self, body), err)]
    pub async fn send(
        &self,
        caller: &PartyId,
        conversation_id: Uuid,
        sender: &PartyId,
        body: &str,
    ) -> ChatServiceResult<Message> {
        if caller.is_blank() || sender != caller {
            return Err(ChatServiceError::Unauthenticated);
        }
        let body = normalize_body(body).ok_or(ChatServiceError::EmptyMessage)?;
        let limit = self.settings.store_timeout;
        conversation_for_party(&*self.store, limit, caller, conversation_id).await?;

        let message = bounded(
            limit,
            "insert_message",
            self.store.insert_message(NewMessage {
                conversation_id,
                sender_id: sender.clone(),
                body,
            }),
        )
        .await??;
        metrics::counter!("farmlink_messages_sent_total").increment(1);
        info!(message_id = %message.id, "message persisted");

        self.refresh_preview(&message).await;
        Ok(message)
    }

    async fn refresh_preview(&self, message: &Message) {
        let preview = preview_of(&message.body, self.settings.preview_max_chars);
        let outcome = bounded(
            self.settings.store_timeout,
            "record_activity",
            self.store
                .record_activity(message.conversation_id, &preview, message.created_at),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        metrics::counter!("farmlink_preview_update_failures_total").increment(1);
        warn!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            error = %failure,
            "conversation preview update failed; preview stays stale until the next send"
        );
    }

    /// Messages of a conversation the caller belongs to, oldest first.
    ///
    /// # Errors
    /// Same access errors as [`MessageService::send`].
    #[instrument(name = "chat.message_history", skip(self), err)]
    pub async fn history(
        &self,
        caller: &PartyId,
        conversation_id: Uuid,
    ) -> ChatServiceResult<Vec<Message>> {
        let limit = self.settings.store_timeout;
        conversation_for_party(&*self.store, limit, caller, conversation_id).await?;
        Ok(bounded(limit, "messages", self.store.messages(conversation_id)).await??)
    }

    /// Opens the live feed of a conversation for one of its parties.
    ///
    /// # Errors
    /// Access errors as for [`MessageService::history`]; store failures while
    /// checking membership surface as [`ChatServiceError::Subscription`].
    #[instrument(name = "chat.subscribe", skip(self), err)]
    pub async fn subscribe(
        &self,
        caller: &PartyId,
        conversation_id: Uuid,
    ) -> ChatServiceResult<Subscription> {
        conversation_for_party(
            &*self.store,
            self.settings.store_timeout,
            caller,
            conversation_id,
        )
        .await
        .map_err(|err| match err {
            ChatServiceError::TransientStore(reason) => ChatServiceError::Subscription(reason),
            other => other,
        })?;
        Ok(self.feed.subscribe(conversation_id))
    }

    /// Recomputes every conversation's preview and activity time from its
    /// newest message. Returns how many conversations were touched.
    ///
    /// # Errors
    /// Fails when the newest messages cannot be listed or an update fails;
    /// each store call is bounded by the store timeout.
    #[instrument(name = "chat.repair_previews", skip(self), err)]
    pub async fn repair_previews(&self) -> ChatServiceResult<usize> {
        let limit = self.settings.store_timeout;
        let latest = bounded(limit, "latest_messages", self.store.latest_messages()).await??;
        for message in &latest {
            let preview = preview_of(&message.body, self.settings.preview_max_chars);
            bounded(
                limit,
                "record_activity",
                self.store
                    .record_activity(message.conversation_id, &preview, message.created_at),
            )
            .await??;
        }
        info!(count = latest.len(), "conversation previews repaired");
        Ok(latest.len())
    }
}
