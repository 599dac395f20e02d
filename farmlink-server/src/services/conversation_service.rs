//! Conversation identity and listing.
//!
//! A conversation is identified by its topic plus the canonically ordered
//! party pair, so "u1 contacts u2 about p42" and "u2 contacts u1 about p42"
//! land on the same row however many requests race to create it.

use std::{fmt, sync::Arc, time::Duration};

use futures::future::join_all;
use shared::models::{
    Conversation, ConversationDetail, ConversationKey, ConversationSummary, PartyId, PartyPair,
    PartyProfile, TopicId, TopicSummary,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{ChatServiceError, ChatServiceResult, bounded, conversation_for_party};
use crate::{
    directory::Directory,
    store::{ChatStore, StoreError},
};

/// Outcome of [`ConversationService::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub conversation: Conversation,
    /// `true` when this call inserted the row.
    pub created: bool,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn Directory>,
    timeout: Duration,
}

impl fmt::Debug for ConversationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>, directory: Arc<dyn Directory>, timeout: Duration) -> Self {
        Self {
            store,
            directory,
            timeout,
        }
    }

    /// Finds or creates the conversation between `caller` and `other` about
    /// `topic_id`.
    ///
    /// # Errors
    /// * [`ChatServiceError::Unauthenticated`] for a blank caller.
    /// * [`ChatServiceError::SelfConversation`] when both parties are the same.
    /// * [`ChatServiceError::ConversationCreation`] when the insert lost a
    ///   race and the winner's row cannot be read back.
    /// * [`ChatServiceError::TransientStore`] on store failures or timeouts.
    #[instrument(name = "chat.resolve_conversation", skip(self), err)]
    pub async fn resolve(
        &self,
        caller: &PartyId,
        other: &PartyId,
        topic_id: Option<TopicId>,
    ) -> ChatServiceResult<Resolution> {
        if caller.is_blank() {
            return Err(ChatServiceError::Unauthenticated);
        }
        if other.is_blank() {
            return Err(ChatServiceError::InvalidParty);
        }
        let parties = PartyPair::canonical(caller.clone(), other.clone())
            .ok_or(ChatServiceError::SelfConversation)?;
        let key = ConversationKey::new(topic_id, parties);

        if let Some(existing) =
            bounded(self.timeout, "find_conversation", self.store.find_conversation(&key)).await??
        {
            return Ok(Resolution {
                conversation: existing,
                created: false,
            });
        }

        match bounded(
            self.timeout,
            "insert_conversation",
            self.store.insert_conversation(&key),
        )
        .await?
        {
            Ok(conversation) => {
                metrics::counter!("farmlink_conversations_created_total").increment(1);
                info!(conversation_id = %conversation.id, "conversation created");
                Ok(Resolution {
                    conversation,
                    created: true,
                })
            }
            Err(StoreError::Conflict) => self.reread_after_conflict(&key).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn reread_after_conflict(&self, key: &ConversationKey) -> ChatServiceResult<Resolution> {
        metrics::counter!("farmlink_resolve_conflicts_total").increment(1);
        match bounded(self.timeout, "find_conversation", self.store.find_conversation(key)).await {
            Ok(Ok(Some(conversation))) => {
                info!(conversation_id = %conversation.id, "concurrent create resolved to existing conversation");
                Ok(Resolution {
                    conversation,
                    created: false,
                })
            }
            Ok(Ok(None)) => Err(ChatServiceError::ConversationCreation(
                "insert conflicted but no conversation was found".to_string(),
            )),
            Ok(Err(err)) => Err(ChatServiceError::ConversationCreation(err.to_string())),
            Err(err) => Err(ChatServiceError::ConversationCreation(err.to_string())),
        }
    }

    /// Every conversation of `caller`, newest activity first, each annotated
    /// with the counterpart's profile and the topic. Annotation failures are
    /// logged and leave the field empty; they never drop a row.
    ///
    /// # Errors
    /// Fails only when the conversation rows themselves cannot be loaded.
    #[instrument(name = "chat.list_conversations", skip(self), err)]
    pub async fn list_for(&self, caller: &PartyId) -> ChatServiceResult<Vec<ConversationSummary>> {
        if caller.is_blank() {
            return Err(ChatServiceError::Unauthenticated);
        }
        let rows = bounded(
            self.timeout,
            "conversations_for",
            self.store.conversations_for(caller),
        )
        .await??;

        let summaries = join_all(rows.into_iter().map(|conversation| async move {
            let Some(other) = conversation.other_party(caller).cloned() else {
                warn!(conversation_id = %conversation.id, "store returned a conversation the caller is not part of");
                return None;
            };
            let (other_profile, topic) = self.enrich(&other, conversation.topic_id.as_ref()).await;
            Some(ConversationSummary {
                id: conversation.id,
                topic_id: conversation.topic_id,
                other_party: other,
                other_profile,
                topic,
                preview_text: conversation.preview_text,
                last_activity_at: conversation.last_activity_at,
            })
        }))
        .await;

        Ok(summaries.into_iter().flatten().collect())
    }

    /// The conversation, its counterpart, topic and full history.
    ///
    /// # Errors
    /// [`ChatServiceError::ConversationNotFound`] or
    /// [`ChatServiceError::NotParticipant`] when `caller` may not see it.
    #[instrument(name = "chat.conversation_detail", skip(self), err)]
    pub async fn detail(
        &self,
        caller: &PartyId,
        conversation_id: Uuid,
    ) -> ChatServiceResult<ConversationDetail> {
        let conversation =
            conversation_for_party(&*self.store, self.timeout, caller, conversation_id).await?;
        let other_party = conversation
            .other_party(caller)
            .cloned()
            .ok_or(ChatServiceError::NotParticipant(conversation_id))?;

        let messages = bounded(self.timeout, "messages", self.store.messages(conversation_id));
        let enrichment = self.enrich(&other_party, conversation.topic_id.as_ref());
        let (messages, (other_profile, topic)) = tokio::join!(messages, enrichment);

        Ok(ConversationDetail {
            conversation,
            other_party,
            other_profile,
            topic,
            messages: messages??,
        })
    }

    async fn enrich(
        &self,
        other: &PartyId,
        topic_id: Option<&TopicId>,
    ) -> (Option<PartyProfile>, Option<TopicSummary>) {
        let profile = async {
            match bounded(self.timeout, "profile", self.directory.profile(other)).await {
                Ok(Ok(profile)) => profile,
                Ok(Err(err)) => enrichment_failed("profile", other.as_str(), &err),
                Err(err) => enrichment_failed("profile", other.as_str(), &err),
            }
        };
        let topic = async {
            let topic_id = topic_id?;
            match bounded(self.timeout, "topic", self.directory.topic(topic_id)).await {
                Ok(Ok(topic)) => topic,
                Ok(Err(err)) => enrichment_failed("topic", topic_id.as_str(), &err),
                Err(err) => enrichment_failed("topic", topic_id.as_str(), &err),
            }
        };
        tokio::join!(profile, topic)
    }
}

fn enrichment_failed<T>(field: &'static str, key: &str, err: &dyn std::error::Error) -> Option<T> {
    metrics::counter!("farmlink_enrichment_failures_total", "field" => field).increment(1);
    warn!(field, key, error = %err, "conversation enrichment lookup failed");
    None
}
