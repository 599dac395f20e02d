use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::models::{Conversation, ConversationKey, Message, PartyId};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, NewMessage, StoreError, StoreResult, activity_order};
use crate::realtime::ChangeFeed;

#[derive(Debug, Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    keys: HashMap<ConversationKey, Uuid>,
    messages: HashMap<Uuid, Vec<Message>>,
    message_index: HashMap<Uuid, Uuid>,
    last_created_at: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Wall clock, nudged forward so insertion order never goes backwards.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created_at {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(at);
        at
    }
}

/// Process-local [`ChatStore`]. Inserted messages are published straight
/// into the attached [`ChangeFeed`].
#[derive(Debug)]
pub struct MemoryChatStore {
    state: RwLock<MemoryState>,
    feed: ChangeFeed,
}

impl MemoryChatStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            feed,
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find_conversation(&self, key: &ConversationKey) -> StoreResult<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.conversations.get(id))
            .cloned())
    }

    async fn insert_conversation(&self, key: &ConversationKey) -> StoreResult<Conversation> {
        let mut state = self.state.write().await;
        if state.keys.contains_key(key) {
            return Err(StoreError::Conflict);
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            topic_id: key.topic_id.clone(),
            party_low: key.parties.low().clone(),
            party_high: key.parties.high().clone(),
            last_activity_at: None,
            preview_text: None,
            created_at: state.next_timestamp(),
        };
        state.keys.insert(key.clone(), conversation.id);
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn conversations_for(&self, party: &PartyId) -> StoreResult<Vec<Conversation>> {
        let state = self.state.read().await;
        let mut rows: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|conversation| conversation.has_party(party))
            .cloned()
            .collect();
        rows.sort_by(activity_order);
        Ok(rows)
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let persisted = {
            let mut state = self.state.write().await;
            if !state.conversations.contains_key(&message.conversation_id) {
                return Err(StoreError::Unavailable(format!(
                    "conversation {} does not exist",
                    message.conversation_id
                )));
            }
            let persisted = Message {
                id: Uuid::new_v4(),
                conversation_id: message.conversation_id,
                sender_id: message.sender_id,
                body: message.body,
                created_at: state.next_timestamp(),
            };
            state
                .message_index
                .insert(persisted.id, persisted.conversation_id);
            state
                .messages
                .entry(persisted.conversation_id)
                .or_default()
                .push(persisted.clone());
            persisted
        };

        self.feed.publish(persisted.clone());
        Ok(persisted)
    }

    async fn message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state.message_index.get(&id).and_then(|conversation_id| {
            state
                .messages
                .get(conversation_id)
                .and_then(|messages| messages.iter().find(|m| m.id == id))
                .cloned()
        }))
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        let mut messages = state
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by_key(Message::sort_key);
        Ok(messages)
    }

    async fn record_activity(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(conversation) = state.conversations.get_mut(&conversation_id)
            && conversation.last_activity_at.is_none_or(|current| current <= at)
        {
            conversation.preview_text = Some(preview.to_string());
            conversation.last_activity_at = Some(at);
        }
        Ok(())
    }

    async fn latest_messages(&self) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .values()
            .filter_map(|messages| messages.iter().max_by_key(|m| m.sort_key()).cloned())
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
