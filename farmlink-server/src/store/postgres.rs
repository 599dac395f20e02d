use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{Conversation, ConversationKey, Message, PartyId, TopicId};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{ChatStore, NewMessage, StoreResult};

const CONVERSATION_COLUMNS: &str =
    "id, topic_id, party_low, party_high, last_activity_at, preview_text, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, created_at";
/// Same expression as the `conversations_identity_key` index, so lookups use it.
const IDENTITY_MATCH: &str =
    "COALESCE(topic_id, '') = COALESCE($1, '') AND party_low = $2 AND party_high = $3";

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    topic_id: Option<String>,
    party_low: String,
    party_high: String,
    last_activity_at: Option<DateTime<Utc>>,
    preview_text: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            topic_id: row.topic_id.map(TopicId::new),
            party_low: PartyId::new(row.party_low),
            party_high: PartyId::new(row.party_high),
            last_activity_at: row.last_activity_at,
            preview_text: row.preview_text,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: PartyId::new(row.sender_id),
            body: row.body,
            created_at: row.created_at,
        }
    }
}

/// [`ChatStore`] over the tables created by the bootstrap scripts.
///
/// Message inserts fire `pg_notify`; see [`crate::realtime::PgChangeRelay`].
#[derive(Debug, Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    #[instrument(name = "store.find_conversation", skip(self), err)]
    async fn find_conversation(&self, key: &ConversationKey) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE {IDENTITY_MATCH}"
        ))
        .bind(key.topic_id.as_ref().map(TopicId::as_str))
        .bind(key.parties.low().as_str())
        .bind(key.parties.high().as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Conversation::from))
    }

    #[instrument(name = "store.insert_conversation", skip(self), err)]
    async fn insert_conversation(&self, key: &ConversationKey) -> StoreResult<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (topic_id, party_low, party_high) \
             VALUES ($1, $2, $3) RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(key.topic_id.as_ref().map(TopicId::as_str))
        .bind(key.parties.low().as_str())
        .bind(key.parties.high().as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Conversation::from))
    }

    async fn conversations_for(&self, party: &PartyId) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE party_low = $1 OR party_high = $1 \
             ORDER BY last_activity_at DESC NULLS LAST, created_at DESC, id"
        ))
        .bind(party.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    #[instrument(name = "store.insert_message", skip(self, message), fields(conversation_id = %message.conversation_id), err)]
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (conversation_id, sender_id, body) \
             VALUES ($1, $2, $3) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.conversation_id)
        .bind(message.sender_id.as_str())
        .bind(&message.body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Message::from))
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 \
             ORDER BY created_at, id"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    #[instrument(name = "store.record_activity", skip(self, preview), err)]
    async fn record_activity(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE conversations SET preview_text = $2, last_activity_at = $3 \
             WHERE id = $1 AND (last_activity_at IS NULL OR last_activity_at <= $3)",
        )
        .bind(conversation_id)
        .bind(preview)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_messages(&self) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT DISTINCT ON (conversation_id) {MESSAGE_COLUMNS} FROM messages \
             ORDER BY conversation_id, created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_lookup_matches_the_unique_index_expression() {
        let indexes = include_str!("../../sql/indexes/001_chat_indexes.sql");
        let indexed = "COALESCE(topic_id, ''), party_low, party_high";
        assert!(indexes.contains(indexed));
        assert!(IDENTITY_MATCH.starts_with("COALESCE(topic_id, '') = COALESCE($1, '')"));
        assert!(!IDENTITY_MATCH.contains("IS NOT DISTINCT FROM"));
    }
}
