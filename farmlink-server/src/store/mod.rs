//! Durable storage of conversations and messages.
//!
//! Services talk to a [`ChatStore`] so the same resolution and delivery
//! logic runs against Postgres in production and against
//! [`memory::MemoryChatStore`] in tests or single-node demos.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{Conversation, ConversationKey, Message, PartyId};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists.
    #[error("unique key conflict")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            return StoreError::Conflict;
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A message about to be persisted. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: PartyId,
    pub body: String,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Point lookup by the unique `(topic, party_low, party_high)` key.
    async fn find_conversation(&self, key: &ConversationKey) -> StoreResult<Option<Conversation>>;

    /// Inserts a conversation for `key`.
    ///
    /// Fails with [`StoreError::Conflict`] when another writer created the
    /// same key first; callers re-read instead of retrying the insert.
    async fn insert_conversation(&self, key: &ConversationKey) -> StoreResult<Conversation>;

    async fn conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Conversations where `party` is either side, most recently active
    /// first and never-active ones last.
    async fn conversations_for(&self, party: &PartyId) -> StoreResult<Vec<Conversation>>;

    /// Appends a message. Single-row and atomic.
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;

    async fn message(&self, id: Uuid) -> StoreResult<Option<Message>>;

    /// All messages of a conversation ordered by `(created_at, id)`.
    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Sets preview and activity time unless a newer activity is already
    /// recorded.
    async fn record_activity(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// The newest message of every conversation that has one.
    async fn latest_messages(&self) -> StoreResult<Vec<Message>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Ordering used by [`ChatStore::conversations_for`].
pub(crate) fn activity_order(a: &Conversation, b: &Conversation) -> std::cmp::Ordering {
    match (a.last_activity_at, b.last_activity_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    }
    .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn conversation(activity: Option<i64>, created: i64) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            topic_id: None,
            party_low: "a".into(),
            party_high: "b".into(),
            last_activity_at: activity.map(|s| DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(s)),
            preview_text: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(created),
        }
    }

    #[test]
    fn activity_order_puts_recent_first_and_inactive_last() {
        let mut rows = vec![
            conversation(None, 50),
            conversation(Some(10), 1),
            conversation(Some(30), 2),
        ];
        rows.sort_by(activity_order);
        let activity: Vec<_> = rows.iter().map(|c| c.last_activity_at.is_some()).collect();
        assert_eq!(activity, [true, true, false]);
        assert!(rows[0].last_activity_at > rows[1].last_activity_at);
    }

    #[test]
    fn pool_timeouts_are_unavailable() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
