//! Read-only lookups of marketplace profiles and listings used to annotate
//! conversations. Owned by other parts of the marketplace; chat never writes
//! them.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::models::{PartyId, PartyProfile, TopicId, TopicSummary};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::store::StoreResult;

#[async_trait]
pub trait Directory: Send + Sync {
    async fn profile(&self, party: &PartyId) -> StoreResult<Option<PartyProfile>>;
    async fn topic(&self, topic: &TopicId) -> StoreResult<Option<TopicSummary>>;
}

#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn profile(&self, party: &PartyId) -> StoreResult<Option<PartyProfile>> {
        #[derive(sqlx::FromRow)]
        struct ProfileRow {
            party_id: String,
            display_name: String,
            avatar_url: Option<String>,
        }

        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT party_id, display_name, avatar_url FROM profiles WHERE party_id = $1",
        )
        .bind(party.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PartyProfile {
            party_id: PartyId::new(row.party_id),
            display_name: row.display_name,
            avatar_url: row.avatar_url,
        }))
    }

    async fn topic(&self, topic: &TopicId) -> StoreResult<Option<TopicSummary>> {
        #[derive(sqlx::FromRow)]
        struct ProductRow {
            id: String,
            title: String,
            image_url: Option<String>,
        }

        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, title, image_url FROM products WHERE id = $1",
        )
        .bind(topic.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| TopicSummary {
            id: TopicId::new(row.id),
            title: row.title,
            image_url: row.image_url,
        }))
    }
}

/// In-process directory for the memory backend and tests.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    profiles: RwLock<HashMap<PartyId, PartyProfile>>,
    topics: RwLock<HashMap<TopicId, TopicSummary>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_profile(&self, profile: PartyProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.party_id.clone(), profile);
    }

    pub async fn upsert_topic(&self, topic: TopicSummary) {
        self.topics.write().await.insert(topic.id.clone(), topic);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn profile(&self, party: &PartyId) -> StoreResult<Option<PartyProfile>> {
        Ok(self.profiles.read().await.get(party).cloned())
    }

    async fn topic(&self, topic: &TopicId) -> StoreResult<Option<TopicSummary>> {
        Ok(self.topics.read().await.get(topic).cloned())
    }
}
