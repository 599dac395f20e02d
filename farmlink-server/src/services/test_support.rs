use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{Conversation, ConversationKey, Message, PartyId};
use uuid::Uuid;

use crate::{
    directory::{Directory, MemoryDirectory},
    realtime::ChangeFeed,
    store::{ChatStore, MemoryChatStore, NewMessage, StoreError, StoreResult},
};

use super::{ConversationService, MessageService, MessageSettings};

/// Wraps the memory store with switchable failures and latency.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryChatStore,
    fail_activity: AtomicBool,
    fail_inserts: AtomicBool,
    conflict_conversation_inserts: AtomicBool,
    fail_lookups_after_conflict: AtomicBool,
    conflict_seen: AtomicBool,
    insert_delay_ms: AtomicU64,
    find_delay_ms: AtomicU64,
    latest_delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            inner: MemoryChatStore::new(feed),
            fail_activity: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
            conflict_conversation_inserts: AtomicBool::new(false),
            fail_lookups_after_conflict: AtomicBool::new(false),
            conflict_seen: AtomicBool::new(false),
            insert_delay_ms: AtomicU64::new(0),
            find_delay_ms: AtomicU64::new(0),
            latest_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn fail_activity_updates(&self, fail: bool) {
        self.fail_activity.store(fail, Ordering::SeqCst);
    }

    pub fn fail_message_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn delay_message_inserts(&self, delay: Duration) {
        self.insert_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    /// Conversation inserts report a unique conflict without writing a row.
    pub fn conflict_conversation_inserts(&self, conflict: bool) {
        self.conflict_conversation_inserts
            .store(conflict, Ordering::SeqCst);
    }

    /// Key lookups fail once an insert has reported a conflict.
    pub fn fail_lookups_after_conflict(&self, fail: bool) {
        self.fail_lookups_after_conflict
            .store(fail, Ordering::SeqCst);
    }

    pub fn delay_latest_messages(&self, delay: Duration) {
        self.latest_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    /// Slows down key lookups so concurrent resolves all miss before any insert.
    pub fn delay_lookups(&self, delay: Duration) {
        self.find_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatStore for FlakyStore {
    async fn find_conversation(&self, key: &ConversationKey) -> StoreResult<Option<Conversation>> {
        let delay = self.find_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.conflict_seen.load(Ordering::SeqCst)
            && self.fail_lookups_after_conflict.load(Ordering::SeqCst)
        {
            return Err(StoreError::Unavailable("injected lookup failure".into()));
        }
        self.inner.find_conversation(key).await
    }

    async fn insert_conversation(&self, key: &ConversationKey) -> StoreResult<Conversation> {
        if self.conflict_conversation_inserts.load(Ordering::SeqCst) {
            self.conflict_seen.store(true, Ordering::SeqCst);
            return Err(StoreError::Conflict);
        }
        self.inner.insert_conversation(key).await
    }

    async fn conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.inner.conversation(id).await
    }

    async fn conversations_for(&self, party: &PartyId) -> StoreResult<Vec<Conversation>> {
        self.inner.conversations_for(party).await
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected insert failure".into()));
        }
        self.inner.insert_message(message).await
    }

    async fn message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.inner.message(id).await
    }

    async fn messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        self.inner.messages(conversation_id).await
    }

    async fn record_activity(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected activity failure".into()));
        }
        self.inner.record_activity(conversation_id, preview, at).await
    }

    async fn latest_messages(&self) -> StoreResult<Vec<Message>> {
        let delay = self.latest_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.latest_messages().await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

/// Directory whose lookups always fail.
#[derive(Debug)]
pub struct BrokenDirectory;

#[async_trait]
impl Directory for BrokenDirectory {
    async fn profile(&self, _party: &PartyId) -> StoreResult<Option<shared::models::PartyProfile>> {
        Err(StoreError::Unavailable("profiles offline".into()))
    }

    async fn topic(
        &self,
        _topic: &shared::models::TopicId,
    ) -> StoreResult<Option<shared::models::TopicSummary>> {
        Err(StoreError::Unavailable("products offline".into()))
    }
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub feed: ChangeFeed,
    pub directory: Arc<MemoryDirectory>,
    pub conversations: ConversationService,
    pub messages: MessageService,
}

pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

pub fn harness() -> Harness {
    harness_with_directory(None)
}

pub fn harness_with_directory(directory_override: Option<Arc<dyn Directory>>) -> Harness {
    let feed = ChangeFeed::new(64);
    let store = Arc::new(FlakyStore::new(feed.clone()));
    let directory = Arc::new(MemoryDirectory::new());
    let lookup: Arc<dyn Directory> = directory_override.unwrap_or_else(|| directory.clone());
    let conversations = ConversationService::new(store.clone(), lookup, TEST_TIMEOUT);
    let messages = MessageService::new(
        store.clone(),
        feed.clone(),
        MessageSettings {
            preview_max_chars: 75,
            store_timeout: TEST_TIMEOUT,
        },
    );
    Harness {
        store,
        feed,
        directory,
        conversations,
        messages,
    }
}

pub fn party(id: &str) -> PartyId {
    PartyId::new(id)
}
