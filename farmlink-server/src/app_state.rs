use std::{fmt, sync::Arc};

use shared::config::server::Config;
use sqlx::PgPool;

use crate::{
    directory::{Directory, MemoryDirectory, PgDirectory},
    identity::{IdentityProvider, PgSessionIdentity, StaticIdentity},
    realtime::ChangeFeed,
    services::{ConversationService, MessageService, MessageSettings},
    store::{ChatStore, MemoryChatStore, PgChatStore},
};

/// Everything a handler needs, shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub feed: ChangeFeed,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub(crate) pool: Option<PgPool>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("profile", &self.config.profile)
            .field("feed", &self.feed)
            .field("postgres", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn Directory>,
        identity: Arc<dyn IdentityProvider>,
        feed: ChangeFeed,
        pool: Option<PgPool>,
    ) -> Self {
        let timeout = config.chat.store_timeout();
        let conversations = ConversationService::new(store.clone(), directory, timeout);
        let messages = MessageService::new(
            store.clone(),
            feed.clone(),
            MessageSettings::from(&config.chat),
        );
        Self {
            config,
            store,
            identity,
            feed,
            conversations,
            messages,
            pool,
        }
    }

    /// Process-local state: memory store, static tokens from
    /// `auth.static_tokens`, and the given directory.
    pub fn in_memory(config: Arc<Config>, directory: Arc<MemoryDirectory>) -> Self {
        let feed = ChangeFeed::new(config.chat.feed_capacity);
        let store = Arc::new(MemoryChatStore::new(feed.clone()));
        let identity = Arc::new(StaticIdentity::new(
            config
                .auth
                .static_tokens
                .iter()
                .map(|(token, party)| (token.clone(), party.clone())),
        ));
        Self::new(config, store, directory, identity, feed, None)
    }

    /// Postgres-backed state. Feed events arrive through
    /// [`crate::realtime::PgChangeRelay`], which the caller starts.
    pub fn postgres(config: Arc<Config>, pool: PgPool) -> Self {
        let feed = ChangeFeed::new(config.chat.feed_capacity);
        Self::new(
            config,
            Arc::new(PgChatStore::new(pool.clone())),
            Arc::new(PgDirectory::new(pool.clone())),
            Arc::new(PgSessionIdentity::new(pool.clone())),
            feed,
            Some(pool),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.auth.session_cookie_name
    }
}
