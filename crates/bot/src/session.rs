//! Durable chat sessions.
//!
//! Sessions live in the `chat_sessions` table as JSON, keyed by chat id, so
//! a conversation survives a bot restart. [`CachedSessionStore`] keeps hot
//! sessions in memory and writes through to the inner store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use sqlx::PgPool;
use sqlx::types::Json;

use plantwatch_core::ChatId;

use crate::conversation::Session;
use crate::error::SessionStoreError;

/// How long an idle session stays cached.
const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: u64 = 10_000;

/// Persistence for chat sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Session of a chat; a chat never seen before starts idle.
    async fn load(&self, chat_id: ChatId) -> Result<Session, SessionStoreError>;

    async fn save(&self, chat_id: ChatId, session: &Session) -> Result<(), SessionStoreError>;
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// [`SessionStore`] backed by the `chat_sessions` table.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, chat_id: ChatId) -> Result<Session, SessionStoreError> {
        let row: Option<(Json<Session>,)> =
            sqlx::query_as("SELECT session FROM chat_sessions WHERE chat_id = $1")
                .bind(chat_id.get())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(session),)| session).unwrap_or_default())
    }

    async fn save(&self, chat_id: ChatId, session: &Session) -> Result<(), SessionStoreError> {
        sqlx::query(
            "INSERT INTO chat_sessions (chat_id, session) VALUES ($1, $2) \
             ON CONFLICT (chat_id) DO UPDATE SET session = EXCLUDED.session, updated_at = NOW()",
        )
        .bind(chat_id.get())
        .bind(Json(session))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Write-through cache in front of another [`SessionStore`].
pub struct CachedSessionStore<S> {
    inner: S,
    cache: Cache<ChatId, Session>,
}

impl<S: SessionStore> CachedSessionStore<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_idle(CACHE_TTL)
                .build(),
        }
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for CachedSessionStore<S> {
    async fn load(&self, chat_id: ChatId) -> Result<Session, SessionStoreError> {
        if let Some(session) = self.cache.get(&chat_id).await {
            return Ok(session);
        }
        let session = self.inner.load(chat_id).await?;
        self.cache.insert(chat_id, session.clone()).await;
        Ok(session)
    }

    async fn save(&self, chat_id: ChatId, session: &Session) -> Result<(), SessionStoreError> {
        // Only cache what made it to the inner store.
        if let Err(e) = self.inner.save(chat_id, session).await {
            self.cache.invalidate(&chat_id).await;
            return Err(e);
        }
        self.cache.insert(chat_id, session.clone()).await;
        Ok(())
    }
}

// =============================================================================
// Memory
// =============================================================================

/// [`SessionStore`] held in a map, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<ChatId, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored session of a chat, without defaulting.
    #[must_use]
    pub fn get(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, chat_id: ChatId) -> Result<Session, SessionStoreError> {
        Ok(self.get(chat_id).unwrap_or_default())
    }

    async fn save(&self, chat_id: ChatId, session: &Session) -> Result<(), SessionStoreError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id, session.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::conversation::ConversationState;

    use super::*;

    /// Counts loads and can be made to fail saves.
    #[derive(Default)]
    struct CountingStore {
        inner: MemorySessionStore,
        loads: AtomicUsize,
        fail_saves: bool,
    }

    #[async_trait]
    impl SessionStore for Arc<CountingStore> {
        async fn load(&self, chat_id: ChatId) -> Result<Session, SessionStoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(chat_id).await
        }

        async fn save(&self, chat_id: ChatId, session: &Session) -> Result<(), SessionStoreError> {
            if self.fail_saves {
                return Err(SessionStoreError::Database(sqlx::Error::PoolClosed));
            }
            self.inner.save(chat_id, session).await
        }
    }

    #[tokio::test]
    async fn test_unknown_chat_starts_idle() {
        let store = MemorySessionStore::new();
        let session = store.load(ChatId::new(1)).await.unwrap();
        assert_eq!(session, Session::default());
        assert_eq!(store.get(ChatId::new(1)), None);
    }

    #[tokio::test]
    async fn test_cache_serves_repeated_loads() {
        let inner = Arc::new(CountingStore::default());
        let store = CachedSessionStore::new(inner.clone());
        let chat = ChatId::new(7);

        store.load(chat).await.unwrap();
        store.load(chat).await.unwrap();
        assert_eq!(inner.loads.load(Ordering::SeqCst), 1);

        let session = Session::default().with_state(ConversationState::AwaitingEmail);
        store.save(chat, &session).await.unwrap();
        assert_eq!(store.load(chat).await.unwrap(), session);
        assert_eq!(inner.inner.get(chat), Some(session));
    }

    #[tokio::test]
    async fn test_failed_save_is_not_cached() {
        let inner = Arc::new(CountingStore {
            fail_saves: true,
            ..CountingStore::default()
        });
        let store = CachedSessionStore::new(inner.clone());
        let chat = ChatId::new(7);

        let session = Session::default().with_state(ConversationState::AwaitingWishlist);
        assert!(store.save(chat, &session).await.is_err());
        assert_eq!(store.load(chat).await.unwrap(), Session::default());
    }
}
