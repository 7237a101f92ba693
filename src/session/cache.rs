//! In-memory session cache with TTL eviction and write-back
//!
//! Every request resolves its viewer through this cache, so lookups must be
//! cheap and safe under concurrency. Entries live in a `DashMap`, which makes
//! lookup, refresh, insert and eviction atomic per token.
//!
//! ## Lifecycle
//!
//! - **new**: created by [`SessionCache::create`]; anonymous sessions are
//!   never cached, the token alone identifies them
//! - **active**: persisted and/or rehydrated, `last_accessed` tracked
//! - **stale**: idle past `max_age`, dropped on the next lookup
//! - **removed**: explicit logout, deleted from the store as well
//!
//! Callers always receive an independent clone of the cached session. The
//! record store handle is owned by the cache and never stored in a session.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::{Credentials, Session, from_unix, token};
use crate::config::SessionConfig;
use crate::store::{RecordStore, SessionDocument, StoreResult};

/// Outcome of consulting the in-memory map.
enum Cached {
    Live { session: Session, refreshed: bool },
    Stale,
    Miss,
}

pub struct SessionCache {
    sessions: DashMap<String, Session>,
    store: Arc<dyn RecordStore>,
    config: SessionConfig,
    max_age: Duration,
    refresh_interval: Duration,
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::days(365 * 100))
}

/// Shorten a token for log output.
fn redact(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

impl SessionCache {
    pub fn new(store: Arc<dyn RecordStore>, config: SessionConfig) -> Self {
        let max_age = to_chrono(config.max_age);
        let refresh_interval = to_chrono(config.refresh_interval);
        Self {
            sessions: DashMap::new(),
            store,
            config,
            max_age,
            refresh_interval,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of sessions currently held in memory.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        self.get_at(token, Utc::now()).await
    }

    /// Resolve a presented token to a session as of `now`.
    ///
    /// Returns `None` for malformed, unknown or expired tokens and when the
    /// store cannot be reached.
    pub async fn get_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        if !token::is_well_formed(token) {
            return None;
        }

        match self.lookup_cached(token, now) {
            Cached::Live { session, refreshed } => {
                // Anonymous sessions only ever live in memory.
                if refreshed && session.is_authenticated() {
                    self.write_back(session.to_document());
                }
                return Some(session);
            }
            Cached::Stale => {
                log::debug!("session {} went stale in memory", redact(token));
            }
            Cached::Miss => {}
        }

        self.rehydrate(token, now).await
    }

    fn lookup_cached(&self, token: &str, now: DateTime<Utc>) -> Cached {
        {
            let Some(mut entry) = self.sessions.get_mut(token) else {
                return Cached::Miss;
            };

            let idle = now - entry.last_accessed();
            if idle <= self.max_age {
                let refreshed = idle > self.refresh_interval;
                if refreshed {
                    entry.set_last_accessed(now);
                }
                return Cached::Live {
                    session: entry.value().clone(),
                    refreshed,
                };
            }
        }

        let max_age = self.max_age;
        self.sessions
            .remove_if(token, |_, session| now - session.last_accessed() > max_age);
        Cached::Stale
    }

    /// Persist a refreshed timestamp without blocking the caller.
    fn write_back(&self, document: SessionDocument) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) = store.put_session(&document).await {
                log::warn!(
                    "failed to write back session {}: {}",
                    redact(&document.token),
                    err
                );
            }
        });
    }

    async fn rehydrate(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let document = match self.store.session(token).await {
            Ok(Some(document)) => document,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("session lookup failed for {}: {}", redact(token), err);
                return None;
            }
        };

        let last_accessed = from_unix(document.last_accessed);
        if now - last_accessed > self.max_age {
            log::debug!("deleting expired session {}", redact(token));
            if let Err(err) = self.store.delete_session(token).await {
                log::warn!("failed to delete expired session {}: {}", redact(token), err);
            }
            return None;
        }

        let Some(account_id) = document.account_id else {
            return Some(Session::anonymous(token.to_string(), last_accessed));
        };

        let account = match self.store.account(&account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                log::warn!(
                    "session {} references missing account {}",
                    redact(token),
                    account_id
                );
                return None;
            }
            Err(err) => {
                log::warn!("account lookup failed for {}: {}", account_id, err);
                return None;
            }
        };

        let mut credentials = Credentials::from_account(&account);
        credentials.authoritative |= self.is_authoritative_provider(&credentials.oauth_provider);

        let session =
            Session::authenticated(token.to_string(), account_id, credentials, last_accessed);

        // First writer wins when two requests rehydrate the same token.
        let cached = self
            .sessions
            .entry(token.to_string())
            .or_insert(session)
            .value()
            .clone();
        Some(cached)
    }

    fn is_authoritative_provider(&self, provider: &str) -> bool {
        self.config.authoritative_providers.contains(provider)
    }

    pub async fn create(
        &self,
        account_id: Option<String>,
        credentials: Option<Credentials>,
    ) -> StoreResult<Session> {
        self.create_at(account_id, credentials, Utc::now()).await
    }

    /// Start a new session.
    ///
    /// With an account id the session is authenticated: the account and the
    /// session are persisted before the session becomes visible in the cache.
    /// Without one, any credentials are discarded and the anonymous session is
    /// returned without entering the cache.
    pub async fn create_at(
        &self,
        account_id: Option<String>,
        credentials: Option<Credentials>,
        now: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let token = token::generate_token();

        let session = match account_id {
            Some(account_id) => {
                let mut credentials =
                    credentials.unwrap_or_else(|| Credentials::builder().build());
                credentials.authoritative |=
                    self.is_authoritative_provider(&credentials.oauth_provider);
                Session::authenticated(token.clone(), account_id, credentials, now)
            }
            None => {
                if credentials.is_some() {
                    log::debug!("ignoring credentials for a session without an account");
                }
                Session::anonymous(token.clone(), now)
            }
        };

        let Some(account) = session.account_document() else {
            return Ok(session);
        };

        self.store.put_account(&account).await?;
        self.store.put_session(&session.to_document()).await?;
        log::info!("created session for account {}", account.account_id);

        self.sessions.insert(token, session.clone());
        Ok(session)
    }

    pub async fn touch(&self, session: &mut Session) -> StoreResult<()> {
        self.touch_at(session, Utc::now()).await
    }

    /// Mark a session as accessed at `now` and persist the timestamp.
    pub async fn touch_at(&self, session: &mut Session, now: DateTime<Utc>) -> StoreResult<()> {
        session.set_last_accessed(now);
        if let Some(mut entry) = self.sessions.get_mut(session.token()) {
            entry.set_last_accessed(now);
        }
        self.store.put_session(&session.to_document()).await
    }

    /// Drop a session from memory; the durable copy is left alone.
    pub fn evict(&self, token: &str) -> Option<Session> {
        self.sessions.remove(token).map(|(_, session)| session)
    }

    /// Remove a session from memory and from the store.
    pub async fn logout(&self, token: &str) -> StoreResult<()> {
        self.evict(token);
        self.store.delete_session(token).await?;
        log::info!("session {} logged out", redact(token));
        Ok(())
    }

    /// Drop every in-memory session idle for longer than `max_age`.
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        let max_age = self.max_age;
        self.sessions
            .retain(|_, session| now - session.last_accessed() <= max_age);
        before.saturating_sub(self.sessions.len())
    }

    /// Periodically purge stale sessions until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("session sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let purged = self.purge_stale(Utc::now());
                    if purged > 0 {
                        log::info!("purged {} stale sessions", purged);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccountCredentials, AccountDocument, AccountInternal, InMemoryStore};
    use std::collections::HashSet;
    use std::time::Duration as StdDuration;

    const HOUR: i64 = 60 * 60;
    const WEEK: i64 = 7 * 24 * HOUR;

    fn config() -> SessionConfig {
        SessionConfig {
            max_age: StdDuration::from_secs(WEEK as u64),
            refresh_interval: StdDuration::from_secs(HOUR as u64),
            sweep_interval: StdDuration::from_secs(600),
            cookie_name: "archive_session".into(),
            cookie_secure: false,
            authoritative_providers: HashSet::from(["corp-sso".to_string()]),
        }
    }

    fn cache_with(store: &InMemoryStore) -> SessionCache {
        SessionCache::new(Arc::new(store.clone()), config())
    }

    fn alice() -> Credentials {
        Credentials::builder()
            .user_id("alice")
            .name("Alice")
            .email("alice@example.org")
            .build()
    }

    fn t(seconds: i64) -> DateTime<Utc> {
        from_unix(1_700_000_000 + seconds)
    }

    async fn seed_durable(store: &InMemoryStore, token: &str, provider: &str, last_accessed: i64) {
        store
            .put_account(&AccountDocument {
                account_id: "acct-1".into(),
                credentials: AccountCredentials {
                    email: "alice@example.org".into(),
                    name: "Alice".into(),
                    user_id: "alice".into(),
                },
                internal: AccountInternal {
                    oauth_provider: provider.into(),
                    oauth_data: serde_json::Value::Null,
                    authoritative: false,
                    admin: false,
                },
            })
            .await
            .unwrap();
        store
            .put_session(&SessionDocument {
                token: token.into(),
                account_id: Some("acct-1".into()),
                last_accessed,
            })
            .await
            .unwrap();
    }

    async fn wait_for_durable(store: &InMemoryStore, token: &str, expected: i64) -> bool {
        for _ in 0..100 {
            if let Ok(Some(doc)) = store.session(token).await {
                if doc.last_accessed == expected {
                    return true;
                }
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_create_authenticated_persists_session_and_account() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);

        let session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        assert!(session.is_authenticated());
        let doc = store.session(session.token()).await.unwrap().unwrap();
        assert_eq!(doc.account_id.as_deref(), Some("acct-1"));
        let account = store.account("acct-1").await.unwrap().unwrap();
        assert_eq!(account.credentials.email, "alice@example.org");

        let fetched = cache.get_at(session.token(), t(10)).await.unwrap();
        assert_eq!(fetched, session);
    }

    #[tokio::test]
    async fn test_create_without_account_discards_credentials() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);

        let session = cache.create_at(None, Some(alice()), t(0)).await.unwrap();

        assert!(!session.is_authenticated());
        assert!(session.credentials().is_none());
        assert_eq!(store.session_count(), 0);
        assert!(cache.is_empty());
        assert!(cache.get_at(session.token(), t(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_lookups_within_refresh_interval_share_timestamp() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        let first = cache.get_at(session.token(), t(60)).await.unwrap();
        let second = cache.get_at(session.token(), t(120)).await.unwrap();

        assert_eq!(first.last_accessed(), second.last_accessed());
        assert_eq!(first.last_accessed(), t(0));
    }

    #[tokio::test]
    async fn test_lookup_after_refresh_interval_writes_back() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        let refreshed = cache.get_at(session.token(), t(2 * HOUR)).await.unwrap();
        assert_eq!(refreshed.last_accessed(), t(2 * HOUR));

        assert!(wait_for_durable(&store, session.token(), t(2 * HOUR).timestamp()).await);

        let again = cache.get_at(session.token(), t(2 * HOUR + 5)).await.unwrap();
        assert_eq!(again.last_accessed(), t(2 * HOUR));
    }

    #[tokio::test]
    async fn test_lookup_after_max_age_is_no_session() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        assert!(cache.get_at(session.token(), t(WEEK + 1)).await.is_none());
        assert!(cache.is_empty());
        assert!(store.session(session.token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_miss_rehydrates_with_account_credentials() {
        let store = InMemoryStore::new();
        let token = token::generate_token();
        seed_durable(&store, &token, "corp-sso", t(0).timestamp()).await;
        let cache = cache_with(&store);

        let session = cache.get_at(&token, t(30)).await.unwrap();

        assert_eq!(session.account_id(), Some("acct-1"));
        assert_eq!(session.last_accessed(), t(0));
        let creds = session.credentials().unwrap();
        assert_eq!(creds.name, "Alice");
        assert!(creds.authoritative, "corp-sso is configured as authoritative");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_durable_session_is_deleted() {
        let store = InMemoryStore::new();
        let token = token::generate_token();
        seed_durable(&store, &token, "github", t(0).timestamp()).await;
        let cache = cache_with(&store);

        assert!(cache.get_at(&token, t(WEEK + HOUR)).await.is_none());
        assert!(store.session(&token).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_means_no_session() {
        let store = InMemoryStore::new();
        let token = token::generate_token();
        seed_durable(&store, &token, "github", t(0).timestamp()).await;
        store.set_unavailable(true);
        let cache = cache_with(&store);

        assert!(cache.get_at(&token, t(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_token_never_reaches_store() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let cache = cache_with(&store);

        assert!(cache.get_at("not-a-token", t(0)).await.is_none());
        assert!(cache.get_at("", t(0)).await.is_none());
    }

    #[tokio::test]
    async fn test_returned_sessions_are_independent_copies() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        let mut first = cache.get_at(session.token(), t(1)).await.unwrap();
        first.set_last_accessed(t(999));

        let second = cache.get_at(session.token(), t(2)).await.unwrap();
        assert_eq!(second.last_accessed(), t(0));
    }

    #[tokio::test]
    async fn test_concurrent_rehydration_converges_on_one_entry() {
        let store = InMemoryStore::new();
        let token = token::generate_token();
        seed_durable(&store, &token, "github", t(0).timestamp()).await;
        let cache = cache_with(&store);

        let (a, b) = tokio::join!(cache.get_at(&token, t(5)), cache.get_at(&token, t(5)));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_touch_updates_memory_and_store() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let mut session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        cache.touch_at(&mut session, t(50)).await.unwrap();

        assert_eq!(session.last_accessed(), t(50));
        let doc = store.session(session.token()).await.unwrap().unwrap();
        assert_eq!(doc.last_accessed, t(50).timestamp());
        let cached = cache.get_at(session.token(), t(51)).await.unwrap();
        assert_eq!(cached.last_accessed(), t(50));
    }

    #[tokio::test]
    async fn test_evict_keeps_durable_copy_and_logout_removes_it() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        let session = cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();

        assert!(cache.evict(session.token()).is_some());
        assert!(cache.is_empty());
        let rehydrated = cache.get_at(session.token(), t(10)).await.unwrap();
        assert_eq!(rehydrated.account_id(), Some("acct-1"));

        cache.logout(session.token()).await.unwrap();
        assert!(cache.is_empty());
        assert!(cache.get_at(session.token(), t(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_stale_drops_only_idle_sessions() {
        let store = InMemoryStore::new();
        let cache = cache_with(&store);
        cache
            .create_at(Some("acct-1".into()), Some(alice()), t(0))
            .await
            .unwrap();
        let fresh = cache
            .create_at(Some("acct-2".into()), Some(alice()), t(WEEK))
            .await
            .unwrap();

        assert_eq!(cache.purge_stale(t(WEEK + 10)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at(fresh.token(), t(WEEK + 20)).await.is_some());
    }
}
