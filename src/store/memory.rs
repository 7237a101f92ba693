//! In-memory record store
//!
//! Keeps messages, sessions and accounts in `DashMap`s. Used by the test
//! suite and for running the server without a database. The store can be
//! switched into an unavailable state to exercise backend-failure paths, and
//! it counts message lookups so callers can assert on traversal cost.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;

use super::{
    AccountDocument, RecordQuery, RecordStore, SessionDocument, StoreError, StoreResult,
};
use crate::models::MessageRecord;

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    messages: Arc<DashMap<String, MessageRecord>>,
    sessions: Arc<DashMap<String, SessionDocument>>,
    accounts: Arc<DashMap<String, AccountDocument>>,
    unavailable: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(records: impl IntoIterator<Item = MessageRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert_message(record);
        }
        store
    }

    pub fn insert_message(&self, record: MessageRecord) {
        self.messages.insert(record.id.clone(), record);
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of message lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store disabled".into()))
        } else {
            Ok(())
        }
    }

    fn count_lookup(&self) -> StoreResult<()> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sorted(mut records: Vec<MessageRecord>) -> Vec<MessageRecord> {
        records.sort_by(|a, b| a.epoch.cmp(&b.epoch).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

#[rocket::async_trait]
impl RecordStore for InMemoryStore {
    async fn message_by_id(&self, id: &str) -> StoreResult<Option<MessageRecord>> {
        self.count_lookup()?;
        Ok(self.messages.get(id).map(|entry| entry.value().clone()))
    }

    async fn message_by_message_id(
        &self,
        message_id: &str,
    ) -> StoreResult<Option<MessageRecord>> {
        self.count_lookup()?;
        let matches: Vec<MessageRecord> = self
            .messages
            .iter()
            .filter(|entry| entry.value().message_id == message_id)
            .map(|entry| entry.value().clone())
            .collect();

        Ok(Self::sorted(matches).into_iter().next())
    }

    async fn replies_to(&self, message_id: &str, limit: usize) -> StoreResult<Vec<MessageRecord>> {
        self.count_lookup()?;
        if message_id.is_empty() {
            return Ok(Vec::new());
        }

        let replies: Vec<MessageRecord> = self
            .messages
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .in_reply_to
                    .as_deref()
                    .map(|irt| irt.contains(message_id))
                    .unwrap_or(false)
            })
            .map(|entry| entry.value().clone())
            .collect();

        let mut replies = Self::sorted(replies);
        replies.truncate(limit);
        Ok(replies)
    }

    async fn scan(&self, query: &RecordQuery) -> StoreResult<Vec<MessageRecord>> {
        self.count_lookup()?;
        let hits: Vec<MessageRecord> = self
            .messages
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        let mut hits = Self::sorted(hits);
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn session(&self, token: &str) -> StoreResult<Option<SessionDocument>> {
        self.check_available()?;
        Ok(self.sessions.get(token).map(|entry| entry.value().clone()))
    }

    async fn put_session(&self, document: &SessionDocument) -> StoreResult<()> {
        self.check_available()?;
        self.sessions
            .insert(document.token.clone(), document.clone());
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        self.check_available()?;
        self.sessions.remove(token);
        Ok(())
    }

    async fn account(&self, account_id: &str) -> StoreResult<Option<AccountDocument>> {
        self.check_available()?;
        Ok(self.accounts.get(account_id).map(|entry| entry.value().clone()))
    }

    async fn put_account(&self, document: &AccountDocument) -> StoreResult<()> {
        self.check_available()?;
        self.accounts
            .insert(document.account_id.clone(), document.clone());
        Ok(())
    }
}
