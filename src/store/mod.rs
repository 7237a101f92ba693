//! Record store contract and its adapters.
//!
//! The core never talks to a backend directly. Everything it needs (message
//! lookups, reply lookups, bulk scans, and session/account persistence) goes
//! through [`RecordStore`]. A missing document is `Ok(None)`; anything else
//! that goes wrong is a [`StoreError`].
//!
//! - `memory`: `DashMap`-backed store used by tests and local development
//! - `postgres`: sqlx adapter over the `archive_db` pool

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MessageRecord;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgRecordStore;

/// Upper bound on the number of replies returned by a single reply lookup.
pub const REPLY_FETCH_LIMIT: usize = 250;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Backend predicates for a bulk scan.
///
/// Built by the query layer; the core only forwards it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub list_id: Option<String>,
    pub since_epoch: Option<i64>,
    pub until_epoch: Option<i64>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn for_list(list_id: impl Into<String>) -> Self {
        Self {
            list_id: Some(list_id.into()),
            ..Self::default()
        }
    }

    /// Whether a record satisfies the list and epoch predicates.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if let Some(list_id) = &self.list_id {
            if &record.list_id != list_id {
                return false;
            }
        }
        if let Some(since) = self.since_epoch {
            if record.epoch < since {
                return false;
            }
        }
        if let Some(until) = self.until_epoch {
            if record.epoch > until {
                return false;
            }
        }
        true
    }
}

/// Durable session row keyed by token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub token: String,
    pub account_id: Option<String>,
    /// Unix seconds of the last recorded access.
    pub last_accessed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub email: String,
    pub name: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInternal {
    pub oauth_provider: String,
    #[serde(default)]
    pub oauth_data: serde_json::Value,
    #[serde(default)]
    pub authoritative: bool,
    #[serde(default)]
    pub admin: bool,
}

/// Durable account row keyed by account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDocument {
    pub account_id: String,
    pub credentials: AccountCredentials,
    pub internal: AccountInternal,
}

/// Query and persistence interface the archive core depends on.
#[rocket::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a message by backend document id.
    async fn message_by_id(&self, id: &str) -> StoreResult<Option<MessageRecord>>;

    /// Fetch a message by its protocol Message-ID.
    async fn message_by_message_id(&self, message_id: &str)
    -> StoreResult<Option<MessageRecord>>;

    /// Fetch messages whose In-Reply-To references `message_id`, oldest first,
    /// at most `limit` of them.
    async fn replies_to(&self, message_id: &str, limit: usize) -> StoreResult<Vec<MessageRecord>>;

    /// Bulk scan in ascending epoch order.
    async fn scan(&self, query: &RecordQuery) -> StoreResult<Vec<MessageRecord>>;

    async fn session(&self, token: &str) -> StoreResult<Option<SessionDocument>>;

    async fn put_session(&self, document: &SessionDocument) -> StoreResult<()>;

    async fn delete_session(&self, token: &str) -> StoreResult<()>;

    async fn account(&self, account_id: &str) -> StoreResult<Option<AccountDocument>>;

    async fn put_account(&self, document: &AccountDocument) -> StoreResult<()>;
}
