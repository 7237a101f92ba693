//! Postgres record store
//!
//! Reads messages from the `messages` table and persists sessions and
//! accounts in `sessions` / `accounts`. All queries are runtime-checked
//! (`sqlx::query_as`) so the crate builds without a live database.

use rocket_db_pools::sqlx::{self, PgPool};

use super::{
    AccountCredentials, AccountDocument, AccountInternal, RecordQuery, RecordStore,
    SessionDocument, StoreError, StoreResult,
};
use crate::models::MessageRecord;

const MESSAGE_COLUMNS: &str =
    "id, message_id, in_reply_to, subject, sender, body, epoch, list_id, private";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    message_id: String,
    in_reply_to: Option<String>,
    subject: String,
    sender: String,
    body: Option<String>,
    epoch: i64,
    list_id: String,
    private: bool,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        MessageRecord {
            id: row.id,
            message_id: row.message_id,
            in_reply_to: row.in_reply_to,
            subject: row.subject,
            from: row.sender,
            body: row.body,
            epoch: row.epoch,
            list_id: row.list_id,
            private: row.private,
            fingerprint: None,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token: String,
    account_id: Option<String>,
    last_accessed: i64,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    email: String,
    name: String,
    user_id: String,
    oauth_provider: String,
    oauth_data: String,
    authoritative: bool,
    admin: bool,
}

impl TryFrom<AccountRow> for AccountDocument {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let oauth_data = if row.oauth_data.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&row.oauth_data).map_err(|err| StoreError::Malformed {
                id: row.account_id.clone(),
                reason: err.to_string(),
            })?
        };

        Ok(AccountDocument {
            account_id: row.account_id,
            credentials: AccountCredentials {
                email: row.email,
                name: row.name,
                user_id: row.user_id,
            },
            internal: AccountInternal {
                oauth_provider: row.oauth_provider,
                oauth_data,
                authoritative: row.authoritative,
                admin: row.admin,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[rocket::async_trait]
impl RecordStore for PgRecordStore {
    async fn message_by_id(&self, id: &str) -> StoreResult<Option<MessageRecord>> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(MessageRecord::from))
    }

    async fn message_by_message_id(
        &self,
        message_id: &str,
    ) -> StoreResult<Option<MessageRecord>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = $1 ORDER BY epoch ASC, id ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(MessageRecord::from))
    }

    async fn replies_to(&self, message_id: &str, limit: usize) -> StoreResult<Vec<MessageRecord>> {
        if message_id.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE in_reply_to IS NOT NULL AND strpos(in_reply_to, $1) > 0 \
             ORDER BY epoch ASC, id ASC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(message_id)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(MessageRecord::from).collect())
    }

    async fn scan(&self, query: &RecordQuery) -> StoreResult<Vec<MessageRecord>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE ($1::TEXT IS NULL OR list_id = $1) \
               AND ($2::BIGINT IS NULL OR epoch >= $2) \
               AND ($3::BIGINT IS NULL OR epoch <= $3) \
             ORDER BY epoch ASC, id ASC \
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(query.list_id.as_deref())
            .bind(query.since_epoch)
            .bind(query.until_epoch)
            .bind(limit_param(query.limit.unwrap_or(usize::MAX)))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(MessageRecord::from).collect())
    }

    async fn session(&self, token: &str) -> StoreResult<Option<SessionDocument>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, account_id, last_accessed FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SessionDocument {
            token: row.token,
            account_id: row.account_id,
            last_accessed: row.last_accessed,
        }))
    }

    async fn put_session(&self, document: &SessionDocument) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO sessions (token, account_id, last_accessed)
               VALUES ($1, $2, $3)
               ON CONFLICT (token) DO UPDATE
               SET account_id = EXCLUDED.account_id,
                   last_accessed = EXCLUDED.last_accessed"#,
        )
        .bind(&document.token)
        .bind(document.account_id.as_deref())
        .bind(document.last_accessed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn account(&self, account_id: &str) -> StoreResult<Option<AccountDocument>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT account_id, email, name, user_id, oauth_provider, oauth_data,
                      authoritative, admin
               FROM accounts
               WHERE account_id = $1"#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccountDocument::try_from).transpose()
    }

    async fn put_account(&self, document: &AccountDocument) -> StoreResult<()> {
        let oauth_data = serde_json::to_string(&document.internal.oauth_data).map_err(|err| {
            StoreError::Malformed {
                id: document.account_id.clone(),
                reason: err.to_string(),
            }
        })?;

        sqlx::query(
            r#"INSERT INTO accounts
                   (account_id, email, name, user_id, oauth_provider, oauth_data, authoritative, admin)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (account_id) DO UPDATE
               SET email = EXCLUDED.email,
                   name = EXCLUDED.name,
                   user_id = EXCLUDED.user_id,
                   oauth_provider = EXCLUDED.oauth_provider,
                   oauth_data = EXCLUDED.oauth_data,
                   authoritative = EXCLUDED.authoritative,
                   admin = EXCLUDED.admin"#,
        )
        .bind(&document.account_id)
        .bind(&document.credentials.email)
        .bind(&document.credentials.name)
        .bind(&document.credentials.user_id)
        .bind(&document.internal.oauth_provider)
        .bind(oauth_data)
        .bind(document.internal.authoritative)
        .bind(document.internal.admin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
