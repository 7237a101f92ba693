//! Viewer sessions: identity, credentials, the in-memory cache, and the
//! Rocket request guard that resolves a session from the request cookie.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LoginView;
use crate::store::{AccountCredentials, AccountDocument, AccountInternal, SessionDocument};

pub mod cache;
pub mod guard;
pub mod token;

pub use cache::SessionCache;
pub use guard::Viewer;

pub const DEFAULT_OAUTH_PROVIDER: &str = "generic";

/// Identity established for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub oauth_provider: String,
    pub authoritative: bool,
    pub admin: bool,
    pub oauth_data: serde_json::Value,
}

impl Credentials {
    pub fn builder() -> CredentialsBuilder {
        CredentialsBuilder::default()
    }

    /// Credentials as stored on an account document.
    pub fn from_account(account: &AccountDocument) -> Self {
        Credentials {
            user_id: account.credentials.user_id.clone(),
            name: account.credentials.name.clone(),
            email: account.credentials.email.clone(),
            oauth_provider: account.internal.oauth_provider.clone(),
            authoritative: account.internal.authoritative,
            admin: account.internal.admin,
            oauth_data: account.internal.oauth_data.clone(),
        }
    }

    pub fn login_view(&self) -> LoginView {
        LoginView {
            name: self.name.clone(),
            email: self.email.clone(),
            oauth_provider: self.oauth_provider.clone(),
            authoritative: self.authoritative,
            admin: self.admin,
        }
    }
}

/// Builder enumerating every recognized credential field.
///
/// Unset fields default to empty strings, provider `generic`, both flags
/// off, and a null OAuth payload.
#[derive(Debug, Clone, Default)]
pub struct CredentialsBuilder {
    user_id: Option<String>,
    name: Option<String>,
    email: Option<String>,
    oauth_provider: Option<String>,
    authoritative: bool,
    admin: bool,
    oauth_data: Option<serde_json::Value>,
}

impl CredentialsBuilder {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn oauth_provider(mut self, provider: impl Into<String>) -> Self {
        self.oauth_provider = Some(provider.into());
        self
    }

    pub fn authoritative(mut self, authoritative: bool) -> Self {
        self.authoritative = authoritative;
        self
    }

    pub fn admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn oauth_data(mut self, data: serde_json::Value) -> Self {
        self.oauth_data = Some(data);
        self
    }

    pub fn build(self) -> Credentials {
        Credentials {
            user_id: self.user_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            oauth_provider: self
                .oauth_provider
                .unwrap_or_else(|| DEFAULT_OAUTH_PROVIDER.to_string()),
            authoritative: self.authoritative,
            admin: self.admin,
            oauth_data: self.oauth_data.unwrap_or(serde_json::Value::Null),
        }
    }
}

/// One browser's interaction with the archive.
///
/// A session without an account never carries credentials; the fields are
/// private so that invariant holds for every value in circulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    token: String,
    account_id: Option<String>,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    credentials: Option<Credentials>,
}

impl Session {
    pub fn anonymous(token: String, now: DateTime<Utc>) -> Self {
        Self {
            token,
            account_id: None,
            created_at: now,
            last_accessed: now,
            credentials: None,
        }
    }

    pub fn authenticated(
        token: String,
        account_id: String,
        credentials: Credentials,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            account_id: Some(account_id),
            created_at: now,
            last_accessed: now,
            credentials: Some(credentials),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some() && self.credentials.is_some()
    }

    /// Whether the viewer may see private material.
    pub fn is_privileged(&self) -> bool {
        self.credentials
            .as_ref()
            .map(|creds| creds.admin || creds.authoritative)
            .unwrap_or(false)
    }

    pub(crate) fn set_last_accessed(&mut self, at: DateTime<Utc>) {
        self.last_accessed = at;
    }

    pub fn to_document(&self) -> SessionDocument {
        SessionDocument {
            token: self.token.clone(),
            account_id: self.account_id.clone(),
            last_accessed: self.last_accessed.timestamp(),
        }
    }

    /// Account document for an authenticated session.
    pub fn account_document(&self) -> Option<AccountDocument> {
        let account_id = self.account_id.clone()?;
        let creds = self.credentials.as_ref()?;
        Some(AccountDocument {
            account_id,
            credentials: AccountCredentials {
                email: creds.email.clone(),
                name: creds.name.clone(),
                user_id: creds.user_id.clone(),
            },
            internal: AccountInternal {
                oauth_provider: creds.oauth_provider.clone(),
                oauth_data: creds.oauth_data.clone(),
                authoritative: creds.authoritative,
                admin: creds.admin,
            },
        })
    }
}

pub(crate) fn from_unix(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
