use std::collections::HashSet;
use std::env;
use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str) -> HashSet<String> {
    env::var(key)
        .map(|value| {
            value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Session lifetime and cookie settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which a session is void.
    pub max_age: Duration,
    /// Idle time after which `last_accessed` is written back to the store.
    pub refresh_interval: Duration,
    /// How often the background sweeper drops stale in-memory sessions.
    pub sweep_interval: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// OAuth providers whose identities are trusted for administrative use.
    pub authoritative_providers: HashSet<String>,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            max_age: env_duration_secs("ARCHIVE_SESSION_MAX_AGE_SECS", 7 * 24 * 60 * 60),
            refresh_interval: env_duration_secs("ARCHIVE_SESSION_REFRESH_SECS", 60 * 60),
            sweep_interval: env_duration_secs("ARCHIVE_SESSION_SWEEP_SECS", 10 * 60),
            cookie_name: env_string("ARCHIVE_SESSION_COOKIE_NAME", "archive_session"),
            cookie_secure: env_bool("ARCHIVE_COOKIE_SECURE", true),
            authoritative_providers: env_list("ARCHIVE_AUTHORITATIVE_PROVIDERS"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Bounds on reply-graph traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Maximum reply hops followed when walking up to a thread root.
    pub max_hops: usize,
    /// Maximum reply lookups performed while collecting descendants.
    pub max_depth: usize,
}

impl TraversalLimits {
    pub const DEFAULT_MAX_HOPS: usize = 50;
    pub const DEFAULT_MAX_DEPTH: usize = 250;

    pub fn from_env() -> Self {
        Self {
            max_hops: env_usize("ARCHIVE_ANCESTRY_MAX_HOPS", Self::DEFAULT_MAX_HOPS),
            max_depth: env_usize("ARCHIVE_DESCENDANT_MAX_DEPTH", Self::DEFAULT_MAX_DEPTH),
        }
    }
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_hops: Self::DEFAULT_MAX_HOPS,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Retrieval settings for the archive.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Lists whose messages are only shown to privileged viewers.
    pub private_lists: HashSet<String>,
    /// Cap on records returned by a bulk query.
    pub max_hits: usize,
    /// Body length kept when a query asks for shortened records.
    pub short_body_chars: usize,
    pub traversal: TraversalLimits,
}

impl ArchiveConfig {
    pub fn from_env() -> Self {
        Self {
            private_lists: env_list("ARCHIVE_PRIVATE_LISTS"),
            max_hits: env_usize("ARCHIVE_MAX_HITS", 5_000),
            short_body_chars: env_usize("ARCHIVE_SHORT_BODY_CHARS", 200),
            traversal: TraversalLimits::from_env(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            private_lists: HashSet::new(),
            max_hits: 5_000,
            short_body_chars: 200,
            traversal: TraversalLimits::default(),
        }
    }
}

/// Backend serving records, sessions and accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Postgres through the `archive_db` pool.
    Postgres,
    /// Process-local store; nothing survives a restart.
    Memory,
}

impl StoreBackend {
    pub fn from_env() -> Self {
        Self::parse(&env_string("ARCHIVE_STORE", "postgres"))
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        }
    }
}
