//! Access control predicates
//!
//! The archive core only consumes [`AccessGate`]; it never decides access on
//! its own. Denial is a filtering decision: denied records are silently left
//! out of results.

use std::collections::HashSet;

use crate::models::MessageRecord;
use crate::session::Session;

/// Capability checks for the current viewer.
///
/// Implementations must be pure and side-effect free.
pub trait AccessGate: Send + Sync {
    fn can_access(&self, session: &Session, record: &MessageRecord) -> bool;

    fn can_view_list(&self, session: &Session, list_id: &str) -> bool;
}

/// Gate based on per-record privacy flags and a set of private lists.
///
/// Public material is visible to everyone. Private material is visible to
/// authenticated viewers holding admin or authoritative credentials.
#[derive(Debug, Clone, Default)]
pub struct ListAccessGate {
    private_lists: HashSet<String>,
}

impl ListAccessGate {
    pub fn new(private_lists: impl IntoIterator<Item = String>) -> Self {
        Self {
            private_lists: private_lists
                .into_iter()
                .map(|list| normalize_list_id(&list))
                .collect(),
        }
    }

    pub fn is_public_list(&self, list_id: &str) -> bool {
        !self.private_lists.contains(&normalize_list_id(list_id))
    }
}

impl AccessGate for ListAccessGate {
    fn can_access(&self, session: &Session, record: &MessageRecord) -> bool {
        if !record.private && self.is_public_list(&record.list_id) {
            return true;
        }
        session.is_authenticated() && session.is_privileged()
    }

    fn can_view_list(&self, session: &Session, list_id: &str) -> bool {
        self.is_public_list(list_id) || (session.is_authenticated() && session.is_privileged())
    }
}

/// Canonical `<name.domain>` form of a list identifier.
///
/// Accepts `name@domain`, `<name.domain>` and `name.domain`.
pub fn normalize_list_id(list_id: &str) -> String {
    let trimmed = list_id.trim().trim_matches(|c| c == '<' || c == '>');
    format!("<{}>", trimmed.replacen('@', ".", 1).to_lowercase())
}
