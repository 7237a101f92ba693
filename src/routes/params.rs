//! Query parameter parsing and validation shared by the route handlers.
//!
//! Anything that cannot form a well-shaped backend query is rejected here with
//! [`ApiError::BadRequest`] before the record store is touched.

use regex::Regex;
use std::sync::OnceLock;

use crate::access::normalize_list_id;
use crate::error::ApiError;
use crate::store::RecordQuery;

const MAX_ID_LEN: usize = 512;
const WILDCARD: &str = "*";

static LIST_PART_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_list_part_regex() -> &'static Regex {
    LIST_PART_REGEX
        .get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_.+]+$").expect("Invalid list part regex"))
}

/// Reject document ids that no backend could have issued.
pub fn validate_document_id(id: &str) -> Result<&str, ApiError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("document id must not be empty".to_string()));
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "document id longer than {} bytes",
            MAX_ID_LEN
        )));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ApiError::BadRequest(
            "document id must not contain whitespace".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Parameters of the stats view.
#[derive(Debug, Clone, Default, rocket::form::FromForm)]
pub struct StatsParams {
    /// List name, or `*` for every list.
    pub list: Option<String>,
    /// List domain, or `*` for every domain.
    pub domain: Option<String>,
    /// Lower epoch bound (inclusive, unix seconds).
    pub since: Option<i64>,
    /// Upper epoch bound (inclusive, unix seconds).
    pub until: Option<i64>,
}

/// Validated stats parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub list: String,
    pub domain: String,
    pub query: RecordQuery,
}

impl StatsParams {
    pub fn validate(self) -> Result<StatsQuery, ApiError> {
        let list = self.list.unwrap_or_else(|| WILDCARD.to_string());
        let domain = self.domain.unwrap_or_else(|| WILDCARD.to_string());

        let list_id = match (list.as_str(), domain.as_str()) {
            (WILDCARD, WILDCARD) => None,
            (WILDCARD, _) | (_, WILDCARD) => {
                return Err(ApiError::BadRequest(
                    "list and domain must both be given or both be '*'".to_string(),
                ));
            }
            (name, host) => {
                for part in [name, host] {
                    if !get_list_part_regex().is_match(part) {
                        return Err(ApiError::BadRequest(format!(
                            "invalid list component '{}'",
                            part
                        )));
                    }
                }
                Some(normalize_list_id(&format!("{}@{}", name, host)))
            }
        };

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(ApiError::BadRequest(format!(
                    "since ({}) is after until ({})",
                    since, until
                )));
            }
        }

        Ok(StatsQuery {
            list,
            domain,
            query: RecordQuery {
                list_id,
                since_epoch: self.since,
                until_epoch: self.until,
                limit: None,
            },
        })
    }
}
