//! Subject normalization and reply-reference parsing
//!
//! Subject-based grouping is the fallback used when a reply reference does
//! not resolve to an already-threaded message. Two messages land in the same
//! thread when their subjects match after stripping leading `word:` prefixes
//! (`Re:`, `Fwd:`, `AW:` ...) and they were posted to the same list.

use regex::Regex;
use std::sync::OnceLock;

static REPLY_PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
static REFERENCE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_reply_prefix_regex() -> &'static Regex {
    REPLY_PREFIX_REGEX
        .get_or_init(|| Regex::new(r"^([a-zA-Z]+:\s*)+").expect("Invalid reply prefix regex"))
}

fn get_reference_regex() -> &'static Regex {
    REFERENCE_REGEX.get_or_init(|| Regex::new(r"<[^>]+>").expect("Invalid reference regex"))
}

/// Crop a possibly multi-line subject onto a single line.
pub fn strip_newlines(subject: &str) -> String {
    subject.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Remove every leading `word:` prefix from a subject.
///
/// ```text
/// "Re: Fwd: Hi"  -> "Hi"
/// "AW:Re:  Hi"   -> "Hi"
/// "Hi: there"    -> "there"
/// ```
///
/// The last case is a known false positive of the heuristic and is kept as is.
pub fn strip_reply_prefixes(subject: &str) -> &str {
    match get_reply_prefix_regex().find(subject) {
        Some(prefix) => &subject[prefix.end()..],
        None => subject,
    }
}

/// Key under which messages are grouped when falling back to subjects.
///
/// The subject is cropped to one line, stripped of reply prefixes and joined
/// to the list id with `_`. An empty subject yields `"_" + list_id`, so all
/// subject-less messages of a list group together.
pub fn grouping_key(subject: &str, list_id: &str) -> String {
    let cropped = strip_newlines(subject);
    format!("{}_{}", strip_reply_prefixes(&cropped), list_id)
}

/// First `<...>` token of an In-Reply-To value.
pub fn first_reference(in_reply_to: &str) -> Option<&str> {
    get_reference_regex()
        .find(in_reply_to)
        .map(|token| token.as_str())
}

/// Reference used to look a parent up among already-threaded messages.
///
/// Prefers the first `<...>` token and falls back to the trimmed raw value,
/// so headers without angle brackets can still match a bare message id.
pub fn parent_reference(in_reply_to: Option<&str>) -> Option<&str> {
    let raw = in_reply_to?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(first_reference(raw).unwrap_or(raw))
}
