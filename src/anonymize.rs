//! Sender anonymization for viewers without credentials.
//!
//! Every address-shaped substring in the sender and the body keeps the first
//! one or two characters of its local part followed by `..` and the domain:
//! `alice@example.com` becomes `al..@example.com`. The transform never fails
//! and applying it twice gives the same result as applying it once.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::MessageRecord;

const REDACTION_MARKER: &str = "..";

static ADDRESS_REGEX: OnceLock<Regex> = OnceLock::new();
static NAME_ADDR_REGEX: OnceLock<Regex> = OnceLock::new();

fn address_regex() -> &'static Regex {
    ADDRESS_REGEX.get_or_init(|| {
        Regex::new(r#"(?P<local>[^\s<>@"(),:;\[\]]+)@(?P<domain>[-a-zA-Z0-9_.]+)"#)
            .expect("Invalid address regex")
    })
}

fn name_addr_regex() -> &'static Regex {
    NAME_ADDR_REGEX
        .get_or_init(|| Regex::new(r"^([^<]+)\s*<(.+)>$").expect("Invalid name/address regex"))
}

/// Split a `From` value into display name and address.
///
/// Falls back to the raw value (angle brackets stripped) for both parts when
/// the value cannot be parsed.
pub fn extract_name(from: &str) -> (String, String) {
    if let Ok(addrs) = mailparse::addrparse(from) {
        if let Some(mailparse::MailAddr::Single(info)) = addrs.iter().next() {
            if !info.addr.is_empty() {
                let name = info
                    .display_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| info.addr.clone());
                return (name, info.addr.clone());
            }
        }
    }

    let trimmed = from.trim();
    if let Some(caps) = name_addr_regex().captures(trimmed) {
        return (caps[1].trim().to_string(), caps[2].trim().to_string());
    }

    let bare = trimmed.trim_matches(|c| c == '<' || c == '>').to_string();
    (bare.clone(), bare)
}

/// Avatar fingerprint: hex md5 of the lowercased sender address.
pub fn gravatar(from: &str) -> String {
    let (_, address) = extract_name(from);
    let key = if address.is_empty() {
        from.to_lowercase()
    } else {
        address.to_lowercase()
    };
    format!("{:x}", md5::compute(key.as_bytes()))
}

fn is_redacted(local: &str) -> bool {
    local
        .strip_suffix(REDACTION_MARKER)
        .map(|kept| (1..=2).contains(&kept.chars().count()))
        .unwrap_or(false)
}

/// Obfuscate every address-shaped substring of `text`.
pub fn redact_addresses(text: &str) -> Cow<'_, str> {
    address_regex().replace_all(text, |caps: &Captures| {
        let local = &caps["local"];
        if is_redacted(local) {
            return caps[0].to_string();
        }
        let kept: String = local.chars().take(2).collect();
        format!("{}{}@{}", kept, REDACTION_MARKER, &caps["domain"])
    })
}

/// Produce a copy of `record` that is safe to show to an anonymous viewer.
pub fn anonymize(mut record: MessageRecord) -> MessageRecord {
    if record.fingerprint.is_none() {
        record.fingerprint = Some(gravatar(&record.from));
    }

    if let Cow::Owned(redacted) = redact_addresses(&record.from) {
        record.from = redacted;
    }

    if let Some(body) = record.body.as_mut() {
        if let Cow::Owned(redacted) = redact_addresses(body) {
            *body = redacted;
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: &str, body: Option<&str>) -> MessageRecord {
        MessageRecord {
            id: "1".into(),
            message_id: "<1@example.com>".into(),
            in_reply_to: None,
            subject: "Hi".into(),
            from: from.into(),
            body: body.map(str::to_string),
            epoch: 0,
            list_id: "<dev.example.com>".into(),
            private: false,
            fingerprint: None,
        }
    }

    #[test]
    fn test_alice_example() {
        let out = anonymize(record("Alice <alice@example.com>", None));
        assert_eq!(
            out.fingerprint.as_deref(),
            Some(format!("{:x}", md5::compute("alice@example.com")).as_str())
        );
        assert!(out.from.contains("al..@example.com"));
        assert!(!out.from.contains("alice@"));
        assert_eq!(out.from, "Alice <al..@example.com>");
    }

    #[test]
    fn test_fingerprint_uses_lowercased_address() {
        assert_eq!(
            gravatar("Alice <Alice@Example.COM>"),
            format!("{:x}", md5::compute("alice@example.com"))
        );
    }

    #[test]
    fn test_body_addresses_redacted() {
        let body = "Contact bob.smith@lists.example.org or <carol@example.net> for details.\n\
                    > On Monday, dave@example.com wrote:";
        let out = anonymize(record("x@example.org", Some(body)));
        let out_body = out.body.unwrap();

        assert!(out_body.contains("bo..@lists.example.org"));
        assert!(out_body.contains("<ca..@example.net>"));
        assert!(out_body.contains("da..@example.com"));
        assert!(!out_body.contains("bob.smith"));
        assert!(!out_body.contains("carol"));
        assert!(!out_body.contains("dave"));
    }

    #[test]
    fn test_anonymize_is_idempotent() {
        let samples = [
            record("Alice <alice@example.com>", Some("ping a@b.org and xy@z.io")),
            record("x..y@example.com", Some("weird a.bc@example.com local parts")),
            record("no address here", None),
            record("", Some("")),
        ];

        for sample in samples {
            let once = anonymize(sample);
            let twice = anonymize(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_short_local_parts() {
        assert_eq!(redact_addresses("a@b.org"), "a..@b.org");
        assert_eq!(redact_addresses("a..@b.org"), "a..@b.org");
    }

    #[test]
    fn test_malformed_from_is_left_alone() {
        let out = anonymize(record("Totally <not valid", None));
        assert_eq!(out.from, "Totally <not valid");
        assert!(out.fingerprint.is_some());
    }

    #[test]
    fn test_extract_name_forms() {
        assert_eq!(
            extract_name("Alice Example <alice@example.com>"),
            ("Alice Example".to_string(), "alice@example.com".to_string())
        );
        assert_eq!(
            extract_name("<bob@example.com>"),
            ("bob@example.com".to_string(), "bob@example.com".to_string())
        );
    }
}
