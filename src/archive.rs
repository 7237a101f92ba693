//! Access-enforcing view over the record store
//!
//! Every record handed out by [`Archive`] has passed the [`AccessGate`] for
//! the requesting session, and is anonymized when the session carries no
//! credentials. Denied records are filtered out silently: a denied lookup is
//! indistinguishable from a missing one.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::access::AccessGate;
use crate::anonymize::anonymize;
use crate::config::ArchiveConfig;
use crate::models::{MessageRecord, StatsSummary, ThreadDetail};
use crate::session::Session;
use crate::store::{REPLY_FETCH_LIMIT, RecordQuery, RecordStore, StoreResult};
use crate::threading::{CollectMode, TOP_PARTICIPANTS, build_threads, collect_descendants, find_root};

#[derive(Clone)]
pub struct Archive {
    store: Arc<dyn RecordStore>,
    gate: Arc<dyn AccessGate>,
    config: ArchiveConfig,
}

impl Archive {
    pub fn new(store: Arc<dyn RecordStore>, gate: Arc<dyn AccessGate>, config: ArchiveConfig) -> Self {
        Self {
            store,
            gate,
            config,
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn can_access(&self, session: &Session, record: &MessageRecord) -> bool {
        self.gate.can_access(session, record)
    }

    pub fn can_view_list(&self, session: &Session, list_id: &str) -> bool {
        self.gate.can_view_list(session, list_id)
    }

    /// Apply the gate and, for anonymous viewers, the anonymizer.
    fn present(&self, session: &Session, record: MessageRecord) -> Option<MessageRecord> {
        if !self.gate.can_access(session, &record) {
            log::debug!("filtered record {} for viewer", record.id);
            return None;
        }

        if session.is_authenticated() {
            Some(record)
        } else {
            Some(anonymize(record))
        }
    }

    /// Fetch a message by document id.
    pub async fn email(&self, session: &Session, id: &str) -> StoreResult<Option<MessageRecord>> {
        let record = self.store.message_by_id(id).await?;
        Ok(record.and_then(|record| self.present(session, record)))
    }

    /// Fetch a message by its protocol Message-ID.
    pub async fn email_by_message_id(
        &self,
        session: &Session,
        message_id: &str,
    ) -> StoreResult<Option<MessageRecord>> {
        let record = self.store.message_by_message_id(message_id).await?;
        Ok(record.and_then(|record| self.present(session, record)))
    }

    /// Visible direct replies to `message_id`, oldest first.
    pub async fn replies(&self, session: &Session, message_id: &str) -> StoreResult<Vec<MessageRecord>> {
        let replies = self.store.replies_to(message_id, REPLY_FETCH_LIMIT).await?;
        Ok(replies
            .into_iter()
            .filter_map(|record| self.present(session, record))
            .collect())
    }

    /// Bulk query with filtering, the `max_hits` cap and optional shortening.
    ///
    /// Shortened records keep only the first `short_body_chars` characters of
    /// their body.
    pub async fn query(
        &self,
        session: &Session,
        query: &RecordQuery,
        shorten: bool,
    ) -> StoreResult<Vec<MessageRecord>> {
        // The cap counts visible records only, so it is applied after the
        // gate rather than pushed into the scan.
        let max_hits = query.limit.map_or(self.config.max_hits, |limit| {
            limit.min(self.config.max_hits)
        });
        let unbounded = RecordQuery {
            limit: None,
            ..query.clone()
        };

        let records = self.store.scan(&unbounded).await?;
        let scanned = records.len();

        let visible: Vec<MessageRecord> = records
            .into_iter()
            .filter_map(|record| self.present(session, record))
            .take(max_hits)
            .map(|record| {
                if shorten {
                    shorten_body(record, self.config.short_body_chars)
                } else {
                    record
                }
            })
            .collect();

        log::debug!("query returned {} of {} scanned records", visible.len(), scanned);
        Ok(visible)
    }

    /// Assemble the thread view around the message with document id `id`.
    ///
    /// The initiating lookup propagates store errors; failures during the
    /// walk up to the root and the collection of replies only cut the
    /// result short.
    pub async fn thread(
        &self,
        session: &Session,
        id: &str,
        mode: CollectMode,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<ThreadDetail>> {
        let Some(start) = self.email(session, id).await? else {
            return Ok(None);
        };

        let root = find_root(self, session, start, cancel).await;
        let descendants = collect_descendants(
            self,
            session,
            &root,
            mode,
            self.config.traversal.max_depth,
            cancel,
        )
        .await;

        let mut emails = Vec::with_capacity(descendants.flat.len() + 1);
        emails.push(root.clone());
        emails.extend(descendants.flat);

        Ok(Some(ThreadDetail {
            thread: root,
            children: descendants.children,
            emails,
        }))
    }

    /// Activity summary for one list, or for every visible list when
    /// `list_id` is `None`.
    pub async fn stats(
        &self,
        session: &Session,
        query: &RecordQuery,
        list: &str,
        domain: &str,
    ) -> StoreResult<StatsSummary> {
        let mut emails = if query
            .list_id
            .as_deref()
            .map_or(true, |list_id| self.can_view_list(session, list_id))
        {
            self.query(session, query, true).await?
        } else {
            log::debug!("list {} hidden from viewer", list);
            Vec::new()
        };
        emails.sort_by_key(|record| record.epoch);

        let forest = build_threads(&emails);

        Ok(StatsSummary {
            hits: emails.len(),
            numparts: forest.authors.len(),
            no_threads: forest.threads.len(),
            participants: forest.top_participants(TOP_PARTICIPANTS),
            thread_struct: forest.threads,
            emails,
            search_list: format!("<{}.{}>", list, domain),
            list: format!("{}@{}", list, domain),
        })
    }
}

/// Keep at most `max_chars` characters of the body.
pub fn shorten_body(mut record: MessageRecord, max_chars: usize) -> MessageRecord {
    if let Some(body) = record.body.as_mut() {
        if let Some((cut, _)) = body.char_indices().nth(max_chars) {
            body.truncate(cut);
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ListAccessGate;
    use crate::session::Credentials;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    const LIST: &str = "<dev.example.org>";

    fn record(id: &str, epoch: i64) -> MessageRecord {
        MessageRecord {
            id: id.into(),
            message_id: format!("<{}@example.org>", id),
            in_reply_to: None,
            subject: "Hello".into(),
            from: "Alice <alice@example.org>".into(),
            body: Some("Write to alice@example.org for details".into()),
            epoch,
            list_id: LIST.into(),
            private: false,
            fingerprint: None,
        }
    }

    fn archive(store: &InMemoryStore) -> Archive {
        Archive::new(
            Arc::new(store.clone()),
            Arc::new(ListAccessGate::new(vec!["secret@example.org".to_string()])),
            ArchiveConfig::default(),
        )
    }

    fn anonymous() -> Session {
        Session::anonymous("tok".into(), Utc::now())
    }

    fn admin() -> Session {
        let creds = Credentials::builder().email("root@example.org").admin(true).build();
        Session::authenticated("tok".into(), "acct".into(), creds, Utc::now())
    }

    #[tokio::test]
    async fn test_anonymous_viewer_gets_anonymized_record() {
        let store = InMemoryStore::with_messages(vec![record("1", 1)]);
        let archive = archive(&store);

        let email = archive.email(&anonymous(), "1").await.unwrap().unwrap();
        assert_eq!(email.from, "Alice <al..@example.org>");
        assert!(email.body.unwrap().contains("al..@example.org"));
        assert!(email.fingerprint.is_some());

        let email = archive.email(&admin(), "1").await.unwrap().unwrap();
        assert_eq!(email.from, "Alice <alice@example.org>");
    }

    #[tokio::test]
    async fn test_denied_record_looks_absent() {
        let mut private = record("p", 1);
        private.private = true;
        let store = InMemoryStore::with_messages(vec![private]);
        let archive = archive(&store);

        assert!(archive.email(&anonymous(), "p").await.unwrap().is_none());
        assert!(archive.email(&admin(), "p").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_propagates_from_initiating_lookup() {
        let store = InMemoryStore::with_messages(vec![record("1", 1)]);
        store.set_unavailable(true);
        let archive = archive(&store);

        assert!(archive.email(&anonymous(), "1").await.is_err());
        assert!(
            archive
                .thread(&anonymous(), "1", CollectMode::Full, &CancellationToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_query_caps_hits_and_shortens() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            let mut r = record(&i.to_string(), i);
            r.body = Some("x".repeat(500));
            store.insert_message(r);
        }
        let mut archive = archive(&store);
        archive.config.max_hits = 4;

        let results = archive
            .query(&admin(), &RecordQuery::for_list(LIST), true)
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.body.as_ref().unwrap().len() == 200));
        assert!(results.windows(2).all(|w| w[0].epoch <= w[1].epoch));
    }

    #[tokio::test]
    async fn test_query_cap_counts_only_visible_records() {
        let store = InMemoryStore::new();
        for i in 0..2 {
            let mut hidden = record(&format!("p{}", i), i);
            hidden.private = true;
            store.insert_message(hidden);
        }
        store.insert_message(record("a", 2));
        store.insert_message(record("b", 3));
        let mut archive = archive(&store);
        archive.config.max_hits = 2;

        let results = archive
            .query(&anonymous(), &RecordQuery::for_list(LIST), false)
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_shorten_body_respects_char_boundaries() {
        let mut r = record("1", 1);
        r.body = Some("é".repeat(10));
        let short = shorten_body(r, 3);
        assert_eq!(short.body.as_deref(), Some("ééé"));

        let untouched = shorten_body(record("2", 1), 1_000);
        assert_eq!(untouched.body, record("2", 1).body);
    }

    #[tokio::test]
    async fn test_stats_summary() {
        let store = InMemoryStore::new();
        store.insert_message(record("1", 1));
        let mut reply = record("2", 2);
        reply.subject = "Re: Hello".into();
        reply.in_reply_to = Some("<1@example.org>".into());
        reply.from = "Bob <bob@example.org>".into();
        store.insert_message(reply);
        store.insert_message(record("3", 3));
        let archive = archive(&store);

        let stats = archive
            .stats(&anonymous(), &RecordQuery::for_list(LIST), "dev", "example.org")
            .await
            .unwrap();

        assert_eq!(stats.hits, 3);
        assert_eq!(stats.numparts, 2);
        assert_eq!(stats.no_threads, 1);
        assert_eq!(stats.participants[0].count, 2);
        assert_eq!(stats.search_list, "<dev.example.org>");
        assert_eq!(stats.list, "dev@example.org");
    }

    #[tokio::test]
    async fn test_stats_for_hidden_list_is_empty() {
        let mut secret = record("s", 1);
        secret.list_id = "<secret.example.org>".into();
        let store = InMemoryStore::with_messages(vec![secret]);
        let archive = archive(&store);

        let stats = archive
            .stats(
                &anonymous(),
                &RecordQuery::for_list("<secret.example.org>"),
                "secret",
                "example.org",
            )
            .await
            .unwrap();
        assert_eq!(stats.hits, 0);
        assert!(stats.thread_struct.is_empty());
    }
}
