//! Thread forest construction
//!
//! Turns a flat, already access-filtered batch of records into nested
//! threads. Records are visited oldest first and each one is attached to the
//! first parent found by these rules:
//!
//! 1. **Reply reference**: the first `<...>` token of In-Reply-To names an
//!    already-threaded message *with exactly the same subject*
//! 2. **Subject fallback**: an existing root has the same grouping key
//!    (reply prefixes stripped, same list)
//! 3. Otherwise the record starts a new root
//!
//! Rule 2 can merge unrelated conversations that happen to share a subject
//! on the same list. That trade-off is accepted; there is no time window.
//!
//! Nodes are kept in an index arena while threading and only turned into
//! nested [`ThreadNode`]s at the end, which avoids recursion on deep threads.

use std::collections::HashMap;

use super::subject::{grouping_key, parent_reference, strip_newlines};
use crate::anonymize::{extract_name, gravatar};
use crate::models::{MessageRecord, Participant, ThreadNode};

/// Index key for records without a Message-ID.
pub const MISSING_MESSAGE_ID: &str = "??";

/// Number of participants reported by the stats view.
pub const TOP_PARTICIPANTS: usize = 10;

/// Threads built from a batch of records plus per-author message counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadForest {
    /// Root threads in discovery order.
    pub threads: Vec<ThreadNode>,
    /// Message count keyed by the raw `from` value.
    pub authors: HashMap<String, usize>,
}

impl ThreadForest {
    /// The `limit` most active authors, most messages first.
    ///
    /// Ties are broken by the raw `from` value so the output is stable.
    pub fn top_participants(&self, limit: usize) -> Vec<Participant> {
        let mut ranked: Vec<(&String, &usize)> = self.authors.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        ranked
            .into_iter()
            .take(limit)
            .map(|(author, count)| {
                let (name, email) = extract_name(author);
                Participant {
                    email,
                    name,
                    count: *count,
                    gravatar: gravatar(author),
                }
            })
            .collect()
    }
}

/// Arena slot for one threaded record.
struct Slot {
    id: String,
    subject: String,
    key: String,
    epoch: i64,
    nest_level: u32,
    children: Vec<usize>,
}

/// Build the thread forest for `records`.
///
/// Records are processed in ascending epoch order; records sharing an epoch
/// keep their input order.
pub fn build_threads(records: &[MessageRecord]) -> ThreadForest {
    let mut ordered: Vec<&MessageRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.epoch);

    let mut arena: Vec<Slot> = Vec::with_capacity(ordered.len());
    let mut roots: Vec<usize> = Vec::new();
    let mut by_message_id: HashMap<String, usize> = HashMap::new();
    let mut authors: HashMap<String, usize> = HashMap::new();

    for record in ordered {
        *authors.entry(record.from.clone()).or_insert(0) += 1;

        let subject = strip_newlines(&record.subject);
        let key = grouping_key(&subject, &record.list_id);

        let parent = find_parent(&arena, &roots, &by_message_id, record, &subject, &key);
        let nest_level = parent.map_or(1, |index| arena[index].nest_level + 1);

        let index = arena.len();
        arena.push(Slot {
            id: record.id.clone(),
            subject,
            key,
            epoch: record.epoch,
            nest_level,
            children: Vec::new(),
        });

        match parent {
            Some(parent) => arena[parent].children.push(index),
            None => roots.push(index),
        }

        let index_key = if record.message_id.is_empty() {
            MISSING_MESSAGE_ID.to_string()
        } else {
            record.message_id.clone()
        };
        by_message_id.insert(index_key, index);
    }

    ThreadForest {
        threads: materialize(arena, &roots),
        authors,
    }
}

fn find_parent(
    arena: &[Slot],
    roots: &[usize],
    by_message_id: &HashMap<String, usize>,
    record: &MessageRecord,
    subject: &str,
    key: &str,
) -> Option<usize> {
    if let Some(reference) = parent_reference(record.in_reply_to.as_deref()) {
        if let Some(&index) = by_message_id.get(reference) {
            if arena[index].subject == subject {
                return Some(index);
            }
        }
    }

    roots.iter().copied().find(|&root| arena[root].key == key)
}

/// Convert the arena into nested nodes.
///
/// A child is always pushed after its parent, so walking the arena backwards
/// guarantees every child is complete before its parent is assembled.
fn materialize(arena: Vec<Slot>, roots: &[usize]) -> Vec<ThreadNode> {
    let mut built: Vec<Option<ThreadNode>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);

    for (index, slot) in arena.into_iter().enumerate().rev() {
        let children = slot
            .children
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();

        built[index] = Some(ThreadNode {
            id: slot.id,
            subject: slot.subject,
            normalized_subject: slot.key,
            epoch: slot.epoch,
            nest_level: slot.nest_level,
            children,
        });
    }

    roots
        .iter()
        .filter_map(|&root| built[root].take())
        .collect()
}
