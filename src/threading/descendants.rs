//! Descendant collection
//!
//! Collects every visible reply reachable from a root message, depth first.
//! The traversal uses an explicit stack of frames instead of recursion, so
//! arbitrarily deep reply chains cannot exhaust the call stack.
//!
//! ## Guards
//!
//! - **Visited set**: one set of document ids per traversal, seeded with the
//!   root. A record is marked when it is discovered, so cycles and duplicate
//!   reply lookups never produce a record twice.
//! - **Expansion counter**: one counter per traversal, incremented on every
//!   reply lookup. Once it exceeds `max_depth`, expansions yield no children.
//!   This bounds the total number of backend calls, not just the depth.
//! - **Fan-out**: each reply lookup returns at most
//!   [`REPLY_FETCH_LIMIT`](crate::store::REPLY_FETCH_LIMIT) records.
//!
//! Store errors end the affected branch only. Cancellation ends the whole
//! traversal; the partial tree is still well formed.

use std::collections::HashSet;
use std::vec;

use tokio_util::sync::CancellationToken;

use crate::archive::Archive;
use crate::models::{DescendantNode, MessageRecord, ReplyTree};
use crate::session::Session;

/// Output shape of a collected reply tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectMode {
    /// Complete records.
    #[default]
    Full,
    /// Navigation summaries only.
    Short,
}

#[derive(Debug, Clone)]
pub struct Descendants {
    /// Replies nested under their parents.
    pub children: ReplyTree,
    /// Every collected record in discovery order, root excluded.
    pub flat: Vec<MessageRecord>,
}

/// A record being expanded, with the replies not yet visited.
struct Frame {
    /// `None` for the root, whose record is not part of the output.
    record: Option<MessageRecord>,
    pending: vec::IntoIter<MessageRecord>,
    children: Vec<DescendantNode>,
}

struct Traversal<'a> {
    archive: &'a Archive,
    session: &'a Session,
    max_depth: usize,
    expansions: usize,
}

impl Traversal<'_> {
    /// Look up the visible replies of `record`, honouring the counter.
    async fn expand(&mut self, record: &MessageRecord) -> Vec<MessageRecord> {
        self.expansions += 1;
        if self.expansions > self.max_depth {
            return Vec::new();
        }

        match self.archive.replies(self.session, &record.message_id).await {
            Ok(replies) => replies,
            Err(err) => {
                log::warn!("reply lookup for {} failed: {}", record.id, err);
                Vec::new()
            }
        }
    }
}

/// Collect all visible descendants of `root`.
pub async fn collect_descendants(
    archive: &Archive,
    session: &Session,
    root: &MessageRecord,
    mode: CollectMode,
    max_depth: usize,
    cancel: &CancellationToken,
) -> Descendants {
    let mut traversal = Traversal {
        archive,
        session,
        max_depth,
        expansions: 0,
    };
    let mut visited: HashSet<String> = HashSet::from([root.id.clone()]);
    let mut flat: Vec<MessageRecord> = Vec::new();

    let root_replies = if cancel.is_cancelled() {
        Vec::new()
    } else {
        traversal.expand(root).await
    };
    let mut stack = vec![Frame {
        record: None,
        pending: root_replies.into_iter(),
        children: Vec::new(),
    }];

    while let Some(top) = stack.last_mut() {
        let next = if cancel.is_cancelled() {
            None
        } else {
            top.pending.next()
        };

        let Some(candidate) = next else {
            // Frame exhausted (or traversal cancelled): hand it to its parent.
            let Some(frame) = stack.pop() else {
                break;
            };
            let Some(record) = frame.record else {
                return finish(frame.children, flat, mode);
            };
            if let Some(parent) = stack.last_mut() {
                parent.children.push(DescendantNode {
                    record,
                    children: frame.children,
                });
            }
            continue;
        };

        if !archive.can_access(session, &candidate) || !visited.insert(candidate.id.clone()) {
            continue;
        }

        flat.push(candidate.clone());
        let replies = traversal.expand(&candidate).await;
        stack.push(Frame {
            record: Some(candidate),
            pending: replies.into_iter(),
            children: Vec::new(),
        });
    }

    finish(Vec::new(), flat, mode)
}

fn finish(children: Vec<DescendantNode>, flat: Vec<MessageRecord>, mode: CollectMode) -> Descendants {
    let children = match mode {
        CollectMode::Full => ReplyTree::Full(children),
        CollectMode::Short => ReplyTree::Short(
            children
                .into_iter()
                .map(DescendantNode::into_summary)
                .collect(),
        ),
    };
    Descendants { children, flat }
}
