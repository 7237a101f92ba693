use serde::{Deserialize, Serialize};

// ===== Message Models =====

/// A single archived message as returned by the record store.
///
/// Records are treated as immutable once fetched. The only transformation
/// applied on read is anonymization for viewers without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Backend document id (permalink).
    pub id: String,
    /// Protocol Message-ID, the key of the reply graph.
    #[serde(default)]
    pub message_id: String,
    /// Raw In-Reply-To value; may carry text around the `<token>`.
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub body: Option<String>,
    pub epoch: i64,
    #[serde(default)]
    pub list_id: String,
    #[serde(default)]
    pub private: bool,
    /// md5 of the lowercased sender address, filled in by the anonymizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl MessageRecord {
    /// Project the record onto the fields needed to navigate a thread.
    pub fn summary(&self, children: Vec<MessageSummary>) -> MessageSummary {
        MessageSummary {
            id: self.id.clone(),
            message_id: self.message_id.clone(),
            subject: self.subject.clone(),
            from: self.from.clone(),
            epoch: self.epoch,
            in_reply_to: self.in_reply_to.clone(),
            list_id: self.list_id.clone(),
            children,
        }
    }
}

/// Short projection of a message used by navigable thread trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub epoch: i64,
    pub in_reply_to: Option<String>,
    pub list_id: String,
    pub children: Vec<MessageSummary>,
}

// ===== Thread Models =====

/// Node of a thread forest produced by the thread builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub id: String,
    pub subject: String,
    pub normalized_subject: String,
    pub epoch: i64,
    pub nest_level: u32,
    pub children: Vec<ThreadNode>,
}

/// A collected reply with its own subtree of replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescendantNode {
    #[serde(flatten)]
    pub record: MessageRecord,
    pub children: Vec<DescendantNode>,
}

impl DescendantNode {
    pub fn into_summary(self) -> MessageSummary {
        let children = self
            .children
            .into_iter()
            .map(DescendantNode::into_summary)
            .collect();
        self.record.summary(children)
    }
}

/// Reply tree in either of the two output shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReplyTree {
    Full(Vec<DescendantNode>),
    Short(Vec<MessageSummary>),
}

impl ReplyTree {
    pub fn len(&self) -> usize {
        match self {
            ReplyTree::Full(nodes) => nodes.len(),
            ReplyTree::Short(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ===== API Responses =====

#[derive(Debug, Clone, Serialize)]
pub struct ThreadDetail {
    pub thread: MessageRecord,
    pub children: ReplyTree,
    pub emails: Vec<MessageRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub email: String,
    pub name: String,
    pub count: usize,
    pub gravatar: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub hits: usize,
    pub numparts: usize,
    pub no_threads: usize,
    pub emails: Vec<MessageRecord>,
    pub thread_struct: Vec<ThreadNode>,
    pub participants: Vec<Participant>,
    pub search_list: String,
    pub list: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginView {
    pub name: String,
    pub email: String,
    pub oauth_provider: String,
    pub authoritative: bool,
    pub admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub login: Option<LoginView>,
}
