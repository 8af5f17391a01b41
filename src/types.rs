//! Core types for the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Reserved prefix for locally-generated temporary ids.
///
/// Backends assign their own id namespace (uuids, `msg-<n>`, ...); nothing
/// server-side may start with this prefix, which keeps optimistic entries
/// distinguishable from confirmed rows.
pub const LOCAL_ID_PREFIX: &str = "local-";

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a message within a topic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh temporary id for an optimistic insert.
    pub fn new_local() -> Self {
        let n = NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed);
        MessageId(format!("{}{}", LOCAL_ID_PREFIX, n))
    }

    /// Whether this id is a locally-generated placeholder awaiting
    /// server confirmation.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

/// A named message stream: a chat room, a mentorship thread, a signal feed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(pub String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Topic(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic(s.to_string())
    }
}

/// Opaque identifier of a sending principal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(pub String);

impl AuthorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorId({})", self.0)
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(s: &str) -> Self {
        AuthorId(s.to_string())
    }
}

/// Reference to out-of-band stored media (URL or storage handle).
/// Resolved by an external attachment store, never by this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentRef(pub String);

impl fmt::Debug for AttachmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttachmentRef({})", self.0)
    }
}

impl From<&str> for AttachmentRef {
    fn from(s: &str) -> Self {
        AttachmentRef(s.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A single message in a topic's log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned permanent id, or a `local-` temporary id while an
    /// optimistic send is in flight.
    pub id: MessageId,

    /// Which topic this message belongs to.
    pub topic: Topic,

    /// Sending principal.
    pub author: AuthorId,

    /// Display handle of the author, joined by the backend on fetch.
    pub author_name: Option<String>,

    /// Text content. Absent for attachment-only messages.
    pub body: Option<String>,

    /// Out-of-band media reference.
    pub attachment: Option<AttachmentRef>,

    /// When the message was created (server clock for confirmed rows).
    pub created_at: Timestamp,

    /// Present and different from `created_at` iff edited after creation.
    pub updated_at: Option<Timestamp>,
}

impl Message {
    /// Whether this message was edited after creation.
    pub fn is_edited(&self) -> bool {
        self.updated_at.map_or(false, |t| t != self.created_at)
    }

    /// Whether this is an optimistic entry awaiting confirmation.
    pub fn is_local(&self) -> bool {
        self.id.is_local()
    }

    /// Sort key giving the total order within a topic.
    pub fn sort_key(&self) -> (Timestamp, &MessageId) {
        (self.created_at, &self.id)
    }
}

/// Input for a send, before the server assigns id and timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub author: AuthorId,
    pub author_name: Option<String>,
    pub body: Option<String>,
    pub attachment: Option<AttachmentRef>,
}

impl NewMessage {
    /// A plain text message.
    pub fn text(author: impl Into<AuthorId>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            author_name: None,
            body: Some(body.into()),
            attachment: None,
        }
    }

    /// An attachment-only message.
    pub fn attachment_only(
        author: impl Into<AuthorId>,
        attachment: impl Into<AttachmentRef>,
    ) -> Self {
        Self {
            author: author.into(),
            author_name: None,
            body: None,
            attachment: Some(attachment.into()),
        }
    }

    /// Attach a media reference.
    pub fn with_attachment(mut self, attachment: impl Into<AttachmentRef>) -> Self {
        self.attachment = Some(attachment.into());
        self
    }

    /// Set the author's display handle.
    pub fn with_author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = Some(name.into());
        self
    }

    /// True when there is nothing to send: no attachment and no body
    /// (whitespace-only bodies count as empty).
    pub fn is_empty(&self) -> bool {
        let blank_body = self.body.as_deref().map_or(true, |b| b.trim().is_empty());
        blank_body && self.attachment.is_none()
    }
}

/// Partial update for an existing message. Fields left `None` are untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    pub body: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub updated_at: Option<Timestamp>,
}

impl MessagePatch {
    /// A body edit stamped with the current time.
    pub fn edit_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            attachment: None,
            updated_at: Some(Timestamp::now()),
        }
    }

    /// Apply this patch to a message in place.
    pub fn apply_to(&self, message: &mut Message) {
        if let Some(body) = &self.body {
            message.body = Some(body.clone());
        }
        if let Some(attachment) = &self.attachment {
            message.attachment = Some(attachment.clone());
        }
        if let Some(updated_at) = self.updated_at {
            message.updated_at = Some(updated_at);
        }
    }
}
