//! Error types for the sync engine.

use crate::types::{MessageId, NewMessage, Topic};
use thiserror::Error;

/// Failure reported by an external collaborator (query API or change feed).
///
/// The crate never inspects the contents; it carries whatever the transport
/// produced back to the caller, who owns retry UX.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Snapshot load failed. The log is left untouched; callers surface a
    /// retry affordance.
    #[error("snapshot fetch failed: {0}")]
    Fetch(#[source] TransportError),

    /// Persist failed after an optimistic insert. The optimistic entry has
    /// already been rolled back; `draft` preserves the original input so the
    /// caller can offer retry-with-same-content.
    #[error("send failed: {source}")]
    Send {
        #[source]
        source: TransportError,
        draft: NewMessage,
    },

    /// Nothing to send: no body and no attachment.
    #[error("empty message: a body or an attachment is required")]
    EmptyMessage,

    /// Edit target is not present in the local log.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// Persist-time update failed. The local entry has been rolled back to
    /// its pre-edit state.
    #[error("edit failed: {source}")]
    Edit {
        #[source]
        source: TransportError,
        id: MessageId,
    },

    /// Persist-time delete failed. No local mutation was applied.
    #[error("delete failed: {source}")]
    Delete {
        #[source]
        source: TransportError,
        id: MessageId,
    },

    /// The identity lacks posting capability for this topic.
    #[error("not permitted to post to topic: {0}")]
    Forbidden(Topic),

    /// Change feed subscription could not be opened.
    #[error("feed subscription failed: {0}")]
    Subscribe(#[source] TransportError),

    /// A JSON push payload could not be decoded.
    #[error("payload decode failed: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}

impl SyncError {
    /// Recover the preserved draft from a failed send, if any.
    pub fn into_draft(self) -> Option<NewMessage> {
        match self {
            SyncError::Send { draft, .. } => Some(draft),
            _ => None,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
