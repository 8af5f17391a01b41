//! Collaborator traits implemented by the backing service.
//!
//! The sync engine owns no persistence, transport, or auth of its own; it
//! talks to whatever implements these traits. [`MemoryBackend`] is a complete
//! in-process implementation used by the test suites and useful for
//! embedding.

mod memory;

pub use memory::MemoryBackend;

use crate::error::TransportError;
use crate::feed::FeedSubscription;
use crate::types::{AuthorId, Message, MessageId, MessagePatch, NewMessage, Topic};

/// CRUD surface of the message store.
///
/// `fetch_ordered` returns rows ascending by `created_at` with author display
/// names joined; `insert` assigns the permanent id and server timestamps.
pub trait QueryApi: Send + Sync {
    fn fetch_ordered(&self, topic: &Topic) -> Result<Vec<Message>, TransportError>;

    fn insert(&self, topic: &Topic, input: NewMessage) -> Result<Message, TransportError>;

    fn update(
        &self,
        topic: &Topic,
        id: &MessageId,
        patch: MessagePatch,
    ) -> Result<(), TransportError>;

    /// Idempotent; deleting an absent id succeeds.
    fn delete(&self, topic: &Topic, id: &MessageId) -> Result<(), TransportError>;
}

/// Push subscription source for per-topic change notifications.
///
/// Delivery is at-least-once. Reconnection and backoff after a dropped
/// connection are the transport's responsibility; the engine only detaches
/// and re-attaches on request.
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription buffering up to `buffer` events.
    fn subscribe(&self, topic: &Topic, buffer: usize) -> Result<FeedSubscription, TransportError>;
}

/// The viewing principal, resolved by the surrounding application's auth
/// layer. Posting rights are a capability answered here — never a client-held
/// secret compared locally.
pub trait Identity: Send + Sync {
    fn principal(&self) -> &AuthorId;

    /// Display handle shown next to the principal's messages.
    fn handle(&self) -> &str;

    fn can_post(&self, topic: &Topic) -> bool;
}

/// Fixed identity with an allow-list of postable topics.
///
/// `None` means the principal may post anywhere (an ordinary member in open
/// rooms); broadcast-style topics restrict the list to publishers.
#[derive(Clone, Debug)]
pub struct StaticIdentity {
    principal: AuthorId,
    handle: String,
    postable: Option<Vec<Topic>>,
}

impl StaticIdentity {
    pub fn new(principal: impl Into<AuthorId>, handle: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            handle: handle.into(),
            postable: None,
        }
    }

    /// Restrict posting to the given topics.
    pub fn with_postable(mut self, topics: Vec<Topic>) -> Self {
        self.postable = Some(topics);
        self
    }

    /// A principal that may read everything but post nowhere.
    pub fn read_only(principal: impl Into<AuthorId>, handle: impl Into<String>) -> Self {
        Self::new(principal, handle).with_postable(Vec::new())
    }
}

impl Identity for StaticIdentity {
    fn principal(&self) -> &AuthorId {
        &self.principal
    }

    fn handle(&self) -> &str {
        &self.handle
    }

    fn can_post(&self, topic: &Topic) -> bool {
        match &self.postable {
            Some(topics) => topics.contains(topic),
            None => true,
        }
    }
}
