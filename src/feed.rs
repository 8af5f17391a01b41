//! Change feed events and the per-topic subscription handle.

use crate::error::Result;
use crate::types::{Message, MessageId, Topic};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A change notification for one topic's log.
///
/// Delivery is at-least-once with no ordering guarantee relative to query
/// responses; consumers reconcile by id (upsert for `created`/`updated`,
/// idempotent remove for `deleted`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A new message was persisted.
    Created { message: Message },

    /// An existing message changed; carries the full updated row.
    Updated { message: Message },

    /// A message was removed.
    Deleted { id: MessageId },
}

impl FeedEvent {
    /// The id of the affected message.
    pub fn message_id(&self) -> &MessageId {
        match self {
            FeedEvent::Created { message } | FeedEvent::Updated { message } => &message.id,
            FeedEvent::Deleted { id } => id,
        }
    }

    /// Decode a JSON push payload, as delivered by typical realtime
    /// transports.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encode for a JSON push transport.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("FeedEvent is always serializable")
    }
}

/// Handle to a live change feed subscription for one topic.
///
/// Events buffer in the channel until drained; `TopicSession::pump` applies
/// them on the owning event loop. Dropping the handle detaches: the
/// transport's next send observes a disconnected channel and stops delivery,
/// so a remount never sees duplicate delivery from a stale subscription.
pub struct FeedSubscription {
    topic: Topic,
    receiver: crossbeam_channel::Receiver<FeedEvent>,
}

impl FeedSubscription {
    pub fn new(topic: Topic, receiver: crossbeam_channel::Receiver<FeedEvent>) -> Self {
        Self { topic, receiver }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Take the next buffered event, if any (non-blocking).
    pub fn try_recv(&self) -> Option<FeedEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<FeedEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Tear down the subscription. Equivalent to dropping the handle; named
    /// for call sites where the intent should be visible.
    pub fn detach(self) {
        drop(self);
    }
}
