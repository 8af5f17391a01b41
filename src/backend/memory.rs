//! In-process reference backend.

use crate::error::TransportError;
use crate::feed::{FeedEvent, FeedSubscription};
use crate::types::{AuthorId, Message, MessageId, MessagePatch, NewMessage, Timestamp, Topic};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{ChangeFeed, QueryApi};

/// In-memory message store with per-topic change broadcast.
///
/// Implements both [`QueryApi`] and [`ChangeFeed`], so several sessions can
/// share one backend and observe each other's writes, exactly as they would
/// against a hosted service. Cloning is cheap and shares state.
///
/// Write/fetch failure injection is provided for exercising rollback and
/// retry paths in tests.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Rows per topic, unordered; `fetch_ordered` sorts on the way out.
    rows: RwLock<HashMap<Topic, Vec<Message>>>,
    /// Display handles joined onto rows on fetch and broadcast.
    profiles: RwLock<HashMap<AuthorId, String>>,
    /// Live subscribers per topic.
    subscribers: Mutex<HashMap<Topic, Vec<Sender<FeedEvent>>>>,
    next_id: AtomicU64,
    /// Last timestamp handed out; insert timestamps are strictly increasing
    /// even within one microsecond.
    clock: Mutex<i64>,
    fail_writes: AtomicBool,
    fail_fetches: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display handle for a principal, joined onto that author's
    /// rows from then on.
    pub fn register_profile(&self, author: impl Into<AuthorId>, handle: impl Into<String>) {
        self.inner
            .profiles
            .write()
            .insert(author.into(), handle.into());
    }

    /// Make subsequent insert/update/delete calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent fetches fail.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.inner.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Number of live subscribers across all topics.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().values().map(Vec::len).sum()
    }

    fn next_timestamp(&self) -> Timestamp {
        let mut clock = self.inner.clock.lock();
        let now = Timestamp::now().0.max(*clock + 1);
        *clock = now;
        Timestamp(now)
    }

    fn check_writes(&self) -> Result<(), TransportError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::new("injected write failure"));
        }
        Ok(())
    }

    fn joined_handle(&self, message: &Message) -> Option<String> {
        if message.author_name.is_some() {
            return message.author_name.clone();
        }
        self.inner.profiles.read().get(&message.author).cloned()
    }

    fn with_profile(&self, mut message: Message) -> Message {
        message.author_name = self.joined_handle(&message);
        message
    }

    /// Deliver an event to every subscriber of `topic`, pruning subscribers
    /// whose channel is gone or full (teardown on the session side, or a
    /// consumer that stopped draining).
    fn broadcast(&self, topic: &Topic, event: FeedEvent) {
        let mut subs = self.inner.subscribers.lock();
        let Some(senders) = subs.get_mut(topic) else {
            return;
        };

        let before = senders.len();
        senders.retain(|sender| sender.try_send(event.clone()).is_ok());
        if senders.len() < before {
            debug!(
                topic = %topic,
                dropped = before - senders.len(),
                "pruned dead feed subscribers"
            );
        }
    }
}

impl QueryApi for MemoryBackend {
    fn fetch_ordered(&self, topic: &Topic) -> Result<Vec<Message>, TransportError> {
        if self.inner.fail_fetches.load(Ordering::SeqCst) {
            return Err(TransportError::new("injected fetch failure"));
        }

        let rows = self.inner.rows.read();
        let mut messages: Vec<Message> = rows
            .get(topic)
            .map(|rows| rows.iter().map(|m| self.with_profile(m.clone())).collect())
            .unwrap_or_default();
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(messages)
    }

    fn insert(&self, topic: &Topic, input: NewMessage) -> Result<Message, TransportError> {
        self.check_writes()?;

        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let message = self.with_profile(Message {
            id: MessageId(format!("msg-{}", n + 1)),
            topic: topic.clone(),
            author: input.author,
            author_name: input.author_name,
            body: input.body,
            attachment: input.attachment,
            created_at: self.next_timestamp(),
            updated_at: None,
        });

        self.inner
            .rows
            .write()
            .entry(topic.clone())
            .or_default()
            .push(message.clone());

        self.broadcast(
            topic,
            FeedEvent::Created {
                message: message.clone(),
            },
        );
        Ok(message)
    }

    fn update(
        &self,
        topic: &Topic,
        id: &MessageId,
        patch: MessagePatch,
    ) -> Result<(), TransportError> {
        self.check_writes()?;

        let updated = {
            let mut rows = self.inner.rows.write();
            let Some(row) = rows
                .get_mut(topic)
                .and_then(|rows| rows.iter_mut().find(|m| &m.id == id))
            else {
                // Already deleted by another actor; nothing to update.
                return Ok(());
            };
            patch.apply_to(row);
            // updated_at is server-authoritative, like created_at
            row.updated_at = Some(self.next_timestamp());
            self.with_profile(row.clone())
        };

        self.broadcast(topic, FeedEvent::Updated { message: updated });
        Ok(())
    }

    fn delete(&self, topic: &Topic, id: &MessageId) -> Result<(), TransportError> {
        self.check_writes()?;

        let removed = {
            let mut rows = self.inner.rows.write();
            match rows.get_mut(topic) {
                Some(rows) => {
                    let before = rows.len();
                    rows.retain(|m| &m.id != id);
                    rows.len() < before
                }
                None => false,
            }
        };

        if removed {
            self.broadcast(topic, FeedEvent::Deleted { id: id.clone() });
        }
        Ok(())
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, topic: &Topic, buffer: usize) -> Result<FeedSubscription, TransportError> {
        let (sender, receiver) = bounded(buffer);
        self.inner
            .subscribers
            .lock()
            .entry(topic.clone())
            .or_default()
            .push(sender);
        Ok(FeedSubscription::new(topic.clone(), receiver))
    }
}
