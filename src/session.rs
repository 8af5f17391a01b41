//! Per-topic sync session: snapshot loading, live feed application, and
//! optimistic writes.

use crate::backend::{ChangeFeed, Identity, QueryApi};
use crate::error::{Result, SyncError};
use crate::feed::{FeedEvent, FeedSubscription};
use crate::log::MessageLog;
use crate::types::{Message, MessageId, MessagePatch, NewMessage, Timestamp, Topic};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session tuning knobs.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Max feed events buffered between `pump` calls before the transport
    /// starts dropping the subscriber.
    pub feed_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { feed_buffer: 1000 }
    }
}

/// Synchronized view of one topic's message log.
///
/// Owns the topic's [`MessageLog`] and feed subscription exclusively; there
/// is no cross-topic sharing of store instances. All mutations happen on the
/// caller's thread (typically a UI event loop), so the session holds no
/// locks: feed events buffer in the subscription channel until [`pump`]
/// applies them.
///
/// An outbound message moves through `Optimistic -> {Confirmed | Failed}`:
/// [`send`] inserts a provisional entry under a temporary id, persists, then
/// either replaces it with the confirmed row or rolls it back. The feed's own
/// `created` event for the confirmed row lands as an idempotent upsert, so
/// convergence does not depend on which of the two paths completes first.
/// A transport that filters the sender's own events out of the feed
/// converges identically.
///
/// [`pump`]: TopicSession::pump
/// [`send`]: TopicSession::send
pub struct TopicSession {
    topic: Topic,
    identity: Arc<dyn Identity>,
    query: Arc<dyn QueryApi>,
    feed: Arc<dyn ChangeFeed>,
    config: SessionConfig,
    log: MessageLog,
    subscription: Option<FeedSubscription>,
    detached: bool,
}

impl TopicSession {
    /// Open a session: seed the log from a full snapshot fetch, then attach
    /// the change feed.
    pub fn open(
        query: Arc<dyn QueryApi>,
        feed: Arc<dyn ChangeFeed>,
        identity: Arc<dyn Identity>,
        topic: impl Into<Topic>,
        config: SessionConfig,
    ) -> Result<Self> {
        let mut session = Self {
            topic: topic.into(),
            identity,
            query,
            feed,
            config,
            log: MessageLog::new(),
            subscription: None,
            detached: false,
        };
        session.activate()?;
        Ok(session)
    }

    /// The current ordered view, safe to render directly.
    pub fn snapshot(&self) -> &[Message] {
        self.log.snapshot()
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn identity(&self) -> &dyn Identity {
        self.identity.as_ref()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Re-run the snapshot fetch (manual retry affordance).
    ///
    /// A failed fetch leaves the log untouched; it is never partially
    /// applied. No-op once detached.
    pub fn reload(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        let messages = self
            .query
            .fetch_ordered(&self.topic)
            .map_err(SyncError::Fetch)?;
        debug!(topic = %self.topic, count = messages.len(), "reloaded snapshot");
        self.log.replace_all(messages);
        Ok(())
    }

    /// Switch to another topic: detach the old feed, wholesale replace the
    /// log from the new topic's snapshot, re-attach.
    ///
    /// The previous topic's messages never leak into the new view — the log
    /// is cleared before the fetch, so even a failed load leaves it empty
    /// rather than stale.
    pub fn switch_topic(&mut self, topic: impl Into<Topic>) -> Result<()> {
        self.topic = topic.into();
        self.activate()
    }

    /// Switch the viewing principal, re-running the snapshot under the new
    /// identity.
    pub fn switch_identity(&mut self, identity: Arc<dyn Identity>) -> Result<()> {
        self.identity = identity;
        self.activate()
    }

    fn activate(&mut self) -> Result<()> {
        if let Some(sub) = self.subscription.take() {
            sub.detach();
        }
        self.detached = false;
        self.log.clear();

        let messages = self
            .query
            .fetch_ordered(&self.topic)
            .map_err(SyncError::Fetch)?;
        debug!(topic = %self.topic, count = messages.len(), "seeded log from snapshot");
        self.log.replace_all(messages);

        let subscription = self
            .feed
            .subscribe(&self.topic, self.config.feed_buffer)
            .map_err(SyncError::Subscribe)?;
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Apply all pending feed events to the log; returns how many were
    /// applied. Call from the owning event loop whenever the view should
    /// refresh. Safe no-op after [`detach`](TopicSession::detach).
    pub fn pump(&mut self) -> usize {
        if self.detached {
            return 0;
        }
        let Some(subscription) = &self.subscription else {
            return 0;
        };

        let mut events = Vec::new();
        while let Some(event) = subscription.try_recv() {
            events.push(event);
        }

        let applied = events.len();
        for event in events {
            self.apply(event);
        }
        applied
    }

    fn apply(&mut self, event: FeedEvent) {
        match event {
            // Idempotent upsert: the id may already be present from the
            // snapshot, or as the confirmation of our own optimistic send.
            FeedEvent::Created { message } => self.log.insert(message),

            // Applied as a patch rather than an upsert so a late update for
            // a locally-deleted message stays deleted.
            FeedEvent::Updated { message } => {
                let patch = MessagePatch {
                    body: message.body,
                    attachment: message.attachment,
                    updated_at: message.updated_at,
                };
                self.log.update(&message.id, &patch);
            }

            FeedEvent::Deleted { id } => self.log.remove(&id),
        }
    }

    /// Send a message: optimistic local insert, persist, reconcile.
    ///
    /// On success the temporary entry is replaced by the confirmed row and
    /// the confirmed [`Message`] is returned. On failure the temporary entry
    /// is removed and [`SyncError::Send`] carries the draft back for
    /// retry-with-same-content; a retried send is a fresh attempt with a new
    /// temporary id.
    pub fn send(&mut self, input: NewMessage) -> Result<Message> {
        if input.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        if !self.identity.can_post(&self.topic) {
            return Err(SyncError::Forbidden(self.topic.clone()));
        }

        let draft = input.clone();

        // A send whose owning view was torn down still completes its persist
        // call, but must not touch the log.
        if self.detached {
            return self.query.insert(&self.topic, input).map_err(|source| {
                SyncError::Send { source, draft }
            });
        }

        let temp_id = MessageId::new_local();
        let provisional = Message {
            id: temp_id.clone(),
            topic: self.topic.clone(),
            author: input.author.clone(),
            author_name: input
                .author_name
                .clone()
                .or_else(|| Some(self.identity.handle().to_string())),
            body: input.body.clone(),
            attachment: input.attachment.clone(),
            created_at: Timestamp::now(),
            updated_at: None,
        };
        self.log.insert(provisional);
        debug!(topic = %self.topic, id = %temp_id, "optimistic insert");

        match self.query.insert(&self.topic, input) {
            Ok(confirmed) => {
                self.log.remove(&temp_id);
                // Upsert the confirmed row directly; the feed's `created`
                // event for the same id then deduplicates.
                self.log.insert(confirmed.clone());
                debug!(topic = %self.topic, id = %confirmed.id, "send confirmed");
                Ok(confirmed)
            }
            Err(source) => {
                self.log.remove(&temp_id);
                warn!(topic = %self.topic, id = %temp_id, error = %source, "send failed, rolled back");
                Err(SyncError::Send { source, draft })
            }
        }
    }

    /// Convenience: send a plain text message as the session's identity.
    pub fn send_text(&mut self, body: impl Into<String>) -> Result<Message> {
        let input = NewMessage::text(self.identity.principal().clone(), body)
            .with_author_name(self.identity.handle());
        self.send(input)
    }

    /// Edit a message's body: optimistic local patch, persist, roll back on
    /// failure. Fails with [`SyncError::NotFound`] when the id is unknown
    /// locally.
    pub fn edit(&mut self, id: &MessageId, new_body: impl Into<String>) -> Result<()> {
        let previous = match self.log.get(id) {
            Some(message) => message.clone(),
            None => return Err(SyncError::NotFound(id.clone())),
        };

        // stamp strictly after created_at so the edited flag is visible even
        // when the edit lands within the same microsecond
        let stamp = Timestamp(Timestamp::now().0.max(previous.created_at.0 + 1));
        let patch = MessagePatch {
            body: Some(new_body.into()),
            attachment: None,
            updated_at: Some(stamp),
        };
        if !self.detached {
            self.log.update(id, &patch);
        }

        match self.query.update(&self.topic, id, patch) {
            Ok(()) => Ok(()),
            Err(source) => {
                if !self.detached {
                    self.log.insert(previous);
                }
                warn!(topic = %self.topic, id = %id, error = %source, "edit failed, rolled back");
                Err(SyncError::Edit {
                    source,
                    id: id.clone(),
                })
            }
        }
    }

    /// Delete a message: persist-side delete plus immediate local removal.
    /// Idempotent; an id absent locally is not an error, since another actor
    /// may have deleted it first.
    pub fn delete(&mut self, id: &MessageId) -> Result<()> {
        self.query
            .delete(&self.topic, id)
            .map_err(|source| SyncError::Delete {
                source,
                id: id.clone(),
            })?;
        if !self.detached {
            self.log.remove(id);
        }
        Ok(())
    }

    /// Tear down the feed subscription. Idempotent. Afterwards all log
    /// mutations become safe no-ops; [`send`](TopicSession::send) may still
    /// complete its persist call fire-and-forget.
    pub fn detach(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.detach();
            debug!(topic = %self.topic, "feed detached");
        }
        self.detached = true;
    }
}

impl Drop for TopicSession {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StaticIdentity};

    fn open(backend: &MemoryBackend, topic: &str) -> TopicSession {
        let identity = Arc::new(StaticIdentity::new("u1", "alice"));
        TopicSession::open(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            identity,
            topic,
            SessionConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_seeds_from_snapshot() {
        let backend = MemoryBackend::new();
        backend
            .insert(&"community".into(), NewMessage::text("u2", "earlier"))
            .unwrap();

        let session = open(&backend, "community");
        assert_eq!(session.len(), 1);
        assert_eq!(session.snapshot()[0].body.as_deref(), Some("earlier"));
    }

    #[test]
    fn test_send_confirms_with_permanent_id() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "community");

        let confirmed = session.send_text("hello").unwrap();
        assert!(!confirmed.id.is_local());
        assert_eq!(session.len(), 1);
        assert_eq!(session.snapshot()[0].id, confirmed.id);
    }

    #[test]
    fn test_send_failure_rolls_back() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "community");

        backend.set_fail_writes(true);
        let err = session.send_text("hello").unwrap_err();

        assert!(session.is_empty(), "no dangling optimistic entry");
        let draft = err.into_draft().expect("draft preserved");
        assert_eq!(draft.body.as_deref(), Some("hello"));

        // retry with the same content succeeds as a fresh attempt
        backend.set_fail_writes(false);
        session.send(draft).unwrap();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_empty_send_rejected_before_mutation() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "community");

        let err = session.send_text("   ").unwrap_err();
        assert!(matches!(err, SyncError::EmptyMessage));
        assert!(session.is_empty());
        assert!(backend.fetch_ordered(&"community".into()).unwrap().is_empty());
    }

    #[test]
    fn test_capability_gate() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "signals");
        session
            .switch_identity(Arc::new(StaticIdentity::read_only("u3", "viewer")))
            .unwrap();

        let err = session.send_text("not allowed").unwrap_err();
        assert!(matches!(err, SyncError::Forbidden(_)));
        assert!(backend.fetch_ordered(&"signals".into()).unwrap().is_empty());
    }

    #[test]
    fn test_edit_unknown_id() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "community");

        let err = session.edit(&"ghost".into(), "new").unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn test_edit_rolls_back_on_failure() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "community");
        let message = session.send_text("original").unwrap();

        backend.set_fail_writes(true);
        let err = session.edit(&message.id, "changed").unwrap_err();
        assert!(matches!(err, SyncError::Edit { .. }));

        let entry = session.snapshot().iter().find(|m| m.id == message.id).unwrap();
        assert_eq!(entry.body.as_deref(), Some("original"));
        assert!(!entry.is_edited());
    }

    #[test]
    fn test_detach_makes_mutations_noops() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, "community");
        session.send_text("before").unwrap();

        session.detach();
        session.detach(); // idempotent

        // persist still happens, the log does not move
        let confirmed = session.send_text("after").unwrap();
        assert!(!confirmed.id.is_local());
        assert_eq!(session.len(), 1);
        assert_eq!(session.pump(), 0);
        assert_eq!(backend.fetch_ordered(&"community".into()).unwrap().len(), 2);
    }
}
