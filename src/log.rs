//! In-memory ordered log of messages for a single topic.

use crate::types::{Message, MessageId, MessagePatch};

/// Time-ordered collection of messages for one topic.
///
/// Invariant: entries are sorted ascending by `(created_at, id)` and ids are
/// unique. Inserting an id that is already present replaces that entry, which
/// makes change-feed `created` events idempotent by construction. All
/// operations are local; this type never performs I/O and never errors —
/// absence is always a no-op.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace a message by id, keeping the log ordered.
    pub fn insert(&mut self, message: Message) {
        if let Some(pos) = self.position(&message.id) {
            self.entries.remove(pos);
        }
        let at = self
            .entries
            .partition_point(|m| m.sort_key() < message.sort_key());
        self.entries.insert(at, message);
    }

    /// Apply a patch to the message with `id`. A late update for an
    /// already-deleted message is not an error; it is silently dropped.
    ///
    /// Patches never touch `created_at`, so ordering is unaffected.
    pub fn update(&mut self, id: &MessageId, patch: &MessagePatch) {
        if let Some(pos) = self.position(id) {
            patch.apply_to(&mut self.entries[pos]);
        }
    }

    /// Remove the message with `id`. Idempotent; removing an absent id is a
    /// no-op.
    pub fn remove(&mut self, id: &MessageId) {
        if let Some(pos) = self.position(id) {
            self.entries.remove(pos);
        }
    }

    /// Replace the entire contents, used when seeding from a snapshot fetch.
    /// Sorts defensively in case the backend's ordering disagrees.
    pub fn replace_all(&mut self, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        messages.dedup_by(|a, b| a.id == b.id);
        self.entries = messages;
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The current ordered sequence, safe to render directly.
    pub fn snapshot(&self) -> &[Message] {
        &self.entries
    }

    /// Look up a message by id.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|pos| &self.entries[pos])
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Linear scan is fine at chat scale; the order key is (created_at, id),
    // not id, so ids cannot be binary-searched.
    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|m| &m.id == id)
    }
}
