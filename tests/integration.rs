//! End-to-end workflows against the in-process backend.

use livelog::{
    MemoryBackend, NewMessage, QueryApi, SessionConfig, StaticIdentity, TopicSession,
};
use std::sync::Arc;

fn open_session(backend: &MemoryBackend, user: &str, handle: &str, topic: &str) -> TopicSession {
    TopicSession::open(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(StaticIdentity::new(user, handle)),
        topic,
        SessionConfig::default(),
    )
    .unwrap()
}

// --- Realistic Workflow Tests ---

#[test]
fn test_community_chat_between_two_clients() {
    let backend = MemoryBackend::new();
    backend.register_profile("u1", "alice");
    backend.register_profile("u2", "bob");

    let mut alice = open_session(&backend, "u1", "alice", "community");
    let mut bob = open_session(&backend, "u2", "bob", "community");

    alice.send_text("hey bob").unwrap();
    bob.send_text("hey alice").unwrap();

    // each side drains its feed and converges on the same ordered view
    alice.pump();
    bob.pump();

    assert_eq!(alice.len(), 2);
    assert_eq!(bob.len(), 2);

    let alice_ids: Vec<_> = alice.snapshot().iter().map(|m| m.id.clone()).collect();
    let bob_ids: Vec<_> = bob.snapshot().iter().map(|m| m.id.clone()).collect();
    assert_eq!(alice_ids, bob_ids);

    // display handles were joined by the backend
    assert!(alice
        .snapshot()
        .iter()
        .any(|m| m.author_name.as_deref() == Some("bob")));
}

#[test]
fn test_signals_broadcast_to_read_only_viewer() {
    let backend = MemoryBackend::new();

    let mut admin = open_session(&backend, "admin", "Koffie", "signals");
    let mut viewer = TopicSession::open(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(StaticIdentity::read_only("u9", "viewer")),
        "signals",
        SessionConfig::default(),
    )
    .unwrap();

    admin.send_text("GBP/USD buy @ 1.2710, SL 1.2650").unwrap();
    admin.send_text("XAU/USD sell @ 2380").unwrap();

    assert_eq!(viewer.pump(), 2);
    assert_eq!(viewer.len(), 2);

    // the viewer cannot publish into the feed
    assert!(viewer.send_text("me too").is_err());
    assert_eq!(backend.fetch_ordered(&"signals".into()).unwrap().len(), 2);
}

#[test]
fn test_edit_propagates_and_flags_edited() {
    let backend = MemoryBackend::new();
    let mut alice = open_session(&backend, "u1", "alice", "community");
    let mut bob = open_session(&backend, "u2", "bob", "community");

    let sent = alice.send_text("helo").unwrap();
    bob.pump();

    alice.edit(&sent.id, "hello").unwrap();
    bob.pump();

    let seen = bob.snapshot().iter().find(|m| m.id == sent.id).unwrap();
    assert_eq!(seen.body.as_deref(), Some("hello"));
    assert!(seen.is_edited());

    // the editor's own view was patched optimistically
    let own = alice.snapshot().iter().find(|m| m.id == sent.id).unwrap();
    assert_eq!(own.body.as_deref(), Some("hello"));
}

#[test]
fn test_delete_propagates() {
    let backend = MemoryBackend::new();
    let mut alice = open_session(&backend, "u1", "alice", "community");
    let mut bob = open_session(&backend, "u2", "bob", "community");

    let sent = alice.send_text("oops").unwrap();
    bob.pump();
    assert_eq!(bob.len(), 1);

    alice.delete(&sent.id).unwrap();
    assert!(alice.is_empty());

    bob.pump();
    assert!(bob.is_empty());

    // deleting again is fine on both sides
    alice.delete(&sent.id).unwrap();
}

#[test]
fn test_attachment_only_message() {
    let backend = MemoryBackend::new();
    let mut alice = open_session(&backend, "u1", "alice", "community");

    let input = NewMessage::attachment_only("u1", "https://cdn.example/chat/pic.png");
    let sent = alice.send(input).unwrap();

    assert!(sent.body.is_none());
    assert_eq!(
        sent.attachment.as_ref().map(|a| a.0.as_str()),
        Some("https://cdn.example/chat/pic.png")
    );
}

#[test]
fn test_late_joiner_sees_history_then_live_updates() {
    let backend = MemoryBackend::new();
    let mut alice = open_session(&backend, "u1", "alice", "community");
    alice.send_text("first").unwrap();
    alice.send_text("second").unwrap();

    // bob joins after the fact: snapshot seeds history
    let mut bob = open_session(&backend, "u2", "bob", "community");
    assert_eq!(bob.len(), 2);

    // and the feed covers everything from then on
    alice.send_text("third").unwrap();
    bob.pump();
    assert_eq!(bob.len(), 3);
    assert_eq!(bob.snapshot()[2].body.as_deref(), Some("third"));
}
