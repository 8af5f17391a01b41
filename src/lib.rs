//! # livelog
//!
//! Client-side synchronization engine for server-held message logs: chat
//! rooms, mentorship threads, broadcast signal feeds.
//!
//! ## Core Concepts
//!
//! - **Topic**: a named message stream held by a remote backend
//! - **MessageLog**: the in-memory ordered view of one topic
//! - **Change feed**: push notifications keeping the log live-updated
//! - **Optimistic send**: local insert under a temporary id, reconciled
//!   against the server-confirmed row by id-based idempotent upsert
//!
//! The backend is abstracted behind the [`QueryApi`], [`ChangeFeed`], and
//! [`Identity`] traits; [`MemoryBackend`] is a complete in-process
//! implementation.
//!
//! ## Example
//!
//! ```
//! use livelog::{MemoryBackend, NewMessage, SessionConfig, StaticIdentity, TopicSession};
//! use std::sync::Arc;
//!
//! let backend = MemoryBackend::new();
//! let identity = Arc::new(StaticIdentity::new("u1", "alice"));
//!
//! let mut session = TopicSession::open(
//!     Arc::new(backend.clone()),
//!     Arc::new(backend),
//!     identity,
//!     "community",
//!     SessionConfig::default(),
//! )?;
//!
//! session.send_text("Hello, room!")?;
//! session.pump(); // apply any pending feed events
//!
//! for message in session.snapshot() {
//!     println!("{}: {:?}", message.author, message.body);
//! }
//! # Ok::<(), livelog::SyncError>(())
//! ```

pub mod backend;
pub mod error;
pub mod feed;
pub mod log;
pub mod session;
pub mod types;

// Re-exports
pub use backend::{ChangeFeed, Identity, MemoryBackend, QueryApi, StaticIdentity};
pub use error::{Result, SyncError, TransportError};
pub use feed::{FeedEvent, FeedSubscription};
pub use log::MessageLog;
pub use session::{SessionConfig, TopicSession};
pub use types::{
    AttachmentRef, AuthorId, Message, MessageId, MessagePatch, NewMessage, Timestamp, Topic,
    LOCAL_ID_PREFIX,
};
