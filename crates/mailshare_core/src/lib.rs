//! # MailShare Core
//!
//! A small persistent store for temporarily shared email messages.
//!
//! Each shared link is a [`SharedMessageRecord`]: an id, the room (mailbox)
//! the message lives in, a reference to the message, and an expiration
//! timestamp. Records live in one flat file, one comma-delimited row each:
//!
//! ```text
//! <id>,<room>,<message_id>,<YYYY-MM-DD HH:MM:SS>
//! ```
//!
//! This crate provides:
//! - The row codec ([`codec`])
//! - The expiration policy shared by lookup and compaction ([`expiry`])
//! - [`SharedMessageStore`] with `find`, `add` and `delete_expired`
//!
//! ## Example
//!
//! ```rust,no_run
//! use mailshare_core::{SharedMessageRecord, SharedMessageStore, StoreConfig};
//!
//! let store = SharedMessageStore::open(StoreConfig::new("shares.csv"))?;
//!
//! let shared = store.add(SharedMessageRecord::new("inbox", "msg-42"))?;
//! let found = store.find(&shared.id)?;
//! assert_eq!(found.message_id.as_str(), "msg-42");
//!
//! store.delete_expired()?;
//! # Ok::<(), mailshare_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod config;
mod error;
pub mod expiry;
mod record;
mod store;

pub use codec::{DecodeError, EXPIRED_AT_FORMAT};
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use expiry::{is_live, RowStatus};
pub use record::{MessageId, Room, SharedMessageRecord, DEFAULT_EXPIRATION_HOURS};
pub use store::{CompactionStats, SharedMessageStore};

pub use mailshare_storage::{FileBackend, InMemoryBackend, StorageBackend, StorageError};
