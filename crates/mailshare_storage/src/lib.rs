//! # MailShare Storage
//!
//! Line-oriented storage backends for the MailShare record store.
//!
//! Backends are **opaque line stores**: they hand lines to the caller,
//! append lines, and rewrite the line set, but never interpret what a
//! line contains. Row encoding lives in `mailshare_core`.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - Persistent storage in a single flat file
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//!
//! ## Example
//!
//! ```rust
//! use mailshare_storage::{InMemoryBackend, StorageBackend};
//! use std::ops::ControlFlow;
//!
//! let backend = InMemoryBackend::new();
//! backend.append_line("a,b,c,d").unwrap();
//!
//! let mut seen = Vec::new();
//! backend
//!     .scan(&mut |line| {
//!         seen.push(line.to_string());
//!         ControlFlow::Continue(())
//!     })
//!     .unwrap();
//! assert_eq!(seen, vec!["a,b,c,d".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
