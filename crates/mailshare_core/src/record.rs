//! Shared message records.

use crate::codec;
use crate::expiry;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifetime given to a record created with [`SharedMessageRecord::new`].
pub const DEFAULT_EXPIRATION_HOURS: i64 = 24;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the value as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype! {
    /// Label of the room (mailbox namespace) a shared message belongs to.
    Room
}

string_newtype! {
    /// Opaque reference to the underlying stored email message.
    MessageId
}

/// A temporarily shared link to an email message.
///
/// Records are immutable once stored. A record is live while
/// `expired_at` is strictly in the future; liveness is never stored,
/// it is evaluated against the clock every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedMessageRecord {
    /// Unique id, assigned by the store on add. Empty until then.
    pub id: String,
    /// Room the message belongs to.
    pub room: Room,
    /// The shared message.
    pub message_id: MessageId,
    /// Instant after which the record is gone.
    pub expired_at: DateTime<Utc>,
}

impl SharedMessageRecord {
    /// Creates an unsaved record expiring [`DEFAULT_EXPIRATION_HOURS`] from now.
    #[must_use]
    pub fn new(room: impl Into<Room>, message_id: impl Into<MessageId>) -> Self {
        Self {
            id: String::new(),
            room: room.into(),
            message_id: message_id.into(),
            expired_at: hours_from_now(DEFAULT_EXPIRATION_HOURS),
        }
    }

    /// Sets the expiration to `hours` from now.
    ///
    /// Negative values produce a record that is already expired.
    #[must_use]
    pub fn with_expiration_in_hours(mut self, hours: i64) -> Self {
        self.expired_at = hours_from_now(hours);
        self
    }

    /// Sets an absolute expiration, truncated to whole seconds and clamped
    /// to years 1 through 9999.
    #[must_use]
    pub fn with_expired_at(mut self, expired_at: DateTime<Utc>) -> Self {
        self.expired_at = codec::clamp_expired_at(expired_at);
        self
    }

    /// Returns `true` once the record has been assigned an id.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    /// Returns `true` if the record is live at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        expiry::is_live(self.expired_at, now)
    }

    /// Returns `true` if the record is no longer live.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_live_at(Utc::now())
    }

    /// Renders `expired_at` the way it is written to the backing file.
    #[must_use]
    pub fn expired_at_string(&self) -> String {
        codec::format_expired_at(self.expired_at)
    }
}

fn hours_from_now(hours: i64) -> DateTime<Utc> {
    let now = Utc::now();
    let fallback = if hours < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    };
    let at = TimeDelta::try_hours(hours)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(fallback);
    codec::clamp_expired_at(at)
}
