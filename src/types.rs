//! Core identifier and timestamp types.
//!
//! All persisted entities are keyed by `u64` ids allocated from a
//! monotonic counter. The newtypes below exist so a message id cannot be
//! passed where a user id is expected, and so the big-endian key
//! encoding used by the store lives in one place.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian key encoding, sorted the same way as the numeric id.
            pub fn to_key_bytes(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }

            /// Decodes an id from its big-endian key encoding.
            pub fn from_key_bytes(bytes: [u8; 8]) -> Self {
                Self(u64::from_be_bytes(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type! {
    /// Identifier of a registered user.
    UserId
}

id_type! {
    /// Identifier of a discussion topic.
    TopicId
}

id_type! {
    /// Identifier of a message.
    MessageId
}

/// Returns the current time in milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Inverts a timestamp so that ascending key order yields newest-first.
pub fn invert_timestamp(ts: u64) -> u64 {
    u64::MAX - ts
}
