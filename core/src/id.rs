//! Identities: model ids, setter tokens, document ids and callback handles.
//!
//! Model ids are strings so that ids minted by a peer (which may use any
//! scheme) can be adopted verbatim when a model arrives over the wire.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

static NEXT_ID: AtomicU64 = AtomicU64::new(1000);

fn next_serial() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a model, unique for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Mints a fresh id (`p1000`, `p1001`, ...).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("p{}", next_serial()))
    }

    /// Mints an id no independently running peer will mint too.
    #[must_use]
    pub fn unique() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Adopts an id produced elsewhere, typically decoded from the wire.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token naming the origin of a change.
///
/// A session applies incoming patches under its own token; events carrying
/// that token are not sent back to the peer they came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetterId(String);

impl SetterId {
    /// Mints a fresh setter token.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("s{}", next_serial()))
    }

    /// Wraps an externally chosen token.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SetterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SetterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a document, used to check that combined events belong together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Mints a fresh document id.
    #[must_use]
    pub fn new() -> Self {
        Self(next_serial())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned when registering a callback; needed to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Mints a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(next_serial())
    }
}

impl Default for CallbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb{}", self.0)
    }
}

/// Mints an id for an out-of-band buffer.
pub(crate) fn next_buffer_id() -> String {
    format!("b{}", next_serial())
}

/// Mints an id for a protocol message.
pub(crate) fn next_message_id() -> String {
    format!("m{}", next_serial())
}
