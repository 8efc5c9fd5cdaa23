//! Wire protocol between two synchronized documents.
//!
//! A [`Message`] is a header, metadata, a JSON content part and the binary
//! buffers the content refers to. [`SyncSession`] binds a
//! [`crate::document::Document`] to one peer: it queues local changes as
//! `PATCH-DOC` messages and applies incoming messages without echoing them.

mod message;
mod session;

pub use message::{Header, Message, MsgType};
pub use session::SyncSession;
