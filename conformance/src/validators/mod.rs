//! Conformance validators.
//!
//! - [`registry`]: type tables are closed and their defaults valid.
//! - [`document`]: a document's index agrees with its root graph.
//! - [`wire`]: payloads use only the tagged vocabulary and well-formed
//!   events and headers.

pub mod document;
pub mod registry;
pub mod wire;
