//! Embedded conformance payloads.

pub mod fixtures;
