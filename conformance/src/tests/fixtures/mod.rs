//! Wire payloads checked on every conformance run.
//!
//! Each constant is a fixture envelope: `{"kind", "payload", "buffers"}`
//! where `kind` is `snapshot`, `patch` or `message` (see
//! [`crate::fixture::Fixture`]). Snapshots must also decode against the
//! built-in registry.

mod plot_snapshot;
mod stream_patch;
mod pull_reply;

pub use plot_snapshot::PLOT_SNAPSHOT;
pub use pull_reply::PULL_REPLY;
pub use stream_patch::STREAM_PATCH;

/// All embedded fixtures with their names.
pub const ALL: &[(&str, &str)] = &[
    ("plot_snapshot", PLOT_SNAPSHOT),
    ("stream_patch", STREAM_PATCH),
    ("pull_reply", PULL_REPLY),
];
