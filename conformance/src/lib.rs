//! propsync conformance suite.
//!
//! Validators that check the pieces two synchronized runtimes have to agree
//! on, reported as a [`ConformanceReport`].
//!
//! # Conformance Scope
//!
//! | Component | Checks |
//! |-----------|--------|
//! | Type registry | closed `Instance` targets, valid defaults, inherited overrides |
//! | Documents | index equals root closure, names, no dangling references |
//! | Wire payloads | tagged vocabulary, buffers, patch events, message headers |
//!
//! # Entry Point
//!
//! ```no_run
//! use propsync_conformance::{run_all, ConformancePaths};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let paths = ConformancePaths {
//!     fixtures: PathBuf::from("conformance/fixtures"),
//! };
//! let report = run_all(&paths)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod fixture;
pub mod report;
pub mod tests;
pub mod validators;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use propsync::document::Document;
use walkdir::WalkDir;

pub use fixture::{Fixture, FixtureKind};
pub use report::{ConformanceReport, Severity, TestResult};

/// Paths used by the conformance runner.
#[derive(Debug, Clone)]
pub struct ConformancePaths {
    /// Directory searched recursively for `*.json` fixture envelopes.
    pub fixtures: PathBuf,
}

/// Runs every validator and returns the aggregated report.
///
/// Checks run in this order:
/// 1. The built-in registry
/// 2. Each fixture, embedded ones first, then files in name order:
///    wire vocabulary, then (for snapshots) the decoded document graph
///
/// # Errors
///
/// Returns an error if the built-in registry cannot be built or a fixture
/// file cannot be read or parsed as an envelope.
pub fn run_all(paths: &ConformancePaths) -> Result<ConformanceReport> {
    let mut report = ConformanceReport::new();

    let registry = propsync_models::builtin_registry().context("Failed to build the built-in registry")?;
    report.extend(validators::registry::validate(&registry));

    let mut fixtures = embedded_fixtures()?;
    if paths.fixtures.is_dir() {
        fixtures.extend(load_fixtures(&paths.fixtures)?);
    } else {
        report.push(TestResult::warn(
            "fixtures",
            format!("{} is not a directory; only embedded fixtures checked", paths.fixtures.display()),
        ));
    }

    for fixture in &fixtures {
        report.extend(validators::wire::validate(fixture));
        let Some(snapshot) = fixture.snapshot() else {
            continue;
        };
        match Document::from_json(Arc::clone(&registry), &snapshot) {
            Ok(doc) => report.extend(validators::document::validate(&fixture.name, &doc)),
            Err(err) => report.push(TestResult::fail(
                "document/decode",
                format!("{}: {err}", fixture.name),
            )),
        }
    }

    tracing::debug!(
        fixtures = fixtures.len(),
        checks = report.results.len(),
        failures = report.failure_count(),
        "conformance run finished"
    );
    Ok(report)
}

/// Parses the fixtures compiled into this crate.
///
/// # Errors
///
/// Returns an error if an embedded envelope is malformed.
pub fn embedded_fixtures() -> Result<Vec<Fixture>> {
    tests::fixtures::ALL
        .iter()
        .map(|(name, text)| Fixture::parse(name, text))
        .collect()
}

/// Loads every `*.json` envelope under `dir`, sorted by path.
///
/// # Errors
///
/// Returns an error if the directory cannot be walked or a file cannot be
/// read or parsed.
pub fn load_fixtures(dir: &Path) -> Result<Vec<Fixture>> {
    let mut fixtures = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path.strip_prefix(dir).unwrap_or(path).display().to_string();
        tracing::trace!(fixture = %name, "loaded fixture");
        fixtures.push(Fixture::parse(&name, &text)?);
    }
    Ok(fixtures)
}
