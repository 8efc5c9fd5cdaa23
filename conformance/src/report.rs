//! Check results and their aggregation.

use std::fmt;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The check passed.
    Pass,
    /// Suspicious but not a conformance failure.
    Warning,
    /// The check failed.
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Warning => "warn",
            Self::Failure => "FAIL",
        })
    }
}

/// One check result.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Validator id, e.g. `wire/patch`.
    pub validator: String,
    /// One-line outcome.
    pub message: String,
    /// Outcome severity.
    pub severity: Severity,
    /// Offending items, one per line.
    pub details: Vec<String>,
}

impl TestResult {
    fn new(validator: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            validator: validator.into(),
            message: message.into(),
            severity,
            details: Vec::new(),
        }
    }

    /// A passing result.
    pub fn pass(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, message, Severity::Pass)
    }

    /// A failing result.
    pub fn fail(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, message, Severity::Failure)
    }

    /// A failing result listing the offending items.
    pub fn fail_with_details(
        validator: impl Into<String>,
        message: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        Self {
            details,
            ..Self::fail(validator, message)
        }
    }

    /// A warning.
    pub fn warn(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, message, Severity::Warning)
    }

    /// Whether this result is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Failure
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.validator, self.message)?;
        for detail in &self.details {
            write!(f, "\n    {detail}")?;
        }
        Ok(())
    }
}

/// Results of a conformance run, in check order.
#[derive(Debug, Default)]
pub struct ConformanceReport {
    /// All results.
    pub results: Vec<TestResult>,
}

impl ConformanceReport {
    /// An empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result.
    pub fn push(&mut self, result: TestResult) {
        self.results.push(result);
    }

    /// Appends every result of `other`.
    pub fn extend(&mut self, other: ConformanceReport) {
        self.results.extend(other.results);
    }

    /// Failed results.
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Number of failed results.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::Warning)
            .count()
    }

    /// Whether no result failed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failure_count() == 0
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{result}")?;
        }
        write!(
            f,
            "{} checks, {} failed, {} warnings",
            self.results.len(),
            self.failure_count(),
            self.warning_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_severity() {
        let mut report = ConformanceReport::new();
        report.push(TestResult::pass("a", "ok"));
        report.push(TestResult::warn("b", "hmm"));
        report.push(TestResult::fail_with_details("c", "bad", vec!["x".into()]));
        assert_eq!(report.failure_count(), 1);
        assert!(!report.all_passed());
        let text = report.to_string();
        assert!(text.contains("[FAIL] c: bad\n    x"));
        assert!(text.ends_with("3 checks, 1 failed, 1 warnings"));
    }
}
