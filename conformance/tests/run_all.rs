//! Full conformance run over the embedded and on-disk fixtures.

use std::path::PathBuf;

use propsync_conformance::{load_fixtures, run_all, ConformancePaths, FixtureKind, Severity};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

#[test]
fn all_fixtures_conform() {
    let report = run_all(&ConformancePaths {
        fixtures: fixture_dir(),
    })
    .expect("fixtures load");
    assert!(report.all_passed(), "{report}");
    assert_eq!(report.warning_count(), 0);
    for validator in ["registry/defaults", "wire/header", "document/index"] {
        assert!(report.results.iter().any(|r| r.validator == validator), "{validator} ran");
    }
}

#[test]
fn on_disk_fixtures_load_in_name_order() {
    let fixtures = load_fixtures(&fixture_dir()).expect("fixtures load");
    let names: Vec<&str> = fixtures.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["push_doc.json", "selection_patch.json"]);
    assert_eq!(fixtures[0].kind, FixtureKind::Message);
    assert!(fixtures[0].snapshot().is_some());
}

#[test]
fn missing_fixture_directory_is_a_warning() {
    let report = run_all(&ConformancePaths {
        fixtures: fixture_dir().join("absent"),
    })
    .expect("embedded fixtures load");
    assert!(report.all_passed(), "{report}");
    assert!(report.results.iter().any(|r| r.severity == Severity::Warning));
}
