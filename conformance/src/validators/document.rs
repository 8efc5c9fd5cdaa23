//! Document graph validator.
//!
//! Checks that what a document indexes is exactly what its roots reach:
//! - the model index equals the reference closure of the roots
//! - no attached model refers to a model the document cannot resolve
//! - every named model is found by name
//! - roots are distinct

use std::collections::{HashSet, VecDeque};

use propsync::document::Document;
use propsync::ModelId;

use crate::report::{ConformanceReport, TestResult};

/// Validates `doc`; `label` names it in report messages.
pub fn validate(label: &str, doc: &Document) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    check_roots(label, doc, &mut report);
    check_closure(label, doc, &mut report);
    check_names(label, doc, &mut report);
    report
}

fn check_roots(label: &str, doc: &Document, report: &mut ConformanceReport) {
    let mut seen = HashSet::new();
    let repeated: Vec<String> = doc
        .roots()
        .iter()
        .filter(|id| !seen.insert(*id))
        .map(ToString::to_string)
        .collect();
    if repeated.is_empty() {
        report.push(TestResult::pass(
            "document/roots",
            format!("{label}: {} distinct roots", doc.roots().len()),
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "document/roots",
            format!("{label}: roots listed more than once"),
            repeated,
        ));
    }
}

fn check_closure(label: &str, doc: &Document, report: &mut ConformanceReport) {
    let mut reached: HashSet<ModelId> = HashSet::new();
    let mut dangling = Vec::new();
    let mut queue: VecDeque<ModelId> = doc.roots().iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        if !reached.insert(id.clone()) {
            continue;
        }
        match doc.get_by_id(&id) {
            Some(model) => queue.extend(model.references()),
            None => dangling.push(id.to_string()),
        }
    }

    if dangling.is_empty() {
        report.push(TestResult::pass(
            "document/references",
            format!("{label}: every reference resolves"),
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "document/references",
            format!("{label}: references to models outside the index"),
            dangling,
        ));
    }

    let indexed: HashSet<ModelId> = doc.models().iter().map(|m| m.id().clone()).collect();
    let mut mismatched: Vec<String> = indexed
        .symmetric_difference(&reached)
        .map(|id| {
            let side = if indexed.contains(id) { "unreachable" } else { "unindexed" };
            format!("{id} ({side})")
        })
        .collect();
    mismatched.sort();
    if mismatched.is_empty() {
        report.push(TestResult::pass(
            "document/index",
            format!("{label}: index holds exactly the {} reachable models", reached.len()),
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "document/index",
            format!("{label}: index differs from the root closure"),
            mismatched,
        ));
    }
}

fn check_names(label: &str, doc: &Document, report: &mut ConformanceReport) {
    let mut lost = Vec::new();
    for model in doc.models() {
        let Some(name) = model.name() else { continue };
        match doc.get_by_name(&name) {
            Ok(Some(found)) if found.name().as_deref() == Some(name.as_str()) => {}
            // Several models share the name; the lookup reports the ambiguity.
            Err(_) => {}
            _ => lost.push(format!("{} named '{name}'", model.id())),
        }
    }
    if lost.is_empty() {
        report.push(TestResult::pass(
            "document/names",
            format!("{label}: name index is consistent"),
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "document/names",
            format!("{label}: named models missing from the name index"),
            lost,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propsync::value::Value;

    #[test]
    fn built_documents_pass() {
        let mut doc = Document::new(propsync_models::builtin_registry().expect("catalog is consistent"));
        let a = doc
            .create_with("Spacer", [("name", Value::from("gap"))])
            .expect("valid");
        let b = doc.create_with("Spacer", [("name", Value::from("gap"))]).expect("valid");
        let row = doc
            .create_with("Row", [("children", Value::list([Value::Ref(a), Value::Ref(b)]))])
            .expect("valid");
        let column = doc
            .create_with("Column", [("children", Value::list([Value::Ref(row.clone())]))])
            .expect("valid");
        doc.add_root(&column).expect("owned");
        doc.add_root(&row).expect("owned");

        let report = validate("layout", &doc);
        assert!(report.all_passed(), "{:#?}", report.results);
        assert_eq!(report.results.len(), 4);
    }

    #[test]
    fn empty_documents_pass() {
        let doc = Document::new(propsync_models::builtin_registry().expect("catalog is consistent"));
        assert!(validate("empty", &doc).all_passed());
    }
}
