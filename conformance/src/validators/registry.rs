//! Type registry validator.
//!
//! Registration already rejects most inconsistencies one type at a time;
//! these checks look at the finished table as a whole:
//! - every `Instance(T)` target names a registered type
//! - every effective default (own, inherited or overridden) satisfies its kind
//! - overrides only touch properties inherited from the parent

use propsync::property::{Kind, NoReferences};
use propsync::registry::{ModelClass, TypeRegistry};

use crate::report::{ConformanceReport, TestResult};

/// Validates a registry.
pub fn validate(registry: &TypeRegistry) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    check_instance_targets(registry, &mut report);
    check_defaults(registry, &mut report);
    check_overrides(registry, &mut report);
    report
}

fn check_instance_targets(registry: &TypeRegistry, report: &mut ConformanceReport) {
    let mut dangling = Vec::new();
    for class in registry.types() {
        for property in class.properties() {
            let mut targets = Vec::new();
            instance_targets(property.kind(), &mut targets);
            for target in targets {
                if registry.get(target).is_none() {
                    dangling.push(format!("{}.{} -> {target}", class.name(), property.name()));
                }
            }
        }
    }
    if dangling.is_empty() {
        report.push(TestResult::pass(
            "registry/instances",
            "Every Instance kind targets a registered type",
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "registry/instances",
            "Instance kinds target unregistered types",
            dangling,
        ));
    }
}

fn instance_targets<'k>(kind: &'k Kind, out: &mut Vec<&'k str>) {
    match kind {
        Kind::Instance(name) => out.push(name),
        Kind::Nullable(inner) | Kind::List(inner) | Kind::Set(inner) => instance_targets(inner, out),
        Kind::Dict(key, value) => {
            instance_targets(key, out);
            instance_targets(value, out);
        }
        Kind::Union(kinds) | Kind::Tuple(kinds) => {
            for kind in kinds {
                instance_targets(kind, out);
            }
        }
        _ => {}
    }
}

fn check_defaults(registry: &TypeRegistry, report: &mut ConformanceReport) {
    let mut invalid = Vec::new();
    for class in registry.types() {
        for property in class.properties() {
            let Some(default) = class.class_default(property.name()) else {
                invalid.push(format!("{}.{}: no default", class.name(), property.name()));
                continue;
            };
            // Null stands for "not assigned yet".
            if default.is_null() {
                continue;
            }
            if let Err(err) = property.validate(class.name(), &default, &NoReferences) {
                invalid.push(err.to_string());
            }
        }
    }
    if invalid.is_empty() {
        report.push(TestResult::pass(
            "registry/defaults",
            format!("Defaults of {} types satisfy their kinds", registry.len()),
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "registry/defaults",
            "Defaults violate their kinds",
            invalid,
        ));
    }
}

fn check_overrides(registry: &TypeRegistry, report: &mut ConformanceReport) {
    let mut misplaced = Vec::new();
    for class in registry.types() {
        for (attr, _) in class.own_overrides() {
            if !inherits(registry, class, attr) {
                misplaced.push(format!("{} overrides '{attr}' it does not inherit", class.name()));
            }
        }
    }
    if misplaced.is_empty() {
        report.push(TestResult::pass(
            "registry/overrides",
            "Default overrides only touch inherited properties",
        ));
    } else {
        report.push(TestResult::fail_with_details(
            "registry/overrides",
            "Overrides of properties that are not inherited",
            misplaced,
        ));
    }
}

fn inherits(registry: &TypeRegistry, class: &ModelClass, attr: &str) -> bool {
    class
        .parent()
        .and_then(|parent| registry.get(parent))
        .is_some_and(|parent| parent.has_property(attr))
}
