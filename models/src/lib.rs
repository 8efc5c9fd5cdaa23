//! Built-in model types for propsync documents.
//!
//! The catalog is split into [`TypeModule`]s (layouts, widgets, data
//! sources, ranges, plots). [`builtin_registry`] registers all of them once
//! per process and hands out a shared registry:
//!
//! ```no_run
//! use propsync::document::Document;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = Document::new(propsync_models::builtin_registry()?);
//! let slider = doc.create("Slider")?;
//! doc.set(&slider, "value", 0.25)?;
//! doc.add_root(&slider)?;
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

pub mod catalog;
mod module;

use std::sync::{Arc, OnceLock};

use propsync::error::RegistryError;
use propsync::registry::TypeRegistry;

pub use module::TypeModule;

/// All built-in modules, in registration order.
#[must_use]
pub fn modules() -> Vec<TypeModule> {
    vec![
        catalog::layouts::module(),
        catalog::widgets::module(),
        catalog::sources::module(),
        catalog::ranges::module(),
        catalog::plots::module(),
    ]
}

/// Registers every built-in type into `registry`.
///
/// # Errors
///
/// Returns the first [`RegistryError`], e.g. when `registry` already holds
/// a type with a built-in name.
pub fn register_builtins(registry: &mut TypeRegistry) -> Result<(), RegistryError> {
    for module in modules() {
        module.register_into(registry)?;
    }
    Ok(())
}

/// A shared registry holding the base type and every built-in type.
///
/// Built on first use; later calls clone the same `Arc`.
///
/// # Errors
///
/// Returns the [`RegistryError`] raised while building the registry. The
/// failure is cached, so every call reports it.
pub fn builtin_registry() -> Result<Arc<TypeRegistry>, RegistryError> {
    static REGISTRY: OnceLock<Result<Arc<TypeRegistry>, RegistryError>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| {
            let mut registry = TypeRegistry::new();
            register_builtins(&mut registry)?;
            tracing::debug!(types = registry.len(), "built-in registry ready");
            Ok(Arc::new(registry))
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use propsync::document::Document;
    use propsync::property::Kind;
    use propsync::value::Value;
    use std::collections::HashSet;

    #[test]
    fn every_module_registers() {
        let registry = builtin_registry().expect("catalog is consistent");
        let declared: usize = modules().iter().map(|m| m.types.len()).sum();
        // The base type is always present.
        assert_eq!(registry.len(), declared + 1);
    }

    #[test]
    fn type_names_are_unique() {
        let mut seen = HashSet::new();
        for module in modules() {
            for name in module.type_names() {
                assert!(seen.insert(name.to_string()), "duplicate type {name}");
            }
        }
    }

    #[test]
    fn instance_targets_are_registered() {
        fn targets<'k>(kind: &'k Kind, out: &mut Vec<&'k str>) {
            match kind {
                Kind::Instance(name) => out.push(name),
                Kind::Nullable(inner) | Kind::List(inner) | Kind::Set(inner) => targets(inner, out),
                Kind::Dict(key, value) => {
                    targets(key, out);
                    targets(value, out);
                }
                Kind::Union(kinds) | Kind::Tuple(kinds) => {
                    kinds.iter().for_each(|k| targets(k, out));
                }
                _ => {}
            }
        }

        let registry = builtin_registry().expect("catalog is consistent");
        for class in registry.types() {
            let mut names = Vec::new();
            class.properties().for_each(|p| targets(p.kind(), &mut names));
            for name in names {
                assert!(registry.get(name).is_some(), "{}: unknown target {name}", class.name());
            }
        }
    }

    #[test]
    fn registering_twice_fails() {
        let mut registry = TypeRegistry::new();
        register_builtins(&mut registry).expect("first pass");
        assert!(matches!(
            register_builtins(&mut registry),
            Err(RegistryError::DuplicateType { name }) if name == "LayoutDOM"
        ));
    }

    #[test]
    fn overridden_defaults_apply_to_subtypes() {
        let registry = builtin_registry().expect("catalog is consistent");
        let plot = registry.resolve("Plot").expect("registered");
        assert_eq!(plot.class_default("width"), Some(Value::Int(600)));
        let renderer = registry.resolve("GlyphRenderer").expect("registered");
        assert_eq!(renderer.class_default("level"), Some(Value::from("glyph")));
        assert!(registry.is_subtype("Slider", "LayoutDOM"));
        assert!(registry.resolve("Widget").expect("registered").is_abstract());
    }

    #[test]
    fn plots_wire_up_in_a_document() {
        let mut doc = Document::new(builtin_registry().expect("catalog is consistent"));
        let source = doc.create("ColumnDataSource").expect("concrete");
        let glyph = doc
            .create_with("Scatter", [("size", Value::Float(8.0)), ("marker", Value::from("square"))])
            .expect("valid");
        let renderer = doc
            .create_with(
                "GlyphRenderer",
                [("data_source", Value::Ref(source.clone())), ("glyph", Value::Ref(glyph.clone()))],
            )
            .expect("valid");
        let plot = doc
            .create_with("Plot", [("renderers", Value::list([Value::Ref(renderer.clone())]))])
            .expect("valid");
        doc.add_root(&plot).expect("owned");

        for id in [&source, &glyph, &renderer] {
            assert!(doc.get_by_id(id).is_some());
        }
        assert!(doc.set(&renderer, "glyph", Value::Ref(source.clone())).is_err());
        assert!(doc.set(&glyph, "size", -1.0).is_err());
        assert_eq!(doc.get(&glyph, "size").expect("declared"), Value::Float(8.0));
    }

    #[test]
    fn readonly_widget_values_reject_sets() {
        let mut doc = Document::new(builtin_registry().expect("catalog is consistent"));
        let slider = doc.create("Slider").expect("concrete");
        assert!(doc.set(&slider, "value_throttled", 0.5).is_err());
        assert!(doc.set(&slider, "step", 0.0).is_err());
        doc.set(&slider, "value", 3).expect("ints widen");
        assert_eq!(doc.get(&slider, "value").expect("declared"), Value::Float(3.0));
    }
}
