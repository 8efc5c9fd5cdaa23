//! Per-class default overrides applied to every model of a document.
//!
//! Loading themes from files is left to callers; a theme is built from an
//! already parsed `{"attrs": {ClassName: {attr: value}}}` mapping or
//! programmatically.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DocumentError;
use crate::registry::ModelClass;
use crate::value::Value;

/// Mapping `class name → attribute → value`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Theme {
    by_class: HashMap<String, HashMap<String, Value>>,
}

impl Theme {
    /// A theme with no overrides.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds one override.
    #[must_use]
    pub fn with_attr(mut self, class: &str, attr: &str, value: impl Into<Value>) -> Self {
        self.by_class
            .entry(class.to_string())
            .or_default()
            .insert(attr.to_string(), value.into());
        self
    }

    /// Parses `{"attrs": {ClassName: {attr: value}}}`. A missing `attrs` key
    /// yields the empty theme.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidTheme`] when `attrs` or one of its
    /// entries is not an object.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DocumentError> {
        let Some(attrs) = json.get("attrs") else {
            return Ok(Self::empty());
        };
        let classes = attrs.as_object().ok_or_else(|| DocumentError::InvalidTheme {
            reason: format!("theme attrs should be a dictionary of class names, not {attrs}"),
        })?;
        let mut theme = Self::empty();
        for (class, props) in classes {
            let props = props.as_object().ok_or_else(|| DocumentError::InvalidTheme {
                reason: format!(
                    "theme attrs.{class} should be a dictionary of properties, not {props}"
                ),
            })?;
            let entry = theme.by_class.entry(class.clone()).or_default();
            for (attr, value) in props {
                entry.insert(attr.clone(), Value::from_plain_json(value));
            }
        }
        Ok(theme)
    }

    /// Whether the theme has no overrides at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_class.values().all(HashMap::is_empty)
    }

    /// Overrides that apply to instances of `class`, merged along its
    /// inheritance chain with the most derived class winning.
    #[must_use]
    pub fn for_class(&self, class: &ModelClass) -> Arc<HashMap<String, Value>> {
        let mut merged = HashMap::new();
        for name in class.chain().iter().rev() {
            if let Some(props) = self.by_class.get(name) {
                merged.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Arc::new(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Kind, PropertyDescriptor};
    use crate::registry::{TypeDef, TypeRegistry};
    use serde_json::json;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDef::new("ThemedModel")
                    .property(PropertyDescriptor::new("number", Kind::Int).with_default(42))
                    .property(PropertyDescriptor::new("string", Kind::String).with_default("hello")),
            )
            .expect("registers");
        registry
            .register(
                TypeDef::new("SubOfThemedModel")
                    .extends("ThemedModel")
                    .property(
                        PropertyDescriptor::new("another_string", Kind::String)
                            .with_default("world"),
                    ),
            )
            .expect("registers");
        registry
    }

    #[test]
    fn overrides_merge_along_the_chain() {
        let registry = registry();
        let theme = Theme::from_json(&json!({
            "attrs": {
                "ThemedModel": {"number": 57},
                "SubOfThemedModel": {"another_string": "boo"}
            }
        }))
        .expect("well formed");
        let base = theme.for_class(registry.get("ThemedModel").expect("known"));
        assert_eq!(base.len(), 1);
        assert_eq!(base.get("number"), Some(&Value::Int(57)));
        let sub = theme.for_class(registry.get("SubOfThemedModel").expect("known"));
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.get("another_string"), Some(&Value::from("boo")));
    }

    #[test]
    fn malformed_attrs_are_rejected() {
        assert!(Theme::from_json(&json!({"attrs": 42})).is_err());
        assert!(Theme::from_json(&json!({"attrs": {"SomeClass": 42}})).is_err());
        assert!(Theme::from_json(&json!({})).expect("empty").is_empty());
    }
}
