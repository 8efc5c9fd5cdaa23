//! Simple attribute and type selectors over models.

use std::fmt;

use crate::model::Model;
use crate::value::Value;

/// A conjunction of conditions a model must meet.
///
/// An empty selector matches every model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    type_name: Option<String>,
    name: Option<String>,
    tags: Vec<Value>,
    attrs: Vec<(String, Value)>,
}

impl Selector {
    /// Matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances of `type_name` or any subtype.
    #[must_use]
    pub fn of_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    /// Models whose `name` equals `name`.
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Models whose `tags` contain `tag`.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<Value>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Models declaring `attr` with a value equal to `value`.
    #[must_use]
    pub fn with_attr(mut self, attr: &str, value: impl Into<Value>) -> Self {
        self.attrs.push((attr.to_string(), value.into()));
        self
    }

    /// The name condition, used to narrow lookups through the name index.
    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether `model` meets every condition.
    #[must_use]
    pub fn matches(&self, model: &Model) -> bool {
        if let Some(type_name) = &self.type_name {
            if !model.class().is_subtype_of(type_name) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if model.name().as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let Ok(tags) = model.value_cow("tags") else {
                return false;
            };
            let tags = tags.as_list().unwrap_or_default();
            if !self.tags.iter().all(|tag| tags.contains(tag)) {
                return false;
            }
        }
        self.attrs.iter().all(|(attr, expected)| {
            model
                .value_cow(attr)
                .is_ok_and(|actual| actual.as_ref() == expected)
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(type_name) = &self.type_name {
            parts.push(format!("type={type_name}"));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={name:?}"));
        }
        for tag in &self.tags {
            parts.push(format!("tag={}", tag.describe()));
        }
        for (attr, value) in &self.attrs {
            parts.push(format!("{attr}={}", value.describe()));
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}
