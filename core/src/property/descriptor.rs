//! Property descriptors: one typed attribute slot of a model type.

use crate::error::ValidationError;
use crate::property::kind::{Kind, ReferenceTypes};
use crate::value::Value;

/// Zero-argument default producer, called once per instance.
pub type Generator = fn() -> Value;

/// Extra acceptance check run after kind validation.
pub type Check = fn(&Value) -> Result<(), String>;

/// Where a property's default comes from.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    /// A fixed value, cloned per read.
    Static(Value),
    /// A generator producing a fresh value per instance.
    Generated(Generator),
}

impl DefaultValue {
    /// Produces the default value.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Generated(generator) => generator(),
        }
    }

    /// Whether each instance needs its own materialized copy.
    ///
    /// Generated defaults and mutable collections are unstable.
    #[must_use]
    pub fn is_unstable(&self) -> bool {
        match self {
            Self::Static(value) => value.is_container(),
            Self::Generated(_) => true,
        }
    }
}

/// Typed attribute slot declared on a model type.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    kind: Kind,
    default: DefaultValue,
    help: Option<String>,
    readonly: bool,
    serialized: bool,
    check: Option<Check>,
}

impl PropertyDescriptor {
    /// A serialized, writable property defaulting to the kind's natural
    /// default.
    #[must_use]
    pub fn new(name: &str, kind: Kind) -> Self {
        let default = DefaultValue::Static(kind.natural_default());
        Self {
            name: name.to_string(),
            kind,
            default,
            help: None,
            readonly: false,
            serialized: true,
            check: None,
        }
    }

    /// Sets a static default.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Static(value.into());
        self
    }

    /// Sets a generated default.
    #[must_use]
    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.default = DefaultValue::Generated(generator);
        self
    }

    /// Attaches help text.
    #[must_use]
    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    /// Adds an acceptance check run after kind validation.
    #[must_use]
    pub fn with_check(mut self, check: Check) -> Self {
        self.check = Some(check);
        self
    }

    /// Marks the property read-only for callers (the wire path may still set it).
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Excludes the property from serialization.
    #[must_use]
    pub fn unserialized(mut self) -> Self {
        self.serialized = false;
        self
    }

    /// Property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind.
    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Declared default, before any subtype override.
    #[must_use]
    pub fn default(&self) -> &DefaultValue {
        &self.default
    }

    /// Help text.
    #[must_use]
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Whether callers may not set the property.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether the property is sent over the wire.
    #[must_use]
    pub fn is_serialized(&self) -> bool {
        self.serialized
    }

    /// Validates `value` against the kind and check.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] naming the attribute, expected kind and
    /// offending value.
    pub fn validate(
        &self,
        class: &str,
        value: &Value,
        refs: &dyn ReferenceTypes,
    ) -> Result<(), ValidationError> {
        let reject = |detail: Option<String>| ValidationError {
            class: class.to_string(),
            attr: self.name.clone(),
            expected: self.kind.to_string(),
            got: value.describe(),
            detail,
        };
        if !self.kind.accepts(value, refs) {
            return Err(reject(None));
        }
        if let Some(check) = self.check {
            check(value).map_err(|reason| reject(Some(reason)))?;
        }
        Ok(())
    }

    /// Validates then coerces `value` into its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when validation fails.
    pub fn prepare(
        &self,
        class: &str,
        value: Value,
        refs: &dyn ReferenceTypes,
    ) -> Result<Value, ValidationError> {
        self.validate(class, &value, refs)?;
        Ok(self.kind.coerce(value, refs))
    }
}
