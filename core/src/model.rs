//! Model instances: identity plus a name → value store checked against the
//! type's descriptor table.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::containers::ChangeHint;
use crate::error::{AttributeError, DocumentError, Error, RegistryError};
use crate::id::ModelId;
use crate::property::ReferenceTypes;
use crate::registry::ModelClass;
use crate::value::Value;

/// A single observable change to one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Model that changed.
    pub model: ModelId,
    /// Attribute that changed.
    pub attr: String,
    /// Effective value before the change.
    pub old: Value,
    /// Effective value after the change.
    pub new: Value,
    /// Narrow description of a container mutation, when one is available.
    pub hint: Option<ChangeHint>,
}

/// Attribute access checked against declared properties.
pub trait PropertyBag {
    /// Reads the effective value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError`] when `name` is not declared.
    fn get(&self, name: &str) -> Result<Value, AttributeError>;

    /// Validates, coerces and stores `value`.
    ///
    /// Returns `None` when the new value equals the current one, in which case
    /// nothing is stored and no change should be reported.
    ///
    /// # Errors
    ///
    /// Returns an attribute, read-only or validation error; the previous value
    /// is kept.
    fn set(
        &mut self,
        name: &str,
        value: Value,
        refs: &dyn ReferenceTypes,
    ) -> Result<Option<PropertyChange>, Error>;
}

/// A model instance.
#[derive(Debug)]
pub struct Model {
    id: ModelId,
    class: Arc<ModelClass>,
    property_values: HashMap<String, Value>,
    unstable_default_values: HashMap<String, Value>,
    themed_values: Option<Arc<HashMap<String, Value>>>,
}

impl Model {
    /// Creates a detached instance with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AbstractType`] for abstract types.
    pub fn new(class: Arc<ModelClass>) -> Result<Self, RegistryError> {
        Self::with_id(class, ModelId::new())
    }

    /// Creates a detached instance with a given id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AbstractType`] for abstract types.
    pub fn with_id(class: Arc<ModelClass>, id: ModelId) -> Result<Self, RegistryError> {
        if class.is_abstract() {
            return Err(RegistryError::AbstractType {
                name: class.name().to_string(),
            });
        }
        let mut model = Self {
            id,
            class,
            property_values: HashMap::new(),
            unstable_default_values: HashMap::new(),
            themed_values: None,
        };
        let names: Vec<String> = model.class.property_names().map(str::to_string).collect();
        for name in names {
            model.materialize_default(&name);
        }
        Ok(model)
    }

    /// Identity.
    #[must_use]
    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// Type.
    #[must_use]
    pub fn class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    /// Qualified type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.class.name()
    }

    /// Property names, inherited ones first.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.class.property_names()
    }

    /// The optional user-assigned label.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        match self.value_cow("name") {
            Ok(value) => value.as_str().map(str::to_string),
            Err(_) => None,
        }
    }

    /// Whether `name` was explicitly set (or mutated in place).
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.property_values.contains_key(name)
    }

    /// Borrows the effective value of `name` when it is stored, producing the
    /// class default otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError`] when `name` is not declared.
    pub fn value_cow(&self, name: &str) -> Result<Cow<'_, Value>, AttributeError> {
        self.class.lookup(name)?;
        if let Some(value) = self.property_values.get(name) {
            return Ok(Cow::Borrowed(value));
        }
        if let Some(value) = self.themed_values.as_ref().and_then(|t| t.get(name)) {
            return Ok(Cow::Borrowed(value));
        }
        if let Some(value) = self.unstable_default_values.get(name) {
            return Ok(Cow::Borrowed(value));
        }
        Ok(Cow::Owned(self.class.class_default(name).unwrap_or(Value::Null)))
    }

    fn effective(&self, name: &str) -> Value {
        self.value_cow(name)
            .map(Cow::into_owned)
            .unwrap_or(Value::Null)
    }

    fn materialize_default(&mut self, name: &str) {
        if let Some(source) = self.class.default_source(name) {
            if source.is_unstable() {
                self.unstable_default_values
                    .insert(name.to_string(), source.produce());
            }
        }
    }

    /// Wire-path set: unknown attributes are logged and skipped, read-only
    /// attributes are writable.
    ///
    /// # Errors
    ///
    /// Returns a validation error; the previous value is kept.
    pub fn set_from_json(
        &mut self,
        name: &str,
        value: Value,
        refs: &dyn ReferenceTypes,
    ) -> Result<Option<PropertyChange>, Error> {
        if !self.class.has_property(name) {
            tracing::warn!(
                model = %self.id,
                model_type = self.class.name(),
                attr = name,
                "ignoring unknown attribute received from peer"
            );
            return Ok(None);
        }
        self.assign(name, value, refs)
    }

    fn assign(
        &mut self,
        name: &str,
        value: Value,
        refs: &dyn ReferenceTypes,
    ) -> Result<Option<PropertyChange>, Error> {
        let descriptor = self.class.lookup(name)?;
        let new = descriptor.prepare(self.class.name(), value, refs)?;
        Ok(self.assign_prepared(name, new))
    }

    /// Stores an already validated value unless it equals the current one.
    pub(crate) fn assign_prepared(&mut self, name: &str, new: Value) -> Option<PropertyChange> {
        let old = self.effective(name);
        if old == new {
            return None;
        }
        self.unstable_default_values.remove(name);
        self.property_values.insert(name.to_string(), new.clone());
        Some(PropertyChange {
            model: self.id.clone(),
            attr: name.to_string(),
            old,
            new,
            hint: None,
        })
    }

    /// Stores the already validated result of an in-place container
    /// mutation. There is no equality short-circuit.
    pub(crate) fn store_mutated(&mut self, name: &str, new: Value) {
        self.unstable_default_values.remove(name);
        self.property_values.insert(name.to_string(), new);
    }

    /// Sets several attributes in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first failing attribute's error; earlier ones stay set.
    pub fn update<'a>(
        &mut self,
        values: impl IntoIterator<Item = (&'a str, Value)>,
        refs: &dyn ReferenceTypes,
    ) -> Result<Vec<PropertyChange>, Error> {
        let mut changes = Vec::new();
        for (name, value) in values {
            if let Some(change) = self.set(name, value, refs)? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Property values, optionally leaving out those still at their default.
    ///
    /// Non-default values are the explicitly set ones, themed ones, and
    /// generated defaults that are not collections.
    #[must_use]
    pub fn properties_with_values(&self, include_defaults: bool) -> Vec<(String, Value)> {
        self.class
            .property_names()
            .filter(|name| include_defaults || self.is_non_default(name))
            .map(|name| (name.to_string(), self.effective(name)))
            .collect()
    }

    fn is_non_default(&self, name: &str) -> bool {
        self.property_values.contains_key(name)
            || self
                .themed_values
                .as_ref()
                .is_some_and(|t| t.contains_key(name))
            || self
                .unstable_default_values
                .get(name)
                .is_some_and(|v| !v.is_container())
    }

    /// Like [`Model::properties_with_values`], restricted to serialized
    /// properties.
    #[must_use]
    pub fn serializable_values(&self, include_defaults: bool) -> Vec<(String, Value)> {
        self.properties_with_values(include_defaults)
            .into_iter()
            .filter(|(name, _)| {
                self.class
                    .lookup(name)
                    .is_ok_and(|descriptor| descriptor.is_serialized())
            })
            .collect()
    }

    /// Names of properties whose kind may hold references.
    pub fn properties_with_refs(&self) -> impl Iterator<Item = &str> {
        self.class
            .properties()
            .filter(|p| p.kind().has_refs())
            .map(|p| p.name())
    }

    /// Models referenced directly by this model's properties.
    ///
    /// Nested collections and records are searched; referenced models are not.
    #[must_use]
    pub fn references(&self) -> Vec<ModelId> {
        let mut out = Vec::new();
        for name in self.properties_with_refs() {
            if let Ok(value) = self.value_cow(name) {
                value.collect_refs(&mut out);
            }
        }
        out.retain(|id| id != &self.id);
        out
    }

    /// The theme overlay currently applied.
    #[must_use]
    pub fn themed_values(&self) -> Option<&HashMap<String, Value>> {
        self.themed_values.as_deref()
    }

    /// Applies theme overrides, returning a change for every attribute whose
    /// effective value moved.
    pub fn apply_theme(&mut self, overrides: &HashMap<String, Value>) -> Vec<PropertyChange> {
        let known: HashMap<String, Value> = overrides
            .iter()
            .filter(|(name, _)| self.class.has_property(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let current = self.themed_values.as_deref();
        if current.map_or(known.is_empty(), |c| *c == known) {
            return Vec::new();
        }

        let affected: Vec<String> = self
            .class
            .property_names()
            .filter(|name| known.contains_key(*name) || current.is_some_and(|c| c.contains_key(*name)))
            .map(str::to_string)
            .collect();
        let old: Vec<Value> = affected.iter().map(|name| self.effective(name)).collect();

        self.themed_values = if known.is_empty() {
            None
        } else {
            Some(Arc::new(known))
        };
        for name in &affected {
            self.unstable_default_values.remove(name);
            self.materialize_default(name);
        }

        affected
            .into_iter()
            .zip(old)
            .filter_map(|(attr, old)| {
                let new = self.effective(&attr);
                (old != new).then(|| PropertyChange {
                    model: self.id.clone(),
                    attr,
                    old,
                    new,
                    hint: None,
                })
            })
            .collect()
    }

    /// Removes any theme overlay.
    pub fn unapply_theme(&mut self) -> Vec<PropertyChange> {
        self.apply_theme(&HashMap::new())
    }

    /// A new instance (fresh id) of the same type with the same non-default
    /// property values.
    ///
    /// # Errors
    ///
    /// Cannot fail for instances of registered concrete types; the error
    /// type is shared with [`Model::new`].
    pub fn duplicate(&self) -> Result<Self, RegistryError> {
        let mut copy = Self::new(Arc::clone(&self.class))?;
        for (name, value) in self.properties_with_values(false) {
            copy.unstable_default_values.remove(&name);
            copy.property_values.insert(name, value);
        }
        Ok(copy)
    }

    /// Structural equality: same type and equal effective property values.
    /// Identity is not compared.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.class.name() == other.class.name()
            && self.properties_with_values(true) == other.properties_with_values(true)
    }
}

impl PropertyBag for Model {
    fn get(&self, name: &str) -> Result<Value, AttributeError> {
        self.value_cow(name).map(Cow::into_owned)
    }

    fn set(
        &mut self,
        name: &str,
        value: Value,
        refs: &dyn ReferenceTypes,
    ) -> Result<Option<PropertyChange>, Error> {
        let descriptor = self.class.lookup(name)?;
        if descriptor.is_readonly() {
            return Err(DocumentError::Readonly {
                class: self.class.name().to_string(),
                attr: name.to_string(),
            }
            .into());
        }
        self.assign(name, value, refs)
    }
}
