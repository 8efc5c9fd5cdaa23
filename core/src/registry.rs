//! Model type registry.
//!
//! Types are declared with a [`TypeDef`] and registered once, at startup,
//! into a [`TypeRegistry`]. Registration merges the parent's descriptor table
//! with the new type's own declarations and default overrides into an
//! immutable [`ModelClass`]. Documents and deserializers receive the registry
//! by reference (`Arc`); nothing reads a process-wide table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AttributeError, RegistryError};
use crate::property::{DefaultValue, Kind, NoReferences, PropertyDescriptor};
use crate::value::Value;

/// Name of the root type every model type descends from.
pub const BASE_TYPE: &str = "Model";

/// Declaration of a model type, consumed by [`TypeRegistry::register`].
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: String,
    extends: String,
    properties: Vec<PropertyDescriptor>,
    overrides: Vec<(String, DefaultValue)>,
    is_abstract: bool,
    data_model: bool,
}

impl TypeDef {
    /// A concrete type extending [`BASE_TYPE`].
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            extends: BASE_TYPE.to_string(),
            properties: Vec::new(),
            overrides: Vec::new(),
            is_abstract: false,
            data_model: false,
        }
    }

    /// Sets the parent type.
    #[must_use]
    pub fn extends(mut self, parent: &str) -> Self {
        self.extends = parent.to_string();
        self
    }

    /// Declares a property.
    #[must_use]
    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    /// Overrides the default of an inherited property.
    #[must_use]
    pub fn override_default(mut self, attr: &str, value: impl Into<Value>) -> Self {
        self.overrides
            .push((attr.to_string(), DefaultValue::Static(value.into())));
        self
    }

    /// Marks the type as not instantiable.
    #[must_use]
    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Marks the type as a user-defined data model, described to peers in
    /// snapshot `defs`.
    #[must_use]
    pub fn data_model(mut self) -> Self {
        self.data_model = true;
        self
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A registered model type with its merged descriptor table.
#[derive(Debug)]
pub struct ModelClass {
    name: String,
    chain: Vec<String>,
    properties: Vec<Arc<PropertyDescriptor>>,
    index: HashMap<String, usize>,
    defaults: HashMap<String, DefaultValue>,
    own_properties: Vec<String>,
    own_overrides: Vec<(String, DefaultValue)>,
    is_abstract: bool,
    data_model: bool,
}

impl ModelClass {
    /// Qualified type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inheritance chain, this type first and [`BASE_TYPE`] last.
    #[must_use]
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Direct parent, `None` for the base type.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.chain.get(1).map(String::as_str)
    }

    /// Whether this type is `ancestor` or descends from it.
    #[must_use]
    pub fn is_subtype_of(&self, ancestor: &str) -> bool {
        self.chain.iter().any(|t| t == ancestor)
    }

    /// Whether the type cannot be instantiated.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether the type is a user-defined data model.
    #[must_use]
    pub fn is_data_model(&self) -> bool {
        self.data_model
    }

    /// All descriptors, inherited ones first, in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().map(|p| &**p)
    }

    /// All property names, inherited ones first.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name())
    }

    /// Names of the properties declared by this type itself.
    #[must_use]
    pub fn own_properties(&self) -> &[String] {
        &self.own_properties
    }

    /// Default overrides declared by this type itself.
    #[must_use]
    pub fn own_overrides(&self) -> &[(String, DefaultValue)] {
        &self.own_overrides
    }

    /// Whether `name` is declared on this type or an ancestor.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Finds the descriptor for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError`] with near-miss suggestions when the name is
    /// not declared.
    pub fn lookup(&self, name: &str) -> Result<&PropertyDescriptor, AttributeError> {
        match self.index.get(name) {
            Some(&i) => Ok(&self.properties[i]),
            None => Err(self.attribute_error(name)),
        }
    }

    /// Effective default source: the most-derived override, falling back to
    /// the descriptor's own default.
    #[must_use]
    pub fn default_source(&self, name: &str) -> Option<&DefaultValue> {
        self.defaults.get(name)
    }

    /// Produces the effective default for `name`.
    #[must_use]
    pub fn class_default(&self, name: &str) -> Option<Value> {
        self.defaults.get(name).map(DefaultValue::produce)
    }

    fn attribute_error(&self, name: &str) -> AttributeError {
        let max = (name.chars().count() / 2).clamp(1, 3);
        let mut close: Vec<(usize, String)> = self
            .property_names()
            .filter_map(|candidate| {
                levenshtein_bounded(name, candidate, max).map(|d| (d, candidate.to_string()))
            })
            .collect();
        close.sort();
        if close.is_empty() {
            let mut all: Vec<String> = self.property_names().map(str::to_string).collect();
            all.sort();
            AttributeError {
                class: self.name.clone(),
                name: name.to_string(),
                similar: false,
                candidates: all,
            }
        } else {
            AttributeError {
                class: self.name.clone(),
                name: name.to_string(),
                similar: true,
                candidates: close.into_iter().take(3).map(|(_, c)| c).collect(),
            }
        }
    }
}

/// Edit distance between `a` and `b`, or `None` once it exceeds `max`.
fn levenshtein_bounded(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

/// Registry of model types, keyed by qualified name.
#[derive(Debug)]
pub struct TypeRegistry {
    classes: HashMap<String, Arc<ModelClass>>,
    order: Vec<String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry holding only the base `Model` type, which declares
    /// `name: Nullable(String)` and `tags: List(Any)`.
    #[must_use]
    pub fn new() -> Self {
        let properties = vec![
            Arc::new(
                PropertyDescriptor::new("name", Kind::nullable(Kind::String))
                    .with_help("An arbitrary, user-supplied name for this model."),
            ),
            Arc::new(
                PropertyDescriptor::new("tags", Kind::list(Kind::Any))
                    .with_help("An optional list of arbitrary, user-supplied values."),
            ),
        ];
        let base = ModelClass {
            name: BASE_TYPE.to_string(),
            chain: vec![BASE_TYPE.to_string()],
            index: properties
                .iter()
                .enumerate()
                .map(|(i, p)| (p.name().to_string(), i))
                .collect(),
            defaults: properties
                .iter()
                .map(|p| (p.name().to_string(), p.default().clone()))
                .collect(),
            own_properties: properties.iter().map(|p| p.name().to_string()).collect(),
            properties,
            own_overrides: Vec::new(),
            is_abstract: false,
            data_model: false,
        };
        let mut classes = HashMap::new();
        classes.insert(BASE_TYPE.to_string(), Arc::new(base));
        Self {
            classes,
            order: vec![BASE_TYPE.to_string()],
        }
    }

    /// Registers a type, merging its parent's table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for duplicate names, unknown parents,
    /// redeclared properties, overrides of unknown properties, and defaults
    /// that do not satisfy their kind.
    pub fn register(&mut self, def: TypeDef) -> Result<Arc<ModelClass>, RegistryError> {
        if self.classes.contains_key(&def.name) {
            return Err(RegistryError::DuplicateType { name: def.name });
        }
        let parent = self
            .classes
            .get(&def.extends)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownParent {
                name: def.name.clone(),
                parent: def.extends.clone(),
            })?;

        let mut properties = parent.properties.clone();
        let mut index = parent.index.clone();
        let mut defaults = parent.defaults.clone();
        let mut own_properties = Vec::with_capacity(def.properties.len());

        for descriptor in def.properties {
            if index.contains_key(descriptor.name()) {
                return Err(RegistryError::RedeclaredProperty {
                    name: def.name,
                    attr: descriptor.name().to_string(),
                });
            }
            check_default(&def.name, &descriptor, descriptor.default())?;
            index.insert(descriptor.name().to_string(), properties.len());
            defaults.insert(descriptor.name().to_string(), descriptor.default().clone());
            own_properties.push(descriptor.name().to_string());
            properties.push(Arc::new(descriptor));
        }

        for (attr, default) in &def.overrides {
            let Some(&i) = index.get(attr) else {
                return Err(RegistryError::UnknownOverride {
                    name: def.name,
                    attr: attr.clone(),
                });
            };
            check_default(&def.name, &properties[i], default)?;
            defaults.insert(attr.clone(), default.clone());
        }

        let mut chain = Vec::with_capacity(parent.chain.len() + 1);
        chain.push(def.name.clone());
        chain.extend(parent.chain.iter().cloned());

        let class = Arc::new(ModelClass {
            name: def.name.clone(),
            chain,
            properties,
            index,
            defaults,
            own_properties,
            own_overrides: def.overrides,
            is_abstract: def.is_abstract,
            data_model: def.data_model,
        });
        tracing::trace!(model_type = %def.name, "registered model type");
        self.classes.insert(def.name.clone(), Arc::clone(&class));
        self.order.push(def.name);
        Ok(class)
    }

    /// Registers several types in order.
    ///
    /// # Errors
    ///
    /// Stops at the first [`RegistryError`].
    pub fn register_all(
        &mut self,
        defs: impl IntoIterator<Item = TypeDef>,
    ) -> Result<(), RegistryError> {
        for def in defs {
            self.register(def)?;
        }
        Ok(())
    }

    /// Finds a type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ModelClass>> {
        self.classes.get(name)
    }

    /// Finds a type by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownType`] when the name is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<ModelClass>, RegistryError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Whether `child` is `ancestor` or descends from it.
    #[must_use]
    pub fn is_subtype(&self, child: &str, ancestor: &str) -> bool {
        self.classes
            .get(child)
            .is_some_and(|class| class.is_subtype_of(ancestor))
    }

    /// All types in registration order.
    pub fn types(&self) -> impl Iterator<Item = &ModelClass> {
        self.order
            .iter()
            .filter_map(|name| self.classes.get(name))
            .map(|class| &**class)
    }

    /// Types registered as data models, in registration order.
    pub fn data_models(&self) -> impl Iterator<Item = &ModelClass> {
        self.types().filter(|class| class.is_data_model())
    }

    /// Number of registered types, including the base type.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false: the base type is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn check_default(
    type_name: &str,
    descriptor: &PropertyDescriptor,
    default: &DefaultValue,
) -> Result<(), RegistryError> {
    let value = default.produce();
    // Null stands for "no value yet", e.g. an Instance that must be assigned.
    if value.is_null() {
        return Ok(());
    }
    descriptor
        .validate(type_name, &value, &NoReferences)
        .map_err(|err| RegistryError::InvalidDefault {
            name: type_name.to_string(),
            attr: descriptor.name().to_string(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDef::new("Widget")
                    .abstract_()
                    .property(PropertyDescriptor::new("disabled", Kind::Bool)),
            )
            .expect("Widget registers");
        registry
            .register(
                TypeDef::new("Slider")
                    .extends("Widget")
                    .property(PropertyDescriptor::new("value", Kind::Float).with_default(0.5))
                    .property(PropertyDescriptor::new("title", Kind::String)),
            )
            .expect("Slider registers");
        registry
            .register(
                TypeDef::new("LockedSlider")
                    .extends("Slider")
                    .override_default("disabled", true)
                    .override_default("value", 1.0),
            )
            .expect("LockedSlider registers");
        registry
    }

    #[test]
    fn inherited_properties_come_first() {
        let registry = registry();
        let slider = registry.get("Slider").expect("registered");
        let names: Vec<&str> = slider.property_names().collect();
        assert_eq!(names, vec!["name", "tags", "disabled", "value", "title"]);
        assert_eq!(slider.chain(), ["Slider", "Widget", "Model"]);
    }

    #[test]
    fn most_derived_override_wins() {
        let registry = registry();
        let locked = registry.get("LockedSlider").expect("registered");
        assert_eq!(locked.class_default("disabled"), Some(Value::Bool(true)));
        assert_eq!(locked.class_default("value"), Some(Value::Float(1.0)));
        let slider = registry.get("Slider").expect("registered");
        assert_eq!(slider.class_default("disabled"), Some(Value::Bool(false)));
    }

    #[test]
    fn registration_errors() {
        let mut registry = registry();
        assert!(matches!(
            registry.register(TypeDef::new("Slider")),
            Err(RegistryError::DuplicateType { .. })
        ));
        assert!(matches!(
            registry.register(TypeDef::new("Orphan").extends("Missing")),
            Err(RegistryError::UnknownParent { .. })
        ));
        assert!(matches!(
            registry.register(
                TypeDef::new("Redeclare")
                    .extends("Slider")
                    .property(PropertyDescriptor::new("value", Kind::Int))
            ),
            Err(RegistryError::RedeclaredProperty { .. })
        ));
        assert!(matches!(
            registry.register(TypeDef::new("Bad").override_default("nope", 1)),
            Err(RegistryError::UnknownOverride { .. })
        ));
        assert!(matches!(
            registry.register(
                TypeDef::new("BadDefault").extends("Slider").override_default("value", "high")
            ),
            Err(RegistryError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn lookup_suggests_near_misses() {
        let registry = registry();
        let slider = registry.get("Slider").expect("registered");
        let err = slider.lookup("vlaue").expect_err("unknown");
        assert!(err.similar);
        assert_eq!(err.candidates, vec!["value".to_string()]);

        let err = slider.lookup("zzzzzzzzzz").expect_err("unknown");
        assert!(!err.similar);
        assert!(err.candidates.contains(&"title".to_string()));
    }

    #[test]
    fn subtype_queries() {
        let registry = registry();
        assert!(registry.is_subtype("LockedSlider", "Widget"));
        assert!(registry.is_subtype("Slider", BASE_TYPE));
        assert!(!registry.is_subtype("Widget", "Slider"));
        assert!(registry.get("Widget").expect("registered").is_abstract());
    }

    #[test]
    fn levenshtein_bounds() {
        assert_eq!(levenshtein_bounded("abc", "abc", 2), Some(0));
        assert_eq!(levenshtein_bounded("abc", "abd", 2), Some(1));
        assert_eq!(levenshtein_bounded("abc", "xyz", 1), None);
        assert_eq!(levenshtein_bounded("", "ab", 2), Some(2));
    }
}
