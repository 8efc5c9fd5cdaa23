//! Model storage keyed by identity, and reachability over references.

use std::collections::{HashMap, HashSet};

use crate::id::ModelId;
use crate::model::Model;
use crate::property::ReferenceTypes;

/// Read access to models by id.
pub trait ModelLookup {
    /// The model with this id, if present.
    fn model(&self, id: &ModelId) -> Option<&Model>;
}

/// Owns every model of a document, attached or not.
#[derive(Debug, Default)]
pub struct ModelArena {
    models: HashMap<ModelId, Model>,
}

impl ModelArena {
    /// An empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a model, replacing any model with the same id.
    pub fn insert(&mut self, model: Model) -> Option<Model> {
        self.models.insert(model.id().clone(), model)
    }

    /// Removes and returns a model.
    pub fn remove(&mut self, id: &ModelId) -> Option<Model> {
        self.models.remove(id)
    }

    /// Borrows a model.
    #[must_use]
    pub fn get(&self, id: &ModelId) -> Option<&Model> {
        self.models.get(id)
    }

    /// Mutably borrows a model.
    pub fn get_mut(&mut self, id: &ModelId) -> Option<&mut Model> {
        self.models.get_mut(id)
    }

    /// Whether a model with this id is stored.
    #[must_use]
    pub fn contains(&self, id: &ModelId) -> bool {
        self.models.contains_key(id)
    }

    /// Number of stored models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Every stored model, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    /// Drops every model whose id is not in `keep`.
    pub fn retain(&mut self, keep: &HashSet<ModelId>) {
        self.models.retain(|id, _| keep.contains(id));
    }
}

impl IntoIterator for ModelArena {
    type Item = Model;
    type IntoIter = std::collections::hash_map::IntoValues<ModelId, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.into_values()
    }
}

impl Extend<Model> for ModelArena {
    fn extend<I: IntoIterator<Item = Model>>(&mut self, models: I) {
        for model in models {
            self.insert(model);
        }
    }
}

impl ModelLookup for ModelArena {
    fn model(&self, id: &ModelId) -> Option<&Model> {
        self.models.get(id)
    }
}

impl ReferenceTypes for ModelArena {
    fn type_chain(&self, id: &ModelId) -> Option<&[String]> {
        self.models.get(id).map(|model| model.class().chain())
    }
}

/// Every model reachable from `roots`, roots included, in discovery order.
///
/// Ids missing from `lookup` are skipped. Cycles terminate through the
/// visited set.
pub fn collect_closure<'a>(
    lookup: &dyn ModelLookup,
    roots: impl IntoIterator<Item = &'a ModelId>,
) -> Vec<ModelId> {
    let mut visited: HashSet<ModelId> = HashSet::new();
    let mut order = Vec::new();
    let mut worklist: Vec<ModelId> = roots.into_iter().cloned().collect();
    worklist.reverse();
    while let Some(id) = worklist.pop() {
        if visited.contains(&id) {
            continue;
        }
        let Some(model) = lookup.model(&id) else {
            continue;
        };
        visited.insert(id.clone());
        order.push(id);
        let mut refs = model.references();
        refs.reverse();
        worklist.extend(refs.into_iter().filter(|r| !visited.contains(r)));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyBag;
    use crate::property::{Kind, PropertyDescriptor};
    use crate::registry::{TypeDef, TypeRegistry};
    use crate::value::Value;

    fn arena_with_cycle() -> (ModelArena, ModelId, ModelId, ModelId) {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDef::new("Node")
                    .property(PropertyDescriptor::new("next", Kind::list(Kind::instance("Node")))),
            )
            .expect("registers");
        let class = registry.resolve("Node").expect("known");
        let mut arena = ModelArena::new();
        let a = Model::new(class.clone()).expect("concrete");
        let b = Model::new(class.clone()).expect("concrete");
        let c = Model::new(class).expect("concrete");
        let (ia, ib, ic) = (a.id().clone(), b.id().clone(), c.id().clone());
        arena.insert(a);
        arena.insert(b);
        arena.insert(c);
        let link = |arena: &mut ModelArena, from: &ModelId, to: &ModelId| {
            let mut model = arena.remove(from).expect("present");
            model
                .set("next", Value::list([Value::Ref(to.clone())]), &*arena)
                .expect("valid reference");
            arena.insert(model);
        };
        link(&mut arena, &ia, &ib);
        link(&mut arena, &ib, &ia);
        (arena, ia, ib, ic)
    }

    #[test]
    fn closure_terminates_on_cycles() {
        let (arena, a, b, c) = arena_with_cycle();
        let reached = collect_closure(&arena, [&a]);
        assert_eq!(reached, vec![a.clone(), b.clone()]);
        assert!(!reached.contains(&c));
    }

    #[test]
    fn closure_skips_unknown_roots() {
        let (arena, _, _, c) = arena_with_cycle();
        let missing = ModelId::from_raw("missing");
        assert_eq!(collect_closure(&arena, [&missing, &c]), vec![c]);
    }
}
