//! Documents: a set of root models, the index of every model reachable from
//! them, and the event bus that reports changes to that graph.
//!
//! A [`Document`] owns its models in a [`ModelArena`]. Models are created
//! detached; they become attached (indexed, themed, reported on) when they are
//! reachable from a root, and detached again when the last path from a root
//! goes away. Every change to an attached model is wrapped as a
//! [`DocumentChangedEvent`] and delivered to callbacks, unless the document is
//! held, in which case events are collected (or combined) until
//! [`Document::unhold`].

pub mod callbacks;
pub mod events;
mod models;
pub mod selector;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value as Json};

use crate::arena::{collect_closure, ModelArena, ModelLookup};
use crate::config::Settings;
use crate::containers::{
    ChangeHint, ContainerChange, ContainerHost, PropertyValueColumnData, PropertyValueDict,
    PropertyValueList, PropertyValueSet,
};
use crate::error::{DeserializationError, DocumentError, Error, Result};
use crate::id::{CallbackId, DocumentId, ModelId, SetterId};
use crate::model::{Model, PropertyBag, PropertyChange};
use crate::registry::{ModelClass, TypeRegistry};
use crate::serialization::{Deserializer, Serialized, Serializer};
use crate::theme::Theme;
use crate::value::Value;

pub use callbacks::{
    ChangeCallback, HoldPolicy, MessageCallback, PropertyCallback, SessionCallback,
    SessionCallbackFn, SessionSchedule,
};
pub use events::{should_suppress_on_change, DocumentChange, DocumentChangedEvent, PatchEvent};
pub use selector::Selector;

use callbacks::DocumentCallbacks;
use models::{DocumentModels, IndexDelta};

/// Version string written into document snapshots.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A synchronized model graph.
pub struct Document {
    id: DocumentId,
    registry: Arc<TypeRegistry>,
    settings: Settings,
    arena: ModelArena,
    roots: Vec<ModelId>,
    title: String,
    theme: Theme,
    models: DocumentModels,
    callbacks: DocumentCallbacks,
    origin: Option<Origin>,
}

// Where the changes currently being made come from. Only set around the
// replay of received state; callbacks reacting to it run without one.
#[derive(Debug, Clone)]
struct Origin {
    setter: SetterId,
    received: Option<PatchEvent>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("roots", &self.roots)
            .field("models", &self.models.len())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

// Attached models only: what a peer can legitimately refer to.
struct Attached<'d>(&'d Document);

impl ModelLookup for Attached<'_> {
    fn model(&self, id: &ModelId) -> Option<&Model> {
        self.0.get_by_id(id)
    }
}

impl Document {
    /// An empty document with default settings.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_settings(registry, Settings::default())
    }

    /// An empty document.
    #[must_use]
    pub fn with_settings(registry: Arc<TypeRegistry>, settings: Settings) -> Self {
        Self {
            id: DocumentId::new(),
            registry,
            title: settings.default_title.clone(),
            settings,
            arena: ModelArena::new(),
            roots: Vec::new(),
            theme: Theme::empty(),
            models: DocumentModels::default(),
            callbacks: DocumentCallbacks::default(),
            origin: None,
        }
    }

    /// Identity of this document.
    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Types this document can hold.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Creates a detached model of `type_name` with default values.
    ///
    /// # Errors
    ///
    /// Returns a registry error for unknown or abstract types.
    pub fn create(&mut self, type_name: &str) -> Result<ModelId> {
        let class = self.registry.resolve(type_name)?;
        let model = Model::with_id(class, self.mint_id())?;
        let id = model.id().clone();
        self.arena.insert(model);
        Ok(id)
    }

    /// Creates a detached model and sets the given attributes.
    ///
    /// # Errors
    ///
    /// Returns a registry error for unknown or abstract types, and the first
    /// attribute or validation error; the model is discarded in that case.
    pub fn create_with<'a>(
        &mut self,
        type_name: &str,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<ModelId> {
        let class = self.registry.resolve(type_name)?;
        let mut model = Model::with_id(class, self.mint_id())?;
        model.update(values, &self.arena)?;
        let id = model.id().clone();
        self.arena.insert(model);
        Ok(id)
    }

    fn mint_id(&self) -> ModelId {
        if self.settings.unique_ids {
            ModelId::unique()
        } else {
            ModelId::new()
        }
    }

    /// Takes ownership of a detached model built elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidOperation`] when a model with the same
    /// id already belongs to this document.
    pub fn insert_model(&mut self, model: Model) -> Result<ModelId> {
        let id = model.id().clone();
        if self.arena.contains(&id) {
            return Err(DocumentError::invalid(
                "insert_model",
                format!("model {id} already belongs to this document"),
            )
            .into());
        }
        self.arena.insert(model);
        Ok(id)
    }

    /// Any model owned by this document, attached or not.
    #[must_use]
    pub fn model(&self, id: &ModelId) -> Option<&Model> {
        self.arena.get(id)
    }

    /// An attached model.
    #[must_use]
    pub fn get_by_id(&self, id: &ModelId) -> Option<&Model> {
        if self.models.contains(id) {
            self.arena.get(id)
        } else {
            None
        }
    }

    /// The attached model named `name`, if exactly one is.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::MultipleModels`] when several attached models
    /// share the name.
    pub fn get_by_name(&self, name: &str) -> std::result::Result<Option<&Model>, DocumentError> {
        match self.models.named(name) {
            [] => Ok(None),
            [one] => Ok(self.arena.get(one)),
            _ => Err(DocumentError::MultipleModels {
                query: format!("name={name:?}"),
            }),
        }
    }

    /// Attached models in discovery order from the roots.
    #[must_use]
    pub fn models(&self) -> Vec<&Model> {
        self.attached_in_order()
            .iter()
            .filter_map(|id| self.get_by_id(id))
            .collect()
    }

    /// Number of attached models.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Number of roots reaching an attached model, zero when detached.
    #[must_use]
    pub fn reference_count(&self, id: &ModelId) -> usize {
        self.models.refcount(id)
    }

    fn attached_in_order(&self) -> Vec<ModelId> {
        collect_closure(&self.arena, self.roots.iter())
            .into_iter()
            .filter(|id| self.models.contains(id))
            .collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Attached models matching `selector`.
    #[must_use]
    pub fn select(&self, selector: &Selector) -> Vec<&Model> {
        match selector.name() {
            Some(name) => {
                let mut found: Vec<&Model> = self
                    .models
                    .named(name)
                    .iter()
                    .filter_map(|id| self.arena.get(id))
                    .filter(|model| selector.matches(model))
                    .collect();
                found.sort_by(|a, b| a.id().cmp(b.id()));
                found
            }
            None => self
                .models()
                .into_iter()
                .filter(|model| selector.matches(model))
                .collect(),
        }
    }

    /// The one attached model matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::MultipleModels`] when several match.
    pub fn select_one(&self, selector: &Selector) -> std::result::Result<Option<&Model>, DocumentError> {
        let mut found = self.select(selector);
        if found.len() > 1 {
            return Err(DocumentError::MultipleModels {
                query: selector.to_string(),
            });
        }
        Ok(found.pop())
    }

    /// Models reachable from `root` (itself included) matching `selector`.
    #[must_use]
    pub fn select_from(&self, root: &ModelId, selector: &Selector) -> Vec<&Model> {
        collect_closure(&self.arena, [root])
            .iter()
            .filter_map(|id| self.arena.get(id))
            .filter(|model| selector.matches(model))
            .collect()
    }

    /// Sets `updates` on every attached model matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns the first attribute or validation error; earlier assignments
    /// stay in place.
    pub fn set_select(&mut self, selector: &Selector, updates: &[(&str, Value)]) -> Result<()> {
        let ids: Vec<ModelId> = self
            .select(selector)
            .iter()
            .map(|model| model.id().clone())
            .collect();
        self.batch(|doc| {
            for id in &ids {
                for (attr, value) in updates {
                    doc.set(id, attr, value.clone())?;
                }
            }
            Ok(())
        })
    }

    // ========================================================================
    // Attribute access
    // ========================================================================

    fn owned_model(&self, id: &ModelId) -> std::result::Result<&Model, DocumentError> {
        self.arena
            .get(id)
            .ok_or_else(|| DocumentError::UnknownModel { id: id.clone() })
    }

    /// Effective value of `model.attr`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown models or attributes.
    pub fn get(&self, model: &ModelId, attr: &str) -> Result<Value> {
        Ok(self.owned_model(model)?.get(attr)?)
    }

    /// Validates and stores `value`, reporting a change unless the value is
    /// equal to the current one.
    ///
    /// # Errors
    ///
    /// Returns an attribute, read-only or validation error; the previous value
    /// is kept.
    pub fn set(&mut self, model: &ModelId, attr: &str, value: impl Into<Value>) -> Result<()> {
        self.assign(model, attr, value.into(), false)
    }

    /// Wire-path set: unknown attributes are logged and skipped and read-only
    /// attributes are writable.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown models or invalid values.
    pub fn set_from_json(&mut self, model: &ModelId, attr: &str, value: Value) -> Result<()> {
        self.assign(model, attr, value, true)
    }

    /// Sets several attributes of one model inside a single freeze bracket.
    ///
    /// # Errors
    ///
    /// Returns the first failing attribute's error; earlier ones stay set.
    pub fn update<'a>(
        &mut self,
        model: &ModelId,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<()> {
        self.batch(|doc| {
            for (attr, value) in values {
                doc.set(model, attr, value)?;
            }
            Ok(())
        })
    }

    fn assign(&mut self, id: &ModelId, attr: &str, value: Value, from_wire: bool) -> Result<()> {
        let class = Arc::clone(self.owned_model(id)?.class());
        if from_wire && !class.has_property(attr) {
            tracing::warn!(
                model = %id,
                model_type = class.name(),
                attr,
                "ignoring unknown attribute received from peer"
            );
            return Ok(());
        }
        let descriptor = class.lookup(attr)?;
        if !from_wire && descriptor.is_readonly() {
            return Err(DocumentError::Readonly {
                class: class.name().to_string(),
                attr: attr.to_string(),
            }
            .into());
        }
        let new = descriptor.prepare(class.name(), value, &self.arena)?;
        let change = self
            .arena
            .get_mut(id)
            .and_then(|model| model.assign_prepared(attr, new));
        if let Some(change) = change {
            self.notify_change(change, None);
        }
        Ok(())
    }

    /// Mutation-tracking view of a list-valued attribute.
    pub fn list_mut(&mut self, model: &ModelId, attr: &str) -> PropertyValueList<'_, Self> {
        PropertyValueList::new(self, model, attr)
    }

    /// Mutation-tracking view of a map-valued attribute.
    pub fn dict_mut(&mut self, model: &ModelId, attr: &str) -> PropertyValueDict<'_, Self> {
        PropertyValueDict::new(self, model, attr)
    }

    /// Mutation-tracking view of a set-valued attribute.
    pub fn set_mut(&mut self, model: &ModelId, attr: &str) -> PropertyValueSet<'_, Self> {
        PropertyValueSet::new(self, model, attr)
    }

    /// Mutation-tracking view of a columnar-data attribute.
    pub fn columns_mut(&mut self, model: &ModelId, attr: &str) -> PropertyValueColumnData<'_, Self> {
        PropertyValueColumnData::new(self, model, attr)
    }

    // ========================================================================
    // Roots and the model index
    // ========================================================================

    /// Roots in insertion order.
    #[must_use]
    pub fn roots(&self) -> &[ModelId] {
        &self.roots
    }

    /// Makes `id` a root, attaching everything it reaches. Adding an existing
    /// root does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnknownModel`] when the model does not belong
    /// to this document.
    pub fn add_root(&mut self, id: &ModelId) -> Result<()> {
        if self.roots.contains(id) {
            return Ok(());
        }
        self.owned_model(id)?;
        self.roots.push(id.clone());
        let closure = collect_closure(&self.arena, [id]);
        let delta = self.models.add_root_closure(&self.arena, &closure);
        tracing::debug!(
            document = ?self.id,
            root = %id,
            attached = delta.attached.len(),
            "root added"
        );
        self.after_index_change(delta);
        self.trigger_patch(PatchEvent::RootAdded { model: id.clone() });
        Ok(())
    }

    /// Removes a root, detaching what no other root reaches. Removing a model
    /// that is not a root does nothing.
    pub fn remove_root(&mut self, id: &ModelId) {
        let Some(position) = self.roots.iter().position(|root| root == id) else {
            return;
        };
        self.roots.remove(position);
        let closure = collect_closure(&self.arena, [id]);
        let remaining: HashSet<ModelId> = collect_closure(&self.arena, self.roots.iter())
            .into_iter()
            .collect();
        let delta = self
            .models
            .remove_root_closure(&self.arena, &closure, &remaining);
        tracing::debug!(
            document = ?self.id,
            root = %id,
            detached = delta.detached.len(),
            "root removed"
        );
        self.after_index_change(delta);
        self.trigger_patch(PatchEvent::RootRemoved { model: id.clone() });
    }

    /// Removes every root and drops every model.
    pub fn clear(&mut self) {
        self.batch(|doc| {
            for root in doc.roots.clone() {
                doc.remove_root(&root);
            }
        });
        let detached = self.models.clear();
        if !detached.is_empty() {
            tracing::debug!(document = ?self.id, detached = detached.len(), "document cleared");
        }
        self.arena.retain(&HashSet::new());
        self.callbacks.retain_properties(|_| false);
    }

    /// Runs `f` inside a freeze bracket: index recomputation is deferred
    /// until the outermost bracket closes.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.models.push_freeze();
        let result = f(self);
        if self.models.pop_freeze() {
            self.recompute_models();
        }
        self.sweep();
        result
    }

    /// Runs `f` with the changes it makes tagged as originating from `setter`.
    /// Changes made by property callbacks in reaction stay untagged.
    pub fn with_setter<R>(&mut self, setter: SetterId, f: impl FnOnce(&mut Self) -> R) -> R {
        self.with_origin(
            Some(Origin {
                setter,
                received: None,
            }),
            f,
        )
    }

    fn with_origin<R>(&mut self, origin: Option<Origin>, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.origin, origin);
        let result = f(self);
        self.origin = previous;
        result
    }

    /// Whether `id` was attached to this document at some point and has since
    /// been detached.
    #[must_use]
    pub fn seen(&self, id: &ModelId) -> bool {
        self.models.seen(id)
    }

    /// Attached models the peer is known to hold.
    #[must_use]
    pub fn synced_references(&self) -> &HashSet<ModelId> {
        self.models.synced()
    }

    /// Marks every attached model as known to the peer.
    pub fn flush_synced(&mut self) {
        self.models.flush_synced();
    }

    fn invalidate_models(&mut self) {
        if self.models.invalidate() {
            self.recompute_models();
        }
    }

    fn recompute_models(&mut self) {
        let delta = self.models.recompute(&self.arena, &self.roots);
        if !delta.attached.is_empty() || !delta.detached.is_empty() {
            tracing::debug!(
                document = ?self.id,
                attached = delta.attached.len(),
                detached = delta.detached.len(),
                "model index recomputed"
            );
        }
        self.after_index_change(delta);
    }

    fn after_index_change(&mut self, delta: IndexDelta) {
        for id in &delta.attached {
            self.theme_model(id);
        }
        for id in &delta.detached {
            if let Some(model) = self.arena.get_mut(id) {
                model.unapply_theme();
            }
        }
        self.sweep();
    }

    // Destroys received models that are neither attached nor referenced by a
    // model the caller has yet to attach. Their ids stay seen.
    fn sweep(&mut self) {
        if !self.models.take_sweep() {
            return;
        }
        let models = &self.models;
        let pending: Vec<&ModelId> = self
            .arena
            .iter()
            .map(Model::id)
            .filter(|id| !models.contains(id) && !models.is_adopted(id))
            .collect();
        let held: HashSet<ModelId> = collect_closure(&self.arena, pending).into_iter().collect();
        let doomed: Vec<ModelId> = models
            .adopted()
            .filter(|id| !models.contains(id) && !held.contains(*id))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return;
        }
        for id in &doomed {
            self.arena.remove(id);
            self.models.release(id);
        }
        let arena = &self.arena;
        self.callbacks.retain_properties(|model| arena.contains(model));
        tracing::debug!(document = ?self.id, destroyed = doomed.len(), "destroyed detached models");
    }

    /// Destroys a detached model the caller no longer needs. Models received
    /// from a peer are destroyed on detach without this.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnknownModel`] for models this document does
    /// not own and [`DocumentError::InvalidOperation`] for attached ones.
    pub fn destroy(&mut self, id: &ModelId) -> Result<()> {
        self.owned_model(id)?;
        if self.models.contains(id) {
            return Err(DocumentError::invalid(
                "destroy",
                format!("model {id} is still reachable from a root"),
            )
            .into());
        }
        self.arena.remove(id);
        self.models.release(id);
        self.callbacks.retain_properties(|model| model != id);
        Ok(())
    }

    fn theme_model(&mut self, id: &ModelId) -> Vec<PropertyChange> {
        let Some(model) = self.arena.get_mut(id) else {
            return Vec::new();
        };
        if self.theme.is_empty() && model.themed_values().is_none() {
            return Vec::new();
        }
        let overrides = self.theme.for_class(model.class());
        model.apply_theme(&overrides)
    }

    // ========================================================================
    // Title and theme
    // ========================================================================

    /// Document title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Changes the title, reporting the change only when it differs.
    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if title == self.title {
            return;
        }
        self.title.clone_from(&title);
        self.trigger_patch(PatchEvent::TitleChanged { title });
    }

    /// Theme applied to attached models.
    #[must_use]
    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Replaces the theme, reporting every effective value it changes.
    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        let ids = self.attached_in_order();
        self.batch(|doc| {
            for id in &ids {
                for change in doc.theme_model(id) {
                    doc.notify_change(change, None);
                }
            }
        });
    }

    // ========================================================================
    // Event bus
    // ========================================================================

    /// Starts holding events. While held, events are collected (or combined)
    /// instead of delivered. Requesting a different policy while a hold is
    /// active is ignored with a warning.
    pub fn hold(&mut self, policy: HoldPolicy) {
        self.callbacks.hold(policy);
    }

    /// Starts holding with the configured policy.
    pub fn hold_default(&mut self) {
        self.hold(self.settings.hold_policy);
    }

    /// The active hold policy, if held.
    #[must_use]
    pub fn hold_policy(&self) -> Option<HoldPolicy> {
        self.callbacks.hold_policy()
    }

    /// Stops holding and delivers the held events in order.
    pub fn unhold(&mut self) {
        if self.callbacks.hold_policy().is_none() {
            return;
        }
        for event in self.callbacks.unhold() {
            self.trigger_on_change(event);
        }
    }

    /// Registers a callback for every change event.
    pub fn on_change(&mut self, callback: impl FnMut(&DocumentChangedEvent) + 'static) -> CallbackId {
        self.callbacks.add_change(Box::new(callback))
    }

    /// Unregisters a change callback.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::CallbackNotFound`] for unknown handles.
    pub fn remove_on_change(&mut self, id: CallbackId) -> std::result::Result<(), DocumentError> {
        if self.callbacks.remove_change(id) {
            Ok(())
        } else {
            Err(DocumentError::CallbackNotFound { id })
        }
    }

    /// Registers a callback for changes of one attribute of one model. It
    /// runs before document-level callbacks and may mutate the document;
    /// events it causes are delivered after the current one.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown models or attributes.
    pub fn on_property_change(
        &mut self,
        model: &ModelId,
        attr: &str,
        callback: impl FnMut(&mut Document, &PropertyChange) + 'static,
    ) -> Result<CallbackId> {
        self.owned_model(model)?.class().lookup(attr)?;
        Ok(self
            .callbacks
            .add_property(model.clone(), attr.to_string(), Box::new(callback)))
    }

    /// Unregisters a per-attribute callback.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::CallbackNotFound`] for unknown handles.
    pub fn remove_property_change(&mut self, id: CallbackId) -> std::result::Result<(), DocumentError> {
        if self.callbacks.remove_property(id) {
            Ok(())
        } else {
            Err(DocumentError::CallbackNotFound { id })
        }
    }

    fn notify_change(&mut self, change: PropertyChange, setter: Option<SetterId>) {
        if !self.models.contains(&change.model) {
            return;
        }
        if change.attr == "name" {
            self.models
                .rename(&change.model, change.old.as_str(), change.new.as_str());
        }
        let holds_refs = self.arena.get(&change.model).is_some_and(|model| {
            model
                .class()
                .lookup(&change.attr)
                .is_ok_and(|descriptor| descriptor.kind().has_refs())
        });
        if holds_refs {
            self.invalidate_models();
        }

        let model = change.model.clone();
        let attr = change.attr.clone();
        let event = match &change.hint {
            None => PatchEvent::ModelChanged {
                model,
                attr,
                new: change.new.clone(),
            },
            Some(ChangeHint::ColumnDataChanged { cols }) => PatchEvent::ColumnDataChanged {
                model,
                attr,
                data: select_columns(&change.new, cols.as_deref()),
                cols: cols.clone(),
            },
            Some(ChangeHint::ColumnsStreamed { data, rollover }) => PatchEvent::ColumnsStreamed {
                model,
                attr,
                data: data.clone(),
                rollover: *rollover,
            },
            Some(ChangeHint::ColumnsPatched { patches }) => PatchEvent::ColumnsPatched {
                model,
                attr,
                patches: patches.clone(),
            },
        };
        let (setter, received) = match (setter, &self.origin) {
            (Some(setter), _) => (Some(setter), None),
            (None, Some(origin)) => (Some(origin.setter.clone()), origin.received.clone()),
            (None, None) => (None, None),
        };
        let event = DocumentChangedEvent {
            document: self.id,
            setter,
            received,
            change: DocumentChange::Patched(event),
            callback: Some(change),
        };
        self.trigger_on_change(event);
    }

    fn trigger_patch(&mut self, event: PatchEvent) {
        self.trigger(DocumentChange::Patched(event));
    }

    fn trigger(&mut self, change: DocumentChange) {
        let event = DocumentChangedEvent {
            document: self.id,
            setter: self.origin.as_ref().map(|origin| origin.setter.clone()),
            received: self.origin.as_ref().and_then(|origin| origin.received.clone()),
            change,
            callback: None,
        };
        self.trigger_on_change(event);
    }

    fn trigger_on_change(&mut self, event: DocumentChangedEvent) {
        let Some(event) = self.callbacks.intercept(event) else {
            return;
        };
        if !self.callbacks.enqueue(event) {
            return;
        }
        while let Some(event) = self.callbacks.next_pending() {
            self.dispatch(&event);
        }
    }

    fn dispatch(&mut self, event: &DocumentChangedEvent) {
        if let Some(change) = &event.callback {
            let ids = self.callbacks.property_ids(&change.model, &change.attr);
            // Reactions are local changes, whatever triggered them.
            self.with_origin(None, |doc| {
                for id in ids {
                    if let Some(mut callback) = doc.callbacks.take_property(id) {
                        callback(doc, change);
                        doc.callbacks.restore_property(id, callback);
                    }
                }
            });
        }
        self.callbacks.notify_change(event);
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Registers a callback for application messages of `msg_type` arriving
    /// from the peer.
    pub fn on_message(&mut self, msg_type: &str, callback: impl FnMut(&Value) + 'static) -> CallbackId {
        self.callbacks.add_message(msg_type.to_string(), Box::new(callback))
    }

    /// Unregisters a message callback.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::CallbackNotFound`] for unknown handles.
    pub fn remove_on_message(&mut self, id: CallbackId) -> std::result::Result<(), DocumentError> {
        if self.callbacks.remove_message(id) {
            Ok(())
        } else {
            Err(DocumentError::CallbackNotFound { id })
        }
    }

    /// Emits a [`PatchEvent::MessageSent`] for the peer.
    pub fn send_message(&mut self, msg_type: &str, data: impl Into<Value>) {
        self.trigger_patch(PatchEvent::MessageSent {
            msg_type: msg_type.to_string(),
            msg_data: data.into(),
        });
    }

    pub(crate) fn trigger_on_message(&mut self, msg_type: &str, data: &Value) {
        self.callbacks.notify_message(msg_type, data);
    }

    // ========================================================================
    // Session callbacks
    // ========================================================================

    /// Schedules `callback` to run once, as soon as possible.
    pub fn add_next_tick_callback(&mut self, callback: impl FnMut(&mut Document) + 'static) -> CallbackId {
        self.add_session_callback(SessionSchedule::NextTick, Box::new(callback))
    }

    /// Schedules `callback` to run once after `timeout`.
    pub fn add_timeout_callback(
        &mut self,
        callback: impl FnMut(&mut Document) + 'static,
        timeout: Duration,
    ) -> CallbackId {
        self.add_session_callback(SessionSchedule::Timeout(timeout), Box::new(callback))
    }

    /// Schedules `callback` to run every `period`.
    pub fn add_periodic_callback(
        &mut self,
        callback: impl FnMut(&mut Document) + 'static,
        period: Duration,
    ) -> CallbackId {
        self.add_session_callback(SessionSchedule::Periodic(period), Box::new(callback))
    }

    fn add_session_callback(&mut self, schedule: SessionSchedule, callback: SessionCallbackFn) -> CallbackId {
        let id = self.callbacks.add_session(schedule, callback);
        self.trigger(DocumentChange::SessionCallbackAdded { callback: id });
        id
    }

    /// Unschedules a session callback.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::CallbackNotFound`] when the callback already
    /// ran (one-shots) or was already removed.
    pub fn remove_session_callback(&mut self, id: CallbackId) -> std::result::Result<(), DocumentError> {
        if !self.callbacks.remove_session(id) {
            return Err(DocumentError::CallbackNotFound { id });
        }
        self.trigger(DocumentChange::SessionCallbackRemoved { callback: id });
        Ok(())
    }

    /// Scheduled session callbacks.
    #[must_use]
    pub fn session_callbacks(&self) -> Vec<SessionCallback> {
        self.callbacks.sessions()
    }

    /// Runs a session callback now. One-shot callbacks are removed before
    /// they run.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::CallbackNotFound`] for callbacks that already
    /// ran or were removed, and [`DocumentError::InvalidOperation`] when the
    /// callback is already running.
    pub fn run_session_callback(&mut self, id: CallbackId) -> std::result::Result<(), DocumentError> {
        let schedule = self
            .callbacks
            .session_schedule(id)
            .ok_or(DocumentError::CallbackNotFound { id })?;
        let mut callback = self.callbacks.take_session(id).ok_or_else(|| {
            DocumentError::invalid("run_session_callback", format!("callback {id} is already running"))
        })?;
        if schedule.is_one_shot() {
            self.remove_session_callback(id)?;
            callback(self);
        } else {
            callback(self);
            self.callbacks.restore_session(id, callback);
        }
        Ok(())
    }

    // ========================================================================
    // Snapshots and patches
    // ========================================================================

    fn serializer<'s>(&'s self, known: impl IntoIterator<Item = &'s ModelId>) -> Serializer<'s> {
        Serializer::new(&self.arena)
            .with_references(known)
            .deferred(self.settings.deferred_buffers)
            .eager_references(true)
    }

    /// A snapshot of the whole document: protocol version, title, root
    /// encodings and definitions of the custom data models in use.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors.
    pub fn to_json(&self) -> Result<Serialized<Json>> {
        let mut serializer = self.serializer(std::iter::empty());
        let roots = self
            .roots
            .iter()
            .map(|id| serializer.encode_model(id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut content = Map::new();
        content.insert("version".into(), Json::from(PROTOCOL_VERSION));
        content.insert("title".into(), Json::from(self.title.as_str()));
        content.insert("roots".into(), Json::Array(roots));
        let defs = self.custom_definitions(&mut serializer)?;
        if !defs.is_empty() {
            content.insert("defs".into(), Json::Array(defs));
        }
        Ok(Serialized {
            content: Json::Object(content),
            buffers: serializer.take_buffers(),
        })
    }

    fn custom_definitions(&self, serializer: &mut Serializer<'_>) -> Result<Vec<Json>> {
        let mut used: HashSet<&str> = HashSet::new();
        for model in self.models() {
            used.extend(model.class().chain().iter().map(String::as_str));
        }
        let mut defs = Vec::new();
        for class in self.registry.data_models() {
            if used.contains(class.name()) {
                defs.push(definition(class, serializer)?);
            }
        }
        Ok(defs)
    }

    /// Builds a document from a snapshot produced by [`Document::to_json`].
    /// Every decoded model counts as known to the peer.
    ///
    /// # Errors
    ///
    /// Returns a decoding error or [`DocumentError::MalformedSnapshot`].
    pub fn from_json(registry: Arc<TypeRegistry>, snapshot: &Serialized<Json>) -> Result<Self> {
        let mut doc = Self::new(registry);
        doc.replace_with_json(snapshot)?;
        Ok(doc)
    }

    /// Replaces every root, the title and all models with a snapshot. The
    /// document is left untouched when the snapshot does not decode.
    ///
    /// # Errors
    ///
    /// Returns a decoding error or [`DocumentError::MalformedSnapshot`].
    pub fn replace_with_json(&mut self, snapshot: &Serialized<Json>) -> Result<()> {
        let (title, created, roots) = self.decode_snapshot(snapshot)?;
        self.clear();
        self.models.adopt(created.iter().map(|model| model.id().clone()));
        self.batch(|doc| {
            doc.arena.extend(created);
            if let Some(title) = title {
                doc.set_title(title);
            }
            for root in &roots {
                doc.add_root(root)?;
            }
            Ok::<(), Error>(())
        })?;
        self.flush_synced();
        Ok(())
    }

    fn decode_snapshot(
        &self,
        snapshot: &Serialized<Json>,
    ) -> Result<(Option<String>, ModelArena, Vec<ModelId>)> {
        let malformed = |reason: &str| DocumentError::MalformedSnapshot {
            reason: reason.to_string(),
        };
        let content = snapshot
            .content
            .as_object()
            .ok_or_else(|| malformed("snapshot must be an object"))?;
        if content.contains_key("defs") {
            tracing::debug!("ignoring custom model definitions; their types must be registered");
        }
        let roots_json = content
            .get("roots")
            .ok_or_else(|| malformed("snapshot lacks roots"))?;
        let items = roots_json
            .as_array()
            .ok_or_else(|| malformed("roots must be a list"))?;

        let empty = ModelArena::new();
        let mut de = Deserializer::new(&self.registry, &empty)
            .with_buffers(snapshot.buffers.iter().cloned());
        de.create_definitions(roots_json)?;
        let mut roots = Vec::with_capacity(items.len());
        for item in items {
            match de.decode(item)? {
                Value::Ref(id) => roots.push(id),
                other => {
                    return Err(malformed(&format!("root must be a model, got {}", other.describe())).into())
                }
            }
        }
        let title = content
            .get("title")
            .and_then(Json::as_str)
            .map(str::to_string);
        Ok((title, de.into_created(), roots))
    }

    /// Encodes events as a patch payload. Models the peer does not hold yet
    /// are encoded inline and then count as known.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors.
    pub fn create_json_patch<'e>(
        &mut self,
        events: impl IntoIterator<Item = &'e PatchEvent>,
    ) -> Result<Serialized<Json>> {
        let (content, buffers, known) = {
            let mut serializer = self.serializer(self.models.synced().iter());
            let mut reps = Vec::new();
            for event in events {
                reps.push(event.to_serializable(&mut serializer)?);
            }
            let known: Vec<ModelId> = serializer.references().iter().cloned().collect();
            (json!({ "events": reps }), serializer.take_buffers(), known)
        };
        self.models.mark_synced(known);
        Ok(Serialized { content, buffers })
    }

    /// Decodes and applies a patch payload, tagging the resulting events with
    /// `setter`. Returns the applied events.
    ///
    /// A patch referring to a model this document used to hold is dropped
    /// with a warning (when configured so) and yields no events.
    ///
    /// # Errors
    ///
    /// Returns a decoding error (nothing is applied then) or the error of the
    /// first event that fails to apply (earlier events stay applied).
    pub fn apply_json_patch(
        &mut self,
        patch: &Serialized<Json>,
        setter: Option<SetterId>,
    ) -> Result<Vec<PatchEvent>> {
        let events_json = patch
            .content
            .get("events")
            .ok_or_else(|| DeserializationError::malformed("patch lacks events"))?;
        let items = events_json
            .as_array()
            .ok_or_else(|| DeserializationError::malformed("patch events must be a list"))?;

        let decoded = {
            let known = Attached(self);
            let mut de = Deserializer::new(&self.registry, &known)
                .with_buffers(patch.buffers.iter().cloned());
            let events = de.create_definitions(events_json).and_then(|()| {
                items
                    .iter()
                    .map(|rep| PatchEvent::decode(rep, &mut de))
                    .collect::<std::result::Result<Vec<_>, _>>()
            });
            events.map(|events| (events, de.into_created()))
        };
        let (events, created) = match decoded {
            Ok(decoded) => decoded,
            Err(DeserializationError::UnknownReference { id })
                if self.settings.drop_stale_patches && self.models.seen(&id) =>
            {
                tracing::warn!(
                    document = ?self.id,
                    model = %id,
                    "dropping patch that refers to a model removed from this document"
                );
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let created_ids: Vec<ModelId> = created.iter().map(|model| model.id().clone()).collect();
        self.models.adopt(created_ids.iter().cloned());
        let outcome = self.batch(|doc| {
            doc.arena.extend(created);
            let mut applied = Vec::with_capacity(events.len());
            for event in events {
                let origin = setter.clone().map(|setter| Origin {
                    setter,
                    received: Some(event.clone()),
                });
                doc.with_origin(origin, |doc| event.apply(doc))?;
                applied.push(event);
            }
            Ok::<_, Error>(applied)
        });
        self.models.mark_synced(created_ids);
        outcome
    }
}

fn select_columns(data: &Value, cols: Option<&[String]>) -> Value {
    match (data, cols) {
        (Value::Map(entries), Some(cols)) => Value::Map(
            entries
                .iter()
                .filter(|(name, _)| name.as_str().is_some_and(|name| cols.iter().any(|c| c == name)))
                .cloned()
                .collect(),
        ),
        _ => data.clone(),
    }
}

fn definition(class: &ModelClass, serializer: &mut Serializer<'_>) -> Result<Json> {
    let mut properties = Vec::new();
    for name in class.own_properties() {
        let descriptor = class.lookup(name)?;
        properties.push(json!({
            "name": name,
            "kind": descriptor.kind().to_string(),
            "default": serializer.encode(&descriptor.default().produce())?,
        }));
    }
    let mut overrides = Vec::new();
    for (name, default) in class.own_overrides() {
        overrides.push(json!({
            "name": name,
            "default": serializer.encode(&default.produce())?,
        }));
    }
    Ok(json!({
        "type": "model",
        "name": class.name(),
        "extends": class.parent(),
        "properties": properties,
        "overrides": overrides,
    }))
}

impl ContainerHost for Document {
    fn current(&self, model: &ModelId, attr: &str) -> std::result::Result<Cow<'_, Value>, Error> {
        Ok(self.owned_model(model)?.value_cow(attr)?)
    }

    fn replace(&mut self, change: ContainerChange) -> std::result::Result<(), Error> {
        let class = Arc::clone(self.owned_model(&change.model)?.class());
        let new = class
            .lookup(&change.attr)?
            .prepare(class.name(), change.new.clone(), &self.arena)?;
        if let Some(model) = self.arena.get_mut(&change.model) {
            model.store_mutated(&change.attr, new.clone());
        }
        let setter = change.setter.clone();
        self.notify_change(change.into_property_change(new), setter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::PatchIndex;
    use crate::property::{Kind, PropertyDescriptor};
    use crate::registry::TypeDef;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDef::new("Panel")
                    .property(PropertyDescriptor::new("width", Kind::Int).with_default(100))
                    .property(PropertyDescriptor::new("label", Kind::String).with_default(""))
                    .property(PropertyDescriptor::new("child", Kind::nullable(Kind::instance("Panel"))))
                    .property(PropertyDescriptor::new("children", Kind::list(Kind::instance("Panel"))))
                    .property(PropertyDescriptor::new("serial", Kind::Int).readonly()),
            )
            .expect("registers");
        registry
            .register(TypeDef::new("Source").property(PropertyDescriptor::new("data", Kind::ColumnData)))
            .expect("registers");
        Arc::new(registry)
    }

    fn recorder(doc: &mut Document) -> Rc<RefCell<Vec<DocumentChangedEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        doc.on_change(move |event| sink.borrow_mut().push(event.clone()));
        seen
    }

    #[test]
    fn add_root_is_idempotent_and_indexes_the_closure() {
        let mut doc = Document::new(registry());
        let child = doc.create("Panel").expect("concrete");
        let root = doc
            .create_with("Panel", [("child", Value::Ref(child.clone()))])
            .expect("valid");
        let events = recorder(&mut doc);
        doc.add_root(&root).expect("owned");
        doc.add_root(&root).expect("owned");
        assert_eq!(doc.roots(), &[root.clone()]);
        assert!(doc.get_by_id(&child).is_some());
        assert_eq!(events.borrow().len(), 1);
        assert!(doc.add_root(&ModelId::from_raw("nope")).is_err());
    }

    #[test]
    fn shared_child_survives_removal_of_one_root() {
        let mut doc = Document::new(registry());
        let shared = doc.create("Panel").expect("concrete");
        let a = doc
            .create_with("Panel", [("child", Value::Ref(shared.clone()))])
            .expect("valid");
        let b = doc
            .create_with("Panel", [("child", Value::Ref(shared.clone()))])
            .expect("valid");
        doc.add_root(&a).expect("owned");
        doc.add_root(&b).expect("owned");
        assert_eq!(doc.reference_count(&shared), 2);
        doc.remove_root(&a);
        assert!(doc.get_by_id(&shared).is_some());
        assert!(doc.get_by_id(&a).is_none());
        assert!(doc.seen(&a));
        doc.remove_root(&b);
        assert!(doc.get_by_id(&shared).is_none());
        assert_eq!(doc.model_count(), 0);
    }

    #[test]
    fn setting_references_attaches_and_detaches() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        let child = doc.create("Panel").expect("concrete");
        assert!(doc.get_by_id(&child).is_none());
        doc.set(&root, "child", Value::Ref(child.clone())).expect("valid");
        assert!(doc.get_by_id(&child).is_some());
        doc.set(&root, "child", Value::Null).expect("valid");
        assert!(doc.get_by_id(&child).is_none());
        assert!(doc.seen(&child));
    }

    #[test]
    fn equal_values_do_not_emit_and_readonly_is_enforced() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        let events = recorder(&mut doc);
        doc.set(&root, "width", 100).expect("valid");
        assert!(events.borrow().is_empty());
        doc.set(&root, "width", 200).expect("valid");
        assert_eq!(events.borrow().len(), 1);
        assert!(matches!(
            doc.set(&root, "serial", 1),
            Err(Error::Document(DocumentError::Readonly { .. }))
        ));
        doc.set_from_json(&root, "serial", Value::Int(1)).expect("wire write");
        assert!(matches!(doc.set(&root, "width", "wide"), Err(Error::Validation(_))));
        assert_eq!(doc.get(&root, "width").expect("declared"), Value::Int(200));
    }

    #[test]
    fn combine_hold_delivers_one_event_with_first_old_and_last_new() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        let events = recorder(&mut doc);
        doc.hold(HoldPolicy::Combine);
        for width in [1, 2, 3] {
            doc.set(&root, "width", width).expect("valid");
        }
        doc.set(&root, "label", "x").expect("valid");
        assert!(events.borrow().is_empty());
        doc.unhold();
        let events = events.borrow();
        assert_eq!(events.len(), 2);
        let change = events[0].callback.as_ref().expect("attribute change");
        assert_eq!(change.old, Value::Int(100));
        assert_eq!(change.new, Value::Int(3));
        assert_eq!(events[1].callback.as_ref().expect("attribute change").attr, "label");
    }

    #[test]
    fn collect_hold_replays_everything() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        let events = recorder(&mut doc);
        doc.hold(HoldPolicy::Collect);
        doc.hold(HoldPolicy::Combine);
        assert_eq!(doc.hold_policy(), Some(HoldPolicy::Collect));
        doc.set(&root, "width", 1).expect("valid");
        doc.set(&root, "width", 2).expect("valid");
        doc.unhold();
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn property_callbacks_run_first_and_may_mutate() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        let order = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&order);
        doc.on_property_change(&root, "width", move |doc, change| {
            log.borrow_mut().push(format!("width {}", change.new.describe()));
            let label = format!("w{}", change.new.as_i64().unwrap_or_default());
            let _ = doc.set(&change.model, "label", label);
        })
        .expect("declared");
        let log = Rc::clone(&order);
        doc.on_change(move |event| {
            if let Some(change) = &event.callback {
                log.borrow_mut().push(format!("doc {}", change.attr));
            }
        });
        doc.set(&root, "width", 7).expect("valid");
        assert_eq!(
            *order.borrow(),
            vec!["width 7 (Int)".to_string(), "doc width".into(), "doc label".into()]
        );
        assert_eq!(doc.get(&root, "label").expect("declared"), Value::from("w7"));
        assert!(doc.on_property_change(&root, "wdith", |_, _| {}).is_err());
    }

    #[test]
    fn container_mutations_notify_once_each() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        let child = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        let events = recorder(&mut doc);
        doc.list_mut(&root, "children").push(Value::Ref(child.clone())).expect("valid");
        assert_eq!(events.borrow().len(), 1);
        assert!(doc.get_by_id(&child).is_some());
        assert_eq!(doc.list_mut(&root, "children").len().expect("list"), 1);
        assert_eq!(events.borrow().len(), 1);
        assert!(doc.list_mut(&root, "children").push(5).is_err());
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn column_hints_become_narrow_events() {
        let mut doc = Document::new(registry());
        let source = doc.create("Source").expect("concrete");
        doc.add_root(&source).expect("owned");
        doc.columns_mut(&source, "data")
            .update(vec![("x".into(), Value::list([1, 2])), ("y".into(), Value::list([3, 4]))])
            .expect("valid");
        let events = recorder(&mut doc);
        doc.columns_mut(&source, "data")
            .stream(
                vec![("x".into(), Value::list([5])), ("y".into(), Value::list([6]))],
                Some(2),
            )
            .expect("valid");
        doc.columns_mut(&source, "data")
            .patch(vec![("x".into(), vec![(PatchIndex::Index(0), Value::Int(9))])])
            .expect("valid");
        doc.columns_mut(&source, "data")
            .insert("y", Value::list([0, 0]))
            .expect("valid");
        let events = events.borrow();
        let kinds: Vec<&str> = events
            .iter()
            .filter_map(|e| e.patch().map(PatchEvent::kind_name))
            .collect();
        assert_eq!(kinds, vec!["ColumnsStreamed", "ColumnsPatched", "ColumnDataChanged"]);
        assert!(matches!(
            events[2].patch(),
            Some(PatchEvent::ColumnDataChanged { data: Value::Map(cols), .. }) if cols.len() == 1
        ));
        assert_eq!(
            doc.get(&source, "data").expect("declared").get("x"),
            Some(&Value::list([9, 5]))
        );
    }

    #[test]
    fn names_are_indexed_and_selectable() {
        let mut doc = Document::new(registry());
        let a = doc.create_with("Panel", [("name", Value::from("main"))]).expect("valid");
        let b = doc.create_with("Panel", [("child", Value::Ref(a.clone()))]).expect("valid");
        doc.add_root(&b).expect("owned");
        assert_eq!(doc.get_by_name("main").expect("unique").map(Model::id), Some(&a));
        doc.set(&b, "name", "main").expect("valid");
        assert!(doc.get_by_name("main").is_err());
        doc.set(&b, "name", "outer").expect("valid");
        assert_eq!(doc.select(&Selector::new().named("outer")).len(), 1);
        assert_eq!(doc.select(&Selector::new().of_type("Panel")).len(), 2);
        assert!(doc.select_one(&Selector::new().of_type("Panel")).is_err());
        doc.set_select(&Selector::new().of_type("Panel"), &[("width", Value::Int(5))])
            .expect("valid");
        assert_eq!(doc.get(&a, "width").expect("declared"), Value::Int(5));
        assert_eq!(doc.select_from(&a, &Selector::new()).len(), 1);
    }

    #[test]
    fn title_changes_only_emit_on_difference() {
        let mut doc = Document::new(registry());
        assert_eq!(doc.title(), "Untitled");
        let events = recorder(&mut doc);
        doc.set_title("Untitled");
        doc.set_title("Sales");
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn themes_apply_on_attach_and_on_change() {
        let mut doc = Document::new(registry());
        doc.set_theme(Theme::empty().with_attr("Panel", "width", 640));
        let root = doc.create("Panel").expect("concrete");
        assert_eq!(doc.get(&root, "width").expect("declared"), Value::Int(100));
        doc.add_root(&root).expect("owned");
        assert_eq!(doc.get(&root, "width").expect("declared"), Value::Int(640));
        let events = recorder(&mut doc);
        doc.set_theme(Theme::empty());
        assert_eq!(doc.get(&root, "width").expect("declared"), Value::Int(100));
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn session_callbacks_fire_once_unless_periodic() {
        let mut doc = Document::new(registry());
        let events = recorder(&mut doc);
        let runs = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&runs);
        let once = doc.add_next_tick_callback(move |_| *counter.borrow_mut() += 1);
        let counter = Rc::clone(&runs);
        let periodic = doc.add_periodic_callback(
            move |doc| {
                *counter.borrow_mut() += 1;
                doc.set_title("tick");
            },
            Duration::from_millis(10),
        );
        doc.run_session_callback(once).expect("scheduled");
        assert!(matches!(
            doc.run_session_callback(once),
            Err(DocumentError::CallbackNotFound { .. })
        ));
        let err = doc.remove_session_callback(once).expect_err("already ran");
        assert!(err.to_string().contains("already ran or was already removed"));
        doc.run_session_callback(periodic).expect("scheduled");
        doc.run_session_callback(periodic).expect("still scheduled");
        assert_eq!(*runs.borrow(), 3);
        assert_eq!(doc.session_callbacks().len(), 1);
        doc.remove_session_callback(periodic).expect("scheduled");
        let kinds: Vec<bool> = events
            .borrow()
            .iter()
            .map(|e| matches!(e.change, DocumentChange::SessionCallbackRemoved { .. }))
            .collect();
        assert_eq!(kinds.iter().filter(|removed| **removed).count(), 2);
    }

    #[test]
    fn snapshot_round_trips_title_and_graph() {
        let registry = registry();
        let mut doc = Document::new(Arc::clone(&registry));
        let child = doc.create_with("Panel", [("width", Value::Int(3))]).expect("valid");
        let root = doc
            .create_with("Panel", [("children", Value::list([Value::Ref(child.clone())]))])
            .expect("valid");
        doc.set(&child, "child", Value::Ref(root.clone())).expect("valid");
        doc.add_root(&root).expect("owned");
        doc.set_title("Cycle");

        let snapshot = doc.to_json().expect("eager references allow cycles");
        assert_eq!(snapshot.content["version"], json!(PROTOCOL_VERSION));
        let copy = Document::from_json(registry, &snapshot).expect("decodes");
        assert_eq!(copy.title(), "Cycle");
        assert_eq!(copy.roots(), &[root.clone()]);
        assert_eq!(copy.get(&child, "width").expect("declared"), Value::Int(3));
        assert_eq!(copy.get(&child, "child").expect("declared"), Value::Ref(root));
        assert_eq!(copy.synced_references().len(), 2);
    }

    #[test]
    fn patches_replay_and_second_application_is_a_no_op() {
        let registry = registry();
        let mut local = Document::new(Arc::clone(&registry));
        let root = local.create("Panel").expect("concrete");
        local.add_root(&root).expect("owned");
        let mut remote = Document::from_json(Arc::clone(&registry), &local.to_json().expect("encodes"))
            .expect("decodes");
        local.flush_synced();

        let patch = local
            .create_json_patch([&PatchEvent::ModelChanged {
                model: root.clone(),
                attr: "width".into(),
                new: Value::Int(42),
            }])
            .expect("encodes");
        let events = recorder(&mut remote);
        let applied = remote.apply_json_patch(&patch, None).expect("applies");
        assert_eq!(applied.len(), 1);
        assert_eq!(remote.get(&root, "width").expect("declared"), Value::Int(42));
        remote.apply_json_patch(&patch, None).expect("applies");
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn patches_with_extreme_slice_steps_apply_or_fail_cleanly() {
        let registry = registry();
        let mut local = Document::new(Arc::clone(&registry));
        let source = local.create("Source").expect("concrete");
        local.add_root(&source).expect("owned");
        local
            .columns_mut(&source, "data")
            .update(vec![("x".into(), Value::list([1, 2, 3]))])
            .expect("valid");
        let mut remote = Document::from_json(Arc::clone(&registry), &local.to_json().expect("encodes"))
            .expect("decodes");
        local.flush_synced();

        let stride = crate::value::Slice {
            start: Some(1),
            stop: None,
            step: Some(i64::MAX),
        };
        let patch_with = |local: &mut Document, values: Value| {
            local
                .create_json_patch([&PatchEvent::ColumnsPatched {
                    model: source.clone(),
                    attr: "data".into(),
                    patches: vec![("x".into(), vec![(PatchIndex::Slice(stride), values)])],
                }])
                .expect("encodes")
        };

        let fits = patch_with(&mut local, Value::list([7]));
        remote.apply_json_patch(&fits, None).expect("applies");
        assert_eq!(
            remote.get(&source, "data").expect("declared").get("x"),
            Some(&Value::list([1, 7, 3]))
        );

        let too_many = patch_with(&mut local, Value::list([8, 9]));
        assert!(remote.apply_json_patch(&too_many, None).is_err());
        assert_eq!(
            remote.get(&source, "data").expect("declared").get("x"),
            Some(&Value::list([1, 7, 3]))
        );
    }

    #[test]
    fn received_models_are_destroyed_once_detached() {
        let registry = registry();
        let mut server = Document::new(Arc::clone(&registry));
        let mut client = Document::new(Arc::clone(&registry));
        for _ in 0..100 {
            let root = server.create("Panel").expect("concrete");
            server.add_root(&root).expect("owned");
            let added = server
                .create_json_patch([&PatchEvent::RootAdded { model: root.clone() }])
                .expect("encodes");
            client.apply_json_patch(&added, None).expect("applies");
            assert!(client.get_by_id(&root).is_some());

            server.remove_root(&root);
            let removed = server
                .create_json_patch([&PatchEvent::RootRemoved { model: root.clone() }])
                .expect("encodes");
            client.apply_json_patch(&removed, None).expect("applies");
            assert!(client.model(&root).is_none());
            assert!(client.seen(&root));
        }
        assert_eq!(client.arena.len(), 0);
        // Models the caller created stay until the caller destroys them.
        assert_eq!(server.arena.len(), 100);
    }

    #[test]
    fn received_models_survive_a_detach_within_one_patch() {
        let registry = registry();
        let mut server = Document::new(Arc::clone(&registry));
        let root = server.create("Panel").expect("concrete");
        server.add_root(&root).expect("owned");
        let mut client = Document::from_json(Arc::clone(&registry), &server.to_json().expect("encodes"))
            .expect("decodes");
        server.flush_synced();

        let moved = server
            .create_json_patch([
                &PatchEvent::RootRemoved { model: root.clone() },
                &PatchEvent::RootAdded { model: root.clone() },
            ])
            .expect("encodes");
        client.apply_json_patch(&moved, None).expect("applies");
        assert!(client.get_by_id(&root).is_some());
        assert_eq!(client.roots(), &[root]);
    }

    #[test]
    fn received_models_referenced_by_pending_local_models_are_kept() {
        let registry = registry();
        let mut server = Document::new(Arc::clone(&registry));
        let child = server.create("Panel").expect("concrete");
        let root = server
            .create_with("Panel", [("child", Value::Ref(child.clone()))])
            .expect("valid");
        server.add_root(&root).expect("owned");
        let mut client = Document::from_json(Arc::clone(&registry), &server.to_json().expect("encodes"))
            .expect("decodes");

        let holder = client
            .create_with("Panel", [("child", Value::Ref(child.clone()))])
            .expect("valid");
        client.set(&root, "child", Value::Null).expect("valid");
        assert!(client.get_by_id(&child).is_none());
        assert!(client.model(&child).is_some());
        client.add_root(&holder).expect("owned");
        assert!(client.get_by_id(&child).is_some());
    }

    #[test]
    fn documents_minting_unique_ids_never_collide() {
        let settings = Settings {
            unique_ids: true,
            ..Settings::default()
        };
        let mut left = Document::with_settings(registry(), settings.clone());
        let mut right = Document::with_settings(registry(), settings);
        let a = left.create("Panel").expect("concrete");
        let b = right
            .create_with("Panel", [("width", Value::Int(3))])
            .expect("valid");
        assert_ne!(a, b);
        assert!(!a.as_str().starts_with('p'));
        assert_eq!(a.as_str().len(), 36);

        let serial = Document::new(registry()).create("Panel").expect("concrete");
        assert!(serial.as_str().starts_with('p'));
    }

    #[test]
    fn destroy_releases_detached_local_models() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        assert!(matches!(
            doc.destroy(&root),
            Err(Error::Document(DocumentError::InvalidOperation { .. }))
        ));
        doc.remove_root(&root);
        doc.destroy(&root).expect("detached");
        assert!(doc.model(&root).is_none());
        assert!(doc.seen(&root));
        assert!(matches!(
            doc.destroy(&root),
            Err(Error::Document(DocumentError::UnknownModel { .. }))
        ));
    }

    #[test]
    fn stale_patches_are_dropped() {
        let registry = registry();
        let mut doc = Document::new(Arc::clone(&registry));
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        doc.remove_root(&root);
        let patch = Serialized::new(json!({"events": [
            {"kind": "ModelChanged", "model": {"id": root.as_str()}, "attr": "width", "new": 1}
        ]}));
        assert!(doc.apply_json_patch(&patch, None).expect("dropped").is_empty());

        let unknown = Serialized::new(json!({"events": [
            {"kind": "ModelChanged", "model": {"id": "never"}, "attr": "width", "new": 1}
        ]}));
        let err = doc.apply_json_patch(&unknown, None).expect_err("unknown");
        assert!(err.unknown_reference().is_some());
    }

    #[test]
    fn message_events_reach_message_callbacks() {
        let mut doc = Document::new(registry());
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        let id = doc.on_message("ping", move |data| sink.borrow_mut().push(data.clone()));
        let patch = Serialized::new(json!({"events": [
            {"kind": "MessageSent", "msg_type": "ping", "msg_data": 1},
            {"kind": "MessageSent", "msg_type": "other", "msg_data": 2}
        ]}));
        doc.apply_json_patch(&patch, None).expect("applies");
        assert_eq!(*received.borrow(), vec![Value::Int(1)]);
        doc.remove_on_message(id).expect("registered");
        assert!(doc.remove_on_message(id).is_err());
    }

    #[test]
    fn clear_drops_everything() {
        let mut doc = Document::new(registry());
        let root = doc.create("Panel").expect("concrete");
        doc.add_root(&root).expect("owned");
        doc.clear();
        assert!(doc.roots().is_empty());
        assert!(doc.model(&root).is_none());
        assert!(doc.seen(&root));
    }
}
