//! Mutation-tracking views over collection-valued properties.
//!
//! A view borrows its host (a [`crate::document::Document`] or a bare
//! [`crate::arena::ModelArena`]) and one `(model, attribute)` owner. Every
//! mutating operation snapshots the old value, mutates a copy, and hands both
//! to [`ContainerHost::replace`], which validates, stores and notifies. There
//! is no equality short-circuit: a mutating call always notifies, even when
//! the result equals the snapshot. Operations that fail before mutating (a
//! missing key, an empty pop) leave the value alone and notify nobody.
//! Reads never notify.

use std::borrow::Cow;

use crate::arena::ModelArena;
use crate::error::{DocumentError, Error};
use crate::id::{ModelId, SetterId};
use crate::model::PropertyChange;
use crate::value::{Slice, Value};

/// Narrow description of a columnar mutation, carried to the wire instead of
/// the full new value.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeHint {
    /// Some columns (or all, when `None`) were replaced.
    ColumnDataChanged {
        /// Replaced column names.
        cols: Option<Vec<String>>,
    },
    /// Rows were appended, keeping at most `rollover` rows.
    ColumnsStreamed {
        /// Appended rows per column.
        data: Vec<(String, Value)>,
        /// Maximum retained length.
        rollover: Option<usize>,
    },
    /// Individual cells or slices were overwritten.
    ColumnsPatched {
        /// Overwrites per column.
        patches: ColumnPatches,
    },
}

/// Position addressed by a column patch.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchIndex {
    /// A single row.
    Index(usize),
    /// A range of rows.
    Slice(Slice),
}

/// Overwrites per column: `(index, value)` pairs. A slice index takes a list
/// value with one element per addressed row.
pub type ColumnPatches = Vec<(String, Vec<(PatchIndex, Value)>)>;

/// A completed container mutation awaiting validation and storage.
#[derive(Debug, Clone)]
pub struct ContainerChange {
    /// Owning model.
    pub model: ModelId,
    /// Owning attribute.
    pub attr: String,
    /// Snapshot before the mutation.
    pub old: Value,
    /// Value after the mutation.
    pub new: Value,
    /// Narrow description, when cheap to provide.
    pub hint: Option<ChangeHint>,
    /// Origin of the change.
    pub setter: Option<SetterId>,
}

/// Something that stores collection-valued properties and can be told that
/// one was mutated in place.
pub trait ContainerHost {
    /// Effective current value of the owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the model or attribute does not exist.
    fn current(&self, model: &ModelId, attr: &str) -> Result<Cow<'_, Value>, Error>;

    /// Validates and stores the mutated value, then notifies observers.
    ///
    /// # Errors
    ///
    /// Returns a validation error, in which case the old value is kept and
    /// nobody is notified.
    fn replace(&mut self, change: ContainerChange) -> Result<(), Error>;
}

impl ContainerHost for ModelArena {
    fn current(&self, model: &ModelId, attr: &str) -> Result<Cow<'_, Value>, Error> {
        let found = self
            .get(model)
            .ok_or_else(|| DocumentError::UnknownModel { id: model.clone() })?;
        Ok(found.value_cow(attr)?)
    }

    fn replace(&mut self, change: ContainerChange) -> Result<(), Error> {
        let class = match self.get(&change.model) {
            Some(model) => std::sync::Arc::clone(model.class()),
            None => return Err(DocumentError::UnknownModel { id: change.model }.into()),
        };
        let new = class
            .lookup(&change.attr)?
            .prepare(class.name(), change.new, &*self)?;
        if let Some(model) = self.get_mut(&change.model) {
            model.store_mutated(&change.attr, new);
        }
        Ok(())
    }
}

impl ContainerChange {
    /// The change as reported to observers.
    #[must_use]
    pub fn into_property_change(self, stored: Value) -> PropertyChange {
        PropertyChange {
            model: self.model,
            attr: self.attr,
            old: self.old,
            new: stored,
            hint: self.hint,
        }
    }
}

struct Owner<'h, H: ?Sized> {
    host: &'h mut H,
    model: ModelId,
    attr: String,
    setter: Option<SetterId>,
}

impl<'h, H: ContainerHost + ?Sized> Owner<'h, H> {
    fn read(&self) -> Result<Cow<'_, Value>, Error> {
        self.host.current(&self.model, &self.attr)
    }

    fn not_a(&self, expected: &'static str) -> Error {
        DocumentError::NotAContainer {
            model: self.model.clone(),
            attr: self.attr.clone(),
            expected,
        }
        .into()
    }

    fn mutate<R>(
        &mut self,
        hint: Option<ChangeHint>,
        op: impl FnOnce(&mut Value) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let old = self.read()?.into_owned();
        let mut new = old.clone();
        let result = op(&mut new)?;
        self.host.replace(ContainerChange {
            model: self.model.clone(),
            attr: self.attr.clone(),
            old,
            new,
            hint,
            setter: self.setter.clone(),
        })?;
        Ok(result)
    }
}

fn missing(op: &'static str, what: impl std::fmt::Display) -> Error {
    DocumentError::invalid(op, what.to_string()).into()
}

// ============================================================================
// Lists
// ============================================================================

/// View over a list-valued property.
pub struct PropertyValueList<'h, H: ContainerHost + ?Sized> {
    owner: Owner<'h, H>,
}

impl<'h, H: ContainerHost + ?Sized> PropertyValueList<'h, H> {
    /// Views `model.attr` on `host`.
    pub fn new(host: &'h mut H, model: &ModelId, attr: &str) -> Self {
        Self {
            owner: Owner {
                host,
                model: model.clone(),
                attr: attr.to_string(),
                setter: None,
            },
        }
    }

    /// Tags every notification with a setter token.
    #[must_use]
    pub fn with_setter(mut self, setter: Option<SetterId>) -> Self {
        self.owner.setter = setter;
        self
    }

    fn items<'v>(&self, value: &'v Value) -> Result<&'v [Value], Error> {
        value.as_list().ok_or_else(|| self.owner.not_a("list"))
    }

    fn edit<R>(&mut self, op: impl FnOnce(&mut Vec<Value>) -> Result<R, Error>) -> Result<R, Error> {
        let not_a = self.owner.not_a("list");
        self.owner.mutate(None, |value| match value {
            Value::List(items) => op(items),
            _ => Err(not_a),
        })
    }

    /// Number of items.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn len(&self) -> Result<usize, Error> {
        let value = self.owner.read()?;
        Ok(self.items(&value)?.len())
    }

    /// Whether the list is empty.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Item `index`.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn get(&self, index: usize) -> Result<Option<Value>, Error> {
        let value = self.owner.read()?;
        Ok(self.items(&value)?.get(index).cloned())
    }

    /// Whether an equal item is present.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn contains(&self, item: &Value) -> Result<bool, Error> {
        let value = self.owner.read()?;
        Ok(self.items(&value)?.contains(item))
    }

    /// A copy of the items.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn to_vec(&self) -> Result<Vec<Value>, Error> {
        let value = self.owner.read()?;
        Ok(self.items(&value)?.to_vec())
    }

    /// Appends an item.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn push(&mut self, item: impl Into<Value>) -> Result<(), Error> {
        let item = item.into();
        self.edit(|items| {
            items.push(item);
            Ok(())
        })
    }

    /// Appends several items.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn extend(&mut self, more: impl IntoIterator<Item = Value>) -> Result<(), Error> {
        let more: Vec<Value> = more.into_iter().collect();
        self.edit(|items| {
            items.extend(more);
            Ok(())
        })
    }

    /// Inserts before `index`, clamped to the list length.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn insert(&mut self, index: usize, item: impl Into<Value>) -> Result<(), Error> {
        let item = item.into();
        self.edit(|items| {
            let index = index.min(items.len());
            items.insert(index, item);
            Ok(())
        })
    }

    /// Overwrites item `index`.
    ///
    /// # Errors
    ///
    /// Fails when the index is out of range or the result does not validate.
    pub fn set(&mut self, index: usize, item: impl Into<Value>) -> Result<(), Error> {
        let item = item.into();
        self.edit(|items| match items.get_mut(index) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(missing("set", format!("list index {index} out of range"))),
        })
    }

    /// Removes the first item equal to `item`.
    ///
    /// # Errors
    ///
    /// Fails when no such item exists.
    pub fn remove(&mut self, item: &Value) -> Result<(), Error> {
        self.edit(|items| match items.iter().position(|x| x == item) {
            Some(i) => {
                items.remove(i);
                Ok(())
            }
            None => Err(missing("remove", "item not in list")),
        })
    }

    /// Removes and returns item `index`.
    ///
    /// # Errors
    ///
    /// Fails when the index is out of range.
    pub fn remove_at(&mut self, index: usize) -> Result<Value, Error> {
        self.edit(|items| {
            if index < items.len() {
                Ok(items.remove(index))
            } else {
                Err(missing("remove_at", format!("list index {index} out of range")))
            }
        })
    }

    /// Removes and returns the last item.
    ///
    /// # Errors
    ///
    /// Fails when the list is empty.
    pub fn pop(&mut self) -> Result<Value, Error> {
        self.edit(|items| items.pop().ok_or_else(|| missing("pop", "pop from empty list")))
    }

    /// Removes every item.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.edit(|items| {
            items.clear();
            Ok(())
        })
    }

    /// Reverses the items in place.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a list.
    pub fn reverse(&mut self) -> Result<(), Error> {
        self.edit(|items| {
            items.reverse();
            Ok(())
        })
    }

    /// Sorts numbers, strings or booleans in ascending order.
    ///
    /// # Errors
    ///
    /// Fails when two items cannot be compared.
    pub fn sort(&mut self) -> Result<(), Error> {
        self.edit(|items| {
            let comparable = items
                .windows(2)
                .all(|w| w[0].partial_cmp_scalar(&w[1]).is_some());
            if !comparable {
                return Err(missing("sort", "items are not mutually comparable"));
            }
            items.sort_by(|a, b| {
                a.partial_cmp_scalar(b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(())
        })
    }
}

// ============================================================================
// Dicts
// ============================================================================

/// View over a map-valued property.
pub struct PropertyValueDict<'h, H: ContainerHost + ?Sized> {
    owner: Owner<'h, H>,
}

fn position(entries: &[(Value, Value)], key: &Value) -> Option<usize> {
    entries.iter().position(|(k, _)| k == key)
}

impl<'h, H: ContainerHost + ?Sized> PropertyValueDict<'h, H> {
    /// Views `model.attr` on `host`.
    pub fn new(host: &'h mut H, model: &ModelId, attr: &str) -> Self {
        Self {
            owner: Owner {
                host,
                model: model.clone(),
                attr: attr.to_string(),
                setter: None,
            },
        }
    }

    /// Tags every notification with a setter token.
    #[must_use]
    pub fn with_setter(mut self, setter: Option<SetterId>) -> Self {
        self.owner.setter = setter;
        self
    }

    fn entries<'v>(&self, value: &'v Value) -> Result<&'v [(Value, Value)], Error> {
        value.as_map().ok_or_else(|| self.owner.not_a("dict"))
    }

    fn edit<R>(
        &mut self,
        op: impl FnOnce(&mut Vec<(Value, Value)>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let not_a = self.owner.not_a("dict");
        self.owner.mutate(None, |value| match value {
            Value::Map(entries) => op(entries),
            _ => Err(not_a),
        })
    }

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn len(&self) -> Result<usize, Error> {
        let value = self.owner.read()?;
        Ok(self.entries(&value)?.len())
    }

    /// Whether the map is empty.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<Value>, Error> {
        let key = key.into();
        let value = self.owner.read()?;
        let entries = self.entries(&value)?;
        Ok(position(entries, &key).map(|i| entries[i].1.clone()))
    }

    /// Whether `key` is present.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn contains_key(&self, key: impl Into<Value>) -> Result<bool, Error> {
        let key = key.into();
        let value = self.owner.read()?;
        Ok(position(self.entries(&value)?, &key).is_some())
    }

    /// Keys in insertion order.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn keys(&self) -> Result<Vec<Value>, Error> {
        let value = self.owner.read()?;
        Ok(self.entries(&value)?.iter().map(|(k, _)| k.clone()).collect())
    }

    /// Stores `value` under `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn insert(
        &mut self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, Error> {
        let (key, value) = (key.into(), value.into());
        self.edit(|entries| {
            Ok(match position(entries, &key) {
                Some(i) => Some(std::mem::replace(&mut entries[i].1, value)),
                None => {
                    entries.push((key, value));
                    None
                }
            })
        })
    }

    /// Removes `key`, returning its value.
    ///
    /// # Errors
    ///
    /// Fails when the key is missing.
    pub fn remove(&mut self, key: impl Into<Value>) -> Result<Value, Error> {
        let key = key.into();
        self.edit(|entries| match position(entries, &key) {
            Some(i) => Ok(entries.remove(i).1),
            None => Err(missing("remove", format!("key {} not found", key.describe()))),
        })
    }

    /// Removes `key` if present. Notifies either way.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn pop(&mut self, key: impl Into<Value>) -> Result<Option<Value>, Error> {
        let key = key.into();
        self.edit(|entries| Ok(position(entries, &key).map(|i| entries.remove(i).1)))
    }

    /// Removes and returns the most recently inserted entry.
    ///
    /// # Errors
    ///
    /// Fails when the map is empty.
    pub fn pop_item(&mut self) -> Result<(Value, Value), Error> {
        self.edit(|entries| {
            entries
                .pop()
                .ok_or_else(|| missing("pop_item", "dictionary is empty"))
        })
    }

    /// Returns the value under `key`, inserting `default` first when absent.
    /// Notifies either way.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn set_default(
        &mut self,
        key: impl Into<Value>,
        default: impl Into<Value>,
    ) -> Result<Value, Error> {
        let (key, default) = (key.into(), default.into());
        self.edit(|entries| {
            Ok(match position(entries, &key) {
                Some(i) => entries[i].1.clone(),
                None => {
                    entries.push((key, default.clone()));
                    default
                }
            })
        })
    }

    /// Stores every pair.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn update(&mut self, pairs: impl IntoIterator<Item = (Value, Value)>) -> Result<(), Error> {
        let pairs: Vec<(Value, Value)> = pairs.into_iter().collect();
        self.edit(|entries| {
            for (key, value) in pairs {
                match position(entries, &key) {
                    Some(i) => entries[i].1 = value,
                    None => entries.push((key, value)),
                }
            }
            Ok(())
        })
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a map.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.edit(|entries| {
            entries.clear();
            Ok(())
        })
    }
}

// ============================================================================
// Sets
// ============================================================================

/// View over a set-valued property.
pub struct PropertyValueSet<'h, H: ContainerHost + ?Sized> {
    owner: Owner<'h, H>,
}

impl<'h, H: ContainerHost + ?Sized> PropertyValueSet<'h, H> {
    /// Views `model.attr` on `host`.
    pub fn new(host: &'h mut H, model: &ModelId, attr: &str) -> Self {
        Self {
            owner: Owner {
                host,
                model: model.clone(),
                attr: attr.to_string(),
                setter: None,
            },
        }
    }

    /// Tags every notification with a setter token.
    #[must_use]
    pub fn with_setter(mut self, setter: Option<SetterId>) -> Self {
        self.owner.setter = setter;
        self
    }

    fn members<'v>(&self, value: &'v Value) -> Result<&'v [Value], Error> {
        match value {
            Value::Set(items) => Ok(items),
            _ => Err(self.owner.not_a("set")),
        }
    }

    fn edit<R>(&mut self, op: impl FnOnce(&mut Vec<Value>) -> Result<R, Error>) -> Result<R, Error> {
        let not_a = self.owner.not_a("set");
        self.owner.mutate(None, |value| match value {
            Value::Set(items) => op(items),
            _ => Err(not_a),
        })
    }

    /// Number of members.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn len(&self) -> Result<usize, Error> {
        let value = self.owner.read()?;
        Ok(self.members(&value)?.len())
    }

    /// Whether the set is empty.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Whether `item` is a member.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn contains(&self, item: &Value) -> Result<bool, Error> {
        let value = self.owner.read()?;
        Ok(self.members(&value)?.contains(item))
    }

    /// Adds a member. Notifies even when it was already present.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn add(&mut self, item: impl Into<Value>) -> Result<(), Error> {
        let item = item.into();
        self.edit(|items| {
            if !items.contains(&item) {
                items.push(item);
            }
            Ok(())
        })
    }

    /// Removes a member if present. Notifies either way.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn discard(&mut self, item: &Value) -> Result<(), Error> {
        self.edit(|items| {
            items.retain(|x| x != item);
            Ok(())
        })
    }

    /// Removes a member.
    ///
    /// # Errors
    ///
    /// Fails when `item` is not a member.
    pub fn remove(&mut self, item: &Value) -> Result<(), Error> {
        self.edit(|items| match items.iter().position(|x| x == item) {
            Some(i) => {
                items.remove(i);
                Ok(())
            }
            None => Err(missing("remove", format!("{} not in set", item.describe()))),
        })
    }

    /// Removes and returns an arbitrary member.
    ///
    /// # Errors
    ///
    /// Fails when the set is empty.
    pub fn pop(&mut self) -> Result<Value, Error> {
        self.edit(|items| items.pop().ok_or_else(|| missing("pop", "pop from an empty set")))
    }

    /// Adds every item.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn update(&mut self, more: impl IntoIterator<Item = Value>) -> Result<(), Error> {
        let more: Vec<Value> = more.into_iter().collect();
        self.edit(|items| {
            for item in more {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            Ok(())
        })
    }

    /// Removes every member found in `other`.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn difference_update(&mut self, other: impl IntoIterator<Item = Value>) -> Result<(), Error> {
        let other: Vec<Value> = other.into_iter().collect();
        self.edit(|items| {
            items.retain(|x| !other.contains(x));
            Ok(())
        })
    }

    /// Keeps only members found in `other`.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn intersection_update(
        &mut self,
        other: impl IntoIterator<Item = Value>,
    ) -> Result<(), Error> {
        let other: Vec<Value> = other.into_iter().collect();
        self.edit(|items| {
            items.retain(|x| other.contains(x));
            Ok(())
        })
    }

    /// Keeps members found in exactly one of the two sets.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn symmetric_difference_update(
        &mut self,
        other: impl IntoIterator<Item = Value>,
    ) -> Result<(), Error> {
        let other: Vec<Value> = other.into_iter().collect();
        self.edit(|items| {
            for item in other {
                match items.iter().position(|x| *x == item) {
                    Some(i) => {
                        items.remove(i);
                    }
                    None => items.push(item),
                }
            }
            Ok(())
        })
    }

    /// Removes every member.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold a set.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.edit(|items| {
            items.clear();
            Ok(())
        })
    }
}

// ============================================================================
// Column data
// ============================================================================

/// View over a columnar-data property (`column name → sequence`).
///
/// Besides whole-column replacement it supports streaming rows and sparse
/// patches, each reported with a narrow [`ChangeHint`].
pub struct PropertyValueColumnData<'h, H: ContainerHost + ?Sized> {
    owner: Owner<'h, H>,
}

fn column_entries<'v>(
    value: &'v mut Value,
    not_a: impl FnOnce() -> Error,
) -> Result<&'v mut Vec<(Value, Value)>, Error> {
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(not_a()),
    }
}

fn column_position(entries: &[(Value, Value)], name: &str) -> Option<usize> {
    entries.iter().position(|(k, _)| k.as_str() == Some(name))
}

fn rows(value: &Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::TypedArray(array) => Ok(array.to_values()),
        other => Err(missing(
            "stream",
            format!("expected a sequence of rows, got {}", other.describe()),
        )),
    }
}

/// Appends `data` to the columns in `entries`, trimming to `rollover` rows.
pub(crate) fn stream_rows(
    entries: &mut Vec<(Value, Value)>,
    data: &[(String, Value)],
    rollover: Option<usize>,
) -> Result<(), Error> {
    if !entries.is_empty() {
        let mut existing: Vec<&str> = entries.iter().filter_map(|(k, _)| k.as_str()).collect();
        let mut streamed: Vec<&str> = data.iter().map(|(k, _)| k.as_str()).collect();
        existing.sort_unstable();
        streamed.sort_unstable();
        if existing != streamed {
            return Err(missing(
                "stream",
                format!(
                    "must stream updates to all existing columns (existing: {}, streamed: {})",
                    existing.join(", "),
                    streamed.join(", ")
                ),
            ));
        }
    }
    let mut lengths = Vec::with_capacity(data.len());
    for (_, column) in data {
        lengths.push(
            column
                .sequence_len()
                .ok_or_else(|| missing("stream", "streamed columns must be sequences"))?,
        );
    }
    if lengths.windows(2).any(|w| w[0] != w[1]) {
        return Err(missing("stream", "all streaming column updates must be the same length"));
    }

    for (name, column) in data {
        let appended = rows(column)?;
        let slot = match column_position(entries, name) {
            Some(i) => &mut entries[i].1,
            None => {
                entries.push((Value::String(name.clone()), Value::List(Vec::new())));
                let last = entries.len() - 1;
                &mut entries[last].1
            }
        };
        match slot {
            Value::List(items) => {
                items.extend(appended);
                if let Some(limit) = rollover {
                    if items.len() > limit {
                        let excess = items.len() - limit;
                        items.drain(..excess);
                    }
                }
            }
            Value::TypedArray(array) => {
                array
                    .extend_from(&appended)
                    .map_err(|reason| missing("stream", reason))?;
                if let Some(limit) = rollover {
                    if array.len() > limit {
                        array.drain_front(array.len() - limit);
                    }
                }
            }
            other => {
                return Err(missing(
                    "stream",
                    format!("cannot stream into column {name} holding {}", other.describe()),
                ))
            }
        }
    }
    Ok(())
}

/// Applies sparse overwrites to the columns in `entries`. Every patch is
/// checked before any is applied.
pub(crate) fn patch_rows(
    entries: &mut [(Value, Value)],
    patches: &ColumnPatches,
) -> Result<(), Error> {
    let mut resolved: Vec<(usize, Vec<(usize, Value)>)> = Vec::new();
    for (name, edits) in patches {
        let Some(column) = column_position(entries, name) else {
            return Err(missing("patch", format!("cannot patch non-existent column {name}")));
        };
        let len = entries[column].1.sequence_len().ok_or_else(|| {
            missing("patch", format!("column {name} does not hold a sequence"))
        })?;
        let mut cells = Vec::new();
        for (index, value) in edits {
            match index {
                PatchIndex::Index(i) => {
                    if *i >= len {
                        return Err(missing(
                            "patch",
                            format!("out-of-range index {i} for column {name} of length {len}"),
                        ));
                    }
                    cells.push((*i, value.clone()));
                }
                PatchIndex::Slice(slice) => {
                    let indices = slice.indices(len).map_err(|reason| missing("patch", reason))?;
                    let values = rows(value)?;
                    if values.len() != indices.len() {
                        return Err(missing(
                            "patch",
                            format!(
                                "slice {slice} of column {name} addresses {} rows, got {} values",
                                indices.len(),
                                values.len()
                            ),
                        ));
                    }
                    cells.extend(indices.into_iter().zip(values));
                }
            }
        }
        resolved.push((column, cells));
    }

    for (column, cells) in resolved {
        let slot = &mut entries[column].1;
        for (i, value) in cells {
            match slot {
                Value::List(items) => items[i] = value,
                Value::TypedArray(array) => {
                    array.set(i, &value).map_err(|reason| missing("patch", reason))?;
                }
                other => {
                    return Err(missing(
                        "patch",
                        format!("cannot patch a column holding {}", other.describe()),
                    ))
                }
            }
        }
    }
    Ok(())
}

impl<'h, H: ContainerHost + ?Sized> PropertyValueColumnData<'h, H> {
    /// Views `model.attr` on `host`.
    pub fn new(host: &'h mut H, model: &ModelId, attr: &str) -> Self {
        Self {
            owner: Owner {
                host,
                model: model.clone(),
                attr: attr.to_string(),
                setter: None,
            },
        }
    }

    /// Tags every notification with a setter token.
    #[must_use]
    pub fn with_setter(mut self, setter: Option<SetterId>) -> Self {
        self.owner.setter = setter;
        self
    }

    fn edit<R>(
        &mut self,
        hint: Option<ChangeHint>,
        op: impl FnOnce(&mut Vec<(Value, Value)>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let not_a = self.owner.not_a("column data");
        self.owner
            .mutate(hint, |value| op(column_entries(value, || not_a)?))
    }

    /// Column names in insertion order.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold column data.
    pub fn columns(&self) -> Result<Vec<String>, Error> {
        let value = self.owner.read()?;
        let entries = value.as_map().ok_or_else(|| self.owner.not_a("column data"))?;
        Ok(entries
            .iter()
            .filter_map(|(k, _)| k.as_str().map(str::to_string))
            .collect())
    }

    /// A copy of one column.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold column data.
    pub fn column(&self, name: &str) -> Result<Option<Value>, Error> {
        let value = self.owner.read()?;
        let entries = value.as_map().ok_or_else(|| self.owner.not_a("column data"))?;
        Ok(column_position(entries, name).map(|i| entries[i].1.clone()))
    }

    /// Length of the first column, or zero.
    ///
    /// # Errors
    ///
    /// Fails when the property does not hold column data.
    pub fn row_count(&self) -> Result<usize, Error> {
        let value = self.owner.read()?;
        let entries = value.as_map().ok_or_else(|| self.owner.not_a("column data"))?;
        Ok(entries
            .first()
            .and_then(|(_, column)| column.sequence_len())
            .unwrap_or(0))
    }

    /// Replaces (or adds) the given columns.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn update(&mut self, columns: Vec<(String, Value)>) -> Result<(), Error> {
        let cols = columns.iter().map(|(name, _)| name.clone()).collect();
        self.edit(
            Some(ChangeHint::ColumnDataChanged { cols: Some(cols) }),
            |entries| {
                for (name, column) in columns {
                    match column_position(entries, &name) {
                        Some(i) => entries[i].1 = column,
                        None => entries.push((Value::String(name), column)),
                    }
                }
                Ok(())
            },
        )
    }

    /// Replaces (or adds) one column.
    ///
    /// # Errors
    ///
    /// Fails when the result does not validate.
    pub fn insert(&mut self, name: &str, column: impl Into<Value>) -> Result<(), Error> {
        self.update(vec![(name.to_string(), column.into())])
    }

    /// Removes a column.
    ///
    /// # Errors
    ///
    /// Fails when the column is missing.
    pub fn remove(&mut self, name: &str) -> Result<Value, Error> {
        self.edit(None, |entries| match column_position(entries, name) {
            Some(i) => Ok(entries.remove(i).1),
            None => Err(missing("remove", format!("column {name} not found"))),
        })
    }

    /// Appends rows to every column, keeping at most `rollover` rows.
    ///
    /// # Errors
    ///
    /// Fails when the streamed columns differ from the existing ones, have
    /// unequal lengths, or do not fit the column element types.
    pub fn stream(
        &mut self,
        data: Vec<(String, Value)>,
        rollover: Option<usize>,
    ) -> Result<(), Error> {
        let hint = ChangeHint::ColumnsStreamed {
            data: data.clone(),
            rollover,
        };
        self.edit(Some(hint), |entries| stream_rows(entries, &data, rollover))
    }

    /// Overwrites individual cells or slices.
    ///
    /// # Errors
    ///
    /// Fails when a column is missing, an index is out of range, or a slice
    /// is paired with the wrong number of values.
    pub fn patch(&mut self, patches: ColumnPatches) -> Result<(), Error> {
        let hint = ChangeHint::ColumnsPatched {
            patches: patches.clone(),
        };
        self.edit(Some(hint), |entries| patch_rows(entries, &patches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::property::{Kind, PropertyDescriptor};
    use crate::registry::{TypeDef, TypeRegistry};
    use crate::value::TypedArray;

    fn setup() -> (ModelArena, ModelId) {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDef::new("Holder")
                    .property(PropertyDescriptor::new("items", Kind::list(Kind::Int)))
                    .property(PropertyDescriptor::new("lookup", Kind::dict(Kind::String, Kind::Int)))
                    .property(PropertyDescriptor::new("flags", Kind::set(Kind::String)))
                    .property(PropertyDescriptor::new("data", Kind::ColumnData)),
            )
            .expect("registers");
        let model = Model::new(registry.resolve("Holder").expect("known")).expect("concrete");
        let id = model.id().clone();
        let mut arena = ModelArena::new();
        arena.insert(model);
        (arena, id)
    }

    #[test]
    fn list_mutations_store_and_reads_do_not() {
        let (mut arena, id) = setup();
        let mut list = PropertyValueList::new(&mut arena, &id, "items");
        list.push(1).expect("valid");
        list.extend([Value::Int(3), Value::Int(2)]).expect("valid");
        list.sort().expect("comparable");
        assert_eq!(list.to_vec().expect("list"), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.pop().expect("non-empty"), Value::Int(3));
        assert!(list.remove(&Value::Int(9)).is_err());
        assert!(arena.get(&id).expect("present").is_set("items"));
    }

    #[test]
    fn invalid_list_mutation_is_rolled_back() {
        let (mut arena, id) = setup();
        let mut list = PropertyValueList::new(&mut arena, &id, "items");
        list.push(1).expect("valid");
        assert!(list.push("nope").is_err());
        assert_eq!(list.to_vec().expect("list"), vec![Value::Int(1)]);
    }

    #[test]
    fn dict_and_set_operations() {
        let (mut arena, id) = setup();
        let mut dict = PropertyValueDict::new(&mut arena, &id, "lookup");
        assert_eq!(dict.insert("a", 1).expect("valid"), None);
        assert_eq!(dict.insert("a", 2).expect("valid"), Some(Value::Int(1)));
        assert_eq!(dict.set_default("b", 5).expect("valid"), Value::Int(5));
        assert!(dict.remove("zz").is_err());
        assert_eq!(dict.len().expect("dict"), 2);

        let mut set = PropertyValueSet::new(&mut arena, &id, "flags");
        set.update([Value::from("x"), Value::from("y")]).expect("valid");
        set.add("x").expect("valid");
        assert_eq!(set.len().expect("set"), 2);
        set.symmetric_difference_update([Value::from("y"), Value::from("z")])
            .expect("valid");
        assert!(set.contains(&Value::from("z")).expect("set"));
        assert!(!set.contains(&Value::from("y")).expect("set"));
    }

    #[test]
    fn stream_appends_and_rolls_over() {
        let (mut arena, id) = setup();
        let mut data = PropertyValueColumnData::new(&mut arena, &id, "data");
        data.update(vec![
            ("x".into(), Value::list([1, 2, 3])),
            ("y".into(), Value::TypedArray(TypedArray::Float64(vec![1.0, 2.0, 3.0]))),
        ])
        .expect("valid");
        data.stream(
            vec![
                ("x".into(), Value::list([4, 5])),
                ("y".into(), Value::list([4.0, 5.0])),
            ],
            Some(4),
        )
        .expect("valid stream");
        assert_eq!(data.column("x").expect("data"), Some(Value::list([2, 3, 4, 5])));
        assert_eq!(
            data.column("y").expect("data"),
            Some(Value::TypedArray(TypedArray::Float64(vec![2.0, 3.0, 4.0, 5.0])))
        );
        assert!(data
            .stream(vec![("x".into(), Value::list([6]))], None)
            .is_err());
        assert!(data
            .stream(
                vec![("x".into(), Value::list([6])), ("y".into(), Value::list([6.0, 7.0]))],
                None
            )
            .is_err());
        assert_eq!(data.row_count().expect("data"), 4);
    }

    #[test]
    fn patch_checks_before_applying() {
        let (mut arena, id) = setup();
        let mut data = PropertyValueColumnData::new(&mut arena, &id, "data");
        data.insert("x", Value::list([0, 0, 0, 0])).expect("valid");
        data.patch(vec![(
            "x".into(),
            vec![
                (PatchIndex::Index(0), Value::Int(7)),
                (PatchIndex::Slice(Slice::range(2, 4)), Value::list([8, 9])),
            ],
        )])
        .expect("valid patch");
        assert_eq!(data.column("x").expect("data"), Some(Value::list([7, 0, 8, 9])));

        let err = data.patch(vec![(
            "x".into(),
            vec![
                (PatchIndex::Index(1), Value::Int(1)),
                (PatchIndex::Index(10), Value::Int(1)),
            ],
        )]);
        assert!(err.is_err());
        assert_eq!(data.column("x").expect("data"), Some(Value::list([7, 0, 8, 9])));
        assert!(data
            .patch(vec![("missing".into(), vec![(PatchIndex::Index(0), Value::Int(1))])])
            .is_err());
    }
}
