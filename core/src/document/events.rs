//! The closed set of document change events.
//!
//! [`PatchEvent`]s are the replayable subset: each one encodes to the wire,
//! decodes against a receiving document, and applies through the same
//! validating setters a local caller would use. Session-callback events are
//! local bookkeeping and never leave the process.

use serde_json::{json, Map, Value as Json};

use crate::containers::{ColumnPatches, PatchIndex};
use crate::error::{DeserializationError, Error, SerializationError};
use crate::id::{CallbackId, DocumentId, ModelId, SetterId};
use crate::model::PropertyChange;
use crate::serialization::{Deserializer, Serializer};
use crate::value::Value;

use super::Document;

/// A replayable change to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchEvent {
    /// An attribute was assigned a new value.
    ModelChanged {
        /// Changed model.
        model: ModelId,
        /// Changed attribute.
        attr: String,
        /// New value.
        new: Value,
    },
    /// Columns of a columnar-data attribute were replaced.
    ColumnDataChanged {
        /// Owning model.
        model: ModelId,
        /// Columnar attribute.
        attr: String,
        /// The replaced columns (all of them when `cols` is `None`).
        data: Value,
        /// Names of the replaced columns.
        cols: Option<Vec<String>>,
    },
    /// Rows were appended to a columnar-data attribute.
    ColumnsStreamed {
        /// Owning model.
        model: ModelId,
        /// Columnar attribute.
        attr: String,
        /// Appended rows per column.
        data: Vec<(String, Value)>,
        /// Maximum retained length.
        rollover: Option<usize>,
    },
    /// Cells of a columnar-data attribute were overwritten.
    ColumnsPatched {
        /// Owning model.
        model: ModelId,
        /// Columnar attribute.
        attr: String,
        /// Overwrites per column.
        patches: ColumnPatches,
    },
    /// The document title changed.
    TitleChanged {
        /// New title.
        title: String,
    },
    /// A root was added.
    RootAdded {
        /// The new root.
        model: ModelId,
    },
    /// A root was removed.
    RootRemoved {
        /// The former root.
        model: ModelId,
    },
    /// An application message for the peer.
    MessageSent {
        /// Message channel name.
        msg_type: String,
        /// Payload.
        msg_data: Value,
    },
}

impl PatchEvent {
    /// Wire discriminator.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::ModelChanged { .. } => "ModelChanged",
            Self::ColumnDataChanged { .. } => "ColumnDataChanged",
            Self::ColumnsStreamed { .. } => "ColumnsStreamed",
            Self::ColumnsPatched { .. } => "ColumnsPatched",
            Self::TitleChanged { .. } => "TitleChanged",
            Self::RootAdded { .. } => "RootAdded",
            Self::RootRemoved { .. } => "RootRemoved",
            Self::MessageSent { .. } => "MessageSent",
        }
    }

    /// Every wire discriminator, in declaration order.
    pub const KINDS: [&'static str; 8] = [
        "ModelChanged",
        "ColumnDataChanged",
        "ColumnsStreamed",
        "ColumnsPatched",
        "TitleChanged",
        "RootAdded",
        "RootRemoved",
        "MessageSent",
    ];

    /// Model the event is about, if any.
    #[must_use]
    pub fn model(&self) -> Option<&ModelId> {
        match self {
            Self::ModelChanged { model, .. }
            | Self::ColumnDataChanged { model, .. }
            | Self::ColumnsStreamed { model, .. }
            | Self::ColumnsPatched { model, .. }
            | Self::RootAdded { model }
            | Self::RootRemoved { model } => Some(model),
            Self::TitleChanged { .. } | Self::MessageSent { .. } => None,
        }
    }

    fn key(&self) -> Option<(&ModelId, &str)> {
        match self {
            Self::ModelChanged { model, attr, .. }
            | Self::ColumnDataChanged { model, attr, .. }
            | Self::ColumnsStreamed { model, attr, .. }
            | Self::ColumnsPatched { model, attr, .. } => Some((model, attr)),
            _ => None,
        }
    }

    /// Whether this locally raised event reproduces `received`: same target
    /// and same value. A full column replacement is raised locally as a plain
    /// attribute change.
    fn replays(&self, received: &Self) -> bool {
        match (self, received) {
            (
                Self::ModelChanged { model, attr, new },
                Self::ColumnDataChanged {
                    model: received_model,
                    attr: received_attr,
                    data,
                    cols: None,
                },
            ) => model == received_model && attr == received_attr && new == data,
            _ => self == received,
        }
    }

    /// Wire representation.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors of the carried values.
    pub fn to_serializable(&self, serializer: &mut Serializer<'_>) -> Result<Json, SerializationError> {
        let kind = self.kind_name();
        Ok(match self {
            Self::ModelChanged { model, attr, new } => json!({
                "kind": kind,
                "model": {"id": model},
                "attr": attr,
                "new": serializer.encode(new)?,
            }),
            Self::ColumnDataChanged {
                model,
                attr,
                data,
                cols,
            } => json!({
                "kind": kind,
                "model": {"id": model},
                "attr": attr,
                "data": serializer.encode(data)?,
                "cols": cols,
            }),
            Self::ColumnsStreamed {
                model,
                attr,
                data,
                rollover,
            } => json!({
                "kind": kind,
                "model": {"id": model},
                "attr": attr,
                "data": serializer.encode(&columns_to_value(data))?,
                "rollover": rollover,
            }),
            Self::ColumnsPatched {
                model,
                attr,
                patches,
            } => json!({
                "kind": kind,
                "model": {"id": model},
                "attr": attr,
                "patches": serializer.encode(&patches_to_value(patches))?,
            }),
            Self::TitleChanged { title } => json!({"kind": kind, "title": title}),
            Self::RootAdded { model } => json!({
                "kind": kind,
                "model": serializer.encode_model(model)?,
            }),
            Self::RootRemoved { model } => json!({"kind": kind, "model": {"id": model}}),
            Self::MessageSent { msg_type, msg_data } => json!({
                "kind": kind,
                "msg_type": msg_type,
                "msg_data": serializer.encode(msg_data)?,
            }),
        })
    }

    /// Decodes a wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializationError::UnknownReference`] when the event
    /// names a model the receiver cannot resolve, and
    /// [`DeserializationError::Malformed`] for unknown kinds or missing
    /// fields.
    pub fn decode(rep: &Json, de: &mut Deserializer<'_>) -> Result<Self, DeserializationError> {
        let fields = rep
            .as_object()
            .ok_or_else(|| DeserializationError::malformed("patch event must be an object"))?;
        let kind = str_field(fields, "kind")?;
        Ok(match kind {
            "ModelChanged" => Self::ModelChanged {
                model: model_field(fields, de)?,
                attr: str_field(fields, "attr")?.to_string(),
                new: de.decode(field(fields, "new")?)?,
            },
            "ColumnDataChanged" => Self::ColumnDataChanged {
                model: model_field(fields, de)?,
                attr: str_field(fields, "attr")?.to_string(),
                data: de.decode(field(fields, "data")?)?,
                cols: match fields.get("cols") {
                    None | Some(Json::Null) => None,
                    Some(cols) => Some(string_list(cols)?),
                },
            },
            "ColumnsStreamed" => Self::ColumnsStreamed {
                model: model_field(fields, de)?,
                attr: str_field(fields, "attr")?.to_string(),
                data: columns_from_value(de.decode(field(fields, "data")?)?)?,
                rollover: match fields.get("rollover") {
                    None | Some(Json::Null) => None,
                    Some(n) => Some(
                        n.as_u64()
                            .and_then(|n| usize::try_from(n).ok())
                            .ok_or_else(|| DeserializationError::malformed("rollover must be a size"))?,
                    ),
                },
            },
            "ColumnsPatched" => Self::ColumnsPatched {
                model: model_field(fields, de)?,
                attr: str_field(fields, "attr")?.to_string(),
                patches: patches_from_value(de.decode(field(fields, "patches")?)?)?,
            },
            "TitleChanged" => Self::TitleChanged {
                title: str_field(fields, "title")?.to_string(),
            },
            "RootAdded" => Self::RootAdded {
                model: model_field(fields, de)?,
            },
            "RootRemoved" => Self::RootRemoved {
                model: model_field(fields, de)?,
            },
            "MessageSent" => Self::MessageSent {
                msg_type: str_field(fields, "msg_type")?.to_string(),
                msg_data: de.decode(fields.get("msg_data").unwrap_or(&Json::Null))?,
            },
            other => {
                return Err(DeserializationError::malformed(format!(
                    "unknown patch event kind '{other}'"
                )))
            }
        })
    }

    /// Replays the event on `doc` through its validating setters.
    ///
    /// # Errors
    ///
    /// Propagates validation and lookup errors; events before the failing
    /// one stay applied.
    pub fn apply(&self, doc: &mut Document) -> Result<(), Error> {
        match self {
            Self::ModelChanged { model, attr, new } => {
                doc.set_from_json(model, attr, new.clone())
            }
            Self::ColumnDataChanged {
                model,
                attr,
                data,
                cols,
            } => match cols {
                None => doc.set_from_json(model, attr, data.clone()),
                Some(cols) => {
                    let entries = data.as_map().unwrap_or_default();
                    let columns: Vec<(String, Value)> = cols
                        .iter()
                        .filter_map(|col| {
                            entries
                                .iter()
                                .find(|(k, _)| k.as_str() == Some(col.as_str()))
                                .map(|(_, v)| (col.clone(), v.clone()))
                        })
                        .collect();
                    doc.columns_mut(model, attr).update(columns)
                }
            },
            Self::ColumnsStreamed {
                model,
                attr,
                data,
                rollover,
            } => doc.columns_mut(model, attr).stream(data.clone(), *rollover),
            Self::ColumnsPatched {
                model,
                attr,
                patches,
            } => doc.columns_mut(model, attr).patch(patches.clone()),
            Self::TitleChanged { title } => {
                doc.set_title(title.clone());
                Ok(())
            }
            Self::RootAdded { model } => doc.add_root(model),
            Self::RootRemoved { model } => {
                doc.remove_root(model);
                Ok(())
            }
            Self::MessageSent { msg_type, msg_data } => {
                doc.trigger_on_message(msg_type, msg_data);
                Ok(())
            }
        }
    }
}

/// What happened to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    /// A replayable change.
    Patched(PatchEvent),
    /// A session callback was scheduled.
    SessionCallbackAdded {
        /// The callback handle.
        callback: CallbackId,
    },
    /// A session callback was removed or a one-shot callback fired.
    SessionCallbackRemoved {
        /// The callback handle.
        callback: CallbackId,
    },
}

/// An event delivered to document change callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChangedEvent {
    /// Document that changed.
    pub document: DocumentId,
    /// Origin of the change, if tagged.
    pub setter: Option<SetterId>,
    /// The peer event this change replays, when it was applied from a
    /// received patch.
    pub received: Option<PatchEvent>,
    /// What happened.
    pub change: DocumentChange,
    /// The attribute change behind the event, driving per-attribute
    /// callbacks.
    pub callback: Option<PropertyChange>,
}

impl DocumentChangedEvent {
    /// The replayable part, if any.
    #[must_use]
    pub fn patch(&self) -> Option<&PatchEvent> {
        match &self.change {
            DocumentChange::Patched(event) => Some(event),
            _ => None,
        }
    }

    /// Whether the change is exactly the received one. Changes tagged without
    /// a single received event (snapshot replacement) count as received.
    fn carries_received(&self) -> bool {
        match (&self.received, self.patch()) {
            (None, _) => true,
            (Some(received), Some(patch)) => patch.replays(received),
            (Some(_), None) => false,
        }
    }

    /// Whether `other` touches the same attribute (or title) as this event.
    fn same_key(&self, other: &Self) -> bool {
        match (self.patch(), other.patch()) {
            (Some(PatchEvent::TitleChanged { .. }), Some(PatchEvent::TitleChanged { .. })) => true,
            (Some(a), Some(b)) => a.key().is_some() && a.key() == b.key(),
            _ => false,
        }
    }

    /// Folds a later event into this one when both set the same attribute
    /// (or both set the title) from the same origin. The folded event keeps
    /// this event's `old` value and takes the later `new` value.
    pub fn combine(&mut self, later: &Self) -> bool {
        if self.document != later.document || self.setter != later.setter {
            return false;
        }
        match (&mut self.change, &later.change) {
            (
                DocumentChange::Patched(PatchEvent::ModelChanged { model, attr, new }),
                DocumentChange::Patched(PatchEvent::ModelChanged {
                    model: later_model,
                    attr: later_attr,
                    new: later_new,
                }),
            ) if model == later_model && attr == later_attr => {
                *new = later_new.clone();
            }
            (
                DocumentChange::Patched(PatchEvent::TitleChanged { title }),
                DocumentChange::Patched(PatchEvent::TitleChanged { title: later_title }),
            ) => {
                *title = later_title.clone();
            }
            _ => return false,
        }
        self.received.clone_from(&later.received);
        match (&mut self.callback, &later.callback) {
            (Some(mine), Some(theirs)) => {
                mine.new = theirs.new.clone();
                mine.hint = theirs.hint.clone();
            }
            (mine @ None, theirs) => *mine = theirs.clone(),
            (Some(_), None) => {}
        }
        true
    }
}

/// Appends `event` to `held`, folding it into the most recent held event
/// for the same key when possible. Scanning stops at the first held event
/// for the same key, so a non-combinable change is never reordered.
pub(crate) fn combine_into(held: &mut Vec<DocumentChangedEvent>, event: DocumentChangedEvent) {
    for previous in held.iter_mut().rev() {
        if previous.same_key(&event) {
            if previous.combine(&event) {
                return;
            }
            break;
        }
    }
    held.push(event);
}

/// Whether every event in a patch originated from `setter` and still carries
/// the value that arrived from it, in which case sending it back would echo
/// the peer's own change.
#[must_use]
pub fn should_suppress_on_change(setter: &SetterId, events: &[DocumentChangedEvent]) -> bool {
    !events.is_empty()
        && events
            .iter()
            .all(|event| event.setter.as_ref() == Some(setter) && event.carries_received())
}

fn field<'j>(fields: &'j Map<String, Json>, key: &str) -> Result<&'j Json, DeserializationError> {
    fields
        .get(key)
        .ok_or_else(|| DeserializationError::malformed(format!("patch event lacks '{key}'")))
}

fn str_field<'j>(fields: &'j Map<String, Json>, key: &str) -> Result<&'j str, DeserializationError> {
    field(fields, key)?
        .as_str()
        .ok_or_else(|| DeserializationError::malformed(format!("patch event '{key}' must be a string")))
}

fn model_field(
    fields: &Map<String, Json>,
    de: &mut Deserializer<'_>,
) -> Result<ModelId, DeserializationError> {
    match de.decode(field(fields, "model")?)? {
        Value::Ref(id) => Ok(id),
        other => Err(DeserializationError::malformed(format!(
            "patch event model must be a reference, got {}",
            other.describe()
        ))),
    }
}

fn string_list(json: &Json) -> Result<Vec<String>, DeserializationError> {
    json.as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| DeserializationError::malformed("cols must be a list of column names"))
}

fn columns_to_value(data: &[(String, Value)]) -> Value {
    Value::Map(
        data.iter()
            .map(|(name, column)| (Value::String(name.clone()), column.clone()))
            .collect(),
    )
}

fn columns_from_value(value: Value) -> Result<Vec<(String, Value)>, DeserializationError> {
    let Value::Map(entries) = value else {
        return Err(DeserializationError::malformed("streamed data must be a map of columns"));
    };
    entries
        .into_iter()
        .map(|(name, column)| match name {
            Value::String(name) => Ok((name, column)),
            other => Err(DeserializationError::malformed(format!(
                "column names must be strings, got {}",
                other.describe()
            ))),
        })
        .collect()
}

fn patches_to_value(patches: &ColumnPatches) -> Value {
    Value::Map(
        patches
            .iter()
            .map(|(name, edits)| {
                let edits = edits
                    .iter()
                    .map(|(index, value)| {
                        let index = match index {
                            PatchIndex::Index(i) => Value::Int(*i as i64),
                            PatchIndex::Slice(slice) => Value::Slice(*slice),
                        };
                        Value::List(vec![index, value.clone()])
                    })
                    .collect();
                (Value::String(name.clone()), Value::List(edits))
            })
            .collect(),
    )
}

fn patches_from_value(value: Value) -> Result<ColumnPatches, DeserializationError> {
    let bad = || DeserializationError::malformed("patches must map columns to [index, value] pairs");
    columns_from_value(value)?
        .into_iter()
        .map(|(name, edits)| {
            let Value::List(edits) = edits else {
                return Err(bad());
            };
            let edits = edits
                .into_iter()
                .map(|edit| match edit {
                    Value::List(pair) => match <[Value; 2]>::try_from(pair) {
                        Ok([Value::Int(i), value]) => usize::try_from(i)
                            .map(|i| (PatchIndex::Index(i), value))
                            .map_err(|_| bad()),
                        Ok([Value::Slice(slice), value]) => Ok((PatchIndex::Slice(slice), value)),
                        _ => Err(bad()),
                    },
                    _ => Err(bad()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((name, edits))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ModelArena;
    use crate::registry::TypeRegistry;
    use crate::value::Slice;

    fn changed(doc: DocumentId, setter: Option<SetterId>, attr: &str, old: i64, new: i64) -> DocumentChangedEvent {
        let model = ModelId::from_raw("m1");
        DocumentChangedEvent {
            document: doc,
            setter,
            received: None,
            change: DocumentChange::Patched(PatchEvent::ModelChanged {
                model: model.clone(),
                attr: attr.into(),
                new: Value::Int(new),
            }),
            callback: Some(PropertyChange {
                model,
                attr: attr.into(),
                old: Value::Int(old),
                new: Value::Int(new),
                hint: None,
            }),
        }
    }

    #[test]
    fn combine_keeps_first_old_and_last_new() {
        let doc = DocumentId::new();
        let mut held = Vec::new();
        combine_into(&mut held, changed(doc, None, "x", 0, 1));
        combine_into(&mut held, changed(doc, None, "y", 0, 5));
        combine_into(&mut held, changed(doc, None, "x", 1, 2));
        assert_eq!(held.len(), 2);
        let first = held[0].callback.as_ref().expect("attribute change");
        assert_eq!((first.attr.as_str(), &first.old, &first.new), ("x", &Value::Int(0), &Value::Int(2)));
        assert_eq!(held[1].callback.as_ref().expect("attribute change").attr, "y");
    }

    #[test]
    fn different_setters_do_not_combine() {
        let doc = DocumentId::new();
        let mut held = Vec::new();
        combine_into(&mut held, changed(doc, None, "x", 0, 1));
        combine_into(&mut held, changed(doc, Some(SetterId::from_raw("s")), "x", 1, 2));
        assert_eq!(held.len(), 2);
    }

    #[test]
    fn suppression_requires_every_event_from_the_setter() {
        let doc = DocumentId::new();
        let me = SetterId::from_raw("me");
        let mine = changed(doc, Some(me.clone()), "x", 0, 1);
        let other = changed(doc, None, "y", 0, 1);
        assert!(should_suppress_on_change(&me, &[mine.clone()]));
        assert!(!should_suppress_on_change(&me, &[mine, other]));
        assert!(!should_suppress_on_change(&me, &[]));
    }

    fn replayed(doc: DocumentId, setter: &SetterId, received: i64, new: i64) -> DocumentChangedEvent {
        let mut event = changed(doc, Some(setter.clone()), "x", 0, new);
        event.received = Some(PatchEvent::ModelChanged {
            model: ModelId::from_raw("m1"),
            attr: "x".into(),
            new: Value::Int(received),
        });
        event
    }

    #[test]
    fn suppression_compares_the_received_value() {
        let doc = DocumentId::new();
        let me = SetterId::from_raw("me");
        assert!(should_suppress_on_change(&me, &[replayed(doc, &me, 1, 1)]));
        assert!(!should_suppress_on_change(&me, &[replayed(doc, &me, 1, 2)]));
        assert!(!should_suppress_on_change(&SetterId::from_raw("you"), &[replayed(doc, &me, 1, 1)]));
    }

    #[test]
    fn combined_replays_keep_the_latest_received_value() {
        let doc = DocumentId::new();
        let me = SetterId::from_raw("me");
        let mut held = Vec::new();
        combine_into(&mut held, replayed(doc, &me, 1, 1));
        combine_into(&mut held, replayed(doc, &me, 2, 2));
        assert_eq!(held.len(), 1);
        assert!(should_suppress_on_change(&me, &held));
    }

    #[test]
    fn full_column_replacements_replay_as_attribute_changes() {
        let model = ModelId::from_raw("src");
        let data = Value::map([("x", Value::list([1, 2]))]);
        let local = PatchEvent::ModelChanged {
            model: model.clone(),
            attr: "data".into(),
            new: data.clone(),
        };
        let received = PatchEvent::ColumnDataChanged {
            model,
            attr: "data".into(),
            data,
            cols: None,
        };
        assert!(local.replays(&received));
        assert!(!received.replays(&local));
    }

    #[test]
    fn patch_events_name_their_model_by_reference() {
        let arena = ModelArena::new();
        let registry = TypeRegistry::new();
        let event = PatchEvent::ColumnsPatched {
            model: ModelId::from_raw("src"),
            attr: "data".into(),
            patches: vec![(
                "x".into(),
                vec![
                    (PatchIndex::Index(0), Value::Int(7)),
                    (PatchIndex::Slice(Slice::range(1, 3)), Value::list([8, 9])),
                ],
            )],
        };
        let mut serializer = Serializer::new(&arena).with_references([&ModelId::from_raw("src")]);
        let rep = event.to_serializable(&mut serializer).expect("encodes");
        assert_eq!(rep["kind"], json!("ColumnsPatched"));

        // The receiver resolves the model through its own index.
        let mut de = Deserializer::new(&registry, &arena);
        let err = PatchEvent::decode(&rep, &mut de).expect_err("model unknown here");
        assert!(matches!(err, DeserializationError::UnknownReference { .. }));
    }

    #[test]
    fn unknown_kinds_are_malformed() {
        let arena = ModelArena::new();
        let registry = TypeRegistry::new();
        let mut de = Deserializer::new(&registry, &arena);
        let err = PatchEvent::decode(&json!({"kind": "Nope"}), &mut de).expect_err("unknown");
        assert!(matches!(err, DeserializationError::Malformed { .. }));
        let title = PatchEvent::decode(&json!({"kind": "TitleChanged", "title": "t"}), &mut de)
            .expect("decodes");
        assert_eq!(title, PatchEvent::TitleChanged { title: "t".into() });
    }
}
