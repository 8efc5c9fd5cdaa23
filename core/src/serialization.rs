//! Conversion between [`Value`]s and the self-describing wire representation.
//!
//! Plain JSON scalars and arrays pass through; everything else is an object
//! with a `type` discriminator (`ref`, `symbol`, `number`, `array`, `set`,
//! `map`, `bytes`, `slice`, `typed_array`, `ndarray`, `object`). Models are
//! encoded inline the first time they are reached and as `{"id": ...}`
//! afterwards. Binary payloads either travel as side buffers referenced by
//! id or inline as base64.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Map, Value as Json};

use crate::arena::{ModelArena, ModelLookup};
use crate::error::{DeserializationError, SerializationError};
use crate::id::{next_buffer_id, ModelId};
use crate::model::Model;
use crate::property::ReferenceTypes;
use crate::registry::TypeRegistry;
use crate::value::{ByteOrder, DType, NdArray, NdData, Slice, StructValue, TypedArray, Value};

/// Largest integer a double represents exactly.
pub const MAX_SAFE_INT: i64 = (1 << 53) - 1;

/// An out-of-band binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    /// Id referenced from the representation.
    pub id: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

/// A representation together with the buffers it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Serialized<T> {
    /// The representation.
    pub content: T,
    /// Buffers referenced by `content`.
    pub buffers: Vec<Buffer>,
}

impl<T> Serialized<T> {
    /// A representation that references no buffers.
    pub fn new(content: T) -> Self {
        Self {
            content,
            buffers: Vec::new(),
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes values, tracking which models the peer already knows.
///
/// An encode error leaves the serializer usable: the in-progress stack is
/// unwound on every path.
pub struct Serializer<'a> {
    lookup: &'a dyn ModelLookup,
    references: HashSet<ModelId>,
    deferred: bool,
    eager_references: bool,
    circular: Vec<ModelId>,
    buffers: Vec<Buffer>,
}

impl<'a> Serializer<'a> {
    /// A serializer resolving model references through `lookup`, with side
    /// buffers enabled and lazy reference registration.
    pub fn new(lookup: &'a dyn ModelLookup) -> Self {
        Self {
            lookup,
            references: HashSet::new(),
            deferred: true,
            eager_references: false,
            circular: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// Models the peer already knows; they are encoded as references.
    #[must_use]
    pub fn with_references<'r>(mut self, known: impl IntoIterator<Item = &'r ModelId>) -> Self {
        self.references.extend(known.into_iter().cloned());
        self
    }

    /// Whether bytes go to side buffers (`true`) or inline base64.
    #[must_use]
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Whether a model counts as known as soon as its encoding starts, which
    /// makes cyclic model graphs encodable.
    #[must_use]
    pub fn eager_references(mut self, eager: bool) -> Self {
        self.eager_references = eager;
        self
    }

    /// Whether `id` will be encoded as a reference.
    #[must_use]
    pub fn has_ref(&self, id: &ModelId) -> bool {
        self.references.contains(id)
    }

    /// Marks `id` as known to the peer.
    pub fn add_ref(&mut self, id: ModelId) {
        self.references.insert(id);
    }

    /// Every model known to the peer after the encodes so far.
    #[must_use]
    pub fn references(&self) -> &HashSet<ModelId> {
        &self.references
    }

    /// Buffers collected so far.
    #[must_use]
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Takes the collected buffers, leaving none behind.
    pub fn take_buffers(&mut self) -> Vec<Buffer> {
        std::mem::take(&mut self.buffers)
    }

    /// Encodes `value` and hands over the buffers collected so far.
    ///
    /// # Errors
    ///
    /// See [`Serializer::encode`].
    pub fn serialize(&mut self, value: &Value) -> Result<Serialized<Json>, SerializationError> {
        let content = self.encode(value)?;
        Ok(Serialized {
            content,
            buffers: self.take_buffers(),
        })
    }

    /// Encodes one value.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::CircularReference`] when a model is
    /// reached again while its own attributes are being encoded, and
    /// [`SerializationError::UnknownModel`] for references the lookup cannot
    /// resolve.
    pub fn encode(&mut self, value: &Value) -> Result<Json, SerializationError> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => self.encode_int(*n),
            Value::Float(f) => encode_float(*f),
            Value::String(s) => Json::String(s.clone()),
            Value::Symbol(name) => json!({"type": "symbol", "name": name}),
            Value::List(items) => Json::Array(self.encode_all(items)?),
            Value::Set(items) => tagged_entries("set", self.encode_all(items)?),
            Value::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push(Json::Array(vec![self.encode(k)?, self.encode(v)?]));
                }
                tagged_entries("map", pairs)
            }
            Value::Bytes(data) => self.encode_bytes(data.clone()),
            Value::Slice(slice) => encode_slice(slice),
            Value::TypedArray(array) => self.encode_typed_array(array),
            Value::NdArray(array) => self.encode_ndarray(array)?,
            Value::Ref(id) => self.encode_model(id)?,
            Value::Struct(record) => self.encode_struct(record)?,
        })
    }

    fn encode_all(&mut self, items: &[Value]) -> Result<Vec<Json>, SerializationError> {
        items.iter().map(|item| self.encode(item)).collect()
    }

    fn encode_int(&self, n: i64) -> Json {
        if -MAX_SAFE_INT < n && n <= MAX_SAFE_INT {
            Json::from(n)
        } else {
            tracing::warn!(value = n, "out of range integer may result in loss of precision");
            encode_float(n as f64)
        }
    }

    /// Encodes raw bytes as a `bytes` record.
    pub fn encode_bytes(&mut self, data: Vec<u8>) -> Json {
        let payload = if self.deferred {
            let id = next_buffer_id();
            self.buffers.push(Buffer {
                id: id.clone(),
                data,
            });
            json!({"id": id})
        } else {
            Json::String(STANDARD.encode(&data))
        };
        json!({"type": "bytes", "data": payload})
    }

    fn encode_typed_array(&mut self, array: &TypedArray) -> Json {
        let order = ByteOrder::native();
        let bytes = self.encode_bytes(array.to_bytes(order));
        json!({
            "type": "typed_array",
            "array": bytes,
            "order": order.as_str(),
            "dtype": array.dtype().as_str(),
        })
    }

    fn encode_ndarray(&mut self, array: &NdArray) -> Result<Json, SerializationError> {
        let order = ByteOrder::native();
        let data = match &array.data {
            NdData::Typed(typed) => self.encode_bytes(typed.to_bytes(order)),
            NdData::Bool(flags) => self.encode_bytes(flags.iter().map(|b| u8::from(*b)).collect()),
            NdData::Object(items) => Json::Array(self.encode_all(items)?),
        };
        Ok(json!({
            "type": "ndarray",
            "array": data,
            "order": order.as_str(),
            "dtype": array.dtype().as_str(),
            "shape": array.shape,
        }))
    }

    fn encode_struct(&mut self, record: &StructValue) -> Result<Json, SerializationError> {
        let mut rep = Map::new();
        rep.insert("type".into(), "object".into());
        rep.insert("name".into(), Json::String(record.name.clone()));
        if !record.fields.is_empty() {
            let mut attributes = Map::new();
            for (name, value) in &record.fields {
                attributes.insert(name.clone(), self.encode(value)?);
            }
            rep.insert("attributes".into(), Json::Object(attributes));
        }
        Ok(Json::Object(rep))
    }

    /// Encodes a model: a reference when the peer knows it, the full object
    /// otherwise.
    ///
    /// # Errors
    ///
    /// See [`Serializer::encode`].
    pub fn encode_model(&mut self, id: &ModelId) -> Result<Json, SerializationError> {
        if self.references.contains(id) {
            return Ok(json!({"id": id}));
        }
        if self.circular.contains(id) {
            return Err(SerializationError::CircularReference { id: id.clone() });
        }
        let lookup = self.lookup;
        let model = lookup
            .model(id)
            .ok_or_else(|| SerializationError::UnknownModel { id: id.clone() })?;

        self.circular.push(id.clone());
        if self.eager_references {
            self.references.insert(id.clone());
        }
        let attributes = self.encode_attributes(model);
        self.circular.pop();
        let attributes = attributes?;
        self.references.insert(id.clone());

        let mut rep = Map::new();
        rep.insert("type".into(), "object".into());
        rep.insert("name".into(), Json::String(model.type_name().to_string()));
        rep.insert("id".into(), Json::String(id.to_string()));
        if !attributes.is_empty() {
            rep.insert("attributes".into(), Json::Object(attributes));
        }
        Ok(Json::Object(rep))
    }

    fn encode_attributes(&mut self, model: &Model) -> Result<Map<String, Json>, SerializationError> {
        let mut attributes = Map::new();
        for (name, value) in model.serializable_values(false) {
            attributes.insert(name, self.encode(&value)?);
        }
        Ok(attributes)
    }
}

fn encode_float(f: f64) -> Json {
    if f.is_nan() {
        json!({"type": "number", "value": "nan"})
    } else if f.is_infinite() {
        json!({"type": "number", "value": if f < 0.0 { "-inf" } else { "+inf" }})
    } else {
        Json::from(f)
    }
}

fn encode_slice(slice: &Slice) -> Json {
    json!({
        "type": "slice",
        "start": slice.start,
        "stop": slice.stop,
        "step": slice.step,
    })
}

fn tagged_entries(kind: &str, entries: Vec<Json>) -> Json {
    if entries.is_empty() {
        json!({"type": kind})
    } else {
        json!({"type": kind, "entries": entries})
    }
}

// ============================================================================
// Decoding
// ============================================================================

struct Layered<'x> {
    created: &'x ModelArena,
    existing: &'x dyn ModelLookup,
}

impl ReferenceTypes for Layered<'_> {
    fn type_chain(&self, id: &ModelId) -> Option<&[String]> {
        self.created
            .type_chain(id)
            .or_else(|| self.existing.model(id).map(|model| model.class().chain()))
    }
}

/// Decodes representations against a registry and a set of known models.
///
/// Objects carrying an id become new models collected in
/// [`Deserializer::into_created`]; the decoded value refers to them by
/// [`Value::Ref`]. Every object definition in a representation is created
/// before any attribute is decoded, so references may precede the inline
/// definition they point at.
pub struct Deserializer<'a> {
    registry: &'a TypeRegistry,
    existing: &'a dyn ModelLookup,
    created: ModelArena,
    unpopulated: HashSet<ModelId>,
    buffers: HashMap<String, Vec<u8>>,
}

impl<'a> Deserializer<'a> {
    /// A deserializer resolving references against `existing`.
    pub fn new(registry: &'a TypeRegistry, existing: &'a dyn ModelLookup) -> Self {
        Self {
            registry,
            existing,
            created: ModelArena::new(),
            unpopulated: HashSet::new(),
            buffers: HashMap::new(),
        }
    }

    /// Makes buffers available to `bytes` records.
    #[must_use]
    pub fn with_buffers(mut self, buffers: impl IntoIterator<Item = Buffer>) -> Self {
        self.add_buffers(buffers);
        self
    }

    /// Makes more buffers available to `bytes` records.
    pub fn add_buffers(&mut self, buffers: impl IntoIterator<Item = Buffer>) {
        self.buffers
            .extend(buffers.into_iter().map(|buffer| (buffer.id, buffer.data)));
    }

    /// Models decoded so far.
    #[must_use]
    pub fn created(&self) -> &ModelArena {
        &self.created
    }

    /// Hands over every model decoded so far.
    #[must_use]
    pub fn into_created(self) -> ModelArena {
        self.created
    }

    /// Whether `id` resolves, either among known or newly decoded models.
    #[must_use]
    pub fn has_ref(&self, id: &ModelId) -> bool {
        self.created.contains(id) || self.existing.model(id).is_some()
    }

    /// Decodes a representation together with its buffers.
    ///
    /// # Errors
    ///
    /// See [`Deserializer::decode`].
    pub fn deserialize(
        &mut self,
        serialized: &Serialized<Json>,
    ) -> Result<Value, DeserializationError> {
        self.add_buffers(serialized.buffers.iter().cloned());
        self.decode(&serialized.content)
    }

    /// Decodes one representation.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializationError::UnknownReference`] for references that
    /// resolve nowhere, [`DeserializationError::UnknownType`] for
    /// unregistered type names, [`DeserializationError::UnknownBuffer`] for
    /// missing buffers, a validation error for attribute values that do not
    /// fit their property, and [`DeserializationError::Malformed`] for
    /// anything outside the wire vocabulary.
    pub fn decode(&mut self, rep: &Json) -> Result<Value, DeserializationError> {
        self.create_definitions(rep)?;
        self.decode_value(rep)
    }

    /// Creates (unpopulated) every model defined anywhere in `rep` that is
    /// not already known. [`Deserializer::decode`] does this itself; calling
    /// it up front lets separately decoded fragments of one message refer to
    /// definitions in later fragments.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializationError::UnknownType`] for unregistered type
    /// names and [`DeserializationError::Malformed`] for definitions without
    /// a type name.
    pub fn create_definitions(&mut self, rep: &Json) -> Result<(), DeserializationError> {
        match rep {
            Json::Array(items) => items.iter().try_for_each(|item| self.create_definitions(item)),
            Json::Object(fields) => {
                if fields.get("type").and_then(Json::as_str) == Some("object") {
                    if let Some(id) = fields.get("id").and_then(Json::as_str) {
                        let id = ModelId::from_raw(id);
                        if !self.has_ref(&id) {
                            let name = required_str(fields, "name")?;
                            let class = self.registry.get(name).cloned().ok_or_else(|| {
                                DeserializationError::UnknownType {
                                    name: name.to_string(),
                                }
                            })?;
                            self.created.insert(Model::with_id(class, id.clone())?);
                            self.unpopulated.insert(id);
                        }
                    }
                }
                fields
                    .values()
                    .try_for_each(|value| self.create_definitions(value))
            }
            _ => Ok(()),
        }
    }

    fn decode_value(&mut self, rep: &Json) -> Result<Value, DeserializationError> {
        match rep {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => Ok(match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Array(items) => items
                .iter()
                .map(|item| self.decode_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Json::Object(fields) => match fields.get("type") {
                Some(Json::String(kind)) => self.decode_tagged(kind, fields),
                Some(other) => Err(DeserializationError::malformed(format!(
                    "type discriminator must be a string, got {other}"
                ))),
                None if fields.contains_key("id") => self.decode_ref(fields),
                None => {
                    let mut entries = Vec::with_capacity(fields.len());
                    for (key, value) in fields {
                        entries.push((Value::String(key.clone()), self.decode_value(value)?));
                    }
                    Ok(Value::Map(entries))
                }
            },
        }
    }

    fn decode_tagged(
        &mut self,
        kind: &str,
        fields: &Map<String, Json>,
    ) -> Result<Value, DeserializationError> {
        match kind {
            "ref" => self.decode_ref(fields),
            "symbol" => Ok(Value::Symbol(required_str(fields, "name")?.to_string())),
            "number" => decode_number(fields),
            "array" => Ok(Value::List(self.decode_entries(fields)?)),
            "set" => Ok(Value::set(self.decode_entries(fields)?)),
            "map" => self.decode_map(fields),
            "bytes" => self.decode_bytes(fields).map(Value::Bytes),
            "slice" => decode_slice(fields),
            "typed_array" => self.decode_typed_array(fields),
            "ndarray" => self.decode_ndarray(fields),
            "object" if fields.contains_key("id") => self.decode_model(fields),
            "object" => self.decode_struct(fields),
            other => Err(DeserializationError::malformed(format!(
                "unable to decode an object of type '{other}'"
            ))),
        }
    }

    fn decode_ref(&self, fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
        let id = ModelId::from_raw(required_str(fields, "id")?);
        if self.has_ref(&id) {
            Ok(Value::Ref(id))
        } else {
            Err(DeserializationError::UnknownReference { id })
        }
    }

    fn decode_entries(
        &mut self,
        fields: &Map<String, Json>,
    ) -> Result<Vec<Value>, DeserializationError> {
        match fields.get("entries") {
            None => Ok(Vec::new()),
            Some(Json::Array(items)) => items.iter().map(|item| self.decode_value(item)).collect(),
            Some(other) => Err(DeserializationError::malformed(format!(
                "entries must be an array, got {other}"
            ))),
        }
    }

    fn decode_map(&mut self, fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
        let Some(entries) = fields.get("entries") else {
            return Ok(Value::Map(Vec::new()));
        };
        let entries = entries
            .as_array()
            .ok_or_else(|| DeserializationError::malformed("map entries must be an array"))?;
        let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_array().map(Vec::as_slice) {
                Some([key, value]) => {
                    let key = self.decode_value(key)?;
                    let value = self.decode_value(value)?;
                    match out.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = value,
                        None => out.push((key, value)),
                    }
                }
                _ => {
                    return Err(DeserializationError::malformed(format!(
                        "map entry must be a [key, value] pair, got {entry}"
                    )))
                }
            }
        }
        Ok(Value::Map(out))
    }

    fn decode_bytes(&self, fields: &Map<String, Json>) -> Result<Vec<u8>, DeserializationError> {
        match fields.get("data") {
            Some(Json::String(encoded)) => STANDARD
                .decode(encoded)
                .map_err(|err| DeserializationError::malformed(format!("invalid base64: {err}"))),
            Some(Json::Object(handle)) => {
                let id = required_str(handle, "id")?;
                self.buffers
                    .get(id)
                    .cloned()
                    .ok_or_else(|| DeserializationError::UnknownBuffer { id: id.to_string() })
            }
            _ => Err(DeserializationError::malformed(
                "bytes data must be base64 text or a buffer handle",
            )),
        }
    }

    fn decode_typed_array(
        &self,
        fields: &Map<String, Json>,
    ) -> Result<Value, DeserializationError> {
        let dtype = parse_dtype(fields)?;
        let order = parse_order(fields)?;
        let array = fields
            .get("array")
            .and_then(Json::as_object)
            .ok_or_else(|| DeserializationError::malformed("typed_array needs a bytes array"))?;
        let bytes = self.decode_bytes(array)?;
        TypedArray::from_bytes(dtype, &bytes, order)
            .map(Value::TypedArray)
            .map_err(DeserializationError::malformed)
    }

    fn decode_ndarray(&mut self, fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
        let dtype = parse_dtype(fields)?;
        let order = parse_order(fields)?;
        let shape = fields
            .get("shape")
            .and_then(Json::as_array)
            .ok_or_else(|| DeserializationError::malformed("ndarray needs a shape"))?
            .iter()
            .map(|dim| {
                dim.as_u64()
                    .and_then(|d| usize::try_from(d).ok())
                    .ok_or_else(|| DeserializationError::malformed("shape entries must be sizes"))
            })
            .collect::<Result<Vec<usize>, _>>()?;
        let array = fields
            .get("array")
            .ok_or_else(|| DeserializationError::malformed("ndarray needs an array"))?;

        let data = match self.decode_value(array)? {
            Value::Bytes(bytes) => match dtype {
                DType::Bool => NdData::Bool(bytes.iter().map(|b| *b != 0).collect()),
                DType::Object => {
                    return Err(DeserializationError::malformed(
                        "object arrays cannot travel as bytes",
                    ))
                }
                _ => NdData::Typed(
                    TypedArray::from_bytes(dtype, &bytes, order)
                        .map_err(DeserializationError::malformed)?,
                ),
            },
            Value::List(items) => match dtype {
                DType::Object => NdData::Object(items),
                DType::Bool => NdData::Bool(
                    items
                        .iter()
                        .map(|item| {
                            item.as_bool().ok_or_else(|| {
                                DeserializationError::malformed("bool array holds a non-boolean")
                            })
                        })
                        .collect::<Result<_, _>>()?,
                ),
                _ => NdData::Typed(
                    TypedArray::from_values(dtype, &items)
                        .map_err(DeserializationError::malformed)?,
                ),
            },
            other => {
                return Err(DeserializationError::malformed(format!(
                    "ndarray data must be bytes or a list, got {}",
                    other.describe()
                )))
            }
        };
        Ok(Value::NdArray(NdArray { data, shape }))
    }

    fn decode_struct(&mut self, fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
        let name = required_str(fields, "name")?.to_string();
        let mut record = StructValue {
            name,
            fields: Vec::new(),
        };
        if let Some(attributes) = fields.get("attributes").and_then(Json::as_object) {
            for (key, value) in attributes {
                record.fields.push((key.clone(), self.decode_value(value)?));
            }
        }
        Ok(Value::Struct(record))
    }

    fn decode_model(&mut self, fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
        let id = ModelId::from_raw(required_str(fields, "id")?);
        if !self.unpopulated.remove(&id) {
            if self.has_ref(&id) {
                tracing::warn!(model = %id, "reference already known");
                return Ok(Value::Ref(id));
            }
            // Definitions are created before decoding, so this is only
            // reachable through an inconsistent representation.
            return Err(DeserializationError::UnknownReference { id });
        }

        let Some(class) = self.created.get(&id).map(|model| std::sync::Arc::clone(model.class()))
        else {
            return Err(DeserializationError::UnknownReference { id });
        };
        let mut decoded = Vec::new();
        if let Some(attributes) = fields.get("attributes") {
            let attributes = attributes
                .as_object()
                .ok_or_else(|| DeserializationError::malformed("attributes must be an object"))?;
            for (name, value) in attributes {
                decoded.push((name.as_str(), self.decode_value(value)?));
            }
        }

        for (name, value) in decoded {
            let Ok(descriptor) = class.lookup(name) else {
                tracing::warn!(
                    model = %id,
                    model_type = class.name(),
                    attr = name,
                    "ignoring unknown attribute received from peer"
                );
                continue;
            };
            let refs = Layered {
                created: &self.created,
                existing: self.existing,
            };
            let value = descriptor.prepare(class.name(), value, &refs)?;
            if let Some(model) = self.created.get_mut(&id) {
                model.assign_prepared(name, value);
            }
        }
        Ok(Value::Ref(id))
    }
}

fn required_str<'j>(fields: &'j Map<String, Json>, key: &str) -> Result<&'j str, DeserializationError> {
    fields
        .get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| DeserializationError::malformed(format!("missing string field '{key}'")))
}

fn decode_number(fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
    match fields.get("value") {
        Some(Json::String(s)) => match s.as_str() {
            "nan" => Ok(Value::Float(f64::NAN)),
            "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
            "+inf" => Ok(Value::Float(f64::INFINITY)),
            other => Err(DeserializationError::malformed(format!(
                "unknown number token '{other}'"
            ))),
        },
        Some(Json::Number(n)) => Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN))),
        _ => Err(DeserializationError::malformed("number needs a value")),
    }
}

fn decode_slice(fields: &Map<String, Json>) -> Result<Value, DeserializationError> {
    let bound = |key: &str| match fields.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| DeserializationError::malformed(format!("slice {key} must be an integer"))),
    };
    Ok(Value::Slice(Slice {
        start: bound("start")?,
        stop: bound("stop")?,
        step: bound("step")?,
    }))
}

fn parse_dtype(fields: &Map<String, Json>) -> Result<DType, DeserializationError> {
    let name = required_str(fields, "dtype")?;
    DType::parse(name)
        .ok_or_else(|| DeserializationError::malformed(format!("unsupported dtype '{name}'")))
}

fn parse_order(fields: &Map<String, Json>) -> Result<ByteOrder, DeserializationError> {
    match fields.get("order").and_then(Json::as_str) {
        None => Ok(ByteOrder::native()),
        Some(name) => ByteOrder::parse(name)
            .ok_or_else(|| DeserializationError::malformed(format!("unknown byte order '{name}'"))),
    }
}
