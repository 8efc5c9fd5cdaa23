//! Dynamic property values.
//!
//! [`Value`] is the closed set of shapes a property can hold. Model
//! references are [`Value::Ref`] handles into a document's arena, never
//! owned sub-objects, so reference-carrying graphs may contain cycles.

use std::cmp::Ordering;
use std::fmt;

use crate::id::ModelId;

/// A property value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double precision float; NaN and infinities are allowed.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Named symbolic constant.
    Symbol(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Unordered collection without duplicates.
    Set(Vec<Value>),
    /// Ordered mapping with arbitrary keys.
    Map(Vec<(Value, Value)>),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Python-style slice, used by sparse column patches.
    Slice(Slice),
    /// Flat typed numeric array.
    TypedArray(TypedArray),
    /// Shaped array.
    NdArray(NdArray),
    /// Handle to another model.
    Ref(ModelId),
    /// Property-bearing value without identity.
    Struct(StructValue),
}

/// Equality used for floats: NaN equals NaN.
#[must_use]
pub fn float_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_eq(*a, *b),
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => *i as f64 == *f,
            (Self::String(a), Self::String(b)) | (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().all(|item| b.contains(item))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Slice(a), Self::Slice(b)) => a == b,
            (Self::TypedArray(a), Self::TypedArray(b)) => a == b,
            (Self::NdArray(a), Self::NdArray(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Builds a map from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a list.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a set, dropping duplicates.
    pub fn set<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            let item = item.into();
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Self::Set(out)
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Symbol(_) => "Symbol",
            Self::List(_) => "List",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::Bytes(_) => "Bytes",
            Self::Slice(_) => "Slice",
            Self::TypedArray(_) => "TypedArray",
            Self::NdArray(_) => "NdArray",
            Self::Ref(_) => "Ref",
            Self::Struct(_) => "Struct",
        }
    }

    /// Renders the value and its type for error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        let repr = match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) | Self::Symbol(s) => {
                let mut shown: String = s.chars().take(40).collect();
                if shown.len() < s.len() {
                    shown.push_str("...");
                }
                format!("'{shown}'")
            }
            Self::Ref(id) => format!("<{id}>"),
            Self::List(items) | Self::Set(items) => format!("{} items", items.len()),
            Self::Map(entries) => format!("{} entries", entries.len()),
            Self::Bytes(bytes) => format!("{} bytes", bytes.len()),
            Self::TypedArray(array) => format!("{} x {}", array.len(), array.dtype().as_str()),
            Self::NdArray(array) => format!("shape {:?}", array.shape),
            Self::Slice(slice) => format!("{slice}"),
            Self::Struct(s) => s.name.clone(),
        };
        format!("{repr} ({})", self.type_name())
    }

    /// Whether this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The number widened to `f64`, if this is an integer or float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The string slice, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced id, if this is a reference.
    #[must_use]
    pub fn as_ref_id(&self) -> Option<&ModelId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// The items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a string key in a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Length of a column-like value: list items, array elements, or the
    /// first dimension of a shaped array.
    #[must_use]
    pub fn sequence_len(&self) -> Option<usize> {
        match self {
            Self::List(items) => Some(items.len()),
            Self::TypedArray(array) => Some(array.len()),
            Self::NdArray(array) => Some(array.shape.first().copied().unwrap_or(0)),
            _ => None,
        }
    }

    /// Whether the value is a mutable collection.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Set(_) | Self::Map(_))
    }

    /// Appends every model id referenced anywhere inside the value, without
    /// duplicates and in first-seen order.
    pub fn collect_refs(&self, out: &mut Vec<ModelId>) {
        match self {
            Self::Ref(id) => {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
            Self::List(items) | Self::Set(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            Self::Map(entries) => {
                for (k, v) in entries {
                    k.collect_refs(out);
                    v.collect_refs(out);
                }
            }
            Self::Struct(s) => {
                for (_, v) in &s.fields {
                    v.collect_refs(out);
                }
            }
            Self::NdArray(NdArray {
                data: NdData::Object(items),
                ..
            }) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            _ => {}
        }
    }

    /// Ordering for sortable scalars (numbers, strings, booleans).
    #[must_use]
    pub fn partial_cmp_scalar(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    /// Converts plain JSON (no wire tags) into a value.
    #[must_use]
    pub fn from_plain_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_plain_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (Self::String(k.clone()), Self::from_plain_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<ModelId> for Value {
    fn from(value: ModelId) -> Self {
        Self::Ref(value)
    }
}

impl From<&ModelId> for Value {
    fn from(value: &ModelId) -> Self {
        Self::Ref(value.clone())
    }
}

impl From<TypedArray> for Value {
    fn from(value: TypedArray) -> Self {
        Self::TypedArray(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// Slices
// ============================================================================

/// A `start:stop:step` slice with Python semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    /// First index, negative counts from the end.
    pub start: Option<i64>,
    /// One past the last index, negative counts from the end.
    pub stop: Option<i64>,
    /// Stride; must not be zero.
    pub step: Option<i64>,
}

impl Slice {
    /// A `start:stop` slice.
    #[must_use]
    pub fn range(start: i64, stop: i64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// Resolves the slice against a sequence length.
    ///
    /// # Errors
    ///
    /// Returns a message when the step is zero.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, String> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err("slice step cannot be zero".into());
        }
        let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let resolve = |bound: Option<i64>, fallback: i64| match bound {
            None => fallback,
            Some(v) => {
                let v = if v < 0 { v + len } else { v };
                v.clamp(lower, upper)
            }
        };
        let (start, stop) = if step > 0 {
            (resolve(self.start, lower), resolve(self.stop, upper))
        } else {
            (resolve(self.start, upper), resolve(self.stop, lower))
        };
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            // A step past the representable range leaves the sequence.
            let Some(next) = i.checked_add(step) else {
                break;
            };
            i = next;
        }
        Ok(out)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}", show(self.start), show(self.stop))?;
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Typed arrays
// ============================================================================

/// Element type of a typed or shaped array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// `u8`.
    Uint8,
    /// `i8`.
    Int8,
    /// `u16`.
    Uint16,
    /// `i16`.
    Int16,
    /// `u32`.
    Uint32,
    /// `i32`.
    Int32,
    /// `f32`.
    Float32,
    /// `f64`.
    Float64,
    /// Booleans, one byte each (shaped arrays only).
    Bool,
    /// Arbitrary values (shaped arrays only, never a binary buffer).
    Object,
}

impl DType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Object => "object",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "uint8" => Self::Uint8,
            "int8" => Self::Int8,
            "uint16" => Self::Uint16,
            "int16" => Self::Int16,
            "uint32" => Self::Uint32,
            "int32" => Self::Int32,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "bool" => Self::Bool,
            "object" => Self::Object,
            _ => return None,
        })
    }
}

/// Byte order of a binary array payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// Byte order of the running machine.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Little => "little",
            Self::Big => "big",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "little" => Some(Self::Little),
            "big" => Some(Self::Big),
            _ => None,
        }
    }
}

/// Flat numeric array with a fixed element type.
#[derive(Debug, Clone)]
pub enum TypedArray {
    /// `u8` elements.
    Uint8(Vec<u8>),
    /// `i8` elements.
    Int8(Vec<i8>),
    /// `u16` elements.
    Uint16(Vec<u16>),
    /// `i16` elements.
    Int16(Vec<i16>),
    /// `u32` elements.
    Uint32(Vec<u32>),
    /// `i32` elements.
    Int32(Vec<i32>),
    /// `f32` elements.
    Float32(Vec<f32>),
    /// `f64` elements.
    Float64(Vec<f64>),
}

macro_rules! each_array {
    ($array:expr, $items:ident => $body:expr) => {
        match $array {
            TypedArray::Uint8($items) => $body,
            TypedArray::Int8($items) => $body,
            TypedArray::Uint16($items) => $body,
            TypedArray::Int16($items) => $body,
            TypedArray::Uint32($items) => $body,
            TypedArray::Int32($items) => $body,
            TypedArray::Float32($items) => $body,
            TypedArray::Float64($items) => $body,
        }
    };
}

macro_rules! decode_chunks {
    ($bytes:expr, $order:expr, $t:ty) => {{
        const N: usize = std::mem::size_of::<$t>();
        if $bytes.len() % N != 0 {
            return Err(format!(
                "{} bytes is not a whole number of {N}-byte elements",
                $bytes.len()
            ));
        }
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut buf = [0u8; N];
                buf.copy_from_slice(chunk);
                match $order {
                    ByteOrder::Little => <$t>::from_le_bytes(buf),
                    ByteOrder::Big => <$t>::from_be_bytes(buf),
                }
            })
            .collect::<Vec<$t>>()
    }};
}

fn int_element<T: TryFrom<i64>>(value: &Value) -> Result<T, String> {
    let n = match value {
        Value::Int(n) => *n,
        Value::Float(f) if f.fract() == 0.0 => *f as i64,
        other => return Err(format!("expected an integer, got {}", other.describe())),
    };
    T::try_from(n).map_err(|_| format!("{n} is out of range for the array"))
}

fn float_element(value: &Value) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("expected a number, got {}", value.describe()))
}

fn floats_eq<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| float_eq((*x).into(), (*y).into()))
}

impl PartialEq for TypedArray {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Uint8(a), Self::Uint8(b)) => a == b,
            (Self::Int8(a), Self::Int8(b)) => a == b,
            (Self::Uint16(a), Self::Uint16(b)) => a == b,
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::Uint32(a), Self::Uint32(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Float32(a), Self::Float32(b)) => floats_eq(a, b),
            (Self::Float64(a), Self::Float64(b)) => floats_eq(a, b),
            _ => false,
        }
    }
}

impl TypedArray {
    /// Element type.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Uint8(_) => DType::Uint8,
            Self::Int8(_) => DType::Int8,
            Self::Uint16(_) => DType::Uint16,
            Self::Int16(_) => DType::Int16,
            Self::Uint32(_) => DType::Uint32,
            Self::Int32(_) => DType::Int32,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        each_array!(self, items => items.len())
    }

    /// Whether the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` as a value.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Self::Uint8(v) => v.get(index).map(|x| Value::Int(i64::from(*x))),
            Self::Int8(v) => v.get(index).map(|x| Value::Int(i64::from(*x))),
            Self::Uint16(v) => v.get(index).map(|x| Value::Int(i64::from(*x))),
            Self::Int16(v) => v.get(index).map(|x| Value::Int(i64::from(*x))),
            Self::Uint32(v) => v.get(index).map(|x| Value::Int(i64::from(*x))),
            Self::Int32(v) => v.get(index).map(|x| Value::Int(i64::from(*x))),
            Self::Float32(v) => v.get(index).map(|x| Value::Float(f64::from(*x))),
            Self::Float64(v) => v.get(index).map(|x| Value::Float(*x)),
        }
    }

    /// Every element as a value.
    #[must_use]
    pub fn to_values(&self) -> Vec<Value> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Overwrites element `index`.
    ///
    /// # Errors
    ///
    /// Returns a message when the index is out of range or the value does not
    /// fit the element type.
    pub fn set(&mut self, index: usize, value: &Value) -> Result<(), String> {
        let len = self.len();
        if index >= len {
            return Err(format!("index {index} out of range for length {len}"));
        }
        match self {
            Self::Uint8(v) => v[index] = int_element(value)?,
            Self::Int8(v) => v[index] = int_element(value)?,
            Self::Uint16(v) => v[index] = int_element(value)?,
            Self::Int16(v) => v[index] = int_element(value)?,
            Self::Uint32(v) => v[index] = int_element(value)?,
            Self::Int32(v) => v[index] = int_element(value)?,
            Self::Float32(v) => v[index] = float_element(value)? as f32,
            Self::Float64(v) => v[index] = float_element(value)?,
        }
        Ok(())
    }

    /// Builds an array of `dtype` from values.
    ///
    /// # Errors
    ///
    /// Returns a message when a value does not fit the element type or the
    /// dtype has no flat representation.
    pub fn from_values(dtype: DType, values: &[Value]) -> Result<Self, String> {
        fn ints<T: TryFrom<i64>>(values: &[Value]) -> Result<Vec<T>, String> {
            values.iter().map(int_element).collect()
        }
        let floats = || values.iter().map(float_element).collect::<Result<Vec<f64>, _>>();
        Ok(match dtype {
            DType::Uint8 => Self::Uint8(ints(values)?),
            DType::Int8 => Self::Int8(ints(values)?),
            DType::Uint16 => Self::Uint16(ints(values)?),
            DType::Int16 => Self::Int16(ints(values)?),
            DType::Uint32 => Self::Uint32(ints(values)?),
            DType::Int32 => Self::Int32(ints(values)?),
            DType::Float32 => Self::Float32(floats()?.into_iter().map(|f| f as f32).collect()),
            DType::Float64 => Self::Float64(floats()?),
            DType::Bool | DType::Object => {
                return Err(format!("{} has no flat array form", dtype.as_str()))
            }
        })
    }

    /// Encodes the elements as raw bytes.
    #[must_use]
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        each_array!(self, items => items
            .iter()
            .flat_map(|x| match order {
                ByteOrder::Little => x.to_le_bytes().to_vec(),
                ByteOrder::Big => x.to_be_bytes().to_vec(),
            })
            .collect())
    }

    /// Decodes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a message when the byte count is not a multiple of the element
    /// size or the dtype has no flat representation.
    pub fn from_bytes(dtype: DType, bytes: &[u8], order: ByteOrder) -> Result<Self, String> {
        Ok(match dtype {
            DType::Uint8 => Self::Uint8(bytes.to_vec()),
            DType::Int8 => Self::Int8(decode_chunks!(bytes, order, i8)),
            DType::Uint16 => Self::Uint16(decode_chunks!(bytes, order, u16)),
            DType::Int16 => Self::Int16(decode_chunks!(bytes, order, i16)),
            DType::Uint32 => Self::Uint32(decode_chunks!(bytes, order, u32)),
            DType::Int32 => Self::Int32(decode_chunks!(bytes, order, i32)),
            DType::Float32 => Self::Float32(decode_chunks!(bytes, order, f32)),
            DType::Float64 => Self::Float64(decode_chunks!(bytes, order, f64)),
            DType::Bool | DType::Object => {
                return Err(format!("{} has no flat array form", dtype.as_str()))
            }
        })
    }

    /// Appends `other`, converting its elements to this array's type.
    ///
    /// # Errors
    ///
    /// Returns a message when an element does not fit.
    pub fn extend_from(&mut self, other: &[Value]) -> Result<(), String> {
        let mut values = self.to_values();
        values.extend_from_slice(other);
        *self = Self::from_values(self.dtype(), &values)?;
        Ok(())
    }

    /// Drops the first `count` elements.
    pub fn drain_front(&mut self, count: usize) {
        each_array!(self, items => {
            let count = count.min(items.len());
            items.drain(..count);
        })
    }
}

/// Storage of a shaped array.
#[derive(Debug, Clone, PartialEq)]
pub enum NdData {
    /// Numeric elements.
    Typed(TypedArray),
    /// Boolean elements.
    Bool(Vec<bool>),
    /// Arbitrary elements.
    Object(Vec<Value>),
}

/// Row-major array with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    /// Flat elements.
    pub data: NdData,
    /// Dimensions, outermost first.
    pub shape: Vec<usize>,
}

impl NdArray {
    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match &self.data {
            NdData::Typed(array) => array.dtype(),
            NdData::Bool(_) => DType::Bool,
            NdData::Object(_) => DType::Object,
        }
    }
}

/// A property-bearing value without identity (a record).
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    /// Type name.
    pub name: String,
    /// Field values in declaration order.
    pub fields: Vec<(String, Value)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_equals_nan() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(f64::INFINITY), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn ints_compare_equal_to_integral_floats() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn sets_and_maps_ignore_order() {
        assert_eq!(Value::set([1, 2, 3]), Value::set([3, 1, 2]));
        assert_eq!(
            Value::map([("a", 1), ("b", 2)]),
            Value::map([("b", 2), ("a", 1)])
        );
        assert_ne!(Value::list([1, 2]), Value::list([2, 1]));
    }

    #[test]
    fn slice_indices_follow_python_semantics() {
        let all = Slice::default();
        assert_eq!(all.indices(4).expect("valid"), vec![0, 1, 2, 3]);
        assert_eq!(Slice::range(1, 3).indices(5).expect("valid"), vec![1, 2]);
        let tail = Slice {
            start: Some(-2),
            stop: None,
            step: None,
        };
        assert_eq!(tail.indices(5).expect("valid"), vec![3, 4]);
        let reversed = Slice {
            start: None,
            stop: None,
            step: Some(-2),
        };
        assert_eq!(reversed.indices(5).expect("valid"), vec![4, 2, 0]);
        let zero = Slice {
            start: None,
            stop: None,
            step: Some(0),
        };
        assert!(zero.indices(3).is_err());
    }

    #[test]
    fn slice_steps_at_the_integer_limits_stay_in_range() {
        let forward = Slice {
            start: Some(1),
            stop: None,
            step: Some(i64::MAX),
        };
        assert_eq!(forward.indices(3).expect("valid"), vec![1]);
        let backward = Slice {
            start: Some(i64::MAX),
            stop: Some(i64::MIN),
            step: Some(i64::MIN),
        };
        assert_eq!(backward.indices(3).expect("valid"), vec![2]);
    }

    #[test]
    fn typed_array_bytes_respect_byte_order() {
        let array = TypedArray::Int32(vec![1, -2, 300]);
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = array.to_bytes(order);
            assert_eq!(bytes.len(), 12);
            let back = TypedArray::from_bytes(DType::Int32, &bytes, order).expect("decodes");
            assert_eq!(back, array);
        }
        assert_eq!(TypedArray::Uint16(vec![1]).to_bytes(ByteOrder::Big), vec![0, 1]);
    }

    #[test]
    fn typed_array_rejects_ragged_bytes() {
        assert!(TypedArray::from_bytes(DType::Float64, &[0; 7], ByteOrder::Little).is_err());
    }

    #[test]
    fn typed_array_set_checks_range() {
        let mut array = TypedArray::Uint8(vec![0, 0]);
        assert!(array.set(1, &Value::Int(255)).is_ok());
        assert!(array.set(1, &Value::Int(256)).is_err());
        assert!(array.set(2, &Value::Int(1)).is_err());
        assert_eq!(array.get(1), Some(Value::Int(255)));
    }

    #[test]
    fn collect_refs_descends_into_containers() {
        let a = ModelId::from_raw("a");
        let b = ModelId::from_raw("b");
        let value = Value::map([(
            Value::from("k"),
            Value::list([Value::Ref(a.clone()), Value::Ref(b.clone()), Value::Ref(a.clone())]),
        )]);
        let mut refs = Vec::new();
        value.collect_refs(&mut refs);
        assert_eq!(refs, vec![a, b]);
    }
}
