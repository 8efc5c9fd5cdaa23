//! Value kinds: the closed set of shapes a property may declare.

use std::fmt;

use crate::id::ModelId;
use crate::value::Value;

/// Resolves the type of a referenced model while validating `Instance` kinds.
pub trait ReferenceTypes {
    /// Inheritance chain of the model with this id, most-derived first.
    fn type_chain(&self, id: &ModelId) -> Option<&[String]>;
}

/// Resolver that knows no models; every reference is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceTypes for NoReferences {
    fn type_chain(&self, _id: &ModelId) -> Option<&[String]> {
        None
    }
}

/// Declared kind of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    /// Accepts anything.
    Any,
    /// Only `Null`.
    Null,
    /// Booleans.
    Bool,
    /// Integers.
    Int,
    /// Floats; integers are accepted and widened.
    Float,
    /// Strings.
    String,
    /// Raw bytes.
    Bytes,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// `Null` or the inner kind.
    Nullable(Box<Kind>),
    /// Any of the listed kinds, tried in order.
    Union(Vec<Kind>),
    /// Sequence of the inner kind.
    List(Box<Kind>),
    /// Fixed-length sequence, one kind per position.
    Tuple(Vec<Kind>),
    /// Set of the inner kind.
    Set(Box<Kind>),
    /// Mapping from key kind to value kind.
    Dict(Box<Kind>, Box<Kind>),
    /// Columnar table: string column names to equal-length sequences.
    ColumnData,
    /// Typed or shaped numeric array.
    Array,
    /// Reference to a model of the named type or one of its subtypes.
    Instance(String),
    /// Property-bearing record without identity.
    Struct,
}

impl Kind {
    /// `Nullable(inner)`.
    #[must_use]
    pub fn nullable(inner: Kind) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// `List(inner)`.
    #[must_use]
    pub fn list(inner: Kind) -> Self {
        Self::List(Box::new(inner))
    }

    /// `Set(inner)`.
    #[must_use]
    pub fn set(inner: Kind) -> Self {
        Self::Set(Box::new(inner))
    }

    /// `Dict(key, value)`.
    #[must_use]
    pub fn dict(key: Kind, value: Kind) -> Self {
        Self::Dict(Box::new(key), Box::new(value))
    }

    /// `Enum(values)`.
    #[must_use]
    pub fn enumeration(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| (*v).to_string()).collect())
    }

    /// `Instance(type_name)`.
    #[must_use]
    pub fn instance(type_name: &str) -> Self {
        Self::Instance(type_name.to_string())
    }

    /// Whether `value` has this kind.
    pub fn accepts(&self, value: &Value, refs: &dyn ReferenceTypes) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Null, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Int(_) | Value::Float(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Bytes, Value::Bytes(_)) => true,
            (Self::Enum(allowed), Value::String(s)) => allowed.iter().any(|a| a == s),
            (Self::Nullable(_), Value::Null) => true,
            (Self::Nullable(inner), v) => inner.accepts(v, refs),
            (Self::Union(kinds), v) => kinds.iter().any(|k| k.accepts(v, refs)),
            (Self::List(inner), Value::List(items)) => {
                items.iter().all(|item| inner.accepts(item, refs))
            }
            (Self::List(inner), Value::TypedArray(array)) => {
                array.to_values().iter().all(|item| inner.accepts(item, refs))
            }
            (Self::Tuple(kinds), Value::List(items)) => {
                kinds.len() == items.len()
                    && kinds.iter().zip(items).all(|(k, item)| k.accepts(item, refs))
            }
            (Self::Set(inner), Value::Set(items)) => {
                items.iter().all(|item| inner.accepts(item, refs))
            }
            (Self::Dict(key, val), Value::Map(entries)) => entries
                .iter()
                .all(|(k, v)| key.accepts(k, refs) && val.accepts(v, refs)),
            (Self::ColumnData, Value::Map(entries)) => entries.iter().all(|(k, v)| {
                matches!(k, Value::String(_))
                    && matches!(v, Value::List(_) | Value::TypedArray(_) | Value::NdArray(_))
            }),
            (Self::Array, Value::TypedArray(_) | Value::NdArray(_)) => true,
            (Self::Instance(type_name), Value::Ref(id)) => refs
                .type_chain(id)
                .is_some_and(|chain| chain.iter().any(|t| t == type_name)),
            (Self::Struct, Value::Struct(_)) => true,
            _ => false,
        }
    }

    /// Normalizes an accepted value: integers become floats where a float is
    /// declared, recursively through containers.
    #[must_use]
    pub fn coerce(&self, value: Value, refs: &dyn ReferenceTypes) -> Value {
        match (self, value) {
            (Self::Float, Value::Int(n)) => Value::Float(n as f64),
            (Self::Nullable(_), Value::Null) => Value::Null,
            (Self::Nullable(inner), v) => inner.coerce(v, refs),
            (Self::Union(kinds), v) => match kinds.iter().find(|k| k.accepts(&v, refs)) {
                Some(kind) => kind.coerce(v, refs),
                None => v,
            },
            (Self::List(inner), Value::List(items)) => Value::List(
                items.into_iter().map(|item| inner.coerce(item, refs)).collect(),
            ),
            (Self::Tuple(kinds), Value::List(items)) => Value::List(
                kinds
                    .iter()
                    .zip(items)
                    .map(|(k, item)| k.coerce(item, refs))
                    .collect(),
            ),
            (Self::Set(inner), Value::Set(items)) => {
                Value::set(items.into_iter().map(|item| inner.coerce(item, refs)))
            }
            (Self::Dict(key, val), Value::Map(entries)) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (key.coerce(k, refs), val.coerce(v, refs)))
                    .collect(),
            ),
            (_, v) => v,
        }
    }

    /// Value a property of this kind holds when no default is declared.
    #[must_use]
    pub fn natural_default(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::String(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::Enum(values) => values.first().cloned().map_or(Value::Null, Value::String),
            Self::Union(kinds) => kinds.first().map_or(Value::Null, Self::natural_default),
            Self::List(_) => Value::List(Vec::new()),
            Self::Tuple(kinds) => Value::List(kinds.iter().map(Self::natural_default).collect()),
            Self::Set(_) => Value::Set(Vec::new()),
            Self::Dict(..) | Self::ColumnData => Value::Map(Vec::new()),
            Self::Any
            | Self::Null
            | Self::Nullable(_)
            | Self::Array
            | Self::Instance(_)
            | Self::Struct => Value::Null,
        }
    }

    /// Whether values of this kind may contain model references.
    #[must_use]
    pub fn has_refs(&self) -> bool {
        match self {
            Self::Any | Self::Instance(_) | Self::Struct => true,
            Self::Nullable(inner) | Self::List(inner) | Self::Set(inner) => inner.has_refs(),
            Self::Union(kinds) | Self::Tuple(kinds) => kinds.iter().any(Self::has_refs),
            Self::Dict(key, val) => key.has_refs() || val.has_refs(),
            _ => false,
        }
    }

    /// Whether the declared value is a mutable collection.
    #[must_use]
    pub fn is_container(&self) -> bool {
        match self {
            Self::List(_) | Self::Set(_) | Self::Dict(..) | Self::ColumnData => true,
            Self::Nullable(inner) => inner.is_container(),
            _ => false,
        }
    }
}

fn join(kinds: &[Kind]) -> String {
    kinds.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Null => f.write_str("Null"),
            Self::Bool => f.write_str("Bool"),
            Self::Int => f.write_str("Int"),
            Self::Float => f.write_str("Float"),
            Self::String => f.write_str("String"),
            Self::Bytes => f.write_str("Bytes"),
            Self::Enum(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
                write!(f, "Enum({})", quoted.join(", "))
            }
            Self::Nullable(inner) => write!(f, "Nullable({inner})"),
            Self::Union(kinds) => write!(f, "Union({})", join(kinds)),
            Self::List(inner) => write!(f, "List({inner})"),
            Self::Tuple(kinds) => write!(f, "Tuple({})", join(kinds)),
            Self::Set(inner) => write!(f, "Set({inner})"),
            Self::Dict(key, val) => write!(f, "Dict({key}, {val})"),
            Self::ColumnData => f.write_str("ColumnData"),
            Self::Array => f.write_str("Array"),
            Self::Instance(name) => write!(f, "Instance({name})"),
            Self::Struct => f.write_str("Struct"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypedArray;

    struct OneRange {
        id: ModelId,
        chain: Vec<String>,
    }

    impl ReferenceTypes for OneRange {
        fn type_chain(&self, id: &ModelId) -> Option<&[String]> {
            (id == &self.id).then_some(self.chain.as_slice())
        }
    }

    #[test]
    fn scalars_validate_strictly() {
        let refs = NoReferences;
        assert!(Kind::Int.accepts(&Value::Int(3), &refs));
        assert!(!Kind::Int.accepts(&Value::Float(3.0), &refs));
        assert!(!Kind::Int.accepts(&Value::from("3"), &refs));
        assert!(Kind::Float.accepts(&Value::Int(3), &refs));
        assert!(!Kind::Bool.accepts(&Value::Int(1), &refs));
    }

    #[test]
    fn float_widens_integers_inside_containers() {
        let refs = NoReferences;
        let kind = Kind::list(Kind::Float);
        let coerced = kind.coerce(Value::list([1, 2]), &refs);
        assert!(matches!(
            coerced.as_list(),
            Some([Value::Float(a), Value::Float(b)]) if *a == 1.0 && *b == 2.0
        ));
    }

    #[test]
    fn enum_membership() {
        let kind = Kind::enumeration(&["left", "right"]);
        assert!(kind.accepts(&Value::from("left"), &NoReferences));
        assert!(!kind.accepts(&Value::from("up"), &NoReferences));
        assert_eq!(kind.natural_default(), Value::from("left"));
        assert_eq!(kind.to_string(), "Enum('left', 'right')");
    }

    #[test]
    fn instance_checks_the_inheritance_chain() {
        let refs = OneRange {
            id: ModelId::from_raw("r"),
            chain: vec!["Range1d".into(), "Range".into(), "Model".into()],
        };
        let target = Value::Ref(ModelId::from_raw("r"));
        assert!(Kind::instance("Range").accepts(&target, &refs));
        assert!(Kind::instance("Range1d").accepts(&target, &refs));
        assert!(!Kind::instance("Plot").accepts(&target, &refs));
        assert!(!Kind::instance("Range").accepts(&Value::Ref(ModelId::from_raw("x")), &refs));
        assert!(Kind::nullable(Kind::instance("Range")).accepts(&Value::Null, &refs));
    }

    #[test]
    fn column_data_requires_sequences() {
        let ok = Value::map([
            (Value::from("x"), Value::list([1, 2])),
            (Value::from("y"), Value::TypedArray(TypedArray::Float64(vec![1.0, 2.0]))),
        ]);
        assert!(Kind::ColumnData.accepts(&ok, &NoReferences));
        let bad = Value::map([("x", 1)]);
        assert!(!Kind::ColumnData.accepts(&bad, &NoReferences));
    }

    #[test]
    fn reference_carrying_kinds() {
        assert!(Kind::list(Kind::instance("Renderer")).has_refs());
        assert!(!Kind::list(Kind::Float).has_refs());
        assert!(Kind::Any.has_refs());
        assert!(Kind::nullable(Kind::list(Kind::Int)).is_container());
    }
}
