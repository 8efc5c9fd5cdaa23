//! Error types for property access, registration, (de)serialization and
//! document operations.

use thiserror::Error;

use crate::id::{CallbackId, ModelId};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A value was rejected by a property's declared kind or check.
///
/// The property keeps its previous value when this is returned.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value for {class}.{attr}: expected {expected}, got {got}{}", detail_suffix(.detail))]
pub struct ValidationError {
    /// Type name of the model owning the property.
    pub class: String,
    /// Property name.
    pub attr: String,
    /// Human-readable description of the accepted kind.
    pub expected: String,
    /// Short rendering of the offending value and its type.
    pub got: String,
    /// Extra context from a custom check, if any.
    pub detail: Option<String>,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(" ({detail})"),
        None => String::new(),
    }
}

/// An attribute name is not declared on the model's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected attribute '{name}' to {class}, {}", suggestion_text(.similar, .candidates))]
pub struct AttributeError {
    /// Type name the lookup was made against.
    pub class: String,
    /// The unknown attribute name.
    pub name: String,
    /// Whether `candidates` are near misses rather than the full list.
    pub similar: bool,
    /// Near misses, or every declared attribute when none were close.
    pub candidates: Vec<String>,
}

fn suggestion_text(similar: &bool, candidates: &[String]) -> String {
    let joined = nice_join(candidates);
    if *similar {
        format!("similar attributes are {joined}")
    } else {
        format!("possible attributes are {joined}")
    }
}

/// Joins names as `a, b or c`.
#[must_use]
pub fn nice_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} or {last}", init.join(", ")),
    }
}

/// Errors raised while building a [`crate::registry::TypeRegistry`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// A type with this name was already registered.
    #[error("duplicate model type {name}")]
    DuplicateType {
        /// Qualified type name.
        name: String,
    },

    /// The declared parent type is not registered.
    #[error("{name} extends unknown type {parent}")]
    UnknownParent {
        /// Type being registered.
        name: String,
        /// Missing parent.
        parent: String,
    },

    /// A subtype declared a property its parent already declares.
    #[error("{name} redeclares inherited property {attr}; only its default may be overridden")]
    RedeclaredProperty {
        /// Type being registered.
        name: String,
        /// Property name.
        attr: String,
    },

    /// A default override names a property the type does not have.
    #[error("{name} overrides the default of unknown property {attr}")]
    UnknownOverride {
        /// Type being registered.
        name: String,
        /// Property name.
        attr: String,
    },

    /// A declared or overridden default does not satisfy the property's kind.
    #[error("invalid default for {name}.{attr}: {reason}")]
    InvalidDefault {
        /// Type being registered.
        name: String,
        /// Property name.
        attr: String,
        /// Validation message.
        reason: String,
    },

    /// A type name was looked up but never registered.
    #[error("unknown model type {name}")]
    UnknownType {
        /// Qualified type name.
        name: String,
    },

    /// An abstract type cannot be instantiated.
    #[error("cannot instantiate abstract model type {name}")]
    AbstractType {
        /// Qualified type name.
        name: String,
    },
}

/// Errors raised while encoding values to the wire representation.
///
/// The serializer stays usable after returning one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// A model was reached again while its own attributes were being encoded.
    #[error("circular reference to model {id}")]
    CircularReference {
        /// The model re-entered.
        id: ModelId,
    },

    /// A reference points at a model the serializer cannot see.
    #[error("reference to unknown model {id}")]
    UnknownModel {
        /// The dangling id.
        id: ModelId,
    },

    /// The value cannot be represented on the wire.
    #[error("cannot encode {what}")]
    Unsupported {
        /// Description of the offending value.
        what: String,
    },
}

/// Errors raised while decoding the wire representation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeserializationError {
    /// A reference token names an id that is neither known nor defined inline.
    ///
    /// Callers may treat this as benign when the id belonged to a model that
    /// was removed locally.
    #[error("can't resolve reference '{id}'")]
    UnknownReference {
        /// The unresolved id.
        id: ModelId,
    },

    /// An object names a type missing from the registry.
    #[error("can't resolve type '{name}'")]
    UnknownType {
        /// Qualified type name.
        name: String,
    },

    /// A buffer handle has no matching buffer.
    #[error("can't resolve buffer '{id}'")]
    UnknownBuffer {
        /// Buffer id.
        id: String,
    },

    /// The representation does not follow the wire vocabulary.
    #[error("malformed representation: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },

    /// A decoded attribute value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A decoded object named a type that cannot be instantiated.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DeserializationError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors raised by document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The id is not present in the document's model arena.
    #[error("unknown model {id}")]
    UnknownModel {
        /// The missing id.
        id: ModelId,
    },

    /// `get_by_name`/`select_one` matched more than one model.
    #[error("found more than one model matching {query}")]
    MultipleModels {
        /// Description of the query.
        query: String,
    },

    /// The callback was never registered, already fired, or was removed.
    #[error("callback {id} already ran or was already removed, cannot be removed again")]
    CallbackNotFound {
        /// The stale handle.
        id: CallbackId,
    },

    /// The attribute is declared read-only.
    #[error("{class}.{attr} is a readonly property")]
    Readonly {
        /// Type name.
        class: String,
        /// Property name.
        attr: String,
    },

    /// A container operation was used on a property holding another shape.
    #[error("{model}.{attr} does not hold a {expected}")]
    NotAContainer {
        /// Model owning the property.
        model: ModelId,
        /// Property name.
        attr: String,
        /// The container shape the operation needs.
        expected: &'static str,
    },

    /// A container operation referred to a missing element, key or index.
    #[error("{op}: {reason}")]
    InvalidOperation {
        /// Operation name.
        op: &'static str,
        /// What was missing or out of range.
        reason: String,
    },

    /// A theme description does not have the expected shape.
    #[error("invalid theme: {reason}")]
    InvalidTheme {
        /// What was wrong.
        reason: String,
    },

    /// A snapshot does not have the expected shape.
    #[error("malformed document snapshot: {reason}")]
    MalformedSnapshot {
        /// What was wrong.
        reason: String,
    },
}

impl DocumentError {
    pub(crate) fn invalid(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            op,
            reason: reason.into(),
        }
    }
}

/// Errors raised while assembling or interpreting protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The header names a message type this endpoint does not speak.
    #[error("unknown message type {msgtype}")]
    UnknownMessageType {
        /// The offending type string.
        msgtype: String,
    },

    /// The header announces a different number of buffers than were delivered.
    #[error("expected {expected} buffers, received {received}")]
    BufferCount {
        /// Buffers announced in the header.
        expected: usize,
        /// Buffers actually delivered.
        received: usize,
    },

    /// A message part is not valid JSON of the expected shape.
    #[error("malformed {part}: {reason}")]
    Malformed {
        /// Header, metadata or content.
        part: &'static str,
        /// Parser message.
        reason: String,
    },
}

/// Errors raised while loading [`crate::config::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text could not be parsed.
    #[error("invalid settings: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment override holds an unusable value.
    #[error("invalid value {value:?} for {var}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Umbrella error for the public API.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// See [`AttributeError`].
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// See [`SerializationError`].
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// See [`DeserializationError`].
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// See [`DocumentError`].
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// See [`ProtocolError`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this is an unresolved reference raised while decoding.
    #[must_use]
    pub fn unknown_reference(&self) -> Option<&ModelId> {
        match self {
            Self::Deserialization(DeserializationError::UnknownReference { id }) => Some(id),
            _ => None,
        }
    }
}
