//! Typed, observable model graphs kept in sync between two runtimes.
//!
//! A [`document::Document`] holds a graph of [`model::Model`]s whose
//! attributes are declared per type in a [`registry::TypeRegistry`]. Every
//! change to an attached model is validated, reported on the document's event
//! bus and can be encoded as a patch that a peer replays.
//!
//! # Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`value`], [`property`] | dynamic values, kinds, property descriptors |
//! | [`registry`], [`model`] | type tables and model instances |
//! | [`containers`] | mutation-tracking views over collection attributes |
//! | [`document`] | roots, model index, event bus, callbacks, patches |
//! | [`serialization`] | tagged wire representation with side buffers |
//! | [`protocol`] | messages and the synchronizing session |
//! | [`config`] | settings loaded from TOML and the environment |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use propsync::property::{Kind, PropertyDescriptor};
//! use propsync::registry::{TypeDef, TypeRegistry};
//! use propsync::document::Document;
//!
//! # fn main() -> propsync::Result<()> {
//! let mut registry = TypeRegistry::new();
//! registry.register(TypeDef::new("Slider").property(PropertyDescriptor::new("value", Kind::Float)))?;
//! let mut doc = Document::new(Arc::new(registry));
//! let slider = doc.create("Slider")?;
//! doc.add_root(&slider)?;
//! doc.set(&slider, "value", 0.5)?;
//! let snapshot = doc.to_json()?;
//! # let _ = snapshot;
//! # Ok(())
//! # }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod arena;
pub mod config;
pub mod containers;
pub mod document;
pub mod error;
pub mod id;
pub mod model;
pub mod property;
pub mod protocol;
pub mod registry;
pub mod serialization;
pub mod theme;
pub mod value;

pub use arena::{ModelArena, ModelLookup};
pub use config::Settings;
pub use document::{Document, DocumentChangedEvent, HoldPolicy, PatchEvent, Selector};
pub use error::{Error, Result};
pub use id::{CallbackId, DocumentId, ModelId, SetterId};
pub use model::{Model, PropertyBag, PropertyChange};
pub use protocol::{Message, MsgType, SyncSession};
pub use registry::{ModelClass, TypeDef, TypeRegistry};
pub use serialization::{Buffer, Deserializer, Serialized, Serializer};
pub use value::Value;
