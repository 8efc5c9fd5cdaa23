//! Typed property declarations.
//!
//! A [`PropertyDescriptor`] pairs a name with a [`Kind`], a default and
//! optional checks. Descriptors are collected per type by
//! [`crate::registry::TypeRegistry`].

pub mod descriptor;
pub mod kind;

pub use descriptor::{Check, DefaultValue, Generator, PropertyDescriptor};
pub use kind::{Kind, NoReferences, ReferenceTypes};
