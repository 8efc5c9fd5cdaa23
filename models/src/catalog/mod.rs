//! Built-in type modules.
//!
//! Modules are listed in dependency order; see [`crate::modules`] for the
//! registration sequence.

pub mod layouts;
pub mod widgets;
pub mod sources;
pub mod ranges;
pub mod plots;

use propsync::value::Value;

// Shared by several modules.
pub(crate) fn non_negative(value: &Value) -> Result<(), String> {
    match value.as_f64() {
        Some(v) if v < 0.0 => Err(format!("expected a non-negative number, got {v}")),
        _ => Ok(()),
    }
}

pub(crate) fn positive(value: &Value) -> Result<(), String> {
    match value.as_f64() {
        Some(v) if v <= 0.0 => Err(format!("expected a positive number, got {v}")),
        _ => Ok(()),
    }
}
