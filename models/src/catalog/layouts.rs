//! `layouts` module: the layout tree that widgets and plots live in.

use propsync::property::{Kind, PropertyDescriptor};
use propsync::registry::TypeDef;

use crate::module::TypeModule;

/// Sizing modes understood by the layout engine.
pub const SIZING_MODES: &[&str] = &[
    "fixed",
    "stretch_width",
    "stretch_height",
    "stretch_both",
    "scale_width",
    "scale_height",
    "scale_both",
];

/// Returns the `layouts` module.
#[must_use]
pub fn module() -> TypeModule {
    TypeModule {
        name: "layouts",
        summary: "Layout tree: the abstract layout base, rows, columns and spacers.",
        types: vec![
            TypeDef::new("LayoutDOM")
                .abstract_()
                .property(PropertyDescriptor::new("disabled", Kind::Bool))
                .property(PropertyDescriptor::new("visible", Kind::Bool).with_default(true))
                .property(PropertyDescriptor::new("width", Kind::nullable(Kind::Int)))
                .property(PropertyDescriptor::new("height", Kind::nullable(Kind::Int)))
                .property(PropertyDescriptor::new(
                    "sizing_mode",
                    Kind::nullable(Kind::enumeration(SIZING_MODES)),
                ))
                .property(PropertyDescriptor::new("css_classes", Kind::list(Kind::String))),
            container("Row"),
            container("Column"),
            TypeDef::new("Spacer").extends("LayoutDOM"),
        ],
    }
}

// Rows and columns share their shape and differ only in orientation.
fn container(name: &str) -> TypeDef {
    TypeDef::new(name)
        .extends("LayoutDOM")
        .property(
            PropertyDescriptor::new("children", Kind::list(Kind::instance("LayoutDOM")))
                .with_help("Child layouts, in display order."),
        )
        .property(
            PropertyDescriptor::new("spacing", Kind::Int)
                .with_help("Gap between children, in pixels.")
                .with_check(super::non_negative),
        )
}
