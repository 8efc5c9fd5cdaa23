//! `widgets` module: interactive inputs.

use propsync::property::{Kind, PropertyDescriptor};
use propsync::registry::TypeDef;

use super::{non_negative, positive};
use crate::module::TypeModule;

/// Returns the `widgets` module.
#[must_use]
pub fn module() -> TypeModule {
    TypeModule {
        name: "widgets",
        summary: "Interactive inputs: sliders, buttons, text inputs, selects and toggles.",
        types: vec![
            TypeDef::new("Widget").extends("LayoutDOM").abstract_(),
            TypeDef::new("Slider")
                .extends("Widget")
                .property(PropertyDescriptor::new("start", Kind::Float))
                .property(PropertyDescriptor::new("end", Kind::Float).with_default(1.0))
                .property(PropertyDescriptor::new("value", Kind::Float))
                .property(
                    PropertyDescriptor::new("value_throttled", Kind::Float)
                        .readonly()
                        .with_help("Value reported once the user releases the handle."),
                )
                .property(
                    PropertyDescriptor::new("step", Kind::Float)
                        .with_default(0.1)
                        .with_check(positive),
                )
                .property(PropertyDescriptor::new("title", Kind::nullable(Kind::String)).with_default(""))
                .property(PropertyDescriptor::new(
                    "orientation",
                    Kind::enumeration(&["horizontal", "vertical"]),
                ))
                .property(PropertyDescriptor::new("bar_color", Kind::String).with_default("#e6e6e6")),
            TypeDef::new("Button")
                .extends("Widget")
                .property(PropertyDescriptor::new("label", Kind::String).with_default("Button"))
                .property(PropertyDescriptor::new(
                    "button_type",
                    Kind::enumeration(&["default", "primary", "success", "warning", "danger", "light"]),
                ))
                .property(
                    PropertyDescriptor::new("clicks", Kind::Int)
                        .with_check(non_negative)
                        .with_help("Number of presses so far."),
                ),
            TypeDef::new("TextInput")
                .extends("Widget")
                .property(PropertyDescriptor::new("value", Kind::String))
                .property(PropertyDescriptor::new("value_input", Kind::String).readonly())
                .property(PropertyDescriptor::new("placeholder", Kind::String))
                .property(PropertyDescriptor::new("title", Kind::String))
                .property(PropertyDescriptor::new("max_length", Kind::nullable(Kind::Int))),
            TypeDef::new("Select")
                .extends("Widget")
                .property(PropertyDescriptor::new("options", Kind::list(Kind::String)))
                .property(PropertyDescriptor::new("value", Kind::String))
                .property(PropertyDescriptor::new("title", Kind::String)),
            TypeDef::new("Toggle")
                .extends("Widget")
                .property(PropertyDescriptor::new("active", Kind::Bool))
                .property(PropertyDescriptor::new("label", Kind::String).with_default("Toggle")),
        ],
    }
}
