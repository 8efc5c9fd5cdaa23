//! `ranges` module: axis extents.

use propsync::property::{Kind, PropertyDescriptor};
use propsync::registry::TypeDef;

use super::non_negative;
use crate::module::TypeModule;

/// Returns the `ranges` module.
#[must_use]
pub fn module() -> TypeModule {
    TypeModule {
        name: "ranges",
        summary: "Axis extents: explicit, data-driven and categorical ranges.",
        types: vec![
            TypeDef::new("Range").abstract_(),
            TypeDef::new("Range1d")
                .extends("Range")
                .property(PropertyDescriptor::new("start", Kind::Float))
                .property(PropertyDescriptor::new("end", Kind::Float).with_default(1.0))
                .property(PropertyDescriptor::new("reset_start", Kind::nullable(Kind::Float)))
                .property(PropertyDescriptor::new("reset_end", Kind::nullable(Kind::Float)))
                .property(PropertyDescriptor::new(
                    "bounds",
                    Kind::nullable(Kind::Tuple(vec![Kind::Float, Kind::Float])),
                )),
            TypeDef::new("DataRange1d")
                .extends("Range")
                .property(PropertyDescriptor::new("start", Kind::nullable(Kind::Float)))
                .property(PropertyDescriptor::new("end", Kind::nullable(Kind::Float)))
                .property(PropertyDescriptor::new("renderers", Kind::list(Kind::instance("Renderer"))))
                .property(
                    PropertyDescriptor::new("range_padding", Kind::Float)
                        .with_default(0.1)
                        .with_check(non_negative),
                )
                .property(PropertyDescriptor::new(
                    "range_padding_units",
                    Kind::enumeration(&["percent", "absolute"]),
                ))
                .property(PropertyDescriptor::new(
                    "follow",
                    Kind::nullable(Kind::enumeration(&["start", "end"])),
                ))
                .property(PropertyDescriptor::new("flipped", Kind::Bool)),
            TypeDef::new("FactorRange")
                .extends("Range")
                .property(PropertyDescriptor::new("factors", Kind::list(Kind::String)))
                .property(PropertyDescriptor::new("factor_padding", Kind::Float).with_check(non_negative))
                .property(PropertyDescriptor::new("range_padding", Kind::Float).with_check(non_negative)),
        ],
    }
}
