//! `plots` module: plots, renderers and glyphs.
//!
//! A [`Plot`](module) owns renderers; each glyph renderer pairs a glyph with
//! the data source it draws from.

use propsync::property::{Kind, PropertyDescriptor};
use propsync::registry::TypeDef;

use super::non_negative;
use crate::module::TypeModule;

/// Render levels, bottom to top.
pub const LEVELS: &[&str] = &["image", "underlay", "glyph", "guide", "annotation", "overlay"];

/// Marker shapes drawn by `Scatter`.
pub const MARKERS: &[&str] = &[
    "circle", "square", "triangle", "diamond", "cross", "x", "star", "hex", "dot",
];

/// Returns the `plots` module.
#[must_use]
pub fn module() -> TypeModule {
    TypeModule {
        name: "plots",
        summary: "Plots, renderers, glyphs and titles.",
        types: vec![
            TypeDef::new("Renderer")
                .abstract_()
                .property(PropertyDescriptor::new("level", Kind::enumeration(LEVELS)))
                .property(PropertyDescriptor::new("visible", Kind::Bool).with_default(true)),
            TypeDef::new("Glyph").abstract_(),
            TypeDef::new("GlyphRenderer")
                .extends("Renderer")
                .override_default("level", "glyph")
                .property(PropertyDescriptor::new("data_source", Kind::nullable(Kind::instance("DataSource"))))
                .property(PropertyDescriptor::new("glyph", Kind::nullable(Kind::instance("Glyph"))))
                .property(PropertyDescriptor::new(
                    "selection_glyph",
                    Kind::nullable(Kind::instance("Glyph")),
                ))
                .property(PropertyDescriptor::new(
                    "nonselection_glyph",
                    Kind::nullable(Kind::instance("Glyph")),
                )),
            TypeDef::new("Scatter")
                .extends("Glyph")
                .property(coordinate("x"))
                .property(coordinate("y"))
                .property(
                    PropertyDescriptor::new("size", Kind::Float)
                        .with_default(4.0)
                        .with_check(non_negative),
                )
                .property(PropertyDescriptor::new("marker", Kind::enumeration(MARKERS)))
                .property(PropertyDescriptor::new("fill_color", Kind::nullable(Kind::String)).with_default("gray"))
                .property(PropertyDescriptor::new("line_color", Kind::nullable(Kind::String)).with_default("black")),
            TypeDef::new("Line")
                .extends("Glyph")
                .property(coordinate("x"))
                .property(coordinate("y"))
                .property(PropertyDescriptor::new("line_color", Kind::nullable(Kind::String)).with_default("black"))
                .property(
                    PropertyDescriptor::new("line_width", Kind::Float)
                        .with_default(1.0)
                        .with_check(non_negative),
                )
                .property(PropertyDescriptor::new(
                    "line_dash",
                    Kind::enumeration(&["solid", "dashed", "dotted", "dotdash", "dashdot"]),
                )),
            TypeDef::new("Title")
                .extends("Renderer")
                .override_default("level", "annotation")
                .property(PropertyDescriptor::new("text", Kind::String))
                .property(PropertyDescriptor::new("align", Kind::enumeration(&["left", "center", "right"])))
                .property(PropertyDescriptor::new("text_font_size", Kind::String).with_default("13px")),
            TypeDef::new("Plot")
                .extends("LayoutDOM")
                .override_default("width", 600)
                .override_default("height", 600)
                .property(PropertyDescriptor::new("title", Kind::nullable(Kind::instance("Title"))))
                .property(PropertyDescriptor::new("renderers", Kind::list(Kind::instance("Renderer"))))
                .property(PropertyDescriptor::new("x_range", Kind::nullable(Kind::instance("Range"))))
                .property(PropertyDescriptor::new("y_range", Kind::nullable(Kind::instance("Range"))))
                .property(PropertyDescriptor::new(
                    "toolbar_location",
                    Kind::nullable(Kind::enumeration(&["above", "below", "left", "right"])),
                ).with_default("right"))
                .property(PropertyDescriptor::new("background_fill_color", Kind::String).with_default("#ffffff")),
        ],
    }
}

// A coordinate is either a column name or a fixed number.
fn coordinate(name: &str) -> PropertyDescriptor {
    PropertyDescriptor::new(name, Kind::Union(vec![Kind::String, Kind::Float])).with_default(name)
}
