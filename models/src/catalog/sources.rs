//! `sources` module: tabular data and selections.

use propsync::property::{Kind, PropertyDescriptor};
use propsync::registry::TypeDef;

use crate::module::TypeModule;

/// Returns the `sources` module.
#[must_use]
pub fn module() -> TypeModule {
    TypeModule {
        name: "sources",
        summary: "Data sources: columnar tables and the selections made on them.",
        types: vec![
            TypeDef::new("Selection")
                .property(PropertyDescriptor::new("indices", Kind::list(Kind::Int)))
                .property(PropertyDescriptor::new("line_indices", Kind::list(Kind::Int)))
                .property(PropertyDescriptor::new(
                    "multiline_indices",
                    Kind::dict(Kind::String, Kind::list(Kind::Int)),
                )),
            TypeDef::new("DataSource")
                .abstract_()
                .property(PropertyDescriptor::new("selected", Kind::nullable(Kind::instance("Selection")))),
            TypeDef::new("ColumnarDataSource").extends("DataSource").abstract_(),
            TypeDef::new("ColumnDataSource")
                .extends("ColumnarDataSource")
                .property(
                    PropertyDescriptor::new("data", Kind::ColumnData)
                        .with_help("Mapping of column names to equal-length columns."),
                ),
        ],
    }
}
