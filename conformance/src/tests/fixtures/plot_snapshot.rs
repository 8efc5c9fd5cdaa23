//! A scatter plot over a column data source, with a cyclic range/renderer
//! link and a float64 column shipped inline.

/// Snapshot of a one-plot document.
pub const PLOT_SNAPSHOT: &str = r#"
{
  "kind": "snapshot",
  "payload": {
    "version": "0.3.0",
    "title": "Scatter demo",
    "roots": [
      {
        "type": "object",
        "name": "Plot",
        "id": "p1",
        "attributes": {
          "name": "main",
          "tags": [{"type": "number", "value": "nan"}, {"type": "symbol", "name": "demo"}],
          "title": {"type": "object", "name": "Title", "id": "p2", "attributes": {"text": "Samples"}},
          "x_range": {"type": "object", "name": "Range1d", "id": "p3", "attributes": {"start": 0, "end": 10}},
          "y_range": {
            "type": "object",
            "name": "DataRange1d",
            "id": "p4",
            "attributes": {"renderers": [{"id": "p5"}], "range_padding": 0.05}
          },
          "renderers": [
            {
              "type": "object",
              "name": "GlyphRenderer",
              "id": "p5",
              "attributes": {
                "data_source": {
                  "type": "object",
                  "name": "ColumnDataSource",
                  "id": "p6",
                  "attributes": {
                    "selected": {"type": "object", "name": "Selection", "id": "p7"},
                    "data": {
                      "type": "map",
                      "entries": [
                        ["x", [1, 2, 3]],
                        ["y", {
                          "type": "typed_array",
                          "array": {"type": "bytes", "data": "AAAAAAAA8D8AAAAAAAAAQAAAAAAAAAhA"},
                          "order": "little",
                          "dtype": "float64"
                        }]
                      ]
                    }
                  }
                },
                "glyph": {
                  "type": "object",
                  "name": "Scatter",
                  "id": "p8",
                  "attributes": {"size": 6, "marker": "diamond", "fill_color": null}
                }
              }
            }
          ]
        }
      },
      {
        "type": "object",
        "name": "Slider",
        "id": "p9",
        "attributes": {"name": "size", "start": 1, "end": 20, "value": 6, "step": 1}
      }
    ]
  },
  "buffers": []
}
"#;
