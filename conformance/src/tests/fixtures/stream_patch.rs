//! Every patch event kind, with one deferred buffer.

/// Patch payload touching the plot snapshot's models.
pub const STREAM_PATCH: &str = r#"
{
  "kind": "patch",
  "payload": {
    "events": [
      {"kind": "ModelChanged", "model": {"id": "p9"}, "attr": "value", "new": 8.5},
      {
        "kind": "ColumnDataChanged",
        "model": {"id": "p6"},
        "attr": "data",
        "data": {"type": "map", "entries": [["x", [0, 1]], ["y", [0, 1]]]},
        "cols": ["x", "y"]
      },
      {
        "kind": "ColumnsStreamed",
        "model": {"id": "p6"},
        "attr": "data",
        "data": {"type": "map", "entries": [["x", [2]], ["y", [{"type": "number", "value": "-inf"}]]]},
        "rollover": 100
      },
      {
        "kind": "ColumnsPatched",
        "model": {"id": "p6"},
        "attr": "data",
        "patches": {
          "type": "map",
          "entries": [
            ["x", [[0, 10]]],
            ["y", [[{"type": "slice", "start": 0, "stop": 2, "step": null}, [7, 8]]]]
          ]
        }
      },
      {"kind": "TitleChanged", "title": "Updated"},
      {
        "kind": "RootAdded",
        "model": {"type": "object", "name": "Toggle", "id": "p10", "attributes": {"active": true}}
      },
      {"kind": "RootRemoved", "model": {"id": "p10"}},
      {"kind": "MessageSent", "msg_type": "notice", "msg_data": {"type": "bytes", "data": {"id": "b1"}}}
    ]
  },
  "buffers": [{"id": "b1", "data": [104, 105]}]
}
"#;
