//! A `PULL-DOC-REPLY` whose snapshot carries an int32 column in a side
//! buffer.

/// Reply message with one buffer.
pub const PULL_REPLY: &str = r#"
{
  "kind": "message",
  "payload": {
    "header": {"msgid": "m7", "msgtype": "PULL-DOC-REPLY", "reqid": "m3", "num_buffers": 1},
    "metadata": {},
    "content": {
      "doc": {
        "version": "0.3.0",
        "title": "Buffers",
        "roots": [
          {
            "type": "object",
            "name": "ColumnDataSource",
            "id": "s1",
            "attributes": {
              "data": {
                "type": "map",
                "entries": [
                  ["squares", {
                    "type": "typed_array",
                    "array": {"type": "bytes", "data": {"id": "b7"}},
                    "order": "little",
                    "dtype": "int32"
                  }]
                ]
              }
            }
          }
        ]
      }
    }
  },
  "buffers": [{"id": "b7", "data": [0, 0, 0, 0, 1, 0, 0, 0, 4, 0, 0, 0, 9, 0, 0, 0]}]
}
"#;
