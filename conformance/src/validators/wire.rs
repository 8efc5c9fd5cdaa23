//! Wire payload validator.
//!
//! Works on raw JSON, independently of the decoder:
//! - every JSON object inside a value is a `{"id"}` reference or carries a
//!   known `type` tag
//! - `map` entries are `[key, value]` pairs
//! - `number` values are `nan`, `-inf` or `+inf`
//! - `bytes` handles resolve to a buffer shipped with the payload
//! - patch events have a known `kind` and all fields that kind requires
//! - message headers are well formed and announce the right buffer count

use std::collections::HashSet;

use propsync::protocol::{Message, MsgType};
use serde_json::{Map, Value};

use crate::fixture::{Fixture, FixtureKind};
use crate::report::{ConformanceReport, TestResult};

/// Tags a value representation may carry.
pub const VALUE_TAGS: &[&str] = &[
    "ref",
    "symbol",
    "number",
    "array",
    "set",
    "map",
    "bytes",
    "slice",
    "typed_array",
    "ndarray",
    "object",
];

/// Element types of typed arrays.
pub const DTYPES: &[&str] = &[
    "uint8", "int8", "uint16", "int16", "uint32", "int32", "float32", "float64",
];

/// Patch event kinds and the fields each requires besides `kind`.
pub const EVENT_FIELDS: &[(&str, &[&str])] = &[
    ("ModelChanged", &["model", "attr", "new"]),
    ("ColumnDataChanged", &["model", "attr", "data"]),
    ("ColumnsStreamed", &["model", "attr", "data"]),
    ("ColumnsPatched", &["model", "attr", "patches"]),
    ("TitleChanged", &["title"]),
    ("RootAdded", &["model"]),
    ("RootRemoved", &["model"]),
    ("MessageSent", &["msg_type", "msg_data"]),
];

/// Validates one fixture.
pub fn validate(fixture: &Fixture) -> ConformanceReport {
    let mut report = ConformanceReport::new();
    let buffers: HashSet<&str> = fixture.buffers.iter().map(|b| b.id.as_str()).collect();
    let mut checker = Checker {
        buffers: &buffers,
        problems: Vec::new(),
    };

    match fixture.kind {
        FixtureKind::Snapshot => checker.snapshot(&fixture.payload, "$"),
        FixtureKind::Patch => checker.patch(&fixture.payload, "$"),
        FixtureKind::Message => {
            check_header(fixture, &mut report);
            checker.message(&fixture.payload);
        }
    }

    let validator = match fixture.kind {
        FixtureKind::Snapshot => "wire/snapshot",
        FixtureKind::Patch => "wire/patch",
        FixtureKind::Message => "wire/message",
    };
    if checker.problems.is_empty() {
        report.push(TestResult::pass(
            validator,
            format!("{}: payload uses the tagged vocabulary", fixture.name),
        ));
    } else {
        report.push(TestResult::fail_with_details(
            validator,
            format!("{}: malformed payload", fixture.name),
            checker.problems,
        ));
    }
    report
}

/// Round-trips the message parts through [`Message::assemble`].
fn check_header(fixture: &Fixture, report: &mut ConformanceReport) {
    let part = |key: &str| {
        fixture
            .payload
            .get(key)
            .map_or_else(String::new, Value::to_string)
    };
    match Message::assemble(
        &part("header"),
        &part("metadata"),
        &part("content"),
        fixture.buffers.clone(),
    ) {
        Ok(message) => report.push(TestResult::pass(
            "wire/header",
            format!("{}: {} header is well formed", fixture.name, message.msgtype()),
        )),
        Err(err) => report.push(TestResult::fail(
            "wire/header",
            format!("{}: {err}", fixture.name),
        )),
    }
}

struct Checker<'b> {
    buffers: &'b HashSet<&'b str>,
    problems: Vec<String>,
}

impl Checker<'_> {
    fn problem(&mut self, path: &str, text: impl std::fmt::Display) {
        self.problems.push(format!("{path}: {text}"));
    }

    fn message(&mut self, payload: &Value) {
        let msgtype = payload
            .pointer("/header/msgtype")
            .and_then(Value::as_str)
            .and_then(|t| t.parse::<MsgType>().ok());
        let Some(content) = payload.get("content") else {
            self.problem("$", "message without content");
            return;
        };
        match msgtype {
            Some(MsgType::PatchDoc) => self.patch(content, "$.content"),
            Some(MsgType::PullDocReply | MsgType::PushDoc) => match content.get("doc") {
                Some(doc) => self.snapshot(doc, "$.content.doc"),
                None => self.problem("$.content", "missing doc"),
            },
            // Header problems are reported by check_header.
            _ => {}
        }
    }

    fn snapshot(&mut self, doc: &Value, path: &str) {
        let Some(fields) = doc.as_object() else {
            self.problem(path, "snapshot is not an object");
            return;
        };
        if !fields.get("title").map_or(true, Value::is_string) {
            self.problem(path, "title is not a string");
        }
        match fields.get("roots") {
            Some(Value::Array(roots)) => {
                for (i, root) in roots.iter().enumerate() {
                    let at = format!("{path}.roots[{i}]");
                    if root.get("type").and_then(Value::as_str) != Some("object")
                        || !root.get("id").is_some_and(Value::is_string)
                    {
                        self.problem(&at, "root is not a full model record");
                    }
                    self.value(root, &at);
                }
            }
            _ => self.problem(path, "missing roots array"),
        }
        if let Some(defs) = fields.get("defs") {
            let named = defs.as_array().is_some_and(|defs| {
                defs.iter().all(|d| {
                    d.get("type").and_then(Value::as_str) == Some("model")
                        && d.get("name").is_some_and(Value::is_string)
                })
            });
            if !named {
                self.problem(path, "defs must be model definitions with names");
            }
        }
    }

    fn patch(&mut self, patch: &Value, path: &str) {
        let Some(events) = patch.get("events").and_then(Value::as_array) else {
            self.problem(path, "missing events array");
            return;
        };
        for (i, event) in events.iter().enumerate() {
            let at = format!("{path}.events[{i}]");
            let kind = event.get("kind").and_then(Value::as_str).unwrap_or("");
            let Some((_, required)) = EVENT_FIELDS.iter().find(|(k, _)| *k == kind) else {
                self.problem(&at, format!("unknown event kind '{kind}'"));
                continue;
            };
            for field in *required {
                match event.get(*field) {
                    Some(value) => self.value(value, &format!("{at}.{field}")),
                    None => self.problem(&at, format!("{kind} without '{field}'")),
                }
            }
        }
    }

    fn value(&mut self, value: &Value, path: &str) {
        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.value(item, &format!("{path}[{i}]"));
                }
            }
            Value::Object(fields) => self.tagged(fields, path),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
        }
    }

    fn tagged(&mut self, fields: &Map<String, Value>, path: &str) {
        if fields.len() == 1 && fields.get("id").is_some_and(Value::is_string) {
            return;
        }
        let Some(tag) = fields.get("type").and_then(Value::as_str) else {
            self.problem(path, "untagged object");
            return;
        };
        if !VALUE_TAGS.contains(&tag) {
            self.problem(path, format!("unknown tag '{tag}'"));
            return;
        }
        match tag {
            "ref" => {
                if !fields.get("id").is_some_and(Value::is_string) {
                    self.problem(path, "ref without an id");
                }
            }
            "symbol" => {
                if !fields.get("name").is_some_and(Value::is_string) {
                    self.problem(path, "symbol without a name");
                }
            }
            "number" => {
                let text = fields.get("value").and_then(Value::as_str);
                if !matches!(text, Some("nan" | "-inf" | "+inf")) {
                    self.problem(path, "number value must be nan, -inf or +inf");
                }
            }
            "array" | "set" => self.entries(fields, path, false),
            "map" => self.entries(fields, path, true),
            "bytes" => self.bytes(fields, path),
            "slice" => {
                for bound in ["start", "stop", "step"] {
                    let ok = fields.get(bound).map_or(true, |b| b.is_null() || b.is_i64());
                    if !ok {
                        self.problem(path, format!("slice {bound} must be an integer or null"));
                    }
                }
            }
            "typed_array" => {
                self.array_header(fields, path, DTYPES);
                match fields.get("array").and_then(Value::as_object) {
                    Some(bytes) if bytes.get("type").and_then(Value::as_str) == Some("bytes") => {
                        self.bytes(bytes, &format!("{path}.array"));
                    }
                    _ => self.problem(path, "typed_array without a bytes record"),
                }
            }
            "ndarray" => {
                let mut dtypes = DTYPES.to_vec();
                dtypes.extend(["bool", "object"]);
                self.array_header(fields, path, &dtypes);
                if !fields
                    .get("shape")
                    .and_then(Value::as_array)
                    .is_some_and(|dims| dims.iter().all(Value::is_u64))
                {
                    self.problem(path, "ndarray shape must be a list of sizes");
                }
                match fields.get("array") {
                    Some(data) => self.value(data, &format!("{path}.array")),
                    None => self.problem(path, "ndarray without data"),
                }
            }
            "object" => {
                if !fields.get("name").is_some_and(Value::is_string) {
                    self.problem(path, "object without a type name");
                }
                match fields.get("attributes") {
                    None => {}
                    Some(Value::Object(attributes)) => {
                        for (name, attr) in attributes {
                            self.value(attr, &format!("{path}.{name}"));
                        }
                    }
                    Some(_) => self.problem(path, "attributes must be an object"),
                }
            }
            _ => {}
        }
    }

    fn entries(&mut self, fields: &Map<String, Value>, path: &str, pairs: bool) {
        let entries = match fields.get("entries") {
            None => return,
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                self.problem(path, "entries must be an array");
                return;
            }
        };
        for (i, entry) in entries.iter().enumerate() {
            let at = format!("{path}.entries[{i}]");
            if pairs && entry.as_array().map_or(true, |pair| pair.len() != 2) {
                self.problem(&at, "map entry is not a [key, value] pair");
                continue;
            }
            self.value(entry, &at);
        }
    }

    fn bytes(&mut self, fields: &Map<String, Value>, path: &str) {
        match fields.get("data") {
            Some(Value::String(_)) => {}
            Some(Value::Object(handle)) => match handle.get("id").and_then(Value::as_str) {
                Some(id) if self.buffers.contains(id) => {}
                Some(id) => self.problem(path, format!("buffer '{id}' was not shipped")),
                None => self.problem(path, "buffer handle without an id"),
            },
            _ => self.problem(path, "bytes data must be base64 text or a buffer handle"),
        }
    }

    fn array_header(&mut self, fields: &Map<String, Value>, path: &str, dtypes: &[&str]) {
        let dtype = fields.get("dtype").and_then(Value::as_str).unwrap_or("");
        if !dtypes.contains(&dtype) {
            self.problem(path, format!("unknown dtype '{dtype}'"));
        }
        let order = fields.get("order").and_then(Value::as_str);
        if !matches!(order, Some("little" | "big")) {
            self.problem(path, "order must be little or big");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(kind: &str, payload: Value) -> ConformanceReport {
        let text = json!({"kind": kind, "payload": payload}).to_string();
        validate(&Fixture::parse("inline", &text).expect("envelope"))
    }

    fn details(report: &ConformanceReport) -> Vec<String> {
        report.results.iter().flat_map(|r| r.details.clone()).collect()
    }

    #[test]
    fn embedded_fixtures_pass() {
        for (name, text) in crate::tests::fixtures::ALL {
            let report = validate(&Fixture::parse(name, text).expect("envelope"));
            assert!(report.all_passed(), "{name}: {:#?}", report.results);
        }
    }

    #[test]
    fn untagged_objects_fail() {
        let report = check("patch", json!({"events": [
            {"kind": "ModelChanged", "model": {"id": "a"}, "attr": "x", "new": {"plain": 1}}
        ]}));
        assert_eq!(report.failure_count(), 1);
        assert!(details(&report)[0].contains("untagged object"));
    }

    #[test]
    fn malformed_values_are_reported_with_paths() {
        let report = check("snapshot", json!({"title": "t", "roots": [{
            "type": "object", "name": "N", "id": "n1", "attributes": {
                "m": {"type": "map", "entries": [[1, 2, 3]]},
                "f": {"type": "number", "value": "inf"},
                "b": {"type": "bytes", "data": {"id": "missing"}},
                "a": {"type": "typed_array", "array": {"type": "bytes", "data": ""}, "order": "middle", "dtype": "int64"}
            }
        }]}));
        let details = details(&report);
        assert!(details.iter().any(|d| d.contains("$.roots[0].m.entries[0]")));
        assert!(details.iter().any(|d| d.contains("nan, -inf or +inf")));
        assert!(details.iter().any(|d| d.contains("'missing' was not shipped")));
        assert!(details.iter().any(|d| d.contains("unknown dtype 'int64'")));
        assert!(details.iter().any(|d| d.contains("order must be")));
    }

    #[test]
    fn events_need_known_kinds_and_fields() {
        let report = check("patch", json!({"events": [
            {"kind": "ModelRenamed"},
            {"kind": "ModelChanged", "model": {"id": "a"}, "new": 1}
        ]}));
        let details = details(&report);
        assert!(details.iter().any(|d| d.contains("unknown event kind 'ModelRenamed'")));
        assert!(details.iter().any(|d| d.contains("ModelChanged without 'attr'")));
    }

    #[test]
    fn headers_must_match_buffers() {
        let report = check("message", json!({
            "header": {"msgid": "m1", "msgtype": "PATCH-DOC", "num_buffers": 1},
            "metadata": {},
            "content": {"events": []}
        }));
        let header = report
            .results
            .iter()
            .find(|r| r.validator == "wire/header")
            .expect("header checked");
        assert!(header.is_failure());
    }
}
