//! Fixture envelopes: a wire payload tagged with what it is and the buffers
//! it refers to.

use anyhow::{anyhow, bail, Context, Result};
use propsync::serialization::{Buffer, Serialized};
use serde_json::Value;

/// What a fixture payload represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureKind {
    /// A document snapshot (`{version, title, roots, defs?}`).
    Snapshot,
    /// A patch payload (`{events}`).
    Patch,
    /// A protocol message (`{header, metadata, content}`).
    Message,
}

/// A parsed fixture.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Name used in report messages.
    pub name: String,
    /// Payload kind.
    pub kind: FixtureKind,
    /// The payload itself.
    pub payload: Value,
    /// Side buffers, by id.
    pub buffers: Vec<Buffer>,
}

impl Fixture {
    /// Parses a fixture envelope.
    ///
    /// # Errors
    ///
    /// Fails when `text` is not JSON or the envelope lacks `kind`/`payload`
    /// or carries malformed buffers.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let envelope: Value =
            serde_json::from_str(text).with_context(|| format!("Failed to parse fixture {name}"))?;
        let kind = match envelope.get("kind").and_then(Value::as_str) {
            Some("snapshot") => FixtureKind::Snapshot,
            Some("patch") => FixtureKind::Patch,
            Some("message") => FixtureKind::Message,
            Some(other) => bail!("fixture {name}: unknown kind '{other}'"),
            None => bail!("fixture {name}: missing kind"),
        };
        let payload = envelope
            .get("payload")
            .cloned()
            .ok_or_else(|| anyhow!("fixture {name}: missing payload"))?;
        let buffers: Vec<Buffer> = match envelope.get("buffers") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_buffer)
                .collect::<Result<_>>()
                .with_context(|| format!("fixture {name}: bad buffers"))?,
            Some(_) => bail!("fixture {name}: buffers must be an array"),
        };
        Ok(Self {
            name: name.to_string(),
            kind,
            payload,
            buffers,
        })
    }

    /// The payload together with its buffers.
    #[must_use]
    pub fn serialized(&self) -> Serialized<Value> {
        Serialized {
            content: self.payload.clone(),
            buffers: self.buffers.clone(),
        }
    }

    /// The snapshot carried by this fixture: the payload itself, or the
    /// `doc` of a message that has one.
    #[must_use]
    pub fn snapshot(&self) -> Option<Serialized<Value>> {
        let doc = match self.kind {
            FixtureKind::Snapshot => &self.payload,
            FixtureKind::Message => self.payload.get("content")?.get("doc")?,
            FixtureKind::Patch => return None,
        };
        Some(Serialized {
            content: doc.clone(),
            buffers: self.buffers.clone(),
        })
    }
}

fn parse_buffer(item: &Value) -> Result<Buffer> {
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("buffer without a string id"))?;
    let data = item
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("buffer {id} without a data array"))?
        .iter()
        .map(|byte| {
            byte.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| anyhow!("buffer {id}: {byte} is not a byte"))
        })
        .collect::<Result<Vec<u8>>>()?;
    Ok(Buffer {
        id: id.to_string(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_parse() {
        let fixture = Fixture::parse(
            "tiny",
            r#"{"kind": "patch", "payload": {"events": []}, "buffers": [{"id": "b", "data": [1, 255]}]}"#,
        )
        .expect("well formed");
        assert_eq!(fixture.kind, FixtureKind::Patch);
        assert_eq!(fixture.buffers[0].data, vec![1, 255]);
        assert!(fixture.snapshot().is_none());
    }

    #[test]
    fn bad_envelopes_are_errors() {
        assert!(Fixture::parse("a", "{").is_err());
        assert!(Fixture::parse("b", r#"{"kind": "blob", "payload": {}}"#).is_err());
        assert!(Fixture::parse("c", r#"{"kind": "patch"}"#).is_err());
        assert!(Fixture::parse("d", r#"{"kind": "patch", "payload": {}, "buffers": [{"id": "x", "data": [256]}]}"#).is_err());
    }
}
