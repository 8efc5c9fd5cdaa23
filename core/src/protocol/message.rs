//! Protocol messages: a header, free-form metadata, a JSON content part and
//! the binary buffers the content refers to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::error::ProtocolError;
use crate::id::next_message_id;
use crate::serialization::{Buffer, Serialized};

/// Every message type this endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Connection acknowledgement.
    #[serde(rename = "ACK")]
    Ack,
    /// Success reply to a request.
    #[serde(rename = "OK")]
    Ok,
    /// Failure reply to a request.
    #[serde(rename = "ERROR")]
    Error,
    /// Request for a document snapshot.
    #[serde(rename = "PULL-DOC-REQ")]
    PullDocReq,
    /// Snapshot answering a pull request.
    #[serde(rename = "PULL-DOC-REPLY")]
    PullDocReply,
    /// Unsolicited snapshot replacing the receiver's document.
    #[serde(rename = "PUSH-DOC")]
    PushDoc,
    /// Ordered patch events.
    #[serde(rename = "PATCH-DOC")]
    PatchDoc,
}

impl MsgType {
    /// All message types.
    pub const ALL: [Self; 7] = [
        Self::Ack,
        Self::Ok,
        Self::Error,
        Self::PullDocReq,
        Self::PullDocReply,
        Self::PushDoc,
        Self::PatchDoc,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::PullDocReq => "PULL-DOC-REQ",
            Self::PullDocReply => "PULL-DOC-REPLY",
            Self::PushDoc => "PUSH-DOC",
            Self::PatchDoc => "PATCH-DOC",
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MsgType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMessageType {
                msgtype: s.to_string(),
            })
    }
}

/// Message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique id of this message.
    pub msgid: String,
    /// Message type.
    pub msgtype: MsgType,
    /// Id of the request this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqid: Option<String>,
    /// Number of binary buffers following the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_buffers: Option<usize>,
}

impl Header {
    fn new(msgtype: MsgType) -> Self {
        Self {
            msgid: next_message_id(),
            msgtype,
            reqid: None,
            num_buffers: None,
        }
    }
}

/// A complete protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Header.
    pub header: Header,
    /// Free-form metadata.
    pub metadata: Json,
    /// Content.
    pub content: Json,
    /// Buffers referenced by the content.
    pub buffers: Vec<Buffer>,
}

impl Message {
    fn build(msgtype: MsgType, reqid: Option<&str>, content: Json, buffers: Vec<Buffer>) -> Self {
        let mut header = Header::new(msgtype);
        header.reqid = reqid.map(str::to_string);
        if !buffers.is_empty() {
            header.num_buffers = Some(buffers.len());
        }
        Self {
            header,
            metadata: json!({}),
            content,
            buffers,
        }
    }

    /// `ACK`.
    #[must_use]
    pub fn ack() -> Self {
        Self::build(MsgType::Ack, None, json!({}), Vec::new())
    }

    /// `OK` answering `reqid`.
    #[must_use]
    pub fn ok(reqid: &str) -> Self {
        Self::build(MsgType::Ok, Some(reqid), json!({}), Vec::new())
    }

    /// `ERROR` answering `reqid`.
    #[must_use]
    pub fn error(reqid: &str, text: &str) -> Self {
        Self::build(MsgType::Error, Some(reqid), json!({ "text": text }), Vec::new())
    }

    /// `PULL-DOC-REQ`.
    #[must_use]
    pub fn pull_doc_req() -> Self {
        Self::build(MsgType::PullDocReq, None, json!({}), Vec::new())
    }

    /// `PULL-DOC-REPLY` answering `reqid` with a snapshot.
    #[must_use]
    pub fn pull_doc_reply(reqid: &str, doc: Serialized<Json>) -> Self {
        Self::build(
            MsgType::PullDocReply,
            Some(reqid),
            json!({ "doc": doc.content }),
            doc.buffers,
        )
    }

    /// `PUSH-DOC` carrying a snapshot.
    #[must_use]
    pub fn push_doc(doc: Serialized<Json>) -> Self {
        Self::build(MsgType::PushDoc, None, json!({ "doc": doc.content }), doc.buffers)
    }

    /// `PATCH-DOC` carrying a patch payload.
    #[must_use]
    pub fn patch_doc(patch: Serialized<Json>) -> Self {
        Self::build(MsgType::PatchDoc, None, patch.content, patch.buffers)
    }

    /// Message type.
    #[must_use]
    pub fn msgtype(&self) -> MsgType {
        self.header.msgtype
    }

    /// Message id.
    #[must_use]
    pub fn msgid(&self) -> &str {
        &self.header.msgid
    }

    /// The snapshot carried by `PULL-DOC-REPLY` and `PUSH-DOC`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] when the content lacks a `doc`.
    pub fn document(&self) -> Result<Serialized<Json>, ProtocolError> {
        let doc = self.content.get("doc").ok_or_else(|| ProtocolError::Malformed {
            part: "content",
            reason: format!("{} lacks 'doc'", self.header.msgtype),
        })?;
        Ok(Serialized {
            content: doc.clone(),
            buffers: self.buffers.clone(),
        })
    }

    /// The patch carried by `PATCH-DOC`.
    #[must_use]
    pub fn patch(&self) -> Serialized<Json> {
        Serialized {
            content: self.content.clone(),
            buffers: self.buffers.clone(),
        }
    }

    /// The JSON text of the header, metadata and content parts.
    #[must_use]
    pub fn parts(&self) -> [String; 3] {
        let header = serde_json::to_value(&self.header).unwrap_or(Json::Null);
        [header.to_string(), self.metadata.to_string(), self.content.to_string()]
    }

    /// Rebuilds a message from its received parts.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] when a part is not JSON (or the
    /// header lacks fields), [`ProtocolError::UnknownMessageType`] for
    /// unknown types and [`ProtocolError::BufferCount`] when the header
    /// announces a different number of buffers than were received.
    pub fn assemble(
        header: &str,
        metadata: &str,
        content: &str,
        buffers: Vec<Buffer>,
    ) -> Result<Self, ProtocolError> {
        let raw: Json = parse_part("header", header)?;
        let msgtype = raw
            .get("msgtype")
            .and_then(Json::as_str)
            .ok_or_else(|| ProtocolError::Malformed {
                part: "header",
                reason: "missing msgtype".into(),
            })?;
        msgtype.parse::<MsgType>()?;
        let header: Header = serde_json::from_value(raw).map_err(|err| ProtocolError::Malformed {
            part: "header",
            reason: err.to_string(),
        })?;

        let expected = header.num_buffers.unwrap_or(0);
        if expected != buffers.len() {
            return Err(ProtocolError::BufferCount {
                expected,
                received: buffers.len(),
            });
        }
        Ok(Self {
            header,
            metadata: parse_part("metadata", metadata)?,
            content: parse_part("content", content)?,
            buffers,
        })
    }
}

fn parse_part(part: &'static str, text: &str) -> Result<Json, ProtocolError> {
    serde_json::from_str(text).map_err(|err| ProtocolError::Malformed {
        part,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_types_use_wire_names() {
        for msgtype in MsgType::ALL {
            assert_eq!(msgtype.as_str().parse::<MsgType>(), Ok(msgtype));
            assert_eq!(
                serde_json::to_value(msgtype).expect("serializes"),
                json!(msgtype.as_str())
            );
        }
        assert!(matches!(
            "SERVER-INFO-REQ".parse::<MsgType>(),
            Err(ProtocolError::UnknownMessageType { .. })
        ));
    }

    #[test]
    fn parts_reassemble_into_the_same_message() {
        let patch = Serialized {
            content: json!({"events": []}),
            buffers: vec![Buffer {
                id: "b1".into(),
                data: vec![1, 2, 3],
            }],
        };
        let message = Message::patch_doc(patch);
        assert_eq!(message.header.num_buffers, Some(1));
        let [header, metadata, content] = message.parts();
        let copy = Message::assemble(&header, &metadata, &content, message.buffers.clone())
            .expect("well formed");
        assert_eq!(copy, message);
    }

    #[test]
    fn assemble_rejects_bad_headers() {
        let header = json!({"msgid": "m1", "msgtype": "PATCH-DOC", "num_buffers": 2}).to_string();
        assert_eq!(
            Message::assemble(&header, "{}", "{}", Vec::new()),
            Err(ProtocolError::BufferCount {
                expected: 2,
                received: 0
            })
        );
        let header = json!({"msgid": "m1", "msgtype": "NOPE"}).to_string();
        assert!(matches!(
            Message::assemble(&header, "{}", "{}", Vec::new()),
            Err(ProtocolError::UnknownMessageType { msgtype }) if msgtype == "NOPE"
        ));
        assert!(matches!(
            Message::assemble("{", "{}", "{}", Vec::new()),
            Err(ProtocolError::Malformed { part: "header", .. })
        ));
    }

    #[test]
    fn replies_carry_the_request_id() {
        let request = Message::pull_doc_req();
        let reply = Message::pull_doc_reply(request.msgid(), Serialized::new(json!({"roots": []})));
        assert_eq!(reply.header.reqid.as_deref(), Some(request.msgid()));
        assert_eq!(reply.document().expect("has doc").content, json!({"roots": []}));
        assert!(Message::ok("x").document().is_err());
    }
}
