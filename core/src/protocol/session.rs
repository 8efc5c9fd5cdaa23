//! One end of a document synchronization link.

use std::cell::RefCell;
use std::rc::Rc;

use crate::document::{should_suppress_on_change, Document, DocumentChangedEvent};
use crate::error::{DocumentError, Result};
use crate::id::{CallbackId, SetterId};

use super::message::{Message, MsgType};

/// Binds a document to a peer.
///
/// The session listens to the document's event bus and queues every change
/// that did not come from its own peer; [`SyncSession::flush`] turns the
/// queue into a `PATCH-DOC` message. Incoming messages are applied with the
/// session's setter token, so they are never echoed back.
#[derive(Debug)]
pub struct SyncSession {
    setter: SetterId,
    listener: CallbackId,
    outgoing: Rc<RefCell<Vec<DocumentChangedEvent>>>,
}

impl SyncSession {
    /// Starts listening to `doc`.
    pub fn attach(doc: &mut Document) -> Self {
        let setter = SetterId::new();
        let outgoing = Rc::new(RefCell::new(Vec::new()));
        let queue = Rc::clone(&outgoing);
        let own = setter.clone();
        let listener = doc.on_change(move |event| {
            if event.patch().is_none() || should_suppress_on_change(&own, std::slice::from_ref(event)) {
                return;
            }
            queue.borrow_mut().push(event.clone());
        });
        tracing::debug!(setter = %setter, document = ?doc.id(), "session attached");
        Self {
            setter,
            listener,
            outgoing,
        }
    }

    /// Stops listening. Queued events are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::CallbackNotFound`] when `doc` is not the
    /// document this session was attached to.
    pub fn detach(self, doc: &mut Document) -> std::result::Result<(), DocumentError> {
        doc.remove_on_change(self.listener)
    }

    /// Token tagging changes that arrive through this session.
    #[must_use]
    pub fn setter(&self) -> &SetterId {
        &self.setter
    }

    /// Number of queued outgoing events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outgoing.borrow().len()
    }

    /// Drains the queue into a `PATCH-DOC` message, or `None` when nothing is
    /// queued.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors; the queue is emptied regardless.
    pub fn flush(&self, doc: &mut Document) -> Result<Option<Message>> {
        let events = std::mem::take(&mut *self.outgoing.borrow_mut());
        if events.is_empty() {
            return Ok(None);
        }
        let patch = doc.create_json_patch(events.iter().filter_map(DocumentChangedEvent::patch))?;
        tracing::trace!(setter = %self.setter, events = events.len(), "flushing patch");
        Ok(Some(Message::patch_doc(patch)))
    }

    /// Handles one incoming message, returning the reply to send, if any.
    ///
    /// Failures to decode or apply a payload are logged and answered with
    /// `ERROR`; they never propagate.
    pub fn handle(&self, doc: &mut Document, message: &Message) -> Option<Message> {
        let reqid = message.msgid();
        match self.dispatch(doc, message) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(
                    msgtype = %message.msgtype(),
                    msgid = reqid,
                    error = %err,
                    "error handling message"
                );
                Some(Message::error(reqid, &err.to_string()))
            }
        }
    }

    fn dispatch(&self, doc: &mut Document, message: &Message) -> Result<Option<Message>> {
        let reqid = message.msgid();
        match message.msgtype() {
            MsgType::PullDocReq => Ok(Some(Message::pull_doc_reply(reqid, doc.to_json()?))),
            MsgType::PushDoc => {
                let snapshot = message.document()?;
                doc.with_setter(self.setter.clone(), |doc| doc.replace_with_json(&snapshot))?;
                Ok(Some(Message::ok(reqid)))
            }
            MsgType::PullDocReply => {
                let snapshot = message.document()?;
                doc.with_setter(self.setter.clone(), |doc| doc.replace_with_json(&snapshot))?;
                Ok(None)
            }
            MsgType::PatchDoc => {
                let applied = doc.apply_json_patch(&message.patch(), Some(self.setter.clone()))?;
                tracing::trace!(setter = %self.setter, events = applied.len(), "applied patch");
                Ok(Some(Message::ok(reqid)))
            }
            MsgType::Error => {
                let text = message.content.get("text").and_then(|t| t.as_str()).unwrap_or("");
                tracing::warn!(reqid = ?message.header.reqid, text, "peer reported an error");
                Ok(None)
            }
            MsgType::Ack | MsgType::Ok => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Kind, PropertyDescriptor};
    use crate::registry::{TypeDef, TypeRegistry};
    use crate::value::Value;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry
            .register(TypeDef::new("Dial").property(PropertyDescriptor::new("value", Kind::Float)))
            .expect("registers");
        Arc::new(registry)
    }

    #[test]
    fn pulled_documents_sync_without_echoes() {
        let registry = registry();
        let mut server = Document::new(Arc::clone(&registry));
        let dial = server.create("Dial").expect("concrete");
        server.add_root(&dial).expect("owned");
        let server_side = SyncSession::attach(&mut server);

        let mut client = Document::new(Arc::clone(&registry));
        let client_side = SyncSession::attach(&mut client);
        let reply = server_side
            .handle(&mut server, &Message::pull_doc_req())
            .expect("replies");
        assert_eq!(reply.msgtype(), MsgType::PullDocReply);
        assert!(client_side.handle(&mut client, &reply).is_none());
        assert_eq!(client.roots(), &[dial.clone()]);
        assert_eq!(client_side.pending(), 0);
        server.flush_synced();

        server.set(&dial, "value", 0.5).expect("valid");
        let patch = server_side.flush(&mut server).expect("encodes").expect("queued");
        let ok = client_side.handle(&mut client, &patch).expect("replies");
        assert_eq!(ok.msgtype(), MsgType::Ok);
        assert_eq!(client.get(&dial, "value").expect("declared"), Value::Float(0.5));
        assert_eq!(client_side.pending(), 0);
        assert!(client_side.flush(&mut client).expect("encodes").is_none());

        client.set(&dial, "value", 0.75).expect("valid");
        assert_eq!(client_side.pending(), 1);
    }

    #[test]
    fn failures_become_error_replies() {
        let mut doc = Document::new(registry());
        let session = SyncSession::attach(&mut doc);
        let bad = Message::patch_doc(crate::serialization::Serialized::new(json!({"events": [
            {"kind": "ModelChanged", "model": {"id": "ghost"}, "attr": "value", "new": 1}
        ]})));
        let reply = session.handle(&mut doc, &bad).expect("replies");
        assert_eq!(reply.msgtype(), MsgType::Error);
        assert_eq!(reply.header.reqid.as_deref(), Some(bad.msgid()));
        assert!(reply.content["text"].as_str().is_some_and(|t| t.contains("ghost")));
        session.detach(&mut doc).expect("attached");
    }
}
