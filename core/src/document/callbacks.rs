//! Callback storage and hold state for a document's event bus.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::{CallbackId, ModelId};
use crate::model::PropertyChange;
use crate::value::Value;

use super::events::{combine_into, DocumentChangedEvent};
use super::Document;

/// How events raised while a document is held are delivered on unhold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldPolicy {
    /// Collapse changes to the same attribute (or the title) into one event
    /// carrying the first old value and the last new value.
    Combine,
    /// Replay every event in order.
    Collect,
}

impl HoldPolicy {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Combine => "combine",
            Self::Collect => "collect",
        }
    }
}

impl fmt::Display for HoldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combine" => Ok(Self::Combine),
            "collect" => Ok(Self::Collect),
            other => Err(format!("unknown hold policy '{other}'")),
        }
    }
}

/// Callback receiving every document change event.
pub type ChangeCallback = Box<dyn FnMut(&DocumentChangedEvent)>;

/// Callback receiving changes of one attribute, with the document at hand.
pub type PropertyCallback = Box<dyn FnMut(&mut Document, &PropertyChange)>;

/// Callback receiving application messages of one type.
pub type MessageCallback = Box<dyn FnMut(&Value)>;

/// Callback scheduled on a session.
pub type SessionCallbackFn = Box<dyn FnMut(&mut Document)>;

/// When a session callback is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSchedule {
    /// Once, as soon as possible.
    NextTick,
    /// Once, after a delay.
    Timeout(Duration),
    /// Repeatedly, with a period.
    Periodic(Duration),
}

impl SessionSchedule {
    /// Whether the callback is removed after it first runs.
    #[must_use]
    pub const fn is_one_shot(self) -> bool {
        !matches!(self, Self::Periodic(_))
    }
}

/// Summary of a scheduled session callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCallback {
    /// Handle used to run or remove it.
    pub id: CallbackId,
    /// When it runs.
    pub schedule: SessionSchedule,
}

// A slot whose callback is `None` is running; the callback is put back
// afterwards unless the slot was removed meanwhile.
struct Slot<F: ?Sized> {
    id: CallbackId,
    callback: Option<Box<F>>,
}

struct PropertySlot {
    model: ModelId,
    attr: String,
    slot: Slot<dyn FnMut(&mut Document, &PropertyChange)>,
}

struct SessionSlot {
    schedule: SessionSchedule,
    slot: Slot<dyn FnMut(&mut Document)>,
}

#[derive(Default)]
pub(crate) struct DocumentCallbacks {
    change: Vec<(CallbackId, ChangeCallback)>,
    property: Vec<PropertySlot>,
    message: Vec<(CallbackId, String, MessageCallback)>,
    session: Vec<SessionSlot>,
    hold: Option<HoldPolicy>,
    held: Vec<DocumentChangedEvent>,
    pending: VecDeque<DocumentChangedEvent>,
    dispatching: bool,
}

impl fmt::Debug for DocumentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCallbacks")
            .field("change", &self.change.len())
            .field("property", &self.property.len())
            .field("message", &self.message.len())
            .field("session", &self.session.len())
            .field("hold", &self.hold)
            .field("held", &self.held.len())
            .finish_non_exhaustive()
    }
}

impl DocumentCallbacks {
    pub(crate) fn hold_policy(&self) -> Option<HoldPolicy> {
        self.hold
    }

    /// Starts holding. A second, different policy is ignored with a warning.
    pub(crate) fn hold(&mut self, policy: HoldPolicy) {
        match self.hold {
            Some(current) if current != policy => {
                tracing::warn!(
                    current = %current,
                    requested = %policy,
                    "hold already active with a different policy, ignoring"
                );
            }
            _ => self.hold = Some(policy),
        }
    }

    /// Stops holding and hands back the held events.
    pub(crate) fn unhold(&mut self) -> Vec<DocumentChangedEvent> {
        self.hold = None;
        std::mem::take(&mut self.held)
    }

    /// Holds `event` when a hold is active. Returns the event otherwise.
    pub(crate) fn intercept(&mut self, event: DocumentChangedEvent) -> Option<DocumentChangedEvent> {
        match self.hold {
            Some(HoldPolicy::Collect) => {
                self.held.push(event);
                None
            }
            Some(HoldPolicy::Combine) => {
                combine_into(&mut self.held, event);
                None
            }
            None => Some(event),
        }
    }

    /// Queues an event. Returns `true` when the caller must drain the queue,
    /// `false` when an outer dispatch already does.
    pub(crate) fn enqueue(&mut self, event: DocumentChangedEvent) -> bool {
        self.pending.push_back(event);
        if self.dispatching {
            false
        } else {
            self.dispatching = true;
            true
        }
    }

    pub(crate) fn next_pending(&mut self) -> Option<DocumentChangedEvent> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.dispatching = false;
        }
        next
    }

    // ------------------------------------------------------------------
    // Document-level change callbacks

    pub(crate) fn add_change(&mut self, callback: ChangeCallback) -> CallbackId {
        let id = CallbackId::new();
        self.change.push((id, callback));
        id
    }

    pub(crate) fn remove_change(&mut self, id: CallbackId) -> bool {
        let before = self.change.len();
        self.change.retain(|(cb, _)| *cb != id);
        self.change.len() != before
    }

    pub(crate) fn notify_change(&mut self, event: &DocumentChangedEvent) {
        for (_, callback) in &mut self.change {
            callback(event);
        }
    }

    // ------------------------------------------------------------------
    // Per-attribute callbacks

    pub(crate) fn add_property(
        &mut self,
        model: ModelId,
        attr: String,
        callback: PropertyCallback,
    ) -> CallbackId {
        let id = CallbackId::new();
        self.property.push(PropertySlot {
            model,
            attr,
            slot: Slot {
                id,
                callback: Some(callback),
            },
        });
        id
    }

    pub(crate) fn remove_property(&mut self, id: CallbackId) -> bool {
        let before = self.property.len();
        self.property.retain(|entry| entry.slot.id != id);
        self.property.len() != before
    }

    /// Ids of idle callbacks registered for `(model, attr)`, in registration
    /// order.
    pub(crate) fn property_ids(&self, model: &ModelId, attr: &str) -> Vec<CallbackId> {
        self.property
            .iter()
            .filter(|entry| &entry.model == model && entry.attr == attr && entry.slot.callback.is_some())
            .map(|entry| entry.slot.id)
            .collect()
    }

    pub(crate) fn take_property(&mut self, id: CallbackId) -> Option<PropertyCallback> {
        self.property
            .iter_mut()
            .find(|entry| entry.slot.id == id)
            .and_then(|entry| entry.slot.callback.take())
    }

    pub(crate) fn restore_property(&mut self, id: CallbackId, callback: PropertyCallback) {
        if let Some(entry) = self.property.iter_mut().find(|entry| entry.slot.id == id) {
            entry.slot.callback = Some(callback);
        }
    }

    /// Drops every per-attribute callback whose model is not in `keep`.
    pub(crate) fn retain_properties(&mut self, keep: impl Fn(&ModelId) -> bool) {
        self.property.retain(|entry| keep(&entry.model));
    }

    // ------------------------------------------------------------------
    // Message callbacks

    pub(crate) fn add_message(&mut self, msg_type: String, callback: MessageCallback) -> CallbackId {
        let id = CallbackId::new();
        self.message.push((id, msg_type, callback));
        id
    }

    pub(crate) fn remove_message(&mut self, id: CallbackId) -> bool {
        let before = self.message.len();
        self.message.retain(|(cb, _, _)| *cb != id);
        self.message.len() != before
    }

    pub(crate) fn notify_message(&mut self, msg_type: &str, data: &Value) {
        for (_, kind, callback) in &mut self.message {
            if kind == msg_type {
                callback(data);
            }
        }
    }

    // ------------------------------------------------------------------
    // Session callbacks

    pub(crate) fn add_session(&mut self, schedule: SessionSchedule, callback: SessionCallbackFn) -> CallbackId {
        let id = CallbackId::new();
        self.session.push(SessionSlot {
            schedule,
            slot: Slot {
                id,
                callback: Some(callback),
            },
        });
        id
    }

    pub(crate) fn remove_session(&mut self, id: CallbackId) -> bool {
        let before = self.session.len();
        self.session.retain(|entry| entry.slot.id != id);
        self.session.len() != before
    }

    pub(crate) fn session_schedule(&self, id: CallbackId) -> Option<SessionSchedule> {
        self.session
            .iter()
            .find(|entry| entry.slot.id == id)
            .map(|entry| entry.schedule)
    }

    pub(crate) fn take_session(&mut self, id: CallbackId) -> Option<SessionCallbackFn> {
        self.session
            .iter_mut()
            .find(|entry| entry.slot.id == id)
            .and_then(|entry| entry.slot.callback.take())
    }

    pub(crate) fn restore_session(&mut self, id: CallbackId, callback: SessionCallbackFn) {
        if let Some(entry) = self.session.iter_mut().find(|entry| entry.slot.id == id) {
            entry.slot.callback = Some(callback);
        }
    }

    pub(crate) fn sessions(&self) -> Vec<SessionCallback> {
        self.session
            .iter()
            .map(|entry| SessionCallback {
                id: entry.slot.id,
                schedule: entry.schedule,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_policy_parses_case_insensitively() {
        assert_eq!("Collect".parse::<HoldPolicy>(), Ok(HoldPolicy::Collect));
        assert_eq!(" combine ".parse::<HoldPolicy>(), Ok(HoldPolicy::Combine));
        assert!("merge".parse::<HoldPolicy>().is_err());
    }

    #[test]
    fn conflicting_hold_keeps_the_first_policy() {
        let mut callbacks = DocumentCallbacks::default();
        callbacks.hold(HoldPolicy::Collect);
        callbacks.hold(HoldPolicy::Combine);
        assert_eq!(callbacks.hold_policy(), Some(HoldPolicy::Collect));
        assert!(callbacks.unhold().is_empty());
        assert_eq!(callbacks.hold_policy(), None);
    }

    #[test]
    fn running_callbacks_survive_removal_of_their_slot() {
        let mut callbacks = DocumentCallbacks::default();
        let id = callbacks.add_session(SessionSchedule::NextTick, Box::new(|_| {}));
        let taken = callbacks.take_session(id).expect("idle");
        assert!(callbacks.take_session(id).is_none());
        assert!(callbacks.remove_session(id));
        callbacks.restore_session(id, taken);
        assert!(callbacks.sessions().is_empty());
    }
}
