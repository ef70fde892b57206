use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form event payload as delivered by the host.
pub type Payload = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One entry of a host batch. Read-only to every processor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(default)]
    pub payload: Payload,
}

impl Event {
    pub fn new(id: impl Into<EventId>, payload: Payload) -> Self {
        Self { id: id.into(), payload }
    }

    /// Wraps a JSON value as an event. Non-object values are rejected.
    pub fn from_value(id: EventId, value: Value) -> Option<Self> {
        match value {
            Value::Object(payload) => Some(Self { id, payload }),
            _ => None,
        }
    }
}

/// Fully rendered notification produced by the deal filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub message: String,
}

impl NotificationEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Converts the notification into an outbound event with a fresh id and a
    /// `{ "message": ... }` payload.
    pub fn into_event(self) -> Event {
        let mut payload = Payload::new();
        payload.insert("message".to_owned(), Value::String(self.message));
        Event { id: EventId::generate(), payload }
    }
}
