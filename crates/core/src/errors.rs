use thiserror::Error;

use crate::events::EventId;

/// Per-event data error. Always local to the offending event; never aborts a batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event {event_id}: payload is missing `{field}`")]
    MissingField { event_id: EventId, field: &'static str },
    #[error("event {event_id}: `{field}` is malformed: {reason}")]
    InvalidField { event_id: EventId, field: &'static str, reason: String },
}

impl EventError {
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::MissingField { event_id, .. } | Self::InvalidField { event_id, .. } => event_id,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn unauthorized(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "The request is missing valid webhook credentials.",
        }
    }
}

impl From<EventError> for InterfaceError {
    fn from(value: EventError) -> Self {
        let correlation_id = value.event_id().to_string();
        Self::BadRequest { message: value.to_string(), correlation_id }
    }
}
