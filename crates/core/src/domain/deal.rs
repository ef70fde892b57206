use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EventError;
use crate::events::Event;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub i64);

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The subset of a CRM deal record the filter watches. Unknown keys are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DealSnapshot {
    #[serde(default)]
    pub id: Option<DealId>,
    #[serde(default)]
    pub title: Option<String>,
    pub stage_id: StageId,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub formatted_value: Option<String>,
}

impl DealSnapshot {
    /// Display form of the deal value: the CRM-formatted string when present, else the raw
    /// number, else `no value`.
    pub fn display_value(&self) -> String {
        if let Some(formatted) =
            self.formatted_value.as_deref().map(str::trim).filter(|value| !value.is_empty())
        {
            return formatted.to_owned();
        }

        match self.value {
            Some(value) => value.normalize().to_string(),
            None => "no value".to_owned(),
        }
    }
}

/// Closed classification of an incoming CRM event. `title` is resolved once at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum DealChange {
    Created { title: String, current: DealSnapshot },
    Updated { title: String, previous: DealSnapshot, current: DealSnapshot },
    Unrecognized { kind: Option<String> },
}

const DISCRIMINATOR_KEYS: [&str; 2] = ["event", "kind"];

impl DealChange {
    /// Validates the payload shape for the discriminated kind.
    ///
    /// Accepts Pipedrive's `event: "added.deal" | "updated.deal"` as well as the
    /// `kind: "deal added" | "deal updated"` form. Anything else is `Unrecognized`.
    /// The title comes from `current.title`, else from a top-level `title`.
    pub fn from_event(event: &Event) -> Result<Self, EventError> {
        let kind = DISCRIMINATOR_KEYS
            .iter()
            .find_map(|key| event.payload.get(*key).and_then(Value::as_str))
            .map(str::trim);

        match kind {
            Some("added.deal") | Some("deal added") => {
                let current = snapshot(event, "current")?;
                Ok(Self::Created { title: deal_title(event, &current)?, current })
            }
            Some("updated.deal") | Some("deal updated") => {
                let previous = snapshot(event, "previous")?;
                let current = snapshot(event, "current")?;
                Ok(Self::Updated { title: deal_title(event, &current)?, previous, current })
            }
            other => Ok(Self::Unrecognized { kind: other.map(str::to_owned) }),
        }
    }
}

fn snapshot(event: &Event, field: &'static str) -> Result<DealSnapshot, EventError> {
    let raw = event
        .payload
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| EventError::MissingField { event_id: event.id.clone(), field })?;

    DealSnapshot::deserialize(raw).map_err(|error| EventError::InvalidField {
        event_id: event.id.clone(),
        field,
        reason: error.to_string(),
    })
}

fn deal_title(event: &Event, current: &DealSnapshot) -> Result<String, EventError> {
    let present = |title: &&str| !title.trim().is_empty();
    current
        .title
        .as_deref()
        .filter(present)
        .or_else(|| event.payload.get("title").and_then(Value::as_str).filter(present))
        .map(str::to_owned)
        .ok_or_else(|| EventError::MissingField { event_id: event.id.clone(), field: "title" })
}
