pub mod activity;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod filter;
pub mod stages;

pub use activity::{
    ActivityEntry, ActivityKind, ActivitySink, AgentActivity, AgentKind, InMemoryActivityLog,
};
pub use domain::deal::{DealChange, DealId, DealSnapshot, StageId};
pub use errors::{EventError, InterfaceError};
pub use events::{Event, EventId, NotificationEvent, Payload};
pub use filter::{normalize_whitespace, DealChangeFilter};
pub use stages::{resolve_stage, StageDirectory, StaticStageDirectory, UNKNOWN_STAGE};
