//! Deal change filter.
//!
//! Classifies CRM deal events and renders a notification for each change worth surfacing:
//! creation, stage moves and value changes. Every rule is evaluated independently, so one
//! update that moves a deal and changes its value yields two notifications, stage first.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::activity::{ActivityEntry, ActivitySink, AgentKind};
use crate::domain::deal::{DealChange, DealSnapshot, StageId};
use crate::events::{Event, NotificationEvent};
use crate::stages::{resolve_stage, StageDirectory};

pub struct DealChangeFilter {
    stages: Arc<dyn StageDirectory>,
    activity: Arc<dyn ActivitySink>,
    deal_link_base_url: Option<String>,
}

impl DealChangeFilter {
    pub fn new(stages: Arc<dyn StageDirectory>, activity: Arc<dyn ActivitySink>) -> Self {
        Self { stages, activity, deal_link_base_url: None }
    }

    /// Appends `<{base}/{deal id}>` to every message for deals that carry an id.
    pub fn with_deal_link_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        self.deal_link_base_url = (!base_url.is_empty()).then_some(base_url);
        self
    }

    pub fn resolve(&self, stage_id: StageId) -> String {
        resolve_stage(self.stages.as_ref(), stage_id)
    }

    /// Lazily maps a batch to notifications, preserving input order.
    pub fn filter<'a, I>(&'a self, events: I) -> impl Iterator<Item = NotificationEvent> + 'a
    where
        I: IntoIterator<Item = &'a Event>,
        I::IntoIter: 'a,
    {
        events.into_iter().flat_map(move |event| self.process(event))
    }

    /// Processes one event. Malformed events are logged and yield nothing.
    pub fn process(&self, event: &Event) -> Vec<NotificationEvent> {
        info!(
            event_name = "filter.event_received",
            agent = AgentKind::DealFilter.as_str(),
            event_id = %event.id,
            "received event {}",
            event.id
        );
        self.activity.record(ActivityEntry::received(AgentKind::DealFilter, &event.id));

        let change = match DealChange::from_event(event) {
            Ok(change) => change,
            Err(event_error) => {
                error!(
                    event_name = "filter.event_malformed",
                    agent = AgentKind::DealFilter.as_str(),
                    event_id = %event.id,
                    error = %event_error,
                    "skipping malformed deal event"
                );
                self.activity.record(ActivityEntry::error(
                    AgentKind::DealFilter,
                    Some(&event.id),
                    event_error.to_string(),
                ));
                return Vec::new();
            }
        };

        let notifications = self.classify(&change);
        for notification in &notifications {
            debug!(
                event_name = "filter.notification_emitted",
                agent = AgentKind::DealFilter.as_str(),
                event_id = %event.id,
                message = %notification.message,
                "emitting notification"
            );
            self.activity
                .record(ActivityEntry::emitted(AgentKind::DealFilter, notification.message.clone()));
        }

        notifications
    }

    pub fn classify(&self, change: &DealChange) -> Vec<NotificationEvent> {
        match change {
            DealChange::Created { title, current } => {
                let message = format!(
                    "{} created in
                     {}.",
                    title,
                    self.resolve(current.stage_id)
                );
                vec![self.notification(current, &message)]
            }
            DealChange::Updated { title, previous, current } => {
                let mut notifications = Vec::new();

                if previous.stage_id != current.stage_id {
                    let message = format!(
                        "{} moved from
                         {} to
                         {}.",
                        title,
                        self.resolve(previous.stage_id),
                        self.resolve(current.stage_id)
                    );
                    notifications.push(self.notification(current, &message));
                }

                if previous.value != current.value {
                    let message = format!(
                        "{} changed value from
                         {} to
                         {}.",
                        title,
                        previous.display_value(),
                        current.display_value()
                    );
                    notifications.push(self.notification(current, &message));
                }

                notifications
            }
            DealChange::Unrecognized { kind } => {
                debug!(
                    event_name = "filter.event_ignored",
                    kind = kind.as_deref().unwrap_or("none"),
                    "event kind is not watched"
                );
                Vec::new()
            }
        }
    }

    fn notification(&self, deal: &DealSnapshot, message: &str) -> NotificationEvent {
        let text = match (&self.deal_link_base_url, deal.id) {
            (Some(base_url), Some(id)) => format!("{message} <{base_url}/{id}>"),
            _ => message.to_owned(),
        };
        NotificationEvent::new(normalize_whitespace(&text))
    }
}

/// Collapses every whitespace run to a single space and trims both ends.
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
