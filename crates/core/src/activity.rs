//! Per-agent activity records: event receipts, emissions and error-log entries.
//!
//! The host reads these to decide whether an agent is healthy; the window arithmetic
//! itself lives with the host.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::EventId;

const DEFAULT_CAPACITY: usize = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    DealFilter,
    SlackNotifier,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DealFilter => "deal_filter",
            Self::SlackNotifier => "slack_notifier",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Received,
    Emitted,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub entry_id: String,
    pub agent: AgentKind,
    pub kind: ActivityKind,
    pub event_id: Option<EventId>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEntry {
    fn new(
        agent: AgentKind,
        kind: ActivityKind,
        event_id: Option<EventId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            agent,
            kind,
            event_id,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn received(agent: AgentKind, event_id: &EventId) -> Self {
        Self::new(
            agent,
            ActivityKind::Received,
            Some(event_id.clone()),
            format!("received event {event_id}"),
        )
    }

    pub fn emitted(agent: AgentKind, message: impl Into<String>) -> Self {
        Self::new(agent, ActivityKind::Emitted, None, message)
    }

    pub fn error(agent: AgentKind, event_id: Option<&EventId>, message: impl Into<String>) -> Self {
        Self::new(agent, ActivityKind::Error, event_id.cloned(), message)
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

pub trait ActivitySink: Send + Sync {
    fn record(&self, entry: ActivityEntry);
}

/// Latest timestamps and counters for one agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AgentActivity {
    pub last_received_at: Option<DateTime<Utc>>,
    pub last_emitted_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub received_count: u64,
    pub emitted_count: u64,
    pub error_count: u64,
}

impl AgentActivity {
    fn apply(&mut self, entry: &ActivityEntry) {
        let at = Some(entry.occurred_at);
        match entry.kind {
            ActivityKind::Received => {
                self.last_received_at = self.last_received_at.max(at);
                self.received_count += 1;
            }
            ActivityKind::Emitted => {
                self.last_emitted_at = self.last_emitted_at.max(at);
                self.emitted_count += 1;
            }
            ActivityKind::Error => {
                self.last_error_at = self.last_error_at.max(at);
                self.error_count += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
struct ActivityState {
    entries: VecDeque<ActivityEntry>,
    agents: HashMap<AgentKind, AgentActivity>,
}

/// Shared, bounded activity log. Timestamps and counters survive entry eviction.
#[derive(Clone, Debug)]
pub struct InMemoryActivityLog {
    state: Arc<Mutex<ActivityState>>,
    capacity: usize,
}

impl Default for InMemoryActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl InMemoryActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { state: Arc::default(), capacity: capacity.max(1) }
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.with_state(|state| state.entries.iter().cloned().collect())
    }

    pub fn errors(&self, agent: AgentKind) -> Vec<ActivityEntry> {
        self.with_state(|state| {
            state
                .entries
                .iter()
                .filter(|entry| entry.agent == agent && entry.kind == ActivityKind::Error)
                .cloned()
                .collect()
        })
    }

    pub fn agent(&self, agent: AgentKind) -> AgentActivity {
        self.with_state(|state| state.agents.get(&agent).copied().unwrap_or_default())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ActivityState) -> R) -> R {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl ActivitySink for InMemoryActivityLog {
    fn record(&self, entry: ActivityEntry) {
        let capacity = self.capacity;
        self.with_state(|state| {
            state.agents.entry(entry.agent).or_default().apply(&entry);
            state.entries.push_back(entry);
            while state.entries.len() > capacity {
                state.entries.pop_front();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{ActivityEntry, ActivityKind, ActivitySink, AgentKind, InMemoryActivityLog};
    use crate::events::EventId;

    #[test]
    fn records_receipts_and_errors_per_agent() {
        let log = InMemoryActivityLog::default();
        let event_id = EventId::from("evt-1");

        log.record(ActivityEntry::received(AgentKind::DealFilter, &event_id));
        log.record(ActivityEntry::error(
            AgentKind::DealFilter,
            Some(&event_id),
            "payload is missing `current`",
        ));
        log.record(ActivityEntry::received(AgentKind::SlackNotifier, &EventId::from("evt-2")));

        let filter = log.agent(AgentKind::DealFilter);
        assert_eq!(filter.received_count, 1);
        assert_eq!(filter.error_count, 1);
        assert!(filter.last_error_at.is_some());
        assert!(filter.last_emitted_at.is_none());

        let errors = log.errors(AgentKind::DealFilter);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event_id.as_ref(), Some(&event_id));
        assert!(log.errors(AgentKind::SlackNotifier).is_empty());
    }

    #[test]
    fn eviction_keeps_latest_timestamps() {
        let log = InMemoryActivityLog::with_capacity(2);
        let earlier = Utc::now() - Duration::hours(3);

        log.record(
            ActivityEntry::emitted(AgentKind::DealFilter, "first").with_occurred_at(earlier),
        );
        log.record(ActivityEntry::emitted(AgentKind::DealFilter, "second"));
        log.record(ActivityEntry::emitted(AgentKind::DealFilter, "third"));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.kind == ActivityKind::Emitted));
        assert_eq!(entries[0].message, "second");

        let activity = log.agent(AgentKind::DealFilter);
        assert_eq!(activity.emitted_count, 3);
        assert!(activity.last_emitted_at > Some(earlier));
    }

    #[test]
    fn unknown_agent_has_empty_activity() {
        let log = InMemoryActivityLog::default();
        assert_eq!(log.agent(AgentKind::SlackNotifier), Default::default());
    }
}
