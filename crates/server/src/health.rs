use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use dealwatch_core::config::AppConfig;
use dealwatch_core::{AgentActivity, AgentKind, InMemoryActivityLog};
use serde::Serialize;

/// Errors logged within this distance before the last receipt count as recent.
const RECENT_ERROR_GRACE_MINUTES: i64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessWindows {
    pub filter_update_period: Duration,
    pub notifier_receive_period: Duration,
}

impl LivenessWindows {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            filter_update_period: Duration::days(i64::from(
                config.filter.expected_update_period_days,
            )),
            notifier_receive_period: Duration::days(i64::from(
                config.dispatch.expected_receive_period_days,
            )),
        }
    }
}

#[derive(Clone)]
pub struct HealthState {
    activity: InMemoryActivityLog,
    windows: LivenessWindows,
}

impl HealthState {
    pub fn new(activity: InMemoryActivityLog, windows: LivenessWindows) -> Self {
        Self { activity, windows }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentHealth {
    pub status: &'static str,
    pub working: bool,
    pub detail: String,
    pub activity: AgentActivity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub deal_filter: AgentHealth,
    pub slack_notifier: AgentHealth,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let now = Utc::now();

    let filter_activity = state.activity.agent(AgentKind::DealFilter);
    let deal_filter = agent_check(
        &filter_activity,
        filter_activity.last_emitted_at,
        "notification emitted",
        state.windows.filter_update_period,
        now,
    );

    let notifier_activity = state.activity.agent(AgentKind::SlackNotifier);
    let slack_notifier = agent_check(
        &notifier_activity,
        notifier_activity.last_received_at,
        "event received",
        state.windows.notifier_receive_period,
        now,
    );

    let working = deal_filter.working && slack_notifier.working;
    let payload = HealthResponse {
        status: if working { "working" } else { "degraded" },
        deal_filter,
        slack_notifier,
        checked_at: now.to_rfc3339(),
    };

    let status_code = if working { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn agent_check(
    activity: &AgentActivity,
    last_signal: Option<DateTime<Utc>>,
    signal: &str,
    window: Duration,
    now: DateTime<Utc>,
) -> AgentHealth {
    let (status, detail) = match last_signal {
        None => ("degraded", format!("no {signal} yet")),
        Some(at) if at < now - window => {
            ("degraded", format!("last {signal} at {} is outside the window", at.to_rfc3339()))
        }
        Some(_) if has_recent_errors(activity) => {
            ("degraded", "recent error-log entries recorded".to_string())
        }
        Some(at) => ("working", format!("last {signal} at {}", at.to_rfc3339())),
    };

    AgentHealth { status, working: status == "working", detail, activity: *activity }
}

fn has_recent_errors(activity: &AgentActivity) -> bool {
    match (activity.last_error_at, activity.last_received_at) {
        (Some(error_at), Some(received_at)) => {
            error_at >= received_at - Duration::minutes(RECENT_ERROR_GRACE_MINUTES)
        }
        (Some(_), None) => true,
        (None, _) => false,
    }
}
