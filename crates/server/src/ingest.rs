//! Event ingress endpoints.
//!
//! - CRM webhook ingest: one Pipedrive webhook body becomes a one-event batch that runs
//!   through the deal filter, and every notification it emits is dispatched to Slack
//! - direct notification ingest: any JSON object is dispatched as-is

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use dealwatch_core::{DealChangeFilter, Event, EventId, InterfaceError, NotificationEvent};
use dealwatch_slack::NotificationDispatcher;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const WEBHOOK_SECRET_HEADER: &str = "x-dealwatch-webhook-secret";

#[derive(Clone)]
pub struct IngestState {
    filter: Arc<DealChangeFilter>,
    dispatcher: Arc<NotificationDispatcher>,
    webhook_secret: Option<SecretString>,
}

impl IngestState {
    pub fn new(
        filter: Arc<DealChangeFilter>,
        dispatcher: Arc<NotificationDispatcher>,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self { filter, dispatcher, webhook_secret }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub event_id: String,
    pub received: usize,
    pub emitted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestError {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type IngestResult = Result<Json<IngestResponse>, (StatusCode, Json<IngestError>)>;

pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/api/v1/pipedrive/webhook", post(pipedrive_webhook))
        .route("/api/v1/notifications", post(notification_ingest))
        .with_state(state)
}

async fn pipedrive_webhook(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> IngestResult {
    let event_id = EventId::generate();
    webhook_guard(&headers, &state, &event_id).map_err(interface_error)?;
    let event = object_event(event_id, body).map_err(interface_error)?;

    let notifications: Vec<Event> =
        state.filter.filter([&event]).map(NotificationEvent::into_event).collect();
    let report = state.dispatcher.dispatch_batch(&notifications).await;

    info!(
        event_name = "ingress.pipedrive.processed",
        event_id = %event.id,
        emitted = notifications.len(),
        delivered = report.delivered,
        failed = report.failed,
        "pipedrive webhook processed"
    );

    Ok(Json(IngestResponse {
        event_id: event.id.to_string(),
        received: 1,
        emitted: notifications.len(),
        delivered: report.delivered,
        failed: report.failed,
    }))
}

async fn notification_ingest(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> IngestResult {
    let event_id = EventId::generate();
    webhook_guard(&headers, &state, &event_id).map_err(interface_error)?;
    let event = object_event(event_id, body).map_err(interface_error)?;

    let report = state.dispatcher.dispatch_batch([&event]).await;

    // Forwarded as-is; nothing passes through the filter on this route.
    Ok(Json(IngestResponse {
        event_id: event.id.to_string(),
        received: 1,
        emitted: 0,
        delivered: report.delivered,
        failed: report.failed,
    }))
}

fn webhook_guard(
    headers: &HeaderMap,
    state: &IngestState,
    event_id: &EventId,
) -> Result<(), InterfaceError> {
    let Some(secret) = &state.webhook_secret else {
        return Ok(());
    };

    let provided = headers.get(WEBHOOK_SECRET_HEADER).and_then(|value| value.to_str().ok());
    match provided {
        Some(value) if value == secret.expose_secret() => Ok(()),
        Some(_) => {
            warn!(event_id = %event_id, "rejected webhook with invalid secret");
            Err(InterfaceError::unauthorized("invalid webhook secret", event_id.to_string()))
        }
        None => {
            warn!(event_id = %event_id, "rejected webhook without secret header");
            Err(InterfaceError::unauthorized("missing webhook secret", event_id.to_string()))
        }
    }
}

fn object_event(event_id: EventId, body: Value) -> Result<Event, InterfaceError> {
    let correlation_id = event_id.to_string();
    Event::from_value(event_id, body).ok_or_else(|| {
        InterfaceError::bad_request("event payload must be a JSON object", correlation_id)
    })
}

fn interface_error(error: InterfaceError) -> (StatusCode, Json<IngestError>) {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
    };
    (
        status,
        Json(IngestError {
            error: error.to_string(),
            message: error.user_message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}
