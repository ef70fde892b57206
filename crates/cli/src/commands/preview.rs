use std::fs;
use std::path::Path;
use std::sync::Arc;

use dealwatch_core::config::{AppConfig, LoadOptions};
use dealwatch_core::{AgentKind, DealChangeFilter, Event, InMemoryActivityLog, StaticStageDirectory};
use dealwatch_slack::WebhookMessage;
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Debug, Serialize)]
struct PreviewNotification {
    source_event_id: String,
    text: String,
    body: WebhookMessage,
}

#[derive(Debug, Serialize)]
struct PreviewReport {
    command: &'static str,
    status: &'static str,
    received: usize,
    malformed: u64,
    notifications: Vec<PreviewNotification>,
}

pub fn run(path: &Path) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("preview", "config_validation", error.to_string(), 2)
        }
    };

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "preview",
                "input_read",
                format!("failed to read `{}`: {error}", path.display()),
                3,
            )
        }
    };

    let events: Vec<Event> = match serde_json::from_str(&raw) {
        Ok(events) => events,
        Err(error) => {
            return CommandResult::failure(
                "preview",
                "input_parse",
                format!("expected a JSON array of {{\"id\", \"payload\"}} events: {error}"),
                4,
            )
        }
    };

    let report = preview(&config, &events);
    let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"preview\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    });

    CommandResult { exit_code: 0, output }
}

/// Runs the batch through the filter against the static stage table only.
fn preview(config: &AppConfig, events: &[Event]) -> PreviewReport {
    let activity = InMemoryActivityLog::default();
    let stages = StaticStageDirectory::new(config.filter.stages.clone());
    let mut filter = DealChangeFilter::new(Arc::new(stages), Arc::new(activity.clone()));
    if let Some(base_url) = &config.filter.deal_link_base_url {
        filter = filter.with_deal_link_base_url(base_url.clone());
    }

    let notifications = events
        .iter()
        .flat_map(|event| {
            filter.process(event).into_iter().map(move |notification| (event, notification))
        })
        .map(|(event, notification)| {
            let outbound = notification.into_event();
            let body = WebhookMessage::for_payload(&outbound.payload, &config.dispatch);
            PreviewNotification {
                source_event_id: event.id.to_string(),
                text: body.text.clone(),
                body,
            }
        })
        .collect();

    PreviewReport {
        command: "preview",
        status: "ok",
        received: events.len(),
        malformed: activity.agent(AgentKind::DealFilter).error_count,
        notifications,
    }
}
