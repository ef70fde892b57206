use std::sync::Arc;
use std::time::Duration;

use dealwatch_core::activity::{ActivityEntry, ActivitySink, AgentKind};
use dealwatch_core::config::{ConfigError, DispatchConfig};
use dealwatch_core::events::Event;
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::message::WebhookMessage;
use crate::transport::{ReqwestWebhookTransport, TransportError, WebhookTransport};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends one webhook message per event, strictly in order.
///
/// Calls are best effort: a failed post is logged against its event and the batch moves on.
/// Nothing is retried, batched or coalesced.
pub struct NotificationDispatcher {
    config: DispatchConfig,
    transport: Arc<dyn WebhookTransport>,
    activity: Arc<dyn ActivitySink>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").field("config", &self.config).finish()
    }
}

impl NotificationDispatcher {
    pub fn new(
        config: DispatchConfig,
        transport: Arc<dyn WebhookTransport>,
        activity: Arc<dyn ActivitySink>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        Ok(Self { config, transport, activity })
    }

    /// Builds a dispatcher on the reqwest transport using `timeout_secs` from the config.
    pub fn with_http_transport(
        config: DispatchConfig,
        activity: Arc<dyn ActivitySink>,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        let transport = ReqwestWebhookTransport::new(Duration::from_secs(config.timeout_secs))?;
        Self::new(config, Arc::new(transport), activity)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn dispatch_batch<'a, I>(&self, events: I) -> DispatchReport
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut report = DispatchReport::default();
        for event in events {
            match self.dispatch(event).await {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Posts a single event. The error is returned for reporting only; it has already been
    /// logged and recorded.
    pub async fn dispatch(&self, event: &Event) -> Result<(), TransportError> {
        self.activity.record(ActivityEntry::received(AgentKind::SlackNotifier, &event.id));

        let message = WebhookMessage::for_payload(&event.payload, &self.config);
        info!(
            event_name = "dispatch.slack.sending",
            agent = AgentKind::SlackNotifier.as_str(),
            event_id = %event.id,
            body = %message.to_json(),
            "sending slack message for event {}",
            event.id
        );

        let result = self.transport.post(self.config.endpoint_url.expose_secret(), &message).await;
        match &result {
            Ok(()) => {
                info!(
                    event_name = "dispatch.slack.delivered",
                    agent = AgentKind::SlackNotifier.as_str(),
                    event_id = %event.id,
                    channel = %self.config.channel,
                    "slack message delivered"
                );
            }
            Err(transport_error) => {
                error!(
                    event_name = "dispatch.slack.failed",
                    agent = AgentKind::SlackNotifier.as_str(),
                    event_id = %event.id,
                    error = %transport_error,
                    "slack message delivery failed; continuing with next event"
                );
                self.activity.record(ActivityEntry::error(
                    AgentKind::SlackNotifier,
                    Some(&event.id),
                    transport_error.to_string(),
                ));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use dealwatch_core::activity::{AgentKind, InMemoryActivityLog};
    use dealwatch_core::config::DispatchConfig;
    use dealwatch_core::events::{Event, EventId};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::{DispatchError, DispatchReport, NotificationDispatcher};
    use crate::message::WebhookMessage;
    use crate::transport::{TransportError, WebhookTransport};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        results: VecDeque<Result<(), TransportError>>,
        posts: Vec<(String, WebhookMessage)>,
    }

    impl ScriptedTransport {
        fn with_results(results: Vec<Result<(), TransportError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState { results: results.into(), posts: Vec::new() }),
            }
        }

        async fn posts(&self) -> Vec<(String, WebhookMessage)> {
            self.state.lock().await.posts.clone()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn post(
            &self,
            endpoint_url: &str,
            message: &WebhookMessage,
        ) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.posts.push((endpoint_url.to_owned(), message.clone()));
            state.results.pop_front().unwrap_or(Ok(()))
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig::new("https://hooks.example/x", "#sales", "bot")
    }

    fn event(id: &str, payload: Value) -> Event {
        Event::from_value(EventId::from(id), payload).expect("object payload")
    }

    #[tokio::test]
    async fn posts_rendered_message_with_channel_identity() {
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = NotificationDispatcher::new(
            config(),
            transport.clone(),
            Arc::new(InMemoryActivityLog::default()),
        )
        .expect("valid config");

        let report = dispatcher
            .dispatch_batch(&[event("evt-1", json!({"message": "Acme Co created in Proposal."}))])
            .await;

        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
        let posts = transport.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "https://hooks.example/x");
        assert_eq!(
            posts[0].1.to_json(),
            r##"{"text":"Acme Co created in Proposal.","channel":"#sales","username":"bot"}"##
        );
    }

    #[tokio::test]
    async fn failed_post_does_not_block_following_events() {
        let transport = Arc::new(ScriptedTransport::with_results(vec![
            Err(TransportError::Status { status: 500, body: "boom".to_owned() }),
            Ok(()),
            Err(TransportError::Request("connection refused".to_owned())),
        ]));
        let log = InMemoryActivityLog::default();
        let dispatcher =
            NotificationDispatcher::new(config(), transport.clone(), Arc::new(log.clone()))
                .expect("valid config");

        let batch = [
            event("evt-1", json!({"message": "one"})),
            event("evt-2", json!({"message": "two"})),
            event("evt-3", json!({"message": "three"})),
        ];
        let report = dispatcher.dispatch_batch(&batch).await;

        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
        let texts: Vec<String> =
            transport.posts().await.into_iter().map(|(_, message)| message.text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);

        let activity = log.agent(AgentKind::SlackNotifier);
        assert_eq!(activity.received_count, 3);
        assert_eq!(activity.error_count, 2);
        let failed_ids: Vec<Option<EventId>> = log
            .errors(AgentKind::SlackNotifier)
            .into_iter()
            .map(|entry| entry.event_id)
            .collect();
        assert_eq!(failed_ids, vec![Some(EventId::from("evt-1")), Some(EventId::from("evt-3"))]);
    }

    #[tokio::test]
    async fn identical_events_are_not_coalesced() {
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = NotificationDispatcher::new(
            config(),
            transport.clone(),
            Arc::new(InMemoryActivityLog::default()),
        )
        .expect("valid config");

        let batch: Vec<Event> =
            (0..5).map(|index| event(&format!("evt-{index}"), json!({"message": "same"}))).collect();
        let report = dispatcher.dispatch_batch(&batch).await;

        assert_eq!(report.delivered, 5);
        assert_eq!(transport.posts().await.len(), 5);
    }

    #[tokio::test]
    async fn payload_without_message_is_sent_as_json_text() {
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = NotificationDispatcher::new(
            config(),
            transport.clone(),
            Arc::new(InMemoryActivityLog::default()),
        )
        .expect("valid config");

        dispatcher.dispatch(&event("evt-1", json!({"status": "won"}))).await.expect("delivered");

        let posts = transport.posts().await;
        assert_eq!(posts[0].1.text, r#"{"status":"won"}"#);
    }

    #[test]
    fn misconfigured_dispatcher_cannot_be_built() {
        let result = NotificationDispatcher::new(
            DispatchConfig::new("https://hooks.example/x", "#sales", ""),
            Arc::new(ScriptedTransport::default()),
            Arc::new(InMemoryActivityLog::default()),
        );

        assert!(matches!(result, Err(DispatchError::Config(_))));
    }
}
