use std::sync::Arc;

use axum::Router;
use dealwatch_core::config::{AppConfig, ConfigError, LoadOptions};
use dealwatch_core::{DealChangeFilter, InMemoryActivityLog};
use dealwatch_slack::{DispatchError, NotificationDispatcher};
use thiserror::Error;
use tracing::info;

use crate::health::{self, HealthState, LivenessWindows};
use crate::ingest::{self, IngestState};
use crate::pipedrive;

pub struct Application {
    pub config: AppConfig,
    pub activity: InMemoryActivityLog,
    pub filter: Arc<DealChangeFilter>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl Application {
    pub fn router(&self) -> Router {
        let ingest = IngestState::new(
            self.filter.clone(),
            self.dispatcher.clone(),
            self.config.server.webhook_secret.clone(),
        );
        let health =
            HealthState::new(self.activity.clone(), LivenessWindows::from_config(&self.config));

        ingest::router(ingest).merge(health::router(health))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatcher(#[from] DispatchError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let activity = InMemoryActivityLog::default();
    let dispatcher = NotificationDispatcher::with_http_transport(
        config.dispatch.clone(),
        Arc::new(activity.clone()),
    )?;

    let stages = pipedrive::load_stage_directory(&config).await;
    let mut filter = DealChangeFilter::new(Arc::new(stages), Arc::new(activity.clone()));
    if let Some(base_url) = &config.filter.deal_link_base_url {
        filter = filter.with_deal_link_base_url(base_url.clone());
    }

    info!(
        event_name = "system.bootstrap.ready",
        channel = %config.dispatch.channel,
        identity_name = %config.dispatch.identity_name,
        "dispatcher and deal filter initialized"
    );

    Ok(Application {
        config,
        activity,
        filter: Arc::new(filter),
        dispatcher: Arc::new(dispatcher),
    })
}
