//! Pipedrive stage directory loading.
//!
//! Stage names are fetched once at startup and merged over the `[filter.stages]` table.
//! A failed fetch is not fatal: the static table is used alone.

use std::time::Duration;

use dealwatch_core::config::AppConfig;
use dealwatch_core::{StageId, StaticStageDirectory};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

const STAGE_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum StageLoadError {
    #[error("stage request failed: {0}")]
    Request(String),
    #[error("stage endpoint returned {0}")]
    Status(u16),
    #[error("failed to decode stage response: {0}")]
    Decode(String),
    #[error("stage endpoint reported an unsuccessful response")]
    Unsuccessful,
}

#[derive(Debug, Deserialize)]
struct StagesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<StageRecord>>,
}

#[derive(Debug, Deserialize)]
struct StageRecord {
    id: i64,
    #[serde(default)]
    name: Option<String>,
}

pub async fn fetch_stages(
    client: &Client,
    base_url: &str,
    api_token: &SecretString,
) -> Result<StaticStageDirectory, StageLoadError> {
    let url = format!("{}/stages", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .query(&[("api_token", api_token.expose_secret())])
        .send()
        .await
        .map_err(|error| StageLoadError::Request(error.without_url().to_string()))?;

    if !response.status().is_success() {
        return Err(StageLoadError::Status(response.status().as_u16()));
    }

    let payload: StagesResponse = response
        .json()
        .await
        .map_err(|error| StageLoadError::Decode(error.without_url().to_string()))?;
    if !payload.success {
        return Err(StageLoadError::Unsuccessful);
    }

    Ok(payload
        .data
        .unwrap_or_default()
        .into_iter()
        .filter_map(|stage| {
            let name = stage.name?.trim().to_owned();
            (!name.is_empty()).then_some((StageId(stage.id), name))
        })
        .collect())
}

/// Builds the directory the deal filter resolves names from.
pub async fn load_stage_directory(config: &AppConfig) -> StaticStageDirectory {
    let mut directory = StaticStageDirectory::new(config.filter.stages.clone());

    let Some(api_token) = &config.pipedrive.api_token else {
        info!(
            event_name = "system.bootstrap.stages_static",
            stage_count = directory.len(),
            "no pipedrive api token configured; using static stage table"
        );
        return directory;
    };

    let fetched = match Client::builder()
        .timeout(Duration::from_secs(STAGE_FETCH_TIMEOUT_SECS))
        .build()
        .map_err(|error| StageLoadError::Request(error.to_string()))
    {
        Ok(client) => fetch_stages(&client, &config.pipedrive.base_url, api_token).await,
        Err(error) => Err(error),
    };

    match fetched {
        Ok(stages) => {
            info!(
                event_name = "system.bootstrap.stages_fetched",
                fetched = stages.len(),
                "pipedrive stages loaded"
            );
            directory.merge(stages);
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.stages_fetch_failed",
                error = %error,
                stage_count = directory.len(),
                "could not load pipedrive stages; using static stage table"
            );
        }
    }

    directory
}
