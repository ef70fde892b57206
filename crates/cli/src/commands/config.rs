use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dealwatch_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct SourceContext {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl SourceContext {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { doc, path }
    }

    fn line(&self, key_path: &str, value: &str, env_keys: &[&str]) -> String {
        render_line(key_path, value, self.field_source(key_path, env_keys))
    }

    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, &SourceContext::detect())
}

fn render(config: &AppConfig, sources: &SourceContext) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let dispatch = &config.dispatch;
    lines.push(sources.line(
        "dispatch.endpoint_url",
        &redact_url(dispatch.endpoint_url.expose_secret()),
        &["DEALWATCH_DISPATCH_ENDPOINT_URL"],
    ));
    lines.push(sources.line(
        "dispatch.channel",
        &dispatch.channel,
        &["DEALWATCH_DISPATCH_CHANNEL"],
    ));
    lines.push(sources.line(
        "dispatch.identity_name",
        &dispatch.identity_name,
        &["DEALWATCH_DISPATCH_IDENTITY_NAME"],
    ));
    lines.push(sources.line(
        "dispatch.icon_url",
        dispatch.icon_url.as_deref().unwrap_or("<unset>"),
        &["DEALWATCH_DISPATCH_ICON_URL"],
    ));
    lines.push(sources.line(
        "dispatch.icon_emoji",
        dispatch.icon_emoji.as_deref().unwrap_or("<unset>"),
        &["DEALWATCH_DISPATCH_ICON_EMOJI"],
    ));
    lines.push(sources.line(
        "dispatch.timeout_secs",
        &dispatch.timeout_secs.to_string(),
        &["DEALWATCH_DISPATCH_TIMEOUT_SECS"],
    ));
    lines.push(sources.line(
        "dispatch.expected_receive_period_days",
        &dispatch.expected_receive_period_days.to_string(),
        &["DEALWATCH_DISPATCH_EXPECTED_RECEIVE_PERIOD_DAYS"],
    ));

    lines.push(sources.line(
        "filter.expected_update_period_days",
        &config.filter.expected_update_period_days.to_string(),
        &["DEALWATCH_FILTER_EXPECTED_UPDATE_PERIOD_DAYS"],
    ));
    lines.push(sources.line(
        "filter.deal_link_base_url",
        config.filter.deal_link_base_url.as_deref().unwrap_or("<unset>"),
        &["DEALWATCH_FILTER_DEAL_LINK_BASE_URL"],
    ));
    lines.push(sources.line(
        "filter.stages",
        &format!("{} static entries", config.filter.stages.len()),
        &[],
    ));

    lines.push(sources.line(
        "pipedrive.api_token",
        redact_optional(config.pipedrive.api_token.as_ref()),
        &["DEALWATCH_PIPEDRIVE_API_TOKEN"],
    ));
    lines.push(sources.line(
        "pipedrive.base_url",
        &config.pipedrive.base_url,
        &["DEALWATCH_PIPEDRIVE_BASE_URL"],
    ));

    lines.push(sources.line(
        "server.bind_address",
        &config.server.bind_address,
        &["DEALWATCH_SERVER_BIND_ADDRESS"],
    ));
    lines.push(sources.line(
        "server.port",
        &config.server.port.to_string(),
        &["DEALWATCH_SERVER_PORT"],
    ));
    lines.push(sources.line(
        "server.webhook_secret",
        redact_optional(config.server.webhook_secret.as_ref()),
        &["DEALWATCH_SERVER_WEBHOOK_SECRET"],
    ));

    lines.push(sources.line(
        "logging.level",
        &config.logging.level,
        &["DEALWATCH_LOGGING_LEVEL", "DEALWATCH_LOG_LEVEL"],
    ));
    lines.push(sources.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["DEALWATCH_LOGGING_FORMAT", "DEALWATCH_LOG_FORMAT"],
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("dealwatch.toml"), PathBuf::from("config/dealwatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps scheme and host; webhook paths carry the credential.
fn redact_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or_default();
            format!("{scheme}://{host}/***")
        }
        None => "<redacted>".to_string(),
    }
}

fn redact_optional(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}
