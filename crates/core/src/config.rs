use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::deal::StageId;

pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 5;
const MAX_DISPATCH_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dispatch: DispatchConfig,
    pub filter: FilterConfig,
    pub pipedrive: PipedriveConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Outbound Slack webhook settings.
///
/// `endpoint_url`, `channel` and `identity_name` are mandatory; `validate` rejects a config
/// missing any of them so a dispatcher can never be built from one.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub endpoint_url: SecretString,
    pub channel: String,
    pub identity_name: String,
    pub icon_url: Option<String>,
    pub icon_emoji: Option<String>,
    pub timeout_secs: u64,
    pub expected_receive_period_days: u32,
}

#[derive(Clone, Debug)]
pub struct FilterConfig {
    pub expected_update_period_days: u32,
    pub deal_link_base_url: Option<String>,
    pub stages: BTreeMap<StageId, String>,
}

#[derive(Clone, Debug)]
pub struct PipedriveConfig {
    pub api_token: Option<SecretString>,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub dispatch_endpoint_url: Option<String>,
    pub dispatch_channel: Option<String>,
    pub dispatch_identity_name: Option<String>,
    pub dispatch_icon_url: Option<String>,
    pub dispatch_icon_emoji: Option<String>,
    pub log_level: Option<String>,
    pub server_bind_address: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::new("", "", ""),
            filter: FilterConfig {
                expected_update_period_days: 1,
                deal_link_base_url: None,
                stages: BTreeMap::new(),
            },
            pipedrive: PipedriveConfig {
                api_token: None,
                base_url: "https://api.pipedrive.com/v1".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                webhook_secret: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl DispatchConfig {
    pub fn new(
        endpoint_url: impl Into<String>,
        channel: impl Into<String>,
        identity_name: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: secret_value(endpoint_url.into()),
            channel: channel.into(),
            identity_name: identity_name.into(),
            icon_url: None,
            icon_emoji: None,
            timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            expected_receive_period_days: 2,
        }
    }

    pub fn with_icon_url(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn with_icon_emoji(mut self, icon_emoji: impl Into<String>) -> Self {
        self.icon_emoji = Some(icon_emoji.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint_url = self.endpoint_url.expose_secret().trim();
        if endpoint_url.is_empty() {
            return Err(ConfigError::Validation(
                "dispatch.endpoint_url is required. Create an incoming webhook at https://api.slack.com/apps > Your App > Incoming Webhooks".to_string(),
            ));
        }
        if !endpoint_url.starts_with("http://") && !endpoint_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "dispatch.endpoint_url must start with http:// or https://".to_string(),
            ));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dispatch.channel is required (for example `#sales`)".to_string(),
            ));
        }
        if self.identity_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dispatch.identity_name is required; it is shown as the poster's name".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_DISPATCH_TIMEOUT_SECS {
            return Err(ConfigError::Validation(format!(
                "dispatch.timeout_secs must be in range 1..={MAX_DISPATCH_TIMEOUT_SECS}"
            )));
        }
        if self.expected_receive_period_days == 0 {
            return Err(ConfigError::Validation(
                "dispatch.expected_receive_period_days must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dealwatch.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(dispatch) = patch.dispatch {
            if let Some(endpoint_url) = dispatch.endpoint_url {
                self.dispatch.endpoint_url = secret_value(endpoint_url);
            }
            if let Some(channel) = dispatch.channel {
                self.dispatch.channel = channel;
            }
            if let Some(identity_name) = dispatch.identity_name {
                self.dispatch.identity_name = identity_name;
            }
            if let Some(icon_url) = dispatch.icon_url {
                self.dispatch.icon_url = Some(icon_url);
            }
            if let Some(icon_emoji) = dispatch.icon_emoji {
                self.dispatch.icon_emoji = Some(icon_emoji);
            }
            if let Some(timeout_secs) = dispatch.timeout_secs {
                self.dispatch.timeout_secs = timeout_secs;
            }
            if let Some(days) = dispatch.expected_receive_period_days {
                self.dispatch.expected_receive_period_days = days;
            }
        }

        if let Some(filter) = patch.filter {
            if let Some(days) = filter.expected_update_period_days {
                self.filter.expected_update_period_days = days;
            }
            if let Some(deal_link_base_url) = filter.deal_link_base_url {
                self.filter.deal_link_base_url = Some(deal_link_base_url);
            }
            if let Some(stages) = filter.stages {
                for (raw_id, name) in stages {
                    self.filter.stages.insert(parse_stage_key(&raw_id)?, name);
                }
            }
        }

        if let Some(pipedrive) = patch.pipedrive {
            if let Some(api_token) = pipedrive.api_token {
                self.pipedrive.api_token = Some(secret_value(api_token));
            }
            if let Some(base_url) = pipedrive.base_url {
                self.pipedrive.base_url = base_url;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(webhook_secret) = server.webhook_secret {
                self.server.webhook_secret = Some(secret_value(webhook_secret));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEALWATCH_DISPATCH_ENDPOINT_URL") {
            self.dispatch.endpoint_url = secret_value(value);
        }
        if let Some(value) = read_env("DEALWATCH_DISPATCH_CHANNEL") {
            self.dispatch.channel = value;
        }
        if let Some(value) = read_env("DEALWATCH_DISPATCH_IDENTITY_NAME") {
            self.dispatch.identity_name = value;
        }
        if let Some(value) = read_env("DEALWATCH_DISPATCH_ICON_URL") {
            self.dispatch.icon_url = Some(value);
        }
        if let Some(value) = read_env("DEALWATCH_DISPATCH_ICON_EMOJI") {
            self.dispatch.icon_emoji = Some(value);
        }
        if let Some(value) = read_env("DEALWATCH_DISPATCH_TIMEOUT_SECS") {
            self.dispatch.timeout_secs = parse_u64("DEALWATCH_DISPATCH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DEALWATCH_DISPATCH_EXPECTED_RECEIVE_PERIOD_DAYS") {
            self.dispatch.expected_receive_period_days =
                parse_u32("DEALWATCH_DISPATCH_EXPECTED_RECEIVE_PERIOD_DAYS", &value)?;
        }

        if let Some(value) = read_env("DEALWATCH_FILTER_EXPECTED_UPDATE_PERIOD_DAYS") {
            self.filter.expected_update_period_days =
                parse_u32("DEALWATCH_FILTER_EXPECTED_UPDATE_PERIOD_DAYS", &value)?;
        }
        if let Some(value) = read_env("DEALWATCH_FILTER_DEAL_LINK_BASE_URL") {
            self.filter.deal_link_base_url = Some(value);
        }

        if let Some(value) = read_env("DEALWATCH_PIPEDRIVE_API_TOKEN") {
            self.pipedrive.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("DEALWATCH_PIPEDRIVE_BASE_URL") {
            self.pipedrive.base_url = value;
        }

        if let Some(value) = read_env("DEALWATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DEALWATCH_SERVER_PORT") {
            self.server.port = parse_u16("DEALWATCH_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DEALWATCH_SERVER_WEBHOOK_SECRET") {
            self.server.webhook_secret = Some(secret_value(value));
        }

        let log_level =
            read_env("DEALWATCH_LOGGING_LEVEL").or_else(|| read_env("DEALWATCH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALWATCH_LOGGING_FORMAT").or_else(|| read_env("DEALWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(endpoint_url) = overrides.dispatch_endpoint_url {
            self.dispatch.endpoint_url = secret_value(endpoint_url);
        }
        if let Some(channel) = overrides.dispatch_channel {
            self.dispatch.channel = channel;
        }
        if let Some(identity_name) = overrides.dispatch_identity_name {
            self.dispatch.identity_name = identity_name;
        }
        if let Some(icon_url) = overrides.dispatch_icon_url {
            self.dispatch.icon_url = Some(icon_url);
        }
        if let Some(icon_emoji) = overrides.dispatch_icon_emoji {
            self.dispatch.icon_emoji = Some(icon_emoji);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.server_bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate()?;
        validate_filter(&self.filter)?;
        validate_pipedrive(&self.pipedrive)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dealwatch.toml"), PathBuf::from("config/dealwatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn parse_stage_key(raw: &str) -> Result<StageId, ConfigError> {
    raw.trim().parse::<i64>().map(StageId).map_err(|_| {
        ConfigError::Validation(format!("filter.stages key `{raw}` must be a numeric stage id"))
    })
}

fn validate_filter(filter: &FilterConfig) -> Result<(), ConfigError> {
    if filter.expected_update_period_days == 0 {
        return Err(ConfigError::Validation(
            "filter.expected_update_period_days must be greater than zero".to_string(),
        ));
    }

    if let Some(base_url) = &filter.deal_link_base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "filter.deal_link_base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if let Some((id, _)) = filter.stages.iter().find(|(_, name)| name.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "filter.stages entry `{id}` has an empty name"
        )));
    }

    Ok(())
}

fn validate_pipedrive(pipedrive: &PipedriveConfig) -> Result<(), ConfigError> {
    let base_url = pipedrive.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "pipedrive.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    dispatch: Option<DispatchPatch>,
    filter: Option<FilterPatch>,
    pipedrive: Option<PipedrivePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    endpoint_url: Option<String>,
    channel: Option<String>,
    identity_name: Option<String>,
    icon_url: Option<String>,
    icon_emoji: Option<String>,
    timeout_secs: Option<u64>,
    expected_receive_period_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterPatch {
    expected_update_period_days: Option<u32>,
    deal_link_base_url: Option<String>,
    stages: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PipedrivePatch {
    api_token: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, DispatchConfig, LoadOptions, LogFormat};
    use crate::domain::deal::StageId;

    const DISPATCH_VARS: [&str; 3] = [
        "DEALWATCH_DISPATCH_ENDPOINT_URL",
        "DEALWATCH_DISPATCH_CHANNEL",
        "DEALWATCH_DISPATCH_IDENTITY_NAME",
    ];

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_dispatch_env() {
        env::set_var("DEALWATCH_DISPATCH_ENDPOINT_URL", "https://hooks.example/secret-path");
        env::set_var("DEALWATCH_DISPATCH_CHANNEL", "#sales");
        env::set_var("DEALWATCH_DISPATCH_IDENTITY_NAME", "dealwatch");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DEALWATCH_HOOK", "https://hooks.example/from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealwatch.toml");
            fs::write(
                &path,
                r##"
[dispatch]
endpoint_url = "${TEST_DEALWATCH_HOOK}"
channel = "#sales"
identity_name = "dealwatch"
"##,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.dispatch.endpoint_url.expose_secret() == "https://hooks.example/from-env",
                "endpoint url should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_DEALWATCH_HOOK"]);
        result
    }

    #[test]
    fn stage_table_is_parsed_into_directory_entries() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_dispatch_env();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealwatch.toml");
            fs::write(
                &path,
                r##"
[filter]
expected_update_period_days = 3
deal_link_base_url = "https://app.pipedrive.com/deal/view"

[filter.stages]
"1" = "Qualified"
"3" = "Proposal"
"##,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.filter.expected_update_period_days == 3, "period should come from file")?;
            ensure(
                config.filter.stages.get(&StageId(3)).map(String::as_str) == Some("Proposal"),
                "stage 3 should map to Proposal",
            )?;
            ensure(config.filter.stages.len() == 2, "both stages should be loaded")
        })();

        clear_vars(&DISPATCH_VARS);
        result
    }

    #[test]
    fn non_numeric_stage_key_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_dispatch_env();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealwatch.toml");
            fs::write(&path, "[filter.stages]\nproposal = \"Proposal\"\n")
                .map_err(|err| err.to_string())?;

            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => Err("expected stage key validation failure".to_string()),
                Err(ConfigError::Validation(message)) => {
                    ensure(message.contains("filter.stages"), "error should name filter.stages")
                }
                Err(other) => Err(format!("unexpected error: {other}")),
            }
        })();

        clear_vars(&DISPATCH_VARS);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_dispatch_env();
        env::set_var("DEALWATCH_LOG_LEVEL", "warn");
        env::set_var("DEALWATCH_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&DISPATCH_VARS);
        clear_vars(&["DEALWATCH_LOG_LEVEL", "DEALWATCH_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALWATCH_DISPATCH_CHANNEL", "#from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealwatch.toml");
            fs::write(
                &path,
                r##"
[dispatch]
endpoint_url = "https://hooks.example/from-file"
channel = "#from-file"
identity_name = "file-bot"

[logging]
level = "warn"
"##,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    dispatch_identity_name: Some("override-bot".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.dispatch.identity_name == "override-bot",
                "override identity name should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.dispatch.channel == "#from-env", "env channel should win over file")?;
            ensure(
                config.dispatch.endpoint_url.expose_secret() == "https://hooks.example/from-file",
                "file endpoint should win over defaults",
            )
        })();

        clear_vars(&["DEALWATCH_DISPATCH_CHANNEL"]);
        result
    }

    #[test]
    fn validation_fails_fast_when_channel_is_missing() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALWATCH_DISPATCH_ENDPOINT_URL", "https://hooks.example/x");
        env::set_var("DEALWATCH_DISPATCH_IDENTITY_NAME", "bot");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("dispatch.channel")
            );
            ensure(has_message, "validation failure should mention dispatch.channel")
        })();

        clear_vars(&["DEALWATCH_DISPATCH_ENDPOINT_URL", "DEALWATCH_DISPATCH_IDENTITY_NAME"]);
        result
    }

    #[test]
    fn dispatch_config_requires_every_mandatory_field() {
        let cases = [
            (DispatchConfig::new("", "#sales", "bot"), "dispatch.endpoint_url"),
            (DispatchConfig::new("https://hooks.example/x", "  ", "bot"), "dispatch.channel"),
            (DispatchConfig::new("https://hooks.example/x", "#sales", ""), "dispatch.identity_name"),
            (DispatchConfig::new("ftp://hooks.example/x", "#sales", "bot"), "dispatch.endpoint_url"),
        ];

        for (config, field) in cases {
            let error = config.validate().expect_err("config should be rejected");
            assert!(error.to_string().contains(field), "`{error}` should mention {field}");
        }

        assert!(DispatchConfig::new("https://hooks.example/x", "#sales", "bot").validate().is_ok());
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_dispatch_env();
        env::set_var("DEALWATCH_PIPEDRIVE_API_TOKEN", "pd-secret-token");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("secret-path"), "debug output should not contain webhook url")?;
            ensure(
                !debug.contains("pd-secret-token"),
                "debug output should not contain pipedrive token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&DISPATCH_VARS);
        clear_vars(&["DEALWATCH_PIPEDRIVE_API_TOKEN"]);
        result
    }
}
