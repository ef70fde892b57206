use dealwatch_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()));
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report<E: std::fmt::Display>(loaded: Result<AppConfig, E>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_dispatch_identity(&config));
            checks.push(check_stage_directory(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["dispatch_identity", "stage_directory"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_dispatch_identity(config: &AppConfig) -> DoctorCheck {
    let dispatch = &config.dispatch;
    let icon = match (&dispatch.icon_emoji, &dispatch.icon_url) {
        (Some(emoji), _) if !emoji.trim().is_empty() => format!("icon emoji {emoji}"),
        (_, Some(url)) if !url.trim().is_empty() => format!("icon url {url}"),
        _ => "default icon".to_string(),
    };

    DoctorCheck {
        name: "dispatch_identity",
        status: CheckStatus::Pass,
        details: format!(
            "posting to {} as `{}` with {icon}",
            dispatch.channel, dispatch.identity_name
        ),
    }
}

fn check_stage_directory(config: &AppConfig) -> DoctorCheck {
    let static_count = config.filter.stages.len();
    let fetch_enabled = config.pipedrive.api_token.is_some();

    match (static_count, fetch_enabled) {
        (0, false) => DoctorCheck {
            name: "stage_directory",
            status: CheckStatus::Fail,
            details: "no [filter.stages] entries and no pipedrive.api_token; every stage would render as `Unknown stage`".to_string(),
        },
        (count, true) => DoctorCheck {
            name: "stage_directory",
            status: CheckStatus::Pass,
            details: format!(
                "{count} static entries; stages fetched from {} at startup",
                config.pipedrive.base_url
            ),
        },
        (count, false) => DoctorCheck {
            name: "stage_directory",
            status: CheckStatus::Pass,
            details: format!("{count} static entries; pipedrive fetch disabled"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
