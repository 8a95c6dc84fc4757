use serde::Serialize;
use signcfg_core::config::{AppConfig, LoadOptions};
use signcfg_db::{connect_with_config, migrations};
use signcfg_host::HostClient;

use crate::commands::CommandResult;

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

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
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

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_host_readiness(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["host_readiness", "database_schema"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    // The host is optional, so a skipped check is not a failure once config loaded.
    let config_loaded = checks.first().is_some_and(|check| check.status == CheckStatus::Pass);
    let all_pass = config_loaded && checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_host_readiness(config: &AppConfig) -> DoctorCheck {
    if !config.host.is_configured() {
        return DoctorCheck {
            name: "host_readiness",
            status: CheckStatus::Skipped,
            details: "host.base_url and API credentials are not set; only the local backend is available"
                .to_string(),
        };
    }

    match HostClient::from_config(&config.host) {
        Ok(client) => DoctorCheck {
            name: "host_readiness",
            status: CheckStatus::Pass,
            details: format!("remote backend ready for `{}`", client.base_url()),
        },
        Err(error) => DoctorCheck {
            name: "host_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let pending = migrations::pending_versions(&pool)
            .await
            .map_err(|error| format!("failed to read migration state: {error}"));
        pool.close().await;
        pending
    });

    match result {
        Ok(pending) if pending.is_empty() => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; schema is current", config.database.url),
        },
        Ok(pending) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: format!(
                "{} migration(s) pending ({}); run `signcfg migrate`",
                pending.len(),
                pending.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
            ),
        },
        Err(error) => {
            DoctorCheck { name: "database_schema", status: CheckStatus::Fail, details: error }
        }
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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
