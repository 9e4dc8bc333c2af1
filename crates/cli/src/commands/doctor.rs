use std::sync::Arc;

use serde::Serialize;
use wincomp_core::config::{AppConfig, LoadOptions};
use wincomp_dataverse::{
    build_http_client, ClientCredentials, DataverseClient, DataverseError, TokenProvider,
};

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE, EXIT_RUNTIME_FAILURE};

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

impl DoctorCheck {
    fn skipped(name: &'static str, details: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.to_string() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let (report, config_loaded) = build_report();

    let exit_code = match report.overall_status {
        CheckStatus::Fail if !config_loaded => EXIT_CONFIG_FAILURE,
        CheckStatus::Fail => EXIT_RUNTIME_FAILURE,
        _ => 0,
    };

    if json_output {
        return CommandResult::report("doctor", exit_code, &report);
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> (DoctorReport, bool) {
    let mut checks = Vec::new();

    let config_loaded = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: format!(
                    "configuration loaded; dataverse at {}",
                    config.dataverse.api_root()
                ),
            });
            checks.extend(service_principal_checks(&config));
            true
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped(
                "token_acquisition",
                "skipped because configuration did not load",
            ));
            checks.push(DoctorCheck::skipped(
                "dataverse_whoami",
                "skipped because configuration did not load",
            ));
            false
        }
    };

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    (DoctorReport { overall_status, summary, checks }, config_loaded)
}

/// Exchanges the configured client credentials and calls `WhoAmI` with the
/// resulting token.
fn service_principal_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    if !config.auth.has_client_credentials() {
        let details = "no service principal configured; only caller-token requests will work";
        return vec![
            DoctorCheck::skipped("token_acquisition", details),
            DoctorCheck::skipped("dataverse_whoami", details),
        ];
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "token_acquisition",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let tokens = match credentials(config) {
            Ok(tokens) => Arc::new(tokens),
            Err(error) => {
                return vec![DoctorCheck {
                    name: "token_acquisition",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                }];
            }
        };

        if let Err(error) = tokens.access_token().await {
            return vec![
                DoctorCheck {
                    name: "token_acquisition",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                },
                DoctorCheck::skipped("dataverse_whoami", "skipped because no token was issued"),
            ];
        }
        let token_check = DoctorCheck {
            name: "token_acquisition",
            status: CheckStatus::Pass,
            details: format!("token issued for scope {}", config.dataverse.default_scope()),
        };

        let client = match build_http_client(&config.dataverse) {
            Ok(http) => DataverseClient::from_config(http, &config.dataverse, tokens),
            Err(error) => {
                return vec![
                    token_check,
                    DoctorCheck {
                        name: "dataverse_whoami",
                        status: CheckStatus::Fail,
                        details: error.to_string(),
                    },
                ];
            }
        };

        let whoami = match client.who_am_i().await {
            Ok(identity) => DoctorCheck {
                name: "dataverse_whoami",
                status: CheckStatus::Pass,
                details: format!(
                    "authenticated as user {}",
                    identity.get("UserId").and_then(|value| value.as_str()).unwrap_or("<unknown>")
                ),
            },
            Err(error) => DoctorCheck {
                name: "dataverse_whoami",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        };

        vec![token_check, whoami]
    })
}

fn credentials(config: &AppConfig) -> Result<ClientCredentials, DataverseError> {
    let http = build_http_client(&config.dataverse)?;
    ClientCredentials::from_config(http, &config.auth, &config.dataverse)
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
