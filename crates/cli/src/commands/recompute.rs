use std::sync::Arc;

use serde::Serialize;
use wincomp_core::config::{AppConfig, LoadOptions};
use wincomp_core::{
    parse_ids, recompute_batch, BatchMode, DeterministicCompensationEngine, RecomputeOutcome,
    RecomputeStatus, WonServiceId,
};
use wincomp_dataverse::{
    build_http_client, ClientCredentials, DataverseClient, DataverseWonServiceStore,
};

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE, EXIT_RUNTIME_FAILURE};

#[derive(Debug, Serialize)]
struct RecomputeReport {
    command: &'static str,
    status: &'static str,
    message: String,
    results: Vec<RecomputeOutcome>,
}

pub fn run(raw_ids: &[String], isolate_failures: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "recompute",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG_FAILURE,
            );
        }
    };

    if !config.auth.has_client_credentials() {
        return CommandResult::failure(
            "recompute",
            "config_validation",
            "recompute runs as a service principal; set auth.tenant_id, auth.client_id and \
             auth.client_secret",
            EXIT_CONFIG_FAILURE,
        );
    }

    let ids = match parse_ids(raw_ids) {
        Ok(ids) => ids,
        Err(error) => {
            return CommandResult::failure(
                "recompute",
                "invalid_input",
                error.to_string(),
                EXIT_CONFIG_FAILURE,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "recompute",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME_FAILURE,
            );
        }
    };

    let mode = if isolate_failures { BatchMode::Isolated } else { BatchMode::FailFast };
    match runtime.block_on(recompute(&config, &ids, mode)) {
        Ok(results) => {
            let updated =
                results.iter().filter(|outcome| outcome.status == RecomputeStatus::Updated).count();
            let (status, exit_code) = if updated == results.len() {
                ("ok", 0)
            } else {
                ("partial", EXIT_RUNTIME_FAILURE)
            };
            let report = RecomputeReport {
                command: "recompute",
                status,
                message: format!("updated {updated} of {} won service(s)", results.len()),
                results,
            };
            CommandResult::report("recompute", exit_code, &report)
        }
        Err(error) => CommandResult::failure(
            "recompute",
            "dataverse",
            error.to_string(),
            EXIT_RUNTIME_FAILURE,
        ),
    }
}

async fn recompute(
    config: &AppConfig,
    ids: &[WonServiceId],
    mode: BatchMode,
) -> Result<Vec<RecomputeOutcome>, Box<dyn std::error::Error>> {
    let http = build_http_client(&config.dataverse)?;
    let tokens = ClientCredentials::from_config(http.clone(), &config.auth, &config.dataverse)?;
    let client = DataverseClient::from_config(http, &config.dataverse, Arc::new(tokens));
    let store =
        DataverseWonServiceStore::new(client, config.dataverse.won_service_entity_set.clone());

    Ok(recompute_batch(&store, &DeterministicCompensationEngine, ids, mode).await?)
}
