use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use wincomp_core::config::{AppConfig, ConfigError};
use wincomp_dataverse::{build_http_client, DataverseError};

use crate::api::ApiState;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
}

impl Application {
    pub fn state(&self) -> ApiState {
        ApiState::new(self.http.clone(), self.config.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] DataverseError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let http = build_http_client(&config.dataverse).map_err(BootstrapError::HttpClient)?;
    info!(
        event_name = "system.bootstrap.dataverse_ready",
        correlation_id = "bootstrap",
        api_root = %config.dataverse.api_root(),
        service_principal = config.auth.has_client_credentials(),
        "dataverse client configured"
    );

    Ok(Application { config: Arc::new(config), http })
}
