use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dataverse: DataverseConfig,
    pub auth: AuthConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DataverseConfig {
    pub base_url: String,
    pub api_version: String,
    pub won_service_entity_set: String,
    pub quote_line_entity_set: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

/// Service-principal credentials used when no caller token is forwarded.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub authority: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub allowed_origins: Vec<String>,
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
    pub dataverse_base_url: Option<String>,
    pub log_level: Option<String>,
    pub server_bind_address: Option<String>,
    pub server_port: Option<u16>,
    pub auth_tenant_id: Option<String>,
    pub auth_client_id: Option<String>,
    pub auth_client_secret: Option<String>,
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
            dataverse: DataverseConfig {
                base_url: String::new(),
                api_version: "v9.2".to_string(),
                won_service_entity_set: "cr_wonservices".to_string(),
                quote_line_entity_set: "quotedetails".to_string(),
                timeout_secs: 30,
                max_attempts: 3,
            },
            auth: AuthConfig {
                authority: "https://login.microsoftonline.com".to_string(),
                tenant_id: None,
                client_id: None,
                client_secret: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 7071,
                graceful_shutdown_secs: 15,
                allowed_origins: Vec::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
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

impl AuthConfig {
    /// True when tenant, client id and client secret are all present.
    pub fn has_client_credentials(&self) -> bool {
        let secret_present = self
            .client_secret
            .as_ref()
            .map(|value| !value.expose_secret().trim().is_empty())
            .unwrap_or(false);
        present(&self.tenant_id) && present(&self.client_id) && secret_present
    }
}

impl DataverseConfig {
    /// OData service root, e.g. `https://org.crm.dynamics.com/api/data/v9.2`.
    pub fn api_root(&self) -> String {
        format!("{}/api/data/{}", self.base_url.trim_end_matches('/'), self.api_version)
    }

    /// Token scope for client-credentials exchange against this environment.
    pub fn default_scope(&self) -> String {
        format!("{}/.default", self.base_url.trim_end_matches('/'))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("wincomp.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(dataverse) = patch.dataverse {
            if let Some(base_url) = dataverse.base_url {
                self.dataverse.base_url = base_url;
            }
            if let Some(api_version) = dataverse.api_version {
                self.dataverse.api_version = api_version;
            }
            if let Some(entity_set) = dataverse.won_service_entity_set {
                self.dataverse.won_service_entity_set = entity_set;
            }
            if let Some(entity_set) = dataverse.quote_line_entity_set {
                self.dataverse.quote_line_entity_set = entity_set;
            }
            if let Some(timeout_secs) = dataverse.timeout_secs {
                self.dataverse.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = dataverse.max_attempts {
                self.dataverse.max_attempts = max_attempts;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(authority) = auth.authority {
                self.auth.authority = authority;
            }
            if let Some(tenant_id) = auth.tenant_id {
                self.auth.tenant_id = Some(tenant_id);
            }
            if let Some(client_id) = auth.client_id {
                self.auth.client_id = Some(client_id);
            }
            if let Some(client_secret_value) = auth.client_secret {
                self.auth.client_secret = Some(secret_value(client_secret_value));
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(allowed_origins) = server.allowed_origins {
                self.server.allowed_origins = allowed_origins;
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WINCOMP_DATAVERSE_BASE_URL") {
            self.dataverse.base_url = value;
        }
        if let Some(value) = read_env("WINCOMP_DATAVERSE_API_VERSION") {
            self.dataverse.api_version = value;
        }
        if let Some(value) = read_env("WINCOMP_DATAVERSE_WON_SERVICE_ENTITY_SET") {
            self.dataverse.won_service_entity_set = value;
        }
        if let Some(value) = read_env("WINCOMP_DATAVERSE_QUOTE_LINE_ENTITY_SET") {
            self.dataverse.quote_line_entity_set = value;
        }
        if let Some(value) = read_env("WINCOMP_DATAVERSE_TIMEOUT_SECS") {
            self.dataverse.timeout_secs = parse_u64("WINCOMP_DATAVERSE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("WINCOMP_DATAVERSE_MAX_ATTEMPTS") {
            self.dataverse.max_attempts = parse_u32("WINCOMP_DATAVERSE_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("WINCOMP_AUTH_AUTHORITY") {
            self.auth.authority = value;
        }
        if let Some(value) = read_env("WINCOMP_AUTH_TENANT_ID") {
            self.auth.tenant_id = Some(value);
        }
        if let Some(value) = read_env("WINCOMP_AUTH_CLIENT_ID") {
            self.auth.client_id = Some(value);
        }
        if let Some(value) = read_env("WINCOMP_AUTH_CLIENT_SECRET") {
            self.auth.client_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("WINCOMP_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WINCOMP_SERVER_PORT") {
            self.server.port = parse_u16("WINCOMP_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WINCOMP_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WINCOMP_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("WINCOMP_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = split_list(&value);
        }

        let log_level = read_env("WINCOMP_LOGGING_LEVEL").or_else(|| read_env("WINCOMP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WINCOMP_LOGGING_FORMAT").or_else(|| read_env("WINCOMP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.dataverse_base_url {
            self.dataverse.base_url = base_url;
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
        if let Some(tenant_id) = overrides.auth_tenant_id {
            self.auth.tenant_id = Some(tenant_id);
        }
        if let Some(client_id) = overrides.auth_client_id {
            self.auth.client_id = Some(client_id);
        }
        if let Some(client_secret) = overrides.auth_client_secret {
            self.auth.client_secret = Some(secret_value(client_secret));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dataverse(&self.dataverse)?;
        validate_auth(&self.auth)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("wincomp.toml"), PathBuf::from("config/wincomp.toml")]
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

fn validate_dataverse(dataverse: &DataverseConfig) -> Result<(), ConfigError> {
    let base_url = dataverse.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::Validation(
            "dataverse.base_url is required (e.g. https://yourorg.crm.dynamics.com)".to_string(),
        ));
    }
    if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
        return Err(ConfigError::Validation(
            "dataverse.base_url must start with http:// or https://".to_string(),
        ));
    }

    if dataverse.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("dataverse.api_version must not be empty".to_string()));
    }

    if dataverse.won_service_entity_set.trim().is_empty()
        || dataverse.quote_line_entity_set.trim().is_empty()
    {
        return Err(ConfigError::Validation(
            "dataverse entity set names must not be empty".to_string(),
        ));
    }

    if dataverse.timeout_secs == 0 || dataverse.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dataverse.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if dataverse.max_attempts == 0 || dataverse.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "dataverse.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    if !auth.authority.starts_with("https://") && !auth.authority.starts_with("http://") {
        return Err(ConfigError::Validation(
            "auth.authority must start with http:// or https://".to_string(),
        ));
    }

    let any_set =
        present(&auth.tenant_id) || present(&auth.client_id) || auth.client_secret.is_some();
    if any_set && !auth.has_client_credentials() {
        return Err(ConfigError::Validation(
            "auth.tenant_id, auth.client_id and auth.client_secret must be set together"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
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

fn present(value: &Option<String>) -> bool {
    value.as_ref().map(|value| !value.trim().is_empty()).unwrap_or(false)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
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
    dataverse: Option<DataversePatch>,
    auth: Option<AuthPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DataversePatch {
    base_url: Option<String>,
    api_version: Option<String>,
    won_service_entity_set: Option<String>,
    quote_line_entity_set: Option<String>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    authority: Option<String>,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
