use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use wincomp_core::config::{AppConfig, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE};

struct Field<'a> {
    key: &'static str,
    env_key: &'static str,
    value: &'a str,
}

pub fn run() -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => CommandResult { exit_code: 0, output: render(&config) },
        Err(error) => CommandResult::failure(
            "config",
            "config_validation",
            format!("config validation failed: {error}"),
            EXIT_CONFIG_FAILURE,
        ),
    }
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let timeout_secs = config.dataverse.timeout_secs.to_string();
    let max_attempts = config.dataverse.max_attempts.to_string();
    let tenant_id = config.auth.tenant_id.as_deref().unwrap_or("<unset>");
    let client_id = config.auth.client_id.as_deref().unwrap_or("<unset>");
    let client_secret = config
        .auth
        .client_secret
        .as_ref()
        .map(|secret| redact_secret(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let port = config.server.port.to_string();
    let graceful_shutdown_secs = config.server.graceful_shutdown_secs.to_string();
    let allowed_origins = if config.server.allowed_origins.is_empty() {
        "* (any)".to_string()
    } else {
        config.server.allowed_origins.join(",")
    };
    let log_format = format!("{:?}", config.logging.format);

    let fields = [
        Field {
            key: "dataverse.base_url",
            env_key: "WINCOMP_DATAVERSE_BASE_URL",
            value: &config.dataverse.base_url,
        },
        Field {
            key: "dataverse.api_version",
            env_key: "WINCOMP_DATAVERSE_API_VERSION",
            value: &config.dataverse.api_version,
        },
        Field {
            key: "dataverse.won_service_entity_set",
            env_key: "WINCOMP_DATAVERSE_WON_SERVICE_ENTITY_SET",
            value: &config.dataverse.won_service_entity_set,
        },
        Field {
            key: "dataverse.quote_line_entity_set",
            env_key: "WINCOMP_DATAVERSE_QUOTE_LINE_ENTITY_SET",
            value: &config.dataverse.quote_line_entity_set,
        },
        Field {
            key: "dataverse.timeout_secs",
            env_key: "WINCOMP_DATAVERSE_TIMEOUT_SECS",
            value: &timeout_secs,
        },
        Field {
            key: "dataverse.max_attempts",
            env_key: "WINCOMP_DATAVERSE_MAX_ATTEMPTS",
            value: &max_attempts,
        },
        Field {
            key: "auth.authority",
            env_key: "WINCOMP_AUTH_AUTHORITY",
            value: &config.auth.authority,
        },
        Field { key: "auth.tenant_id", env_key: "WINCOMP_AUTH_TENANT_ID", value: tenant_id },
        Field { key: "auth.client_id", env_key: "WINCOMP_AUTH_CLIENT_ID", value: client_id },
        Field {
            key: "auth.client_secret",
            env_key: "WINCOMP_AUTH_CLIENT_SECRET",
            value: &client_secret,
        },
        Field {
            key: "server.bind_address",
            env_key: "WINCOMP_SERVER_BIND_ADDRESS",
            value: &config.server.bind_address,
        },
        Field { key: "server.port", env_key: "WINCOMP_SERVER_PORT", value: &port },
        Field {
            key: "server.graceful_shutdown_secs",
            env_key: "WINCOMP_SERVER_GRACEFUL_SHUTDOWN_SECS",
            value: &graceful_shutdown_secs,
        },
        Field {
            key: "server.allowed_origins",
            env_key: "WINCOMP_SERVER_ALLOWED_ORIGINS",
            value: &allowed_origins,
        },
        Field {
            key: "logging.level",
            env_key: "WINCOMP_LOGGING_LEVEL",
            value: &config.logging.level,
        },
        Field { key: "logging.format", env_key: "WINCOMP_LOGGING_FORMAT", value: &log_format },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        render_line(
            field.key,
            field.value,
            field_source(
                field.key,
                field.env_key,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        )
    }));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("wincomp.toml"), PathBuf::from("config/wincomp.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
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

/// Keeps the first four characters of long secrets so operators can tell
/// which credential is loaded.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() < 16 {
        return "<redacted>".to_string();
    }

    let prefix = trimmed.chars().take(4).collect::<String>();
    format!("{prefix}***")
}
