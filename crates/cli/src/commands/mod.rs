pub mod calc;
pub mod config;
pub mod doctor;
pub mod recompute;

use serde::Serialize;

pub const EXIT_RUNTIME_FAILURE: u8 = 1;
pub const EXIT_CONFIG_FAILURE: u8 = 2;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Pretty JSON document for commands that report structured data.
    pub fn report<T: Serialize>(command: &str, exit_code: u8, report: &T) -> Self {
        match serde_json::to_string_pretty(report) {
            Ok(output) => Self { exit_code, output },
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("could not render report: {error}"),
                EXIT_RUNTIME_FAILURE,
            ),
        }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
