use std::error::Error as _;
use std::io;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use wincomp_core::ApplicationError;

const MAX_UPSTREAM_MESSAGE_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum DataverseError {
    #[error("dataverse returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("dataverse transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("could not decode dataverse payload: {0}")]
    Decode(String),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
    #[error("dataverse client is not configured: {0}")]
    NotConfigured(String),
}

impl DataverseError {
    /// Timeouts and dropped connections; the only failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(error) => {
                error.is_timeout() || error.is_connect() || is_connection_reset(error)
            }
            _ => false,
        }
    }

    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        Self::Upstream { status: status.as_u16(), message: upstream_message(status, body) }
    }
}

impl From<reqwest::Error> for DataverseError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error)
    }
}

impl From<DataverseError> for ApplicationError {
    fn from(error: DataverseError) -> Self {
        match error {
            DataverseError::Upstream { status, message } => {
                ApplicationError::Upstream { status, message }
            }
            DataverseError::NotConfigured(message) => ApplicationError::Configuration(message),
            other => ApplicationError::Integration(other.to_string()),
        }
    }
}

/// Pulls `error.message` out of an OData error envelope, falling back to the
/// raw body and then the status reason.
pub(crate) fn upstream_message(status: StatusCode, body: &str) -> String {
    let from_envelope = serde_json::from_str::<Value>(body).ok().and_then(|payload| {
        payload
            .pointer("/error/message")
            .or_else(|| payload.get("error_description"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let message = from_envelope
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("upstream request failed").to_string()
        });

    if message.chars().count() > MAX_UPSTREAM_MESSAGE_CHARS {
        message.chars().take(MAX_UPSTREAM_MESSAGE_CHARS).collect()
    } else {
        message
    }
}

fn is_connection_reset(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            if matches!(
                io_error.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        source = current.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use wincomp_core::ApplicationError;

    use super::{upstream_message, DataverseError};

    #[test]
    fn odata_envelope_message_is_preferred() {
        let body = r#"{"error":{"code":"0x80040217",
            "message":"cr_wonservice With Id = abc Does Not Exist"}}"#;
        assert_eq!(
            upstream_message(StatusCode::NOT_FOUND, body),
            "cr_wonservice With Id = abc Does Not Exist"
        );
    }

    #[test]
    fn token_endpoint_description_is_used() {
        let body = r#"{"error":"invalid_client",
            "error_description":"AADSTS7000215: Invalid client secret"}"#;
        assert!(upstream_message(StatusCode::UNAUTHORIZED, body).starts_with("AADSTS7000215"));
    }

    #[test]
    fn plain_body_and_empty_body_fall_back() {
        assert_eq!(upstream_message(StatusCode::BAD_GATEWAY, " gateway down "), "gateway down");
        assert_eq!(upstream_message(StatusCode::SERVICE_UNAVAILABLE, ""), "Service Unavailable");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        assert_eq!(upstream_message(StatusCode::INTERNAL_SERVER_ERROR, &body).len(), 512);
    }

    #[test]
    fn upstream_error_keeps_status_for_callers() {
        let error = DataverseError::from_response(
            StatusCode::FORBIDDEN,
            r#"{"error":{"message":"no access"}}"#,
        );
        assert!(!error.is_transient());
        assert_eq!(
            ApplicationError::from(error),
            ApplicationError::Upstream { status: 403, message: "no access".to_string() }
        );
    }

    #[test]
    fn rejected_token_is_mirrored_as_upstream_401() {
        let error = DataverseError::from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"token expired"}}"#,
        );
        assert_eq!(
            ApplicationError::from(error).into_interface("req-9").status_code(),
            401
        );
    }
}
