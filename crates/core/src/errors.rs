use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid won service id `{0}`")]
    InvalidWonServiceId(String),
    #[error("at least one won service id is required")]
    EmptyBatch,
    #[error("term must not be negative, got {0} months")]
    NegativeTerm(i32),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("missing authorization")]
    Unauthorized,
    #[error("upstream request failed with status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Upstream { status, .. } => *status,
            Self::Internal { .. } => 500,
        }
    }

    /// Message returned to HTTP callers. Upstream and input errors pass their
    /// detail through; internal failures do not.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Upstream { message, .. } => message.clone(),
            Self::Internal { .. } => "An unexpected internal error occurred.".to_string(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Upstream { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Upstream { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Unauthorized => Self::Unauthorized {
                message: "missing or malformed bearer authorization".to_owned(),
                correlation_id,
            },
            // Only real HTTP error statuses are mirrored back to the caller.
            ApplicationError::Upstream { status, message } if (400..=599).contains(&status) => {
                Self::Upstream { status, message, correlation_id }
            }
            ApplicationError::Upstream { message, .. }
            | ApplicationError::Integration(message)
            | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::EmptyBatch).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.status_code(), 400);
        assert_eq!(interface.user_message(), "at least one won service id is required");
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let interface = ApplicationError::Unauthorized.into_interface("req-2");

        assert_eq!(interface.status_code(), 401);
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn upstream_status_is_mirrored() {
        let interface = ApplicationError::Upstream {
            status: 404,
            message: "Entity 'cr_wonservice' With Id = 1 Does Not Exist".to_owned(),
        }
        .into_interface("req-3");

        assert_eq!(interface.status_code(), 404);
        assert!(interface.user_message().contains("Does Not Exist"));
    }

    #[test]
    fn non_error_upstream_status_falls_back_to_internal() {
        let interface =
            ApplicationError::Upstream { status: 204, message: "empty".to_owned() }
                .into_interface("req-4");

        assert_eq!(interface.status_code(), 500);
    }

    #[test]
    fn configuration_error_maps_to_internal_with_safe_message() {
        let interface = ApplicationError::Configuration("client secret missing".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
