//! Shared HTTP plumbing: state, bearer extraction, error responses and CORS.

use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use reqwest::Client;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, warn};
use uuid::Uuid;
use wincomp_core::config::AppConfig;
use wincomp_core::{ApplicationError, InterfaceError};
use wincomp_dataverse::{DataverseClient, ForwardedToken};

use crate::{comp, health, quote_lines};

#[derive(Clone)]
pub struct ApiState {
    http: Client,
    config: Arc<AppConfig>,
}

impl ApiState {
    pub fn new(http: Client, config: Arc<AppConfig>) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Dataverse client acting as the caller.
    pub fn dataverse(&self, token: ForwardedToken) -> DataverseClient {
        DataverseClient::from_config(self.http.clone(), &self.config.dataverse, Arc::new(token))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error returned by every handler; rendered as `{ "error": message }`.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        (status, Json(ErrorBody { error: self.0.user_message() })).into_response()
    }
}

pub fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// The caller's bearer token, or 401.
pub fn bearer_token(headers: &HeaderMap, correlation_id: &str) -> Result<ForwardedToken, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(ForwardedToken::from_authorization_header)
        .ok_or_else(|| ApiError::from_application(ApplicationError::Unauthorized, correlation_id))
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn app(state: ApiState) -> Router {
    let cors = cors_layer(&state.config().server.allowed_origins);
    let health = health::router(state.config().dataverse.api_root());

    Router::new()
        .merge(comp::router())
        .merge(quote_lines::router())
        .with_state(state)
        .merge(health)
        .layer(cors)
}
