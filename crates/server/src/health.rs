use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    api_root: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub dataverse: HealthCheck,
    pub checked_at: String,
}

pub fn router(api_root: String) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { api_root })
}

/// Liveness only; Dataverse is not probed.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "wincomp-server runtime initialized".to_string(),
        },
        dataverse: HealthCheck {
            status: "configured",
            detail: format!("requests are forwarded to {}", state.api_root),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, extract::State, http::Request, http::StatusCode, Json};
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    #[tokio::test]
    async fn health_reports_ready_with_dataverse_root() {
        let (status, Json(payload)) = health(State(HealthState {
            api_root: "https://contoso.crm.dynamics.com/api/data/v9.2".to_string(),
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert!(payload.dataverse.detail.contains("contoso.crm.dynamics.com"));
    }

    #[tokio::test]
    async fn health_route_needs_no_authorization() {
        let response = router("http://127.0.0.1:9/api/data/v9.2".to_string())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
