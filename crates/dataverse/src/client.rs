use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, warn};
use wincomp_core::config::DataverseConfig;

use crate::auth::TokenProvider;
use crate::error::DataverseError;

/// Exponential backoff for the retrying create path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 4_000 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Shared HTTP client with the configured request timeout.
pub fn build_http_client(config: &DataverseConfig) -> Result<Client, DataverseError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(DataverseError::Transport)
}

#[derive(Clone)]
pub struct DataverseClient {
    http: Client,
    api_root: String,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl DataverseClient {
    pub fn new(http: Client, api_root: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        let api_root = api_root.into().trim_end_matches('/').to_string();
        Self { http, api_root, tokens, retry: RetryPolicy::default() }
    }

    pub fn from_config(
        http: Client,
        config: &DataverseConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::new(http, config.api_root(), tokens).with_retry_policy(RetryPolicy {
            max_attempts: config.max_attempts,
            ..RetryPolicy::default()
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    pub async fn get_record(
        &self,
        entity_set: &str,
        id: &str,
        select: &[&str],
    ) -> Result<Value, DataverseError> {
        let mut request = self
            .request(Method::GET, &self.record_url(entity_set, id))
            .await?
            .header("Prefer", "odata.include-annotations=\"*\"");
        if !select.is_empty() {
            request = request.query(&[("$select", select.join(","))]);
        }

        let response = self.send(request).await?;
        response.json::<Value>().await.map_err(|error| DataverseError::Decode(error.to_string()))
    }

    /// Updates an existing record. `If-Match: *` keeps PATCH from upserting.
    pub async fn patch_record(
        &self,
        entity_set: &str,
        id: &str,
        body: &Value,
    ) -> Result<(), DataverseError> {
        let request = self
            .request(Method::PATCH, &self.record_url(entity_set, id))
            .await?
            .header(header::IF_MATCH, "*")
            .json(body);

        self.send(request).await?;
        Ok(())
    }

    /// Creates a record and returns its representation, retrying timeouts and
    /// dropped connections.
    pub async fn create_record(
        &self,
        entity_set: &str,
        body: &Value,
    ) -> Result<Value, DataverseError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_create(entity_set, body).await {
                Ok(created) => return Ok(created),
                Err(error) if error.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt - 1);
                    warn!(
                        event_name = "dataverse.create.retry",
                        entity_set,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient dataverse failure, retrying create"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn try_create(&self, entity_set: &str, body: &Value) -> Result<Value, DataverseError> {
        let url = format!("{}/{entity_set}", self.api_root);
        let request = self
            .request(Method::POST, &url)
            .await?
            .header("Prefer", "return=representation")
            .json(body);

        let response = self.send(request).await?;
        response.json::<Value>().await.map_err(|error| DataverseError::Decode(error.to_string()))
    }

    /// Authenticated round trip that touches no business data.
    pub async fn who_am_i(&self) -> Result<Value, DataverseError> {
        let url = format!("{}/WhoAmI", self.api_root);
        let response = self.send(self.request(Method::GET, &url).await?).await?;
        response.json::<Value>().await.map_err(|error| DataverseError::Decode(error.to_string()))
    }

    fn record_url(&self, entity_set: &str, id: &str) -> String {
        format!("{}/{entity_set}({id})", self.api_root)
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, DataverseError> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret())
            .header(header::ACCEPT, "application/json")
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DataverseError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(event_name = "dataverse.response", status = status.as_u16(), url = %response.url());

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(DataverseError::from_response(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use reqwest::Client;
    use serde_json::{json, Value};

    use super::{DataverseClient, RetryPolicy};
    use crate::auth::ForwardedToken;
    use crate::error::DataverseError;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}/api/data/v9.2")
    }

    fn client(api_root: String, http: Client) -> DataverseClient {
        DataverseClient::new(http, api_root, Arc::new(ForwardedToken::new("caller-token")))
            .with_retry_policy(RetryPolicy { max_attempts: 3, base_delay_ms: 5, max_delay_ms: 20 })
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 1_500 };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_500));
        assert_eq!(policy.backoff(40), Duration::from_millis(1_500));
    }

    #[tokio::test]
    async fn get_record_sends_odata_headers_and_select() {
        let router = Router::new().route(
            "/api/data/v9.2/{record}",
            get(
                |Path(record): Path<String>,
                 Query(query): Query<std::collections::HashMap<String, String>>,
                 headers: HeaderMap| async move {
                    Json(json!({
                        "record": record,
                        "select": query.get("$select"),
                        "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
                        "odata": headers.get("odata-version").and_then(|v| v.to_str().ok()),
                        "prefer": headers.get("prefer").and_then(|v| v.to_str().ok()),
                    }))
                },
            ),
        );
        let api_root = spawn(router).await;

        let payload = client(api_root, Client::new())
            .get_record(
                "cr_wonservices",
                "00000000-0000-0000-0000-000000000001",
                &["cr_tcv", "cr_mrr"],
            )
            .await
            .expect("record");

        assert_eq!(payload["record"], "cr_wonservices(00000000-0000-0000-0000-000000000001)");
        assert_eq!(payload["select"], "cr_tcv,cr_mrr");
        assert_eq!(payload["authorization"], "Bearer caller-token");
        assert_eq!(payload["odata"], "4.0");
        assert_eq!(payload["prefer"], "odata.include-annotations=\"*\"");
    }

    #[tokio::test]
    async fn upstream_error_envelope_is_surfaced() {
        let router = Router::new().route(
            "/api/data/v9.2/{record}",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": { "code": "0x80040217", "message": "Does Not Exist" } })),
                )
            }),
        );
        let api_root = spawn(router).await;

        let error = client(api_root, Client::new())
            .get_record("cr_wonservices", "00000000-0000-0000-0000-000000000001", &[])
            .await
            .expect_err("missing record");

        assert!(matches!(
            error,
            DataverseError::Upstream { status: 404, ref message } if message == "Does Not Exist"
        ));
    }

    #[tokio::test]
    async fn patch_record_uses_if_match_guard() {
        let seen = Arc::new(std::sync::Mutex::new(None::<(String, Value)>));
        let router = Router::new()
            .route(
                "/api/data/v9.2/{record}",
                axum::routing::patch(
                    |State(seen): State<Arc<std::sync::Mutex<Option<(String, Value)>>>>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let if_match = headers
                            .get("if-match")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        if let Ok(mut slot) = seen.lock() {
                            *slot = Some((if_match, body));
                        }
                        StatusCode::NO_CONTENT
                    },
                ),
            )
            .with_state(seen.clone());
        let api_root = spawn(router).await;

        client(api_root, Client::new())
            .patch_record(
                "cr_wonservices",
                "00000000-0000-0000-0000-000000000001",
                &json!({ "cr_expectedcomp": 816.0 }),
            )
            .await
            .expect("patch");

        let recorded = seen.lock().expect("lock").clone().expect("patch received");
        assert_eq!(recorded.0, "*");
        assert_eq!(recorded.1["cr_expectedcomp"], 816.0);
    }

    #[tokio::test]
    async fn create_retries_after_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/data/v9.2/quotedetails",
                post(|State(calls): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_millis(800)).await;
                    }
                    (StatusCode::CREATED, Json(json!({ "quotedetailid": "qd-1", "echo": body })))
                }),
            )
            .with_state(calls.clone());
        let api_root = spawn(router).await;
        let http = Client::builder().timeout(Duration::from_millis(200)).build().expect("client");

        let created = client(api_root, http)
            .create_record("quotedetails", &json!({ "quantity": 2 }))
            .await
            .expect("second attempt should succeed");

        assert_eq!(created["quotedetailid"], "qd-1");
        assert_eq!(created["echo"]["quantity"], 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn create_does_not_retry_client_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/data/v9.2/quotedetails",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": { "message": "quantity must be positive" } })),
                    )
                }),
            )
            .with_state(calls.clone());
        let api_root = spawn(router).await;

        let error = client(api_root, Client::new())
            .create_record("quotedetails", &json!({ "quantity": -1 }))
            .await
            .expect_err("bad request");

        assert!(matches!(error, DataverseError::Upstream { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/data/v9.2/quotedetails",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    StatusCode::CREATED
                }),
            )
            .with_state(calls.clone());
        let api_root = spawn(router).await;
        let http = Client::builder().timeout(Duration::from_millis(100)).build().expect("client");

        let error = client(api_root, http)
            .create_record("quotedetails", &json!({}))
            .await
            .expect_err("every attempt times out");

        assert!(error.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn who_am_i_returns_caller_identity() {
        let router = Router::new().route(
            "/api/data/v9.2/WhoAmI",
            get(|| async {
                Json(json!({
                    "UserId": "7a1c0d2e-0000-0000-0000-000000000042",
                    "OrganizationId": "0c2d9f10-0000-0000-0000-000000000001"
                }))
            }),
        );
        let api_root = spawn(router).await;

        let identity = client(api_root, Client::new()).who_am_i().await.expect("identity");
        assert_eq!(identity["UserId"], "7a1c0d2e-0000-0000-0000-000000000042");
    }
}
