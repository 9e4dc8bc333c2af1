//! Bearer tokens for Dataverse calls.
//!
//! HTTP handlers forward the caller's own token; batch jobs run as a service
//! principal through the OAuth2 client-credentials grant.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use wincomp_core::config::{AuthConfig, DataverseConfig};

use crate::error::DataverseError;

/// Tokens are refreshed this long before the issuer says they expire.
const EXPIRY_SKEW_SECONDS: i64 = 60;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, DataverseError>;
}

/// The caller's own bearer token, passed through untouched.
#[derive(Clone)]
pub struct ForwardedToken(SecretString);

impl ForwardedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Parses an `Authorization` header value of the form `Bearer <token>`.
    pub fn from_authorization_header(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return None;
        }
        Some(Self::new(token))
    }
}

impl std::fmt::Debug for ForwardedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ForwardedToken([REDACTED])")
    }
}

#[async_trait]
impl TokenProvider for ForwardedToken {
    async fn access_token(&self) -> Result<SecretString, DataverseError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Client-credentials grant against an Entra ID tenant, cached until shortly
/// before expiry.
pub struct ClientCredentials {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(
        http: Client,
        authority: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/{tenant_id}/oauth2/v2.0/token", authority.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret,
            scope: scope.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn from_config(
        http: Client,
        auth: &AuthConfig,
        dataverse: &DataverseConfig,
    ) -> Result<Self, DataverseError> {
        match (&auth.tenant_id, &auth.client_id, &auth.client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Ok(Self::new(
                http,
                &auth.authority,
                tenant_id,
                client_id.clone(),
                client_secret.clone(),
                dataverse.default_scope(),
            )),
            _ => Err(DataverseError::NotConfigured(
                "auth.tenant_id, auth.client_id and auth.client_secret are required for \
                 service-principal access"
                    .to_string(),
            )),
        }
    }

    async fn exchange(&self) -> Result<CachedToken, DataverseError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataverseError::TokenExchange(format!(
                "{status}: {}",
                crate::error::upstream_message(status, &body)
            )));
        }

        let payload = response
            .json::<TokenResponse>()
            .await
            .map_err(|error| DataverseError::TokenExchange(error.to_string()))?;

        info!(
            event_name = "dataverse.auth.token_issued",
            expires_in = payload.expires_in,
            "service principal token issued"
        );

        Ok(CachedToken {
            token: SecretString::from(payload.access_token),
            expires_at: Utc::now() + Duration::seconds(payload.expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn access_token(&self) -> Result<SecretString, DataverseError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS) > Utc::now() {
                debug!(event_name = "dataverse.auth.token_cached", "reusing cached token");
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, routing::post, Json, Router};
    use reqwest::Client;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::{json, Value};

    use super::{ClientCredentials, ForwardedToken, TokenProvider};
    use crate::error::DataverseError;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    #[test]
    fn bearer_header_is_parsed_case_insensitively() {
        assert!(ForwardedToken::from_authorization_header("Bearer abc").is_some());
        assert!(ForwardedToken::from_authorization_header("bearer   abc ").is_some());
        assert!(ForwardedToken::from_authorization_header("Basic abc").is_none());
        assert!(ForwardedToken::from_authorization_header("Bearer ").is_none());
        assert!(ForwardedToken::from_authorization_header("").is_none());
    }

    #[test]
    fn forwarded_token_debug_is_redacted() {
        let token = ForwardedToken::new("very-secret");
        assert!(!format!("{token:?}").contains("very-secret"));
    }

    #[tokio::test]
    async fn client_credentials_token_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/tenant-1/oauth2/v2.0/token",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    let issued = calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "token_type": "Bearer",
                        "expires_in": 3599,
                        "access_token": format!("token-{issued}"),
                    }))
                }),
            )
            .with_state(calls.clone());
        let authority = spawn(router).await;

        let provider = ClientCredentials::new(
            Client::new(),
            &authority,
            "tenant-1",
            "client-1",
            SecretString::from("secret".to_string()),
            "https://contoso.crm.dynamics.com/.default",
        );

        let first = provider.access_token().await.expect("first token");
        let second = provider.access_token().await.expect("second token");

        assert_eq!(first.expose_secret(), "token-0");
        assert_eq!(second.expose_secret(), "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_lived_tokens_are_refreshed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/tenant-1/oauth2/v2.0/token",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    let issued = calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "expires_in": 30, "access_token": format!("token-{issued}") }))
                }),
            )
            .with_state(calls.clone());
        let authority = spawn(router).await;

        let provider = ClientCredentials::new(
            Client::new(),
            &authority,
            "tenant-1",
            "client-1",
            SecretString::from("secret".to_string()),
            "scope",
        );

        provider.access_token().await.expect("first token");
        let second = provider.access_token().await.expect("second token");

        assert_eq!(second.expose_secret(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_exchange_surfaces_issuer_message() {
        let router = Router::new().route(
            "/tenant-1/oauth2/v2.0/token",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json::<Value>(json!({
                        "error": "invalid_client",
                        "error_description": "AADSTS7000215: Invalid client secret provided."
                    })),
                )
            }),
        );
        let authority = spawn(router).await;

        let provider = ClientCredentials::new(
            Client::new(),
            &authority,
            "tenant-1",
            "client-1",
            SecretString::from("wrong".to_string()),
            "scope",
        );

        let error = provider.access_token().await.expect_err("exchange should fail");
        assert!(matches!(
            error,
            DataverseError::TokenExchange(ref message) if message.contains("AADSTS7000215")
        ));
    }
}
