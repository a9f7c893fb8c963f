//! OAuth 2.0 client-credentials exchange against the tenant's token endpoint.
//!
//! # Security
//!
//! - Client secret and issued tokens are `SecretString` (never logged)
//! - Error bodies are reduced to their `error`/`error_description` fields
//! - HTTP timeouts bound every exchange

use super::CredentialExchange;
use crate::config::DirectoryConfig;
use crate::errors::DirectoryError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Tokens are dropped from the cache this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Client-credentials [`CredentialExchange`] with a per-tenant token cache.
pub struct ClientCredentialExchange {
    http_client: reqwest::Client,
    login_url: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
    cache: RwLock<HashMap<String, CachedToken>>,
}

impl ClientCredentialExchange {
    pub fn new(config: &DirectoryConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "admin_check.credentials", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            login_url: config.login_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scopes.join(" "),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn token_url(&self, tenant_id: &str) -> Result<reqwest::Url, DirectoryError> {
        let mut url = reqwest::Url::parse(&self.login_url)
            .map_err(|e| DirectoryError::Credentials(format!("invalid login URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| DirectoryError::Credentials("login URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([tenant_id, "oauth2", "v2.0", "token"]);
        Ok(url)
    }

    async fn cached(&self, tenant_id: &str) -> Option<SecretString> {
        let cache = self.cache.read().await;
        cache
            .get(tenant_id)
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    async fn request_token(&self, tenant_id: &str) -> Result<TokenResponse, DirectoryError> {
        let url = self.token_url(tenant_id)?;

        let form_body = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(url)
            .form(&form_body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "admin_check.credentials", error = %e, "Token request failed");
                DirectoryError::Credentials(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: TokenErrorResponse = response.json().await.unwrap_or_default();
            tracing::warn!(
                target: "admin_check.credentials",
                status = %status,
                error = %body.error,
                "Token endpoint rejected the exchange"
            );
            return Err(DirectoryError::Credentials(format!(
                "status {}: {} {}",
                status.as_u16(),
                body.error,
                body.error_description
            )));
        }

        response.json().await.map_err(|e| {
            tracing::warn!(target: "admin_check.credentials", error = %e, "Failed to parse token response");
            DirectoryError::Credentials(format!("invalid token response: {e}"))
        })
    }
}

#[async_trait]
impl CredentialExchange for ClientCredentialExchange {
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    async fn acquire_service_token(
        &self,
        tenant_id: &str,
    ) -> Result<SecretString, DirectoryError> {
        if tenant_id.is_empty() {
            metrics::record_credential_acquisition("error");
            return Err(DirectoryError::Credentials("tenant id is empty".to_string()));
        }

        if let Some(token) = self.cached(tenant_id).await {
            metrics::record_credential_acquisition("cached");
            return Ok(token);
        }

        let response = match self.request_token(tenant_id).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_credential_acquisition("error");
                return Err(e);
            }
        };

        let token = SecretString::from(response.access_token);
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        if !lifetime.is_zero() {
            self.cache.write().await.insert(
                tenant_id.to_string(),
                CachedToken {
                    token: token.clone(),
                    expires_at: Instant::now() + lifetime,
                },
            );
        }

        tracing::debug!(
            target: "admin_check.credentials",
            expires_in_secs = response.expires_in,
            "Service token acquired"
        );
        metrics::record_credential_acquisition("success");

        Ok(token)
    }
}
