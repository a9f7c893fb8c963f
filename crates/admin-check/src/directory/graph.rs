//! Microsoft Graph directory client.
//!
//! Only the two group lookups the resolver needs:
//!
//! - `GET {graph}/groups/{id}?$select=displayName`
//! - `GET {graph}/groups?$select=id,displayName&$filter=displayName eq '<name>'`

use super::{ClientCredentialExchange, CredentialExchange, DirectoryProvider, DirectorySession};
use crate::config::DirectoryConfig;
use crate::errors::DirectoryError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct Group {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    #[serde(default)]
    value: Vec<Group>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphErrorResponse {
    #[serde(default)]
    error: GraphErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct GraphErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// [`DirectoryProvider`] over Microsoft Graph.
pub struct GraphDirectory {
    http_client: reqwest::Client,
    graph_url: String,
    credentials: Arc<dyn CredentialExchange>,
}

impl GraphDirectory {
    /// Create a provider using `credentials` for per-tenant service tokens.
    pub fn new(
        graph_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<dyn CredentialExchange>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "admin_check.directory", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            graph_url: graph_url.into(),
            credentials,
        }
    }

    /// Provider with a [`ClientCredentialExchange`] built from `config`.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(
            config.graph_url.clone(),
            config.timeout,
            Arc::new(ClientCredentialExchange::new(config)),
        )
    }
}

#[async_trait]
impl DirectoryProvider for GraphDirectory {
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    async fn open_session(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn DirectorySession>, DirectoryError> {
        let token = self.credentials.acquire_service_token(tenant_id).await?;
        Ok(Arc::new(GraphSession {
            http_client: self.http_client.clone(),
            graph_url: self.graph_url.clone(),
            token,
        }))
    }
}

/// A tenant-scoped Graph session holding one service token.
struct GraphSession {
    http_client: reqwest::Client,
    graph_url: String,
    token: SecretString,
}

impl GraphSession {
    fn groups_url(&self, group_id: Option<&str>) -> Result<reqwest::Url, DirectoryError> {
        let mut url = reqwest::Url::parse(&self.graph_url)
            .map_err(|e| DirectoryError::Lookup(format!("invalid directory URL: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                DirectoryError::Lookup("directory URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty().push("groups");
            if let Some(id) = group_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Send a GET, decode the body on success and the Graph error on failure.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: reqwest::Url,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let start = Instant::now();
        let result = self.send(url, query).await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_directory_call(operation, status, start.elapsed());

        if let Err(e) = &result {
            tracing::warn!(target: "admin_check.directory", operation, error = %e, "Directory call failed");
        }
        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| DirectoryError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: GraphErrorResponse = response.json().await.unwrap_or_default();
            return Err(DirectoryError::Lookup(format!(
                "status {}: {} {}",
                status.as_u16(),
                body.error.code,
                body.error.message
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Lookup(format!("invalid directory response: {e}")))
    }
}

/// OData string literal: single quotes are doubled.
fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl DirectorySession for GraphSession {
    #[instrument(skip_all, fields(group_id = %group_id))]
    async fn resolve_group_name(&self, group_id: &str) -> Result<String, DirectoryError> {
        let url = self.groups_url(Some(group_id))?;
        let group: Group = self
            .get_json("group_name", url, &[("$select", "displayName")])
            .await?;

        // Missing displayName reads as empty; only a pattern matching "" accepts it
        Ok(group.display_name.unwrap_or_default())
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn resolve_group_id(&self, name: &str) -> Result<String, DirectoryError> {
        let url = self.groups_url(None)?;
        let filter = format!("displayName eq {}", odata_literal(name));
        let groups: GroupList = self
            .get_json(
                "group_id",
                url,
                &[("$select", "id,displayName"), ("$filter", filter.as_str())],
            )
            .await?;

        let count = groups.value.len();
        let mut ids = groups
            .value
            .into_iter()
            .filter_map(|g| g.id.filter(|id| !id.is_empty()));

        match (count, ids.next()) {
            (1, Some(id)) => Ok(id),
            (_, first) => {
                let consistency = DirectoryError::Consistency {
                    name: name.to_string(),
                    count: if first.is_some() { count } else { 0 },
                };
                tracing::warn!(target: "admin_check.directory", error = %consistency, "Group name is ambiguous");
                Err(consistency)
            }
        }
    }
}
