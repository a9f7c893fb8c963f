//! Process-local mapping tier.
//!
//! Owned by an instance (not a global); used as the fast tier and as the
//! persistent tier in tests and single-node deployments.

use super::{AdminGroupRepository, ClientAdminGroup};
use crate::errors::RepositoryError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::instrument;

/// In-memory [`AdminGroupRepository`].
#[derive(Default)]
pub struct MemoryRepository {
    rows: RwLock<HashMap<String, Vec<ClientAdminGroup>>>,
    closed: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), RepositoryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "memory repository is closed".to_string(),
            ));
        }
        Ok(())
    }

    fn row(client: &str, group_id: &str) -> ClientAdminGroup {
        ClientAdminGroup {
            client: client.to_string(),
            group_id: group_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl AdminGroupRepository for MemoryRepository {
    async fn count(&self, client: &str, group_id: &str) -> Result<u64, RepositoryError> {
        self.ensure_open()?;
        let rows = self.rows.read().await;
        let count = rows
            .get(client)
            .map(|mappings| mappings.iter().filter(|m| m.group_id == group_id).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn read(&self, client: &str) -> Result<Vec<ClientAdminGroup>, RepositoryError> {
        self.ensure_open()?;
        Ok(self
            .rows
            .read()
            .await
            .get(client)
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(skip_all, fields(client = %client, group_id = %group_id))]
    async fn create(&self, client: &str, group_id: &str) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        self.rows
            .write()
            .await
            .entry(client.to_string())
            .or_default()
            .push(Self::row(client, group_id));
        tracing::debug!(target: "admin_check.repository", backend = "memory", "Mapping created");
        Ok(())
    }

    async fn create_many(
        &self,
        client: &str,
        group_ids: &[String],
    ) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        let mut rows = self.rows.write().await;
        let mappings = rows.entry(client.to_string()).or_default();
        mappings.extend(group_ids.iter().map(|g| Self::row(client, g)));
        Ok(())
    }

    async fn delete(&self, client: &str, group_id: &str) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        let mut rows = self.rows.write().await;

        let removed = match rows.get_mut(client) {
            Some(mappings) => {
                let before = mappings.len();
                mappings.retain(|m| m.group_id != group_id);
                before - mappings.len()
            }
            None => 0,
        };

        if rows.get(client).is_some_and(Vec::is_empty) {
            rows.remove(client);
        }

        if removed == 0 {
            return Err(RepositoryError::NotFound {
                client: client.to_string(),
                group_id: group_id.to_string(),
            });
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        self.rows.write().await.clear();
        tracing::info!(target: "admin_check.repository", backend = "memory", "Mappings purged");
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
