//! PostgreSQL mapping tier.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - The connection string is never logged

use super::{AdminGroupRepository, ClientAdminGroup};
use crate::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::instrument;

/// Time to wait for a pooled connection before failing the call.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// [`AdminGroupRepository`] over the `client_admin_groups` table.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connect a pool.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the database cannot be reached.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.postgres_url)
            .await
            .map_err(|e| {
                tracing::error!(target: "admin_check.repository", error = %e, "Failed to connect to database");
                RepositoryError::Unavailable(e.to_string())
            })?;

        tracing::info!(
            target: "admin_check.repository",
            max_connections = config.max_connections,
            "Database pool connected"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn read_error(e: sqlx::Error) -> RepositoryError {
    tracing::error!(target: "admin_check.repository", error = %e, "Database read failed");
    match e {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            RepositoryError::Unavailable(e.to_string())
        }
        other => RepositoryError::Read(other.to_string()),
    }
}

fn write_error(e: sqlx::Error) -> RepositoryError {
    tracing::error!(target: "admin_check.repository", error = %e, "Database write failed");
    match e {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            RepositoryError::Unavailable(e.to_string())
        }
        other => RepositoryError::Write(other.to_string()),
    }
}

#[async_trait]
impl AdminGroupRepository for PgRepository {
    #[instrument(skip_all, fields(client = %client, group_id = %group_id))]
    async fn count(&self, client: &str, group_id: &str) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM client_admin_groups
            WHERE client = $1 AND admin_group_id = $2
            "#,
        )
        .bind(client)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip_all, fields(client = %client))]
    async fn read(&self, client: &str) -> Result<Vec<ClientAdminGroup>, RepositoryError> {
        let rows: Vec<ClientAdminGroupRow> = sqlx::query_as(
            r#"
            SELECT client, admin_group_id, created_at
            FROM client_admin_groups
            WHERE client = $1
            ORDER BY id
            "#,
        )
        .bind(client)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip_all, fields(client = %client, group_id = %group_id))]
    async fn create(&self, client: &str, group_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO client_admin_groups (client, admin_group_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(client)
        .bind(group_id)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        tracing::debug!(target: "admin_check.repository", backend = "postgres", "Mapping created");
        Ok(())
    }

    #[instrument(skip_all, fields(client = %client, count = group_ids.len()))]
    async fn create_many(
        &self,
        client: &str,
        group_ids: &[String],
    ) -> Result<(), RepositoryError> {
        if group_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO client_admin_groups (client, admin_group_id)
            SELECT $1, group_id FROM UNNEST($2::text[]) AS group_id
            "#,
        )
        .bind(client)
        .bind(group_ids)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    #[instrument(skip_all, fields(client = %client, group_id = %group_id))]
    async fn delete(&self, client: &str, group_id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM client_admin_groups
            WHERE client = $1 AND admin_group_id = $2
            "#,
        )
        .bind(client)
        .bind(group_id)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                client: client.to_string(),
                group_id: group_id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn purge(&self) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM client_admin_groups")
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        tracing::info!(
            target: "admin_check.repository",
            backend = "postgres",
            removed = result.rows_affected(),
            "Mappings purged"
        );
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[derive(sqlx::FromRow)]
struct ClientAdminGroupRow {
    client: String,
    admin_group_id: String,
    created_at: DateTime<Utc>,
}

impl From<ClientAdminGroupRow> for ClientAdminGroup {
    fn from(row: ClientAdminGroupRow) -> Self {
        Self {
            client: row.client,
            group_id: row.admin_group_id,
            created_at: row.created_at,
        }
    }
}
