//! Admin group mapping tiers.
//!
//! The fast and persistent tiers share one logical shape: a set of
//! `(client, group_id)` facts. Each backend implements
//! [`AdminGroupRepository`]; [`build_repository`] picks one at construction
//! time from a [`RepositoryKind`].
//!
//! Duplicate rows are tolerated. Two resolvers can backfill the same
//! directory match concurrently.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use crate::config::Config;
use crate::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One "group is an admin group for client" fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAdminGroup {
    pub client: String,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
}

/// CRUD surface of a mapping tier.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait AdminGroupRepository: Send + Sync {
    /// Number of rows for `(client, group_id)`.
    async fn count(&self, client: &str, group_id: &str) -> Result<u64, RepositoryError>;

    /// All mappings of `client`, oldest first.
    async fn read(&self, client: &str) -> Result<Vec<ClientAdminGroup>, RepositoryError>;

    /// Record one mapping.
    async fn create(&self, client: &str, group_id: &str) -> Result<(), RepositoryError>;

    /// Record several mappings for one client.
    async fn create_many(&self, client: &str, group_ids: &[String])
        -> Result<(), RepositoryError>;

    /// Remove every row for `(client, group_id)`.
    ///
    /// Returns `NotFound` when there was none.
    async fn delete(&self, client: &str, group_id: &str) -> Result<(), RepositoryError>;

    /// Remove all mappings.
    async fn purge(&self) -> Result<(), RepositoryError>;

    /// Release resources. Later calls fail with `Unavailable`.
    async fn close(&self);

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Closed set of tier backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    Memory,
    Postgres,
}

impl FromStr for RepositoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inmem" | "memory" => Ok(RepositoryKind::Memory),
            "postgres" | "postgresql" => Ok(RepositoryKind::Postgres),
            other => Err(format!(
                "unknown repository kind '{other}', expected inmem or postgres"
            )),
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Memory => f.write_str("inmem"),
            RepositoryKind::Postgres => f.write_str("postgres"),
        }
    }
}

/// Build a tier of the given kind.
///
/// # Errors
///
/// `Unavailable` when Postgres is requested without a database
/// configuration or the pool cannot connect.
pub async fn build_repository(
    kind: RepositoryKind,
    config: &Config,
) -> Result<Arc<dyn AdminGroupRepository>, RepositoryError> {
    match kind {
        RepositoryKind::Memory => Ok(Arc::new(MemoryRepository::new())),
        RepositoryKind::Postgres => {
            let database = config.database.as_ref().ok_or_else(|| {
                RepositoryError::Unavailable("DATABASE_URL is not configured".to_string())
            })?;
            let repository = PgRepository::connect(database).await?;
            Ok(Arc::new(repository))
        }
    }
}

/// Mock tier for unit testing.
///
/// Stores rows in a [`MemoryRepository`] and counts calls per operation.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock repository with call counters and injectable failures.
    #[derive(Default)]
    pub struct MockRepository {
        inner: MemoryRepository,
        count_calls: AtomicUsize,
        read_calls: AtomicUsize,
        create_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        created: Mutex<Vec<(String, String)>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl MockRepository {
        /// Create an empty mock.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a mock pre-populated with `(client, group_id)` rows.
        /// Seeding is not counted as `create` calls.
        pub async fn with_mappings(mappings: &[(&str, &str)]) -> Self {
            let mock = Self::new();
            for (client, group_id) in mappings {
                // MemoryRepository::create only fails once closed
                let _ = mock.inner.create(client, group_id).await;
            }
            mock
        }

        /// Make `count`/`read` fail.
        pub fn failing_reads(self) -> Self {
            self.fail_reads.store(true, Ordering::SeqCst);
            self
        }

        /// Make `create`/`create_many`/`delete`/`purge` fail.
        pub fn failing_writes(self) -> Self {
            self.fail_writes.store(true, Ordering::SeqCst);
            self
        }

        pub fn count_calls(&self) -> usize {
            self.count_calls.load(Ordering::SeqCst)
        }

        pub fn read_calls(&self) -> usize {
            self.read_calls.load(Ordering::SeqCst)
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }

        /// Arguments of every `create` call, in order.
        pub fn created(&self) -> Vec<(String, String)> {
            self.created
                .lock()
                .map(|created| created.clone())
                .unwrap_or_default()
        }

        /// Total calls of any kind.
        pub fn total_calls(&self) -> usize {
            self.count_calls() + self.read_calls() + self.create_calls() + self.delete_calls()
        }

        fn check_read(&self) -> Result<(), RepositoryError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(RepositoryError::Read("mock read failure".to_string()));
            }
            Ok(())
        }

        fn check_write(&self) -> Result<(), RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Write("mock write failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AdminGroupRepository for MockRepository {
        async fn count(&self, client: &str, group_id: &str) -> Result<u64, RepositoryError> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            self.check_read()?;
            self.inner.count(client, group_id).await
        }

        async fn read(&self, client: &str) -> Result<Vec<ClientAdminGroup>, RepositoryError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            self.check_read()?;
            self.inner.read(client).await
        }

        async fn create(&self, client: &str, group_id: &str) -> Result<(), RepositoryError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut created) = self.created.lock() {
                created.push((client.to_string(), group_id.to_string()));
            }
            self.check_write()?;
            self.inner.create(client, group_id).await
        }

        async fn create_many(
            &self,
            client: &str,
            group_ids: &[String],
        ) -> Result<(), RepositoryError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.check_write()?;
            self.inner.create_many(client, group_ids).await
        }

        async fn delete(&self, client: &str, group_id: &str) -> Result<(), RepositoryError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.check_write()?;
            self.inner.delete(client, group_id).await
        }

        async fn purge(&self) -> Result<(), RepositoryError> {
            self.check_write()?;
            self.inner.purge().await
        }

        async fn close(&self) {
            self.inner.close().await;
        }

        fn backend(&self) -> &'static str {
            "mock"
        }
    }
}
