//! Authoritative directory access.
//!
//! The resolver only needs two lookups from the directory: a group's display
//! name by id, and a group's id by display name. Both run inside a
//! [`DirectorySession`] scoped to one tenant, opened through a
//! [`DirectoryProvider`] that obtains a service credential for that tenant
//! from a [`CredentialExchange`].

pub mod credentials;
pub mod graph;

pub use credentials::ClientCredentialExchange;
pub use graph::GraphDirectory;

use crate::errors::DirectoryError;
use async_trait::async_trait;
use common::secret::SecretString;
use std::sync::Arc;

/// Obtains a service-level bearer credential for a tenant.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// Service token usable against the directory of `tenant_id`.
    async fn acquire_service_token(&self, tenant_id: &str)
        -> Result<SecretString, DirectoryError>;
}

/// Opens tenant-scoped directory sessions.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Open a session against the directory of `tenant_id`.
    async fn open_session(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn DirectorySession>, DirectoryError>;
}

/// Group lookups within one tenant.
#[async_trait]
pub trait DirectorySession: Send + Sync {
    /// Display name of the group with id `group_id`.
    async fn resolve_group_name(&self, group_id: &str) -> Result<String, DirectoryError>;

    /// Id of the single group named `name`.
    ///
    /// Fails with `Consistency` when zero or several groups carry the name.
    async fn resolve_group_id(&self, name: &str) -> Result<String, DirectoryError>;
}

/// Mock directory for unit testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        groups: HashMap<String, String>,
        session_calls: AtomicUsize,
        name_calls: AtomicUsize,
        id_calls: AtomicUsize,
        tenants: Mutex<Vec<String>>,
        fail_sessions: AtomicBool,
        fail_lookups: AtomicBool,
    }

    /// In-memory directory with call counters.
    ///
    /// Acts as both the provider and the session; every session shares the
    /// same groups and counters.
    #[derive(Clone, Default)]
    pub struct MockDirectory {
        state: Arc<State>,
    }

    impl MockDirectory {
        /// Empty directory.
        pub fn new() -> Self {
            Self::default()
        }

        /// Directory holding `(group_id, display_name)` groups.
        pub fn with_groups(groups: &[(&str, &str)]) -> Self {
            let state = State {
                groups: groups
                    .iter()
                    .map(|(id, name)| ((*id).to_string(), (*name).to_string()))
                    .collect(),
                ..State::default()
            };
            Self {
                state: Arc::new(state),
            }
        }

        /// Make `open_session` fail with a credential error.
        pub fn failing_sessions(self) -> Self {
            self.state.fail_sessions.store(true, Ordering::SeqCst);
            self
        }

        /// Make both lookups fail with a lookup error.
        pub fn failing_lookups(self) -> Self {
            self.state.fail_lookups.store(true, Ordering::SeqCst);
            self
        }

        pub fn session_calls(&self) -> usize {
            self.state.session_calls.load(Ordering::SeqCst)
        }

        pub fn name_calls(&self) -> usize {
            self.state.name_calls.load(Ordering::SeqCst)
        }

        pub fn id_calls(&self) -> usize {
            self.state.id_calls.load(Ordering::SeqCst)
        }

        /// Total calls of any kind.
        pub fn total_calls(&self) -> usize {
            self.session_calls() + self.name_calls() + self.id_calls()
        }

        /// Tenants sessions were opened for, in order.
        pub fn tenants(&self) -> Vec<String> {
            self.state
                .tenants
                .lock()
                .map(|tenants| tenants.clone())
                .unwrap_or_default()
        }

        fn check_lookup(&self) -> Result<(), DirectoryError> {
            if self.state.fail_lookups.load(Ordering::SeqCst) {
                return Err(DirectoryError::Lookup("mock lookup failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DirectoryProvider for MockDirectory {
        async fn open_session(
            &self,
            tenant_id: &str,
        ) -> Result<Arc<dyn DirectorySession>, DirectoryError> {
            self.state.session_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut tenants) = self.state.tenants.lock() {
                tenants.push(tenant_id.to_string());
            }
            if self.state.fail_sessions.load(Ordering::SeqCst) {
                return Err(DirectoryError::Credentials(
                    "mock credential failure".to_string(),
                ));
            }
            Ok(Arc::new(self.clone()))
        }
    }

    #[async_trait]
    impl DirectorySession for MockDirectory {
        async fn resolve_group_name(&self, group_id: &str) -> Result<String, DirectoryError> {
            self.state.name_calls.fetch_add(1, Ordering::SeqCst);
            self.check_lookup()?;
            self.state
                .groups
                .get(group_id)
                .cloned()
                .ok_or_else(|| DirectoryError::Lookup(format!("group {group_id} not found")))
        }

        async fn resolve_group_id(&self, name: &str) -> Result<String, DirectoryError> {
            self.state.id_calls.fetch_add(1, Ordering::SeqCst);
            self.check_lookup()?;
            let ids: Vec<&String> = self
                .state
                .groups
                .iter()
                .filter(|(_, group_name)| group_name.as_str() == name)
                .map(|(id, _)| id)
                .collect();
            match ids.as_slice() {
                [id] => Ok((*id).clone()),
                _ => Err(DirectoryError::Consistency {
                    name: name.to_string(),
                    count: ids.len(),
                }),
            }
        }
    }
}
