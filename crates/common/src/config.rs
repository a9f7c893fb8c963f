//! Common configuration types for admin-check components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default log filter applied when `LOG_LEVEL` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Database configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

// Connection strings usually embed a password.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("postgres_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}
