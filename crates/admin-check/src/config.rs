//! Admin-check configuration.
//!
//! Configuration is loaded from environment variables. Client secrets and the
//! database URL are redacted in Debug output.

use crate::auth::key_cache::KeyCacheConfig;
use crate::repositories::RepositoryKind;
use crate::resolver::MembershipPolicy;
use common::config::{DatabaseConfig, ObservabilityConfig, DEFAULT_LOG_LEVEL};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default admin group display name (or pattern).
pub const DEFAULT_ADMIN_GROUP_NAME: &str = "DefaultAdmin";

/// Default key publisher (multi-tenant discovery keys).
pub const DEFAULT_JWKS_URL: &str = "https://login.microsoftonline.com/common/discovery/v2.0/keys";

/// Default key fetch timeout in milliseconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 1000;

/// Default throttle interval: minimum time between two key-set fetches.
pub const DEFAULT_JWKS_MAX_REFRESH_INTERVAL_SECONDS: u64 = 300;

/// Default staleness interval: age after which even a key hit refreshes.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 86_400;

/// Default OAuth scopes requested for the directory token.
pub const DEFAULT_MSAD_SCOPES: &str = "https://graph.microsoft.com/.default";

/// Default login (token endpoint) base URL.
pub const DEFAULT_MSAD_LOGIN_URL: &str = "https://login.microsoftonline.com";

/// Default directory (Graph) base URL.
pub const DEFAULT_MSAD_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default directory and token endpoint timeout in milliseconds.
pub const DEFAULT_DIRECTORY_TIMEOUT_MS: u64 = 5000;

/// Default PostgreSQL pool size.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Directory client configuration.
#[derive(Clone)]
pub struct DirectoryConfig {
    /// The service's own tenant, used when a token carries no tenant.
    pub tenant_id: String,

    /// App registration (client) id.
    pub client_id: String,

    /// App registration secret.
    pub client_secret: SecretString,

    /// Scopes requested for the service token.
    pub scopes: Vec<String>,

    /// Token endpoint base URL.
    pub login_url: String,

    /// Directory API base URL.
    pub graph_url: String,

    /// Per-request timeout for token and directory calls.
    pub timeout: Duration,
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("login_url", &self.login_url)
            .field("graph_url", &self.graph_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Admin-check configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Admin group display name, or a regular expression when
    /// `use_group_name_pattern` is set.
    pub admin_group_name: String,

    /// Match group display names against `admin_group_name` as a pattern.
    pub use_group_name_pattern: bool,

    /// Key publisher URL.
    pub jwks_url: String,

    /// Key fetch timeout.
    pub jwks_fetch_timeout: Duration,

    /// Throttle interval between key-set fetches.
    pub jwks_max_refresh_interval: Duration,

    /// Staleness interval after which a lookup forces a refresh.
    pub jwks_min_refresh_interval: Duration,

    /// Leeway for `exp`/`nbf`/`iat` checks.
    pub jwt_clock_skew: Duration,

    /// Directory client; `None` when no app registration is configured.
    pub directory: Option<DirectoryConfig>,

    /// Persistent tier connection; `None` when `DATABASE_URL` is unset.
    pub database: Option<DatabaseConfig>,

    /// Backend of the persistent tier.
    pub persistent_repository: RepositoryKind,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid key refresh configuration: {0}")]
    InvalidRefreshInterval(String),

    #[error("Invalid admin group pattern: {0}")]
    InvalidGroupPattern(String),
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        invalid(
            name,
            format!("must be a valid positive integer, got '{value_str}': {e}"),
        )
    })?;

    if value == 0 {
        return Err(invalid(name, "must be greater than 0"));
    }

    Ok(value)
}

fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    match value_str.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(invalid(name, format!("must be true or false, got '{value_str}'"))),
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let admin_group_name = non_empty(vars, "ADMIN_GROUP_NAME")
            .unwrap_or_else(|| DEFAULT_ADMIN_GROUP_NAME.to_string());

        let use_group_name_pattern = parse_bool(vars, "MSAD_USE_GROUP_NAME_PATTERN", false)?;

        if use_group_name_pattern {
            Regex::new(&admin_group_name).map_err(|e| {
                ConfigError::InvalidGroupPattern(format!(
                    "ADMIN_GROUP_NAME must be a valid regular expression: {e}"
                ))
            })?;
        }

        let jwks_url = non_empty(vars, "JWKS_URL").unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());

        let jwks_fetch_timeout = Duration::from_millis(parse_u64(
            vars,
            "JWKS_FETCH_TIMEOUT_MS",
            DEFAULT_JWKS_FETCH_TIMEOUT_MS,
        )?);

        let jwks_max_refresh_interval = Duration::from_secs(parse_u64(
            vars,
            "JWKS_MAX_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_MAX_REFRESH_INTERVAL_SECONDS,
        )?);

        let jwks_min_refresh_interval = Duration::from_secs(parse_u64(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
        )?);

        if jwks_min_refresh_interval < jwks_max_refresh_interval {
            return Err(ConfigError::InvalidRefreshInterval(format!(
                "JWKS_MIN_REFRESH_INTERVAL_SECONDS ({}) must not be smaller than JWKS_MAX_REFRESH_INTERVAL_SECONDS ({})",
                jwks_min_refresh_interval.as_secs(),
                jwks_max_refresh_interval.as_secs()
            )));
        }

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.trim().parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let directory = Self::directory_from_vars(vars)?;

        let database = match non_empty(vars, "DATABASE_URL") {
            Some(postgres_url) => {
                let max_connections = parse_u64(
                    vars,
                    "DATABASE_MAX_CONNECTIONS",
                    u64::from(DEFAULT_DATABASE_MAX_CONNECTIONS),
                )?;
                let max_connections = u32::try_from(max_connections)
                    .map_err(|_| invalid("DATABASE_MAX_CONNECTIONS", "is too large"))?;
                Some(DatabaseConfig {
                    postgres_url,
                    max_connections,
                })
            }
            None => None,
        };

        let persistent_repository = match non_empty(vars, "PERSISTENT_REPOSITORY") {
            Some(value) => value
                .parse::<RepositoryKind>()
                .map_err(|e| invalid("PERSISTENT_REPOSITORY", e))?,
            None if database.is_some() => RepositoryKind::Postgres,
            None => RepositoryKind::Memory,
        };

        if persistent_repository == RepositoryKind::Postgres && database.is_none() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let observability = ObservabilityConfig {
            log_level: non_empty(vars, "LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            json_logs: parse_bool(vars, "LOG_JSON", false)?,
        };

        Ok(Config {
            admin_group_name,
            use_group_name_pattern,
            jwks_url,
            jwks_fetch_timeout,
            jwks_max_refresh_interval,
            jwks_min_refresh_interval,
            jwt_clock_skew,
            directory,
            database,
            persistent_repository,
            observability,
        })
    }

    fn directory_from_vars(
        vars: &HashMap<String, String>,
    ) -> Result<Option<DirectoryConfig>, ConfigError> {
        let client_id = non_empty(vars, "MSAD_CLIENT_ID");
        let client_secret = non_empty(vars, "MSAD_CLIENT_SECRET");

        let (client_id, client_secret) = match (client_id, client_secret) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("MSAD_CLIENT_SECRET".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("MSAD_CLIENT_ID".to_string())),
            (Some(id), Some(secret)) => (id, secret),
        };

        let tenant_id = non_empty(vars, "MSAD_TENANT_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("MSAD_TENANT_ID".to_string()))?;

        let scopes: Vec<String> = non_empty(vars, "MSAD_SCOPES")
            .unwrap_or_else(|| DEFAULT_MSAD_SCOPES.to_string())
            .split_whitespace()
            .map(ToString::to_string)
            .collect();

        let login_url = non_empty(vars, "MSAD_LOGIN_URL")
            .unwrap_or_else(|| DEFAULT_MSAD_LOGIN_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let graph_url = non_empty(vars, "MSAD_GRAPH_URL")
            .unwrap_or_else(|| DEFAULT_MSAD_GRAPH_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout = Duration::from_millis(parse_u64(
            vars,
            "DIRECTORY_TIMEOUT_MS",
            DEFAULT_DIRECTORY_TIMEOUT_MS,
        )?);

        Ok(Some(DirectoryConfig {
            tenant_id,
            client_id,
            client_secret: SecretString::from(client_secret),
            scopes,
            login_url,
            graph_url,
            timeout,
        }))
    }

    /// Key cache settings derived from this configuration.
    pub fn key_cache_config(&self) -> KeyCacheConfig {
        KeyCacheConfig {
            jwks_url: self.jwks_url.clone(),
            fetch_timeout: self.jwks_fetch_timeout,
            max_refresh_interval: self.jwks_max_refresh_interval,
            min_refresh_interval: self.jwks_min_refresh_interval,
        }
    }

    /// Directory matching policy derived from this configuration.
    ///
    /// # Errors
    ///
    /// `InvalidGroupPattern` if the pattern policy is on and the name does not
    /// compile (already checked by `from_vars`, but the fields are public).
    pub fn membership_policy(&self) -> Result<MembershipPolicy, ConfigError> {
        if self.use_group_name_pattern {
            MembershipPolicy::pattern(&self.admin_group_name)
                .map_err(|e| ConfigError::InvalidGroupPattern(e.to_string()))
        } else {
            Ok(MembershipPolicy::exact_id(&self.admin_group_name))
        }
    }

    /// Tenant used when a token carries none.
    pub fn default_tenant(&self) -> Option<&str> {
        self.directory.as_ref().map(|d| d.tenant_id.as_str())
    }
}
