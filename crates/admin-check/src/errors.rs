//! Admin-check error types.
//!
//! One enum per concern. Each exposes a bounded `kind()` label used for
//! metrics and logs. Display messages never carry token contents or secrets.

use crate::config::ConfigError;
use thiserror::Error;

/// Bearer-token validation failures.
///
/// Every variant is a client-side rejection; none of them indicate an
/// infrastructure outage (a key publisher outage surfaces as `UnknownKeyId`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token format is invalid")]
    TokenFormat,

    #[error("Token signing algorithm is not supported: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token header has no key id")]
    MissingKeyId,

    #[error("Token key id is not published: {0}")]
    UnknownKeyId(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Token carries no group ids")]
    NoGroups,
}

impl TokenError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::TokenFormat => "token_format",
            TokenError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            TokenError::MissingKeyId => "missing_key_id",
            TokenError::UnknownKeyId(_) => "unknown_key_id",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::TokenExpired => "token_expired",
            TokenError::TokenNotYetValid => "token_not_yet_valid",
            TokenError::NoGroups => "no_groups",
        }
    }
}

/// Key-set refresh failures. Returned by `KeyCache::refresh`, swallowed by
/// `KeyCache::lookup`.
#[derive(Debug, Clone, Error)]
pub enum KeyCacheError {
    /// Transport failure or timeout talking to the key publisher.
    #[error("Key fetch failed: {0}")]
    KeyFetch(String),

    /// The key publisher answered with a non-success status.
    #[error("Key publisher returned status {status}")]
    KeyPublisher { status: u16 },

    /// The key document could not be decoded.
    #[error("Key document could not be parsed: {0}")]
    KeyParse(String),
}

impl KeyCacheError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            KeyCacheError::KeyFetch(_) => "key_fetch",
            KeyCacheError::KeyPublisher { .. } => "key_publisher",
            KeyCacheError::KeyParse(_) => "key_parse",
        }
    }
}

/// Failures of a mapping tier (fast or persistent).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Repository read failed: {0}")]
    Read(String),

    #[error("Repository write failed: {0}")]
    Write(String),

    #[error("Mapping not found for client {client} and group {group_id}")]
    NotFound { client: String, group_id: String },

    /// The backing store could not be reached or was closed.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryError::Read(_) => "read",
            RepositoryError::Write(_) => "write",
            RepositoryError::NotFound { .. } => "not_found",
            RepositoryError::Unavailable(_) => "unavailable",
        }
    }
}

/// Failures of the directory session or the credential exchange behind it.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport failure, timeout or error response from the directory.
    #[error("Directory lookup failed: {0}")]
    Lookup(String),

    /// A name lookup did not resolve to exactly one group.
    #[error("Directory returned {count} groups for name '{name}', expected exactly one")]
    Consistency { name: String, count: usize },

    /// The service credential for the tenant could not be obtained.
    #[error("Directory credential exchange failed: {0}")]
    Credentials(String),
}

impl DirectoryError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DirectoryError::Lookup(_) => "lookup",
            DirectoryError::Consistency { .. } => "consistency",
            DirectoryError::Credentials(_) => "credentials",
        }
    }
}

/// Which mapping tier an error or hit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Fast,
    Persistent,
}

impl TierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TierKind::Fast => "fast",
            TierKind::Persistent => "persistent",
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership resolution failures.
///
/// All variants mean "could not determine", never "not an admin".
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Reading the {tier} tier failed: {source}")]
    TierRead {
        tier: TierKind,
        #[source]
        source: RepositoryError,
    },

    #[error("Writing the {tier} tier failed: {source}")]
    TierWrite {
        tier: TierKind,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    DirectoryLookup(DirectoryError),

    #[error(transparent)]
    DirectoryConsistency(DirectoryError),
}

impl ResolveError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::TierRead { .. } => "tier_read",
            ResolveError::TierWrite { .. } => "tier_write",
            ResolveError::DirectoryLookup(_) => "directory_lookup",
            ResolveError::DirectoryConsistency(_) => "directory_consistency",
        }
    }

    /// True when the failure is an outage of a collaborator rather than bad
    /// data. Callers should answer "could not determine" (5xx), not "denied".
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, ResolveError::DirectoryConsistency(_))
    }
}

impl From<DirectoryError> for ResolveError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Consistency { .. } => ResolveError::DirectoryConsistency(err),
            DirectoryError::Lookup(_) | DirectoryError::Credentials(_) => {
                ResolveError::DirectoryLookup(err)
            }
        }
    }
}

/// Failure of the full token-to-decision path.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl CheckError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Token(e) => e.kind(),
            CheckError::Resolve(e) => e.kind(),
        }
    }
}

/// Failure to assemble the checker from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Persistent tier unavailable: {0}")]
    Repository(#[from] RepositoryError),
}
