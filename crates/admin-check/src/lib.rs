//! Admin Check Library
//!
//! Decides whether a caller belongs to a client's admin group: validates the
//! bearer token against a self-refreshing key cache, then resolves the
//! token's groups through the fast tier, the persistent tier and the
//! directory.
//!
//! # Modules
//!
//! - `auth` - Key cache, token validation and claims
//! - `checker` - Token-to-decision entry point
//! - `config` - Configuration
//! - `directory` - Directory sessions and credential exchange
//! - `errors` - Error types
//! - `observability` - Tracing setup and metrics
//! - `repositories` - Mapping tiers (in-memory, PostgreSQL)
//! - `resolver` - Cascading membership resolution

pub mod auth;
pub mod checker;
pub mod config;
pub mod directory;
pub mod errors;
pub mod observability;
pub mod repositories;
pub mod resolver;

pub use checker::AdminChecker;
