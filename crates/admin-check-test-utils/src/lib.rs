//! # Admin Check Test Utilities
//!
//! Shared test utilities for the admin-check crates.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA keys for reproducible tests)
//! - Test token builder (RS256-signed directory-style access tokens)
//! - Mock key publisher (wiremock JWKS endpoint with request counting)
//! - Fixed test IDs (clients, groups, tenants, key ids)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use admin_check_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let publisher = JwksMockServer::start(&[(TEST_KEY_ID_1, TEST_RSA_KEY_1)]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .with_groups(&[TEST_ADMIN_GROUP])
//!         .sign();
//!
//!     assert_eq!(publisher.request_count().await, 0);
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use test_ids::*;
pub use token_builders::*;
