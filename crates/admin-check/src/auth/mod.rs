//! Bearer token authentication: key cache, claims and validator.

pub mod claims;
pub mod key_cache;
pub mod validator;

pub use claims::{AccessTokenClaims, ParsedToken, PrincipalType};
pub use key_cache::{KeyCache, KeyCacheConfig, RefreshOutcome, VerificationKey};
pub use validator::TokenValidator;
