//! Bearer token validation.
//!
//! Turns an opaque token into a [`ParsedToken`] or a classified
//! [`TokenError`].
//!
//! # Security
//!
//! - Tokens are size- and grammar-checked BEFORE decoding (DoS prevention)
//! - Only RS256 is accepted; other algorithms are rejected before any key
//!   lookup, so a forged `alg` never reaches the key cache
//! - `exp`/`nbf` are enforced with clock skew leeway; `iat` may not be further
//!   in the future than the skew
//! - Raw tokens and subjects are never logged

use crate::auth::claims::{AccessTokenClaims, ParsedToken};
use crate::auth::key_cache::KeyCache;
use crate::errors::TokenError;
use crate::observability::metrics;
use common::jwt::{decode_unverified, validate_iat, SUPPORTED_ALGORITHM};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Token validator backed by a [`KeyCache`].
///
/// Holds no mutable state of its own.
#[derive(Clone)]
pub struct TokenValidator {
    key_cache: Arc<KeyCache>,
    clock_skew: Duration,
}

impl TokenValidator {
    /// Create a new validator.
    ///
    /// # Arguments
    ///
    /// * `key_cache` - Source of verification keys
    /// * `clock_skew` - Leeway for `exp`/`nbf`/`iat` checks
    pub fn new(key_cache: Arc<KeyCache>, clock_skew: Duration) -> Self {
        Self {
            key_cache,
            clock_skew,
        }
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    /// Validate raw token bytes (e.g. straight from a header value).
    ///
    /// # Errors
    ///
    /// `TokenFormat` if the bytes are not UTF-8, otherwise as [`Self::parse`].
    pub async fn parse_bytes(&self, raw: &[u8]) -> Result<ParsedToken, TokenError> {
        let token = std::str::from_utf8(raw).map_err(|_| {
            tracing::debug!(target: "admin_check.token", "Token is not valid UTF-8");
            TokenError::TokenFormat
        })?;
        self.parse(token).await
    }

    /// Validate a token and extract its identity claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size and compact-grammar check
    /// 2. Decode the unverified header and payload
    /// 3. Require `alg` = RS256
    /// 4. Require a `kid`
    /// 5. Resolve the `kid` through the key cache (may refresh it)
    /// 6. Verify the signature, then `exp`/`nbf` with leeway and `iat`
    ///
    /// # Errors
    ///
    /// One [`TokenError`] variant per failed step.
    #[instrument(skip_all)]
    pub async fn parse(&self, token: &str) -> Result<ParsedToken, TokenError> {
        let start = Instant::now();
        let result = self.parse_inner(token).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_token_validation(outcome, start.elapsed());

        result
    }

    async fn parse_inner(&self, token: &str) -> Result<ParsedToken, TokenError> {
        // 1-2. Structure, then unverified header/payload
        let unverified = decode_unverified(token).map_err(|e| {
            tracing::debug!(target: "admin_check.token", error = ?e, "Token structure rejected");
            TokenError::TokenFormat
        })?;

        // 3. Algorithm, before touching the key cache
        let alg = unverified.header.alg.as_deref().unwrap_or("none");
        if alg != SUPPORTED_ALGORITHM {
            tracing::debug!(target: "admin_check.token", alg = %alg, "Token algorithm rejected");
            return Err(TokenError::UnsupportedAlgorithm(alg.to_string()));
        }

        // 4. Key id
        let kid = unverified.header.kid.ok_or_else(|| {
            tracing::debug!(target: "admin_check.token", "Token has no key id");
            TokenError::MissingKeyId
        })?;

        // 5. Verification key
        let key = self.key_cache.lookup(&kid).await.ok_or_else(|| {
            tracing::debug!(target: "admin_check.token", kid = %kid, "Token key id not published");
            TokenError::UnknownKeyId(kid.clone())
        })?;

        // 6. Signature and validity window
        let claims = verify_token(token, key.material(), self.clock_skew)?;

        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "admin_check.token", error = ?e, "Token iat validation failed");
                TokenError::TokenNotYetValid
            })?;
        }

        tracing::debug!(
            target: "admin_check.token",
            kid = %kid,
            group_count = claims.groups.len(),
            "Token validated successfully"
        );

        Ok(ParsedToken::new(unverified.payload, claims))
    }
}

/// Verify the RS256 signature and the time-based claims.
fn verify_token(
    token: &str,
    key: &DecodingKey,
    clock_skew: Duration,
) -> Result<AccessTokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = clock_skew.as_secs();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    // exp/nbf are checked when present, never required
    validation.required_spec_claims.clear();
    // Audience is the API layer's concern; admin resolution only needs groups
    validation.validate_aud = false;

    let token_data = decode::<AccessTokenClaims>(token, key, &validation).map_err(|e| {
        let err = classify(e.kind());
        tracing::debug!(target: "admin_check.token", error = %e, kind = err.kind(), "Token verification failed");
        err
    })?;

    Ok(token_data.claims)
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::Crypto(_) => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::TokenExpired,
        ErrorKind::ImmatureSignature => TokenError::TokenNotYetValid,
        _ => TokenError::TokenFormat,
    }
}
