//! JWT utilities shared across admin-check crates.
//!
//! This module provides the parts of bearer-token handling that do not need a
//! verification key:
//! - Size limits for DoS prevention
//! - Structural checks against the three-segment compact grammar
//! - Unverified header/payload decoding (to learn `alg` and `kid`)
//! - Clock skew constants and iat validation
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned here is trusted; the token MUST still be verified
//!   against a key resolved from the published key set
//! - Error messages are generic; details go to debug logs
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_unverified, SUPPORTED_ALGORITHM};
//!
//! let unverified = decode_unverified(token)?;
//! if unverified.header.alg.as_deref() != Some(SUPPORTED_ALGORITHM) {
//!     return Err(TokenError::UnsupportedAlgorithm);
//! }
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this are rejected BEFORE any regex match, base64 decode
/// or signature verification. Directory-issued access tokens with a large
/// `groups` claim are typically 1.5-4KB, so 8KB leaves room for expansion.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Applied as leeway to `exp`/`nbf` and as the upper bound on how far in the
/// future `iat` may be.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration from weakening the validity window.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The only signing algorithm accepted for bearer tokens.
pub const SUPPORTED_ALGORITHM: &str = "RS256";

/// Compact serialization grammar: header and payload are base64url, the
/// signature may be empty and tolerates standard-alphabet characters.
#[allow(clippy::expect_used)] // static pattern, exercised by the tests below
static TOKEN_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_=-]+)\.([A-Za-z0-9_=-]+)\.([A-Za-z0-9_\-+/=]*)$")
        .expect("token format pattern is valid")
});

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting an unverified JWT.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Unverified Token Types
// =============================================================================

/// The JOSE header fields needed to pick a verification key.
///
/// Values are `None` when absent, not strings, or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnverifiedHeader {
    /// Signing algorithm (`alg`).
    pub alg: Option<String>,
    /// Key id (`kid`).
    pub kid: Option<String>,
}

/// A structurally valid token whose header and payload have been decoded but
/// whose signature has NOT been checked.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    /// Decoded header fields.
    pub header: UnverifiedHeader,
    /// Decoded payload bytes (JSON).
    pub payload: Vec<u8>,
}

// =============================================================================
// Functions
// =============================================================================

/// Check the token size and the three-segment compact grammar.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Token does not match the compact grammar
pub fn check_token_format(token: &str) -> Result<(), JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    if !TOKEN_FORMAT.is_match(token) {
        tracing::debug!(
            target: "common.jwt",
            segments = token.split('.').count(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(())
}

/// Decode one base64url segment, tolerating trailing `=` padding.
fn decode_segment(segment: &str, name: &'static str) -> Result<Vec<u8>, JwtValidationError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", segment = name, error = %e, "Failed to decode JWT segment base64");
            JwtValidationError::MalformedToken
        })
}

fn header_field(header: &serde_json::Value, field: &str) -> Option<String> {
    header
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Decode the header and payload of a token without verifying the signature.
///
/// Runs [`check_token_format`] first, so oversized or malformed input is
/// rejected before any allocation proportional to its size.
///
/// # Errors
///
/// - `TokenTooLarge` / `MalformedToken` - see [`check_token_format`]
/// - `MalformedToken` - a segment is not base64url, the header is not a JSON
///   object, or the payload is not valid JSON
pub fn decode_unverified(token: &str) -> Result<UnverifiedToken, JwtValidationError> {
    check_token_format(token)?;

    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part)) = (parts.next(), parts.next()) else {
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = decode_segment(header_part, "header")?;
    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;
    if !header.is_object() {
        tracing::debug!(target: "common.jwt", "JWT header is not a JSON object");
        return Err(JwtValidationError::MalformedToken);
    }

    let payload = decode_segment(payload_part, "payload")?;
    if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&payload) {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(UnverifiedToken {
        header: UnverifiedHeader {
            alg: header_field(&header, "alg"),
            kid: header_field(&header, "kid"),
        },
        payload,
    })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
