//! Metrics definitions for admin-check.
//!
//! All metrics follow Prometheus naming conventions:
//! - `admin_check_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Every label value is a `&'static str` chosen by code:
//! - `status`: success, throttled, error (plus cached for credentials)
//! - `result`: hit, miss
//! - `outcome`: success or a `TokenError::kind()` label
//! - `tier`: fast, persistent, directory, none, error
//! - `operation`: bounded by the directory client

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Key Cache Metrics
// ============================================================================

/// Record a key cache refresh attempt.
///
/// Metric: `admin_check_key_refresh_total`
/// Labels: `status` (success, throttled, error)
pub fn record_key_refresh(status: &'static str) {
    counter!("admin_check_key_refresh_total", "status" => status).increment(1);
}

/// Record a key lookup result.
///
/// Metric: `admin_check_key_lookup_total`
/// Labels: `result` (hit, miss)
pub fn record_key_lookup(result: &'static str) {
    counter!("admin_check_key_lookup_total", "result" => result).increment(1);
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record a token validation.
///
/// Metric: `admin_check_token_validations_total`, `admin_check_token_validation_duration_seconds`
/// Labels: `outcome`
pub fn record_token_validation(outcome: &'static str, duration: Duration) {
    histogram!("admin_check_token_validation_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
    counter!("admin_check_token_validations_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Resolution Metrics
// ============================================================================

/// Record a membership resolution.
///
/// Metric: `admin_check_resolutions_total`, `admin_check_resolution_duration_seconds`
/// Labels: `tier` (fast, persistent, directory, none, error)
pub fn record_resolution(tier: &'static str, duration: Duration) {
    histogram!("admin_check_resolution_duration_seconds", "tier" => tier)
        .record(duration.as_secs_f64());
    counter!("admin_check_resolutions_total", "tier" => tier).increment(1);
}

/// Record a backfill write after a directory match.
///
/// Metric: `admin_check_backfill_writes_total`
/// Labels: `tier` (fast, persistent), `status` (success, error)
pub fn record_backfill(tier: &'static str, status: &'static str) {
    counter!("admin_check_backfill_writes_total", "tier" => tier, "status" => status)
        .increment(1);
}

// ============================================================================
// Directory Metrics
// ============================================================================

/// Record a directory call.
///
/// Metric: `admin_check_directory_requests_total`, `admin_check_directory_request_duration_seconds`
/// Labels: `operation` (group_name, group_id), `status` (success, error)
pub fn record_directory_call(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("admin_check_directory_request_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());
    counter!("admin_check_directory_requests_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record a service credential acquisition.
///
/// Metric: `admin_check_credential_acquisitions_total`
/// Labels: `status` (cached, success, error)
pub fn record_credential_acquisition(status: &'static str) {
    counter!("admin_check_credential_acquisitions_total", "status" => status).increment(1);
}
