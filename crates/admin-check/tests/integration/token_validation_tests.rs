//! Token validation against a mock key publisher.
//!
//! Every failure mode must come back as its own `TokenError` variant.

use admin_check::auth::{KeyCache, KeyCacheConfig, PrincipalType, TokenValidator};
use admin_check::errors::TokenError;
use admin_check_test_utils::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const CLOCK_SKEW: Duration = Duration::from_secs(300);

// ============================================================================
// Helper Functions
// ============================================================================

/// Validator over a publisher serving `TEST_KEY_ID_1`.
async fn validator_with_publisher(throttle: Duration) -> (TokenValidator, JwksMockServer) {
    let publisher = JwksMockServer::start(&[(TEST_KEY_ID_1, TEST_RSA_KEY_1)]).await;
    let cache = KeyCache::new(KeyCacheConfig {
        jwks_url: publisher.jwks_url(),
        fetch_timeout: Duration::from_secs(2),
        max_refresh_interval: throttle,
        min_refresh_interval: Duration::from_secs(86_400),
    });
    (TokenValidator::new(Arc::new(cache), CLOCK_SKEW), publisher)
}

async fn validator() -> (TokenValidator, JwksMockServer) {
    validator_with_publisher(Duration::from_secs(300)).await
}

// ============================================================================
// Accepted Tokens
// ============================================================================

#[tokio::test]
async fn test_valid_token_yields_identity_claims() -> Result<(), anyhow::Error> {
    let (validator, _publisher) = validator().await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_GROUP_UNRELATED, TEST_ADMIN_GROUP, TEST_GROUP_ADMIN_ROLE])
        .for_tenant(TEST_TENANT_ID)
        .app_only()
        .sign();

    let parsed = validator.parse(&token).await?;

    assert_eq!(
        parsed.group_ids(),
        &[
            TEST_GROUP_UNRELATED.to_string(),
            TEST_ADMIN_GROUP.to_string(),
            TEST_GROUP_ADMIN_ROLE.to_string()
        ]
    );
    assert_eq!(parsed.first_group()?, TEST_GROUP_UNRELATED);
    assert_eq!(parsed.tenant_id(), TEST_TENANT_ID);
    assert_eq!(parsed.subject_id(), TEST_SUBJECT);
    assert_eq!(parsed.principal_type(), PrincipalType::App);
    assert!(!parsed.raw_payload().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_user_token_and_raw_bytes() -> Result<(), anyhow::Error> {
    let (validator, _publisher) = validator().await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_ADMIN_GROUP])
        .user()
        .sign();

    let parsed = validator.parse_bytes(token.as_bytes()).await?;
    assert_eq!(parsed.principal_type(), PrincipalType::User);
    Ok(())
}

#[tokio::test]
async fn test_token_without_groups_is_valid_but_has_no_first_group() -> Result<(), anyhow::Error>
{
    let (validator, _publisher) = validator().await;

    let parsed = validator.parse(&TestTokenBuilder::new().sign()).await?;

    assert!(parsed.group_ids().is_empty());
    assert_eq!(parsed.first_group(), Err(TokenError::NoGroups));
    assert_eq!(parsed.principal_type(), PrincipalType::Unknown);
    Ok(())
}

#[tokio::test]
async fn test_expiry_within_clock_skew_is_accepted() -> Result<(), anyhow::Error> {
    let (validator, _publisher) = validator().await;

    // Expired 60 seconds ago, skew is 300 seconds
    let token = TestTokenBuilder::new().expires_in(-60).sign();

    assert!(validator.parse(&token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_rotated_key_becomes_usable_on_next_request() -> Result<(), anyhow::Error> {
    let (validator, publisher) = validator_with_publisher(Duration::ZERO).await;

    validator.parse(&TestTokenBuilder::new().sign()).await?;

    publisher
        .publish(&[(TEST_KEY_ID_1, TEST_RSA_KEY_1), (TEST_KEY_ID_2, TEST_RSA_KEY_2)])
        .await;

    let rotated = TestTokenBuilder::new()
        .with_kid(TEST_KEY_ID_2)
        .signed_with(TEST_RSA_KEY_2)
        .sign();
    validator.parse(&rotated).await?;

    assert_eq!(publisher.request_count().await, 1);
    Ok(())
}

// ============================================================================
// Rejected Tokens
// ============================================================================

#[tokio::test]
async fn test_structurally_invalid_token() {
    let (validator, publisher) = validator().await;

    let result = validator.parse("not_a.token.format.1232").await;

    assert_eq!(result.unwrap_err(), TokenError::TokenFormat);
    assert_eq!(publisher.request_count().await, 0);
}

#[tokio::test]
async fn test_unsupported_algorithm_never_contacts_key_cache() {
    let (validator, publisher) = validator().await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_ADMIN_GROUP])
        .sign_hs256(b"shared-secret-shared-secret-0123");

    let result = validator.parse(&token).await;

    assert_eq!(
        result.unwrap_err(),
        TokenError::UnsupportedAlgorithm("HS256".to_string())
    );
    assert_eq!(publisher.request_count().await, 0);
    assert!(validator.key_cache().is_empty().await);
}

#[tokio::test]
async fn test_alg_none_is_rejected() {
    let (validator, publisher) = validator().await;

    let token = TestTokenBuilder::new().unsigned_with_alg("none");

    assert_eq!(
        validator.parse(&token).await.unwrap_err(),
        TokenError::UnsupportedAlgorithm("none".to_string())
    );
    assert_eq!(publisher.request_count().await, 0);
}

#[tokio::test]
async fn test_missing_key_id() {
    let (validator, publisher) = validator().await;

    let token = TestTokenBuilder::new().without_kid().sign();

    assert_eq!(validator.parse(&token).await.unwrap_err(), TokenError::MissingKeyId);
    assert_eq!(publisher.request_count().await, 0);
}

#[tokio::test]
async fn test_unknown_key_id_after_one_refresh() {
    let (validator, publisher) = validator().await;

    let token = TestTokenBuilder::new().with_kid("unpublished-kid").sign();

    assert_eq!(
        validator.parse(&token).await.unwrap_err(),
        TokenError::UnknownKeyId("unpublished-kid".to_string())
    );
    assert_eq!(publisher.request_count().await, 1);
}

#[tokio::test]
async fn test_tampered_payload_fails_signature() {
    let (validator, _publisher) = validator().await;

    let builder = TestTokenBuilder::new().with_groups(&[TEST_GROUP_UNRELATED]);
    let token = builder.sign();
    let forged_claims = TestTokenBuilder::new()
        .with_groups(&[TEST_ADMIN_GROUP])
        .build_claims();

    let tampered = tamper_payload(&token, &forged_claims);

    assert_eq!(
        validator.parse(&tampered).await.unwrap_err(),
        TokenError::InvalidSignature
    );
}

#[tokio::test]
async fn test_key_mismatch_fails_signature() {
    let (validator, _publisher) = validator().await;

    // Claims to be TEST_KEY_ID_1 but signed with the second key
    let token = TestTokenBuilder::new().signed_with(TEST_RSA_KEY_2).sign();

    assert_eq!(
        validator.parse(&token).await.unwrap_err(),
        TokenError::InvalidSignature
    );
}

#[tokio::test]
async fn test_expired_token() {
    let (validator, _publisher) = validator().await;

    let token = TestTokenBuilder::new().expires_in(-3600).sign();

    assert_eq!(validator.parse(&token).await.unwrap_err(), TokenError::TokenExpired);
}

#[tokio::test]
async fn test_not_before_in_future() {
    let (validator, _publisher) = validator().await;

    let token = TestTokenBuilder::new().not_before_in(3600).sign();

    assert_eq!(
        validator.parse(&token).await.unwrap_err(),
        TokenError::TokenNotYetValid
    );
}

#[tokio::test]
async fn test_issued_in_future_beyond_skew() {
    let (validator, _publisher) = validator().await;

    let token = TestTokenBuilder::new()
        .issued_at(Utc::now().timestamp() + 3600)
        .sign();

    assert_eq!(
        validator.parse(&token).await.unwrap_err(),
        TokenError::TokenNotYetValid
    );
}

#[tokio::test]
async fn test_token_without_expiry_is_accepted() -> Result<(), anyhow::Error> {
    let (validator, _publisher) = validator().await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_ADMIN_GROUP])
        .without_expiry()
        .sign();

    let parsed = validator.parse(&token).await?;
    assert_eq!(parsed.first_group()?, TEST_ADMIN_GROUP);
    Ok(())
}
