//! Token-to-decision tests through `AdminChecker`.

use admin_check::auth::{KeyCache, KeyCacheConfig, TokenValidator};
use admin_check::directory::mock::MockDirectory;
use admin_check::errors::{CheckError, TokenError};
use admin_check::repositories::mock::MockRepository;
use admin_check::repositories::AdminGroupRepository;
use admin_check::resolver::{MembershipPolicy, MembershipResolver, TierHit};
use admin_check::AdminChecker;
use admin_check_test_utils::*;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    checker: AdminChecker,
    fast: Arc<MockRepository>,
    persistent: Arc<MockRepository>,
    directory: MockDirectory,
    _publisher: JwksMockServer,
}

async fn fixture(policy: MembershipPolicy) -> Fixture {
    let publisher = JwksMockServer::start(&[(TEST_KEY_ID_1, TEST_RSA_KEY_1)]).await;
    let key_cache = KeyCache::new(KeyCacheConfig {
        jwks_url: publisher.jwks_url(),
        fetch_timeout: Duration::from_secs(2),
        max_refresh_interval: Duration::from_secs(300),
        min_refresh_interval: Duration::from_secs(86_400),
    });
    let validator = TokenValidator::new(Arc::new(key_cache), Duration::from_secs(300));

    let fast = Arc::new(MockRepository::new());
    let persistent = Arc::new(MockRepository::new());
    let directory = MockDirectory::with_groups(&[
        (TEST_GROUP_ADMIN_ROLE, TEST_ADMIN_ROLE_NAME),
        (TEST_GROUP_TEST_ROLE, TEST_TEST_ROLE_NAME),
        (TEST_ADMIN_GROUP, "DefaultAdmin"),
    ]);
    let resolver = MembershipResolver::new(
        fast.clone(),
        persistent.clone(),
        Some(Arc::new(directory.clone())),
        policy,
        Some(TEST_SERVICE_TENANT_ID.to_string()),
    );

    Fixture {
        checker: AdminChecker::new(validator, resolver),
        fast,
        persistent,
        directory,
        _publisher: publisher,
    }
}

#[tokio::test]
async fn test_token_groups_resolve_in_token_tenant() -> Result<(), anyhow::Error> {
    let f = fixture(MembershipPolicy::pattern(TEST_ADMIN_PATTERN)?).await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_GROUP_TEST_ROLE, TEST_GROUP_ADMIN_ROLE])
        .for_tenant(TEST_TENANT_ID)
        .sign();

    let outcome = f.checker.check_token(TEST_CLIENT, &token).await?;

    assert!(outcome.admin);
    assert_eq!(outcome.tier, TierHit::Directory);
    assert_eq!(outcome.matched_group_id.as_deref(), Some(TEST_GROUP_ADMIN_ROLE));
    assert_eq!(f.directory.tenants(), vec![TEST_TENANT_ID.to_string()]);
    assert_eq!(f.fast.create_calls(), 1);
    assert_eq!(f.persistent.create_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_token_without_tenant_uses_service_tenant() -> Result<(), anyhow::Error> {
    let f = fixture(MembershipPolicy::exact_id("DefaultAdmin")).await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_ADMIN_GROUP])
        .without_tenant()
        .sign();

    let outcome = f.checker.check_token(TEST_CLIENT, &token).await?;

    assert!(outcome.admin);
    assert_eq!(f.directory.tenants(), vec![TEST_SERVICE_TENANT_ID.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_rejected_token_never_reaches_tiers() {
    let f = fixture(MembershipPolicy::exact_id("DefaultAdmin")).await;

    let token = TestTokenBuilder::new()
        .with_groups(&[TEST_ADMIN_GROUP])
        .expires_in(-3600)
        .sign();

    let err = f.checker.check_token(TEST_CLIENT, &token).await.unwrap_err();

    assert!(matches!(err, CheckError::Token(TokenError::TokenExpired)));
    assert_eq!(f.fast.total_calls(), 0);
    assert_eq!(f.persistent.total_calls(), 0);
    assert_eq!(f.directory.total_calls(), 0);
}

#[tokio::test]
async fn test_token_without_groups_is_not_admin() -> Result<(), anyhow::Error> {
    let f = fixture(MembershipPolicy::exact_id("DefaultAdmin")).await;

    let token = TestTokenBuilder::new().sign();
    let outcome = f.checker.check_token(TEST_CLIENT, &token).await?;

    assert!(!outcome.admin);
    assert_eq!(outcome.tier, TierHit::None);
    assert_eq!(f.fast.total_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_check_groups_bypasses_token() -> Result<(), anyhow::Error> {
    let f = fixture(MembershipPolicy::exact_id("DefaultAdmin")).await;
    f.persistent.create(TEST_CLIENT, TEST_ADMIN_GROUP).await?;

    let outcome = f
        .checker
        .check_groups(TEST_CLIENT, &[TEST_ADMIN_GROUP.to_string()], None)
        .await?;

    assert_eq!(outcome.tier, TierHit::Persistent);
    assert_eq!(f.directory.total_calls(), 0);
    Ok(())
}
