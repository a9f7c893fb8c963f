//! Membership resolution across real in-memory tiers and a directory.
//!
//! The directory is either the mock from `admin_check::directory::mock` or
//! the Graph client talking to a wiremock server.

use admin_check::config::DirectoryConfig;
use admin_check::directory::mock::MockDirectory;
use admin_check::directory::{DirectoryProvider, GraphDirectory};
use admin_check::errors::ResolveError;
use admin_check::repositories::{AdminGroupRepository, MemoryRepository};
use admin_check::resolver::{MembershipPolicy, MembershipResolver, TierHit};
use admin_check_test_utils::*;
use common::secret::SecretString;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Tiers {
    fast: Arc<MemoryRepository>,
    persistent: Arc<MemoryRepository>,
}

impl Tiers {
    fn new() -> Self {
        Self {
            fast: Arc::new(MemoryRepository::new()),
            persistent: Arc::new(MemoryRepository::new()),
        }
    }

    fn resolver(
        &self,
        directory: Arc<dyn DirectoryProvider>,
        policy: MembershipPolicy,
    ) -> MembershipResolver {
        MembershipResolver::new(
            self.fast.clone(),
            self.persistent.clone(),
            Some(directory),
            policy,
            Some(TEST_SERVICE_TENANT_ID.to_string()),
        )
    }
}

fn groups(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| (*id).to_string()).collect()
}

// ============================================================================
// Mapping Tiers
// ============================================================================

#[tokio::test]
async fn test_persistent_mapping_resolves_admin() -> Result<(), anyhow::Error> {
    let tiers = Tiers::new();
    let directory = MockDirectory::new();
    let resolver = tiers.resolver(
        Arc::new(directory.clone()),
        MembershipPolicy::exact_id("DefaultAdmin"),
    );

    tiers.persistent.create(TEST_CLIENT, TEST_ADMIN_GROUP).await?;

    let outcome = resolver
        .resolve(TEST_CLIENT, &groups(&[TEST_ADMIN_GROUP]), None)
        .await?;

    assert!(outcome.admin);
    assert_eq!(outcome.tier, TierHit::Persistent);
    assert_eq!(outcome.matched_group_id.as_deref(), Some(TEST_ADMIN_GROUP));
    assert_eq!(directory.total_calls(), 0);
    // Not copied into the fast tier
    assert_eq!(tiers.fast.count(TEST_CLIENT, TEST_ADMIN_GROUP).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_mapping_is_scoped_to_client() -> Result<(), anyhow::Error> {
    let tiers = Tiers::new();
    let resolver = tiers.resolver(
        Arc::new(MockDirectory::new()),
        MembershipPolicy::exact_id("DefaultAdmin"),
    );

    tiers.fast.create(TEST_CLIENT, TEST_ADMIN_GROUP).await?;

    // The other client has no mapping and the directory knows no admin group
    let result = resolver
        .resolve(TEST_CLIENT_OTHER, &groups(&[TEST_ADMIN_GROUP]), None)
        .await;

    assert!(matches!(result, Err(ResolveError::DirectoryConsistency(_))));
    Ok(())
}

#[tokio::test]
async fn test_empty_candidates_leave_tiers_untouched() -> Result<(), anyhow::Error> {
    let tiers = Tiers::new();
    let directory = MockDirectory::with_groups(&[(TEST_ADMIN_GROUP, "DefaultAdmin")]);
    let resolver = tiers.resolver(
        Arc::new(directory.clone()),
        MembershipPolicy::exact_id("DefaultAdmin"),
    );

    let outcome = resolver.resolve(TEST_CLIENT, &[], Some(TEST_TENANT_ID)).await?;

    assert!(!outcome.admin);
    assert_eq!(outcome.tier, TierHit::None);
    assert!(tiers.fast.read(TEST_CLIENT).await?.is_empty());
    assert!(tiers.persistent.read(TEST_CLIENT).await?.is_empty());
    assert_eq!(directory.total_calls(), 0);
    Ok(())
}

// ============================================================================
// Directory Tier
// ============================================================================

#[tokio::test]
async fn test_pattern_policy_matches_admin_role_name() -> Result<(), anyhow::Error> {
    let tiers = Tiers::new();
    let directory = MockDirectory::with_groups(&[
        (TEST_GROUP_ADMIN_ROLE, TEST_ADMIN_ROLE_NAME),
        (TEST_GROUP_TEST_ROLE, TEST_TEST_ROLE_NAME),
    ]);
    let resolver = tiers.resolver(
        Arc::new(directory.clone()),
        MembershipPolicy::pattern(TEST_ADMIN_PATTERN)?,
    );

    let admin = resolver
        .resolve(TEST_CLIENT, &groups(&[TEST_GROUP_ADMIN_ROLE]), Some(TEST_TENANT_ID))
        .await?;
    assert!(admin.admin);
    assert_eq!(admin.tier, TierHit::Directory);
    assert_eq!(admin.matched_group_id.as_deref(), Some(TEST_GROUP_ADMIN_ROLE));

    let not_admin = resolver
        .resolve(TEST_CLIENT, &groups(&[TEST_GROUP_TEST_ROLE]), Some(TEST_TENANT_ID))
        .await?;
    assert!(!not_admin.admin);
    assert_eq!(not_admin.tier, TierHit::None);
    assert!(not_admin.matched_group_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_directory_match_is_served_from_fast_tier_next_time() -> Result<(), anyhow::Error> {
    let tiers = Tiers::new();
    let directory = MockDirectory::with_groups(&[
        (TEST_GROUP_UNRELATED, TEST_TEST_ROLE_NAME),
        (TEST_GROUP_ADMIN_ROLE, TEST_ADMIN_ROLE_NAME),
    ]);
    let resolver = tiers.resolver(
        Arc::new(directory.clone()),
        MembershipPolicy::pattern(TEST_ADMIN_PATTERN)?,
    );
    let candidates = groups(&[TEST_GROUP_UNRELATED, TEST_GROUP_ADMIN_ROLE]);

    let first = resolver.resolve(TEST_CLIENT, &candidates, Some(TEST_TENANT_ID)).await?;
    assert_eq!(first.tier, TierHit::Directory);
    assert_eq!(first.matched_group_id.as_deref(), Some(TEST_GROUP_ADMIN_ROLE));
    assert!(first.backfill_errors.is_empty());
    assert_eq!(tiers.fast.count(TEST_CLIENT, TEST_GROUP_ADMIN_ROLE).await?, 1);
    assert_eq!(
        tiers.persistent.count(TEST_CLIENT, TEST_GROUP_ADMIN_ROLE).await?,
        1
    );

    let calls_after_first = directory.total_calls();
    let second = resolver.resolve(TEST_CLIENT, &candidates, Some(TEST_TENANT_ID)).await?;

    assert_eq!(second.tier, TierHit::Fast);
    assert_eq!(second.matched_group_id.as_deref(), Some(TEST_GROUP_ADMIN_ROLE));
    assert_eq!(directory.total_calls(), calls_after_first);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_directory_matches_tolerate_duplicate_rows() -> Result<(), anyhow::Error> {
    let tiers = Tiers::new();
    let directory = MockDirectory::with_groups(&[(TEST_ADMIN_GROUP, "DefaultAdmin")]);
    let resolver = Arc::new(tiers.resolver(
        Arc::new(directory),
        MembershipPolicy::exact_id("DefaultAdmin"),
    ));
    let candidates = groups(&[TEST_ADMIN_GROUP]);

    let (a, b) = tokio::join!(
        resolver.resolve(TEST_CLIENT, &candidates, Some(TEST_TENANT_ID)),
        resolver.resolve(TEST_CLIENT, &candidates, Some(TEST_TENANT_ID))
    );

    assert!(a?.admin);
    assert!(b?.admin);
    assert!(tiers.persistent.count(TEST_CLIENT, TEST_ADMIN_GROUP).await? >= 1);
    Ok(())
}

// ============================================================================
// Graph Directory
// ============================================================================

async fn mount_token_endpoint(server: &MockServer, tenant: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{tenant}/oauth2/v2.0/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "graph-service-token"
        })))
        .mount(server)
        .await;
}

fn graph_config(server: &MockServer) -> DirectoryConfig {
    DirectoryConfig {
        tenant_id: TEST_SERVICE_TENANT_ID.to_string(),
        client_id: "admin-check-app".to_string(),
        client_secret: SecretString::from("app-secret"),
        scopes: vec!["https://graph.microsoft.com/.default".to_string()],
        login_url: server.uri(),
        graph_url: format!("{}/v1.0", server.uri()),
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn test_graph_exact_id_match_backfills_both_tiers() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, TEST_TENANT_ID).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/groups"))
        .and(query_param("$filter", "displayName eq 'DefaultAdmin'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{ "id": TEST_ADMIN_GROUP, "displayName": "DefaultAdmin" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tiers = Tiers::new();
    let resolver = tiers.resolver(
        Arc::new(GraphDirectory::from_config(&graph_config(&server))),
        MembershipPolicy::exact_id("DefaultAdmin"),
    );

    let outcome = resolver
        .resolve(
            TEST_CLIENT,
            &groups(&[TEST_GROUP_UNRELATED, TEST_ADMIN_GROUP]),
            Some(TEST_TENANT_ID),
        )
        .await?;

    assert!(outcome.admin);
    assert_eq!(outcome.tier, TierHit::Directory);
    assert_eq!(outcome.matched_group_id.as_deref(), Some(TEST_ADMIN_GROUP));
    assert!(outcome.backfill_errors.is_empty());
    assert_eq!(tiers.fast.count(TEST_CLIENT, TEST_ADMIN_GROUP).await?, 1);
    assert_eq!(tiers.persistent.count(TEST_CLIENT, TEST_ADMIN_GROUP).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_graph_pattern_policy_checks_names_in_order() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, TEST_TENANT_ID).await;
    for (id, name) in [
        (TEST_GROUP_TEST_ROLE, TEST_TEST_ROLE_NAME),
        (TEST_GROUP_ADMIN_ROLE, TEST_ADMIN_ROLE_NAME),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/groups/{id}")))
            .and(query_param("$select", "displayName"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "displayName": name })),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let tiers = Tiers::new();
    let resolver = tiers.resolver(
        Arc::new(GraphDirectory::from_config(&graph_config(&server))),
        MembershipPolicy::pattern(TEST_ADMIN_PATTERN)?,
    );

    let outcome = resolver
        .resolve(
            TEST_CLIENT,
            &groups(&[TEST_GROUP_TEST_ROLE, TEST_GROUP_ADMIN_ROLE]),
            Some(TEST_TENANT_ID),
        )
        .await?;

    assert!(outcome.admin);
    assert_eq!(outcome.matched_group_id.as_deref(), Some(TEST_GROUP_ADMIN_ROLE));
    Ok(())
}

#[tokio::test]
async fn test_graph_ambiguous_admin_group_is_consistency_error() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, TEST_TENANT_ID).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                { "id": "g-1", "displayName": "DefaultAdmin" },
                { "id": "g-2", "displayName": "DefaultAdmin" }
            ]
        })))
        .mount(&server)
        .await;

    let tiers = Tiers::new();
    let resolver = tiers.resolver(
        Arc::new(GraphDirectory::from_config(&graph_config(&server))),
        MembershipPolicy::exact_id("DefaultAdmin"),
    );

    let err = resolver
        .resolve(TEST_CLIENT, &groups(&["g-1"]), Some(TEST_TENANT_ID))
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::DirectoryConsistency(_)));
    assert!(!err.is_infrastructure());
}

#[tokio::test]
async fn test_graph_outage_is_not_a_denial() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, TEST_TENANT_ID).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": { "code": "serviceNotAvailable", "message": "Try again later." }
        })))
        .mount(&server)
        .await;

    let tiers = Tiers::new();
    let resolver = tiers.resolver(
        Arc::new(GraphDirectory::from_config(&graph_config(&server))),
        MembershipPolicy::pattern(TEST_ADMIN_PATTERN).unwrap(),
    );

    let err = resolver
        .resolve(TEST_CLIENT, &groups(&[TEST_GROUP_ADMIN_ROLE]), Some(TEST_TENANT_ID))
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::DirectoryLookup(_)));
    assert!(err.is_infrastructure());
    assert!(tiers.fast.read(TEST_CLIENT).await.unwrap().is_empty());
}
