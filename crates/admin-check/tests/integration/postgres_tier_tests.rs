//! Resolution with PostgreSQL as the persistent tier.
//!
//! Requires DATABASE_URL; run with `--features postgres-tests`.

use admin_check::directory::mock::MockDirectory;
use admin_check::repositories::{AdminGroupRepository, MemoryRepository, PgRepository};
use admin_check::resolver::{MembershipPolicy, MembershipResolver, TierHit};
use admin_check_test_utils::*;
use sqlx::PgPool;
use std::sync::Arc;

#[sqlx::test(migrations = "../../migrations")]
async fn test_persistent_mapping_resolves_admin(pool: PgPool) -> Result<(), anyhow::Error> {
    let persistent = Arc::new(PgRepository::from_pool(pool));
    let directory = MockDirectory::new();
    let resolver = MembershipResolver::new(
        Arc::new(MemoryRepository::new()),
        persistent.clone(),
        Some(Arc::new(directory.clone())),
        MembershipPolicy::exact_id("DefaultAdmin"),
        None,
    );

    persistent.create(TEST_CLIENT, TEST_ADMIN_GROUP).await?;

    let outcome = resolver
        .resolve(TEST_CLIENT, &[TEST_ADMIN_GROUP.to_string()], None)
        .await?;

    assert!(outcome.admin);
    assert_eq!(outcome.tier, TierHit::Persistent);
    assert_eq!(directory.total_calls(), 0);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_directory_match_is_written_to_postgres(pool: PgPool) -> Result<(), anyhow::Error> {
    let persistent = Arc::new(PgRepository::from_pool(pool));
    let resolver = MembershipResolver::new(
        Arc::new(MemoryRepository::new()),
        persistent.clone(),
        Some(Arc::new(MockDirectory::with_groups(&[(
            TEST_GROUP_ADMIN_ROLE,
            TEST_ADMIN_ROLE_NAME,
        )]))),
        MembershipPolicy::pattern(TEST_ADMIN_PATTERN)?,
        Some(TEST_SERVICE_TENANT_ID.to_string()),
    );

    let outcome = resolver
        .resolve(TEST_CLIENT, &[TEST_GROUP_ADMIN_ROLE.to_string()], None)
        .await?;
    assert_eq!(outcome.tier, TierHit::Directory);

    let rows = persistent.read(TEST_CLIENT).await?;
    assert_eq!(rows.len(), 1);
    assert!(rows.iter().all(|r| r.group_id == TEST_GROUP_ADMIN_ROLE));
    Ok(())
}
