//! Fixed test IDs for deterministic tests
//!
//! All test IDs are deterministic to ensure reproducible test results.

// Clients
pub const TEST_CLIENT: &str = "CLIENT4";
pub const TEST_CLIENT_OTHER: &str = "CLIENT7";

// Group ids
pub const TEST_ADMIN_GROUP: &str = "ADMINGROUP";
pub const TEST_GROUP_ADMIN_ROLE: &str = "5b7a9c1e-0000-4000-8000-00000000a001";
pub const TEST_GROUP_TEST_ROLE: &str = "5b7a9c1e-0000-4000-8000-00000000b001";
pub const TEST_GROUP_UNRELATED: &str = "5b7a9c1e-0000-4000-8000-00000000c001";

// Group display names
pub const TEST_ADMIN_ROLE_NAME: &str = "adminRole1";
pub const TEST_TEST_ROLE_NAME: &str = "testRole1";
pub const TEST_ADMIN_PATTERN: &str = "admin.*";

// Tenants
pub const TEST_TENANT_ID: &str = "72f988bf-86f1-41af-91ab-2d7cd011db47";
pub const TEST_SERVICE_TENANT_ID: &str = "0d2a3b4c-0000-4000-8000-000000000001";

// Signing key ids
pub const TEST_KEY_ID_1: &str = "test-key-2025-01";
pub const TEST_KEY_ID_2: &str = "test-key-2025-02";

// Subjects
pub const TEST_SUBJECT: &str = "AAAAAAAAAAAAAAAAAAAAAIkzqFVrSaSaFHy782bbtaQ";
