//! Fixed test IDs for deterministic tests
//!
//! Mirrors the service binding most tests run against: one legacy instance
//! on `auth.com` bound to client `clientId` and application `appId`.

// Issuer domains
pub const TEST_DOMAIN: &str = "auth.com";
pub const TEST_MODERN_DOMAIN: &str = "accounts.ias.test";

// Client and application IDs
pub const TEST_CLIENT_ID: &str = "clientId";
pub const TEST_APP_ID: &str = "appId";
pub const TEST_MODERN_CLIENT_ID: &str = "ias-client";
pub const TEST_OTHER_CLIENT_ID: &str = "someone-else";

// Zones / tenants
pub const TEST_ZONE_A: &str = "zone-a";
pub const TEST_ZONE_B: &str = "zone-b";
pub const TEST_TENANT_ID: &str = "tenant-1";

// Signing Key IDs
pub const TEST_KEY_ID_1: &str = "key-1";
pub const TEST_KEY_ID_2: &str = "key-2";

// Subjects
pub const TEST_USER_ALICE: &str = "alice";

// Endpoint paths
pub const LEGACY_JWKS_PATH: &str = "/token_keys";
pub const MODERN_JWKS_PATH: &str = "/oauth2/certs";
