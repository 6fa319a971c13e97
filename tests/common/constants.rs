//! Shared constants for end-to-end tests

// ============================================================================
// Credentials expected by the mock document service
// ============================================================================

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_CHAIN_ID: &str = "chain-42";
pub const TEST_CUSTOMER_CODE: &str = "ACME";

// ============================================================================
// Timing
// ============================================================================

/// Request timeout used by clients pointed at the mock service
pub const CLIENT_TIMEOUT_SECS: u64 = 5;
