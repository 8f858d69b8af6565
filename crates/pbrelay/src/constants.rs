use std::time::Duration;

/// Productboard public API root.
pub const API_BASE_URL: &str = "https://api.productboard.com";

/// Value sent in the `X-Version` header on every upstream call.
pub const API_VERSION: &str = "1";

/// Per-request timeout for upstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total attempts for a call that keeps failing with a transient error.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff delay; doubles on each further attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Record type of every feature created by the relay.
pub const FEATURE_TYPE: &str = "feature";

/// Status name assigned to every created feature.
pub const FEATURE_STATUS: &str = "Blocked";

/// Event types that trigger feature creation.
pub const COMPONENT_CREATED: &str = "component.created";
pub const COMPONENT_UPDATED: &str = "component.updated";

/// Unversioned `data.type` used by older webhook schemas.
pub const LEGACY_COMPONENT_TYPE: &str = "component";
