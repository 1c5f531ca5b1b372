/// Base name of the session cookie over plain HTTP
pub const SESSION_COOKIE_NAME: &str = "authjs.session-token";

/// Base name of the session cookie when the console is served over HTTPS
pub const SECURE_SESSION_COOKIE_NAME: &str = "__Secure-authjs.session-token";

/// Cookie holding the organization slug used for the tenant header
pub const ORGANIZATION_COOKIE_NAME: &str = "default_organization";

/// Tenant header attached to organization-scoped backend calls
pub const ORGANIZATION_HEADER: &str = "x-organization";

/// Request id header attached to every proxied backend call
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest encoded session slice stored in one cookie (leaves room for attributes under 4096)
pub const COOKIE_CHUNK_SIZE: usize = 3800;

/// Chunk indices always cleared, even when the request carried fewer chunks
pub const MIN_CLEARED_CHUNKS: usize = 10;

/// Assumed ceiling for a single `Set-Cookie` header line at proxies and browsers
pub const MAX_SET_COOKIE_HEADER_BYTES: usize = 8192;

/// Consecutive refresh attempts before the client forces a sign-out
pub const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// Default timeout for one HTTP request (30 seconds)
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default session lifetime (30 days)
pub const SESSION_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Page size for the device table
pub const DEVICE_PAGE_SIZE: u32 = 10;

/// Page size for the device model picker
pub const DEVICE_MODEL_PAGE_SIZE: u32 = 8;

/// Page size for the network server picker
pub const NETWORK_SERVER_PAGE_SIZE: u32 = 7;

/// HTTP status used when the inbound request was aborted before work started
pub const CLIENT_CLOSED_REQUEST: u16 = 499;
