//! Identity and API endpoint constants
//!
//! Production hosts are used when no environment override is configured.
//! The refresh window matches the server's 1-hour access token lifetime:
//! tokens are renewed once fewer than five minutes remain.

/// Production resource API host
pub const PRODUCTION_API_URL: &str = "https://api.bitwarden.com";

/// Production identity host
pub const PRODUCTION_IDENTITY_URL: &str = "https://identity.bitwarden.com";

/// Token endpoint path, relative to the identity base URL
pub const TOKEN_PATH: &str = "/connect/token";

/// Scopes requested on password grants
pub const IDENTITY_SCOPE: &str = "api offline_access";

/// Seconds before expiry at which an access token counts as stale
pub const REFRESH_WINDOW_SECS: u64 = 5 * 60;
