// Session types

use serde::{Deserialize, Serialize};

/// Storage key of the access token
pub const ACCESS_KEY: &str = "access";

/// Storage key of the refresh token
pub const REFRESH_KEY: &str = "refresh";

/// Access/refresh token pair returned by token issuance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Credentials for token issuance
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Account registration payload
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub password2: String,
}

/// Refresh request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Refresh response body
///
/// The server usually rotates `refresh` too; only `access` is kept.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    pub refresh: Option<String>,
}
