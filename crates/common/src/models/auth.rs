use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token pair returned by login, sign-up and refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access: String,
    pub refresh: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_organization: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Email/password sign-in payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Body of `POST /console/auth/refresh-token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// Social login start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLoginRequest {
    pub provider: String,
    pub callback_url: String,
}
