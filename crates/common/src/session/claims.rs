use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authentication session persisted in the session cookies
///
/// Holds the backend token pair plus whatever extra claims the backend returned
/// alongside it (for example `default_organization`). A session is never patched
/// in place: every refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for backend calls
    pub access: String,

    /// Token exchanged for a new pair at `/console/auth/refresh-token`
    pub refresh: String,

    /// Additional claims returned by the backend
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl Session {
    /// Create a session from a token pair
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
            claims: Map::new(),
        }
    }

    /// Attach an extra claim
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    /// Build a session from a backend token response
    ///
    /// Returns `None` when either token is missing or not a string.
    pub fn from_token_response(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let access = object.get("access")?.as_str()?.to_string();
        let refresh = object.get("refresh")?.as_str()?.to_string();

        let claims = object
            .iter()
            .filter(|(k, _)| k.as_str() != "access" && k.as_str() != "refresh")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            access,
            refresh,
            claims,
        })
    }

    /// Organization slug carried by the session, if any
    pub fn default_organization(&self) -> Option<&str> {
        self.claims
            .get("default_organization")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Signed payload: the session plus the registered JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SignedSession {
    #[serde(flatten)]
    pub session: Session,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}
