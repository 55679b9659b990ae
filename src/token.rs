//! Bearer-token claims.
//!
//! The token is a JWT; only its payload segment is read, for the username
//! (`sub`) and role. Signature checking is the server's business.

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Decode the payload of `token`.
///
/// Accepts both padded and unpadded base64url, since issuers differ.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let payload = token
        .trim()
        .split('.')
        .nth(1)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ChatError::Token("expected three dot-separated segments".to_string()))?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ChatError::Token(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ChatError::Token(format!("payload is not valid claims JSON: {e}")))
}
