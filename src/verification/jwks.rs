//! Signing key set retrieval
//!
//! Key sets are fetched fresh for every verification attempt. A stale cached
//! key would cause spurious rejections immediately after a provider-side key
//! rollover, so no cross-call cache is kept.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::oauth::{AccessToken, OAuthError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,         // Key type (RSA, EC, etc.)
    pub kid: Option<String>, // Key ID
    pub alg: Option<String>, // Algorithm (RS256, ES256, etc.)
    #[serde(rename = "use")]
    pub key_use: Option<String>, // "sig" for signing

    // RSA keys
    pub n: Option<String>, // Modulus
    pub e: Option<String>, // Exponent

    // EC keys
    pub crv: Option<String>, // Curve
    pub x: Option<String>,   // X coordinate
    pub y: Option<String>,   // Y coordinate
}

impl JsonWebKeySet {
    /// Look up a key by its key id
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys
            .iter()
            .find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// Fetch a key set from the given URL through the access token handle
///
/// # Errors
///
/// Returns an error if the request fails or the response is not a valid JWK
/// Set document
pub async fn fetch(token: &AccessToken, url: &str) -> Result<JsonWebKeySet, OAuthError> {
    debug!("Fetching JWKS from: {url}");

    let document: Value = token.get(url).await?;

    let key_set: JsonWebKeySet = serde_json::from_value(document)
        .map_err(|e| OAuthError::InvalidResponse(format!("Failed to parse JWKS: {e}")))?;

    debug!("Fetched {} signing keys", key_set.keys.len());
    Ok(key_set)
}
