//! OIDC discovery resolution
//!
//! The discovery document supplies the tenant JWKS location and the set of
//! signing algorithms the provider will use for ID tokens. It is fetched at
//! most once per verification call and never cached across calls.

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::oauth::{AccessToken, OAuthError};

/// Subset of the OpenID Connect discovery document used by verification
#[derive(Debug, Clone, Deserialize)]
pub struct OidcDiscovery {
    pub jwks_uri: String,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Fetch and parse the discovery document at the given URL
///
/// # Errors
///
/// Returns an error if the request fails or the document is missing the
/// required fields
pub async fn resolve(token: &AccessToken, url: &str) -> Result<OidcDiscovery, OAuthError> {
    debug!("Fetching OIDC discovery document from {url}");

    let document: Value = token.get(url).await?;

    let discovery: OidcDiscovery = serde_json::from_value(document).map_err(|e| {
        OAuthError::InvalidResponse(format!("Failed to parse discovery document: {e}"))
    })?;

    debug!("Discovery document fetched, JWKS URI: {}", discovery.jwks_uri);
    Ok(discovery)
}
