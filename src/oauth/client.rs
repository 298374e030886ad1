//! Authorization-code exchange client for the Microsoft identity platform
//!
//! This module handles authorization URL construction, the code-for-token
//! exchange, and the bearer-authenticated access token handle used by the
//! rest of the crate for provider API calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_json::Value;

use crate::oauth::scopes::normalize_scope;
use crate::oauth::OAuthError;
use crate::settings::ProviderSettings;

/// Transport seam for bearer-authenticated provider calls
///
/// The production implementation wraps a `reqwest` client; tests substitute a
/// recording mock so flows can be exercised without the network.
#[async_trait]
pub trait BearerTransport: Send + Sync {
    /// Perform an authenticated GET and parse the response as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the response status is not
    /// successful, or the body is not valid JSON
    async fn get_json(&self, url: &str, bearer: &str) -> Result<Value, OAuthError>;

    /// Perform a form POST and parse the response as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the response status is not
    /// successful, or the body is not valid JSON
    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<Value, OAuthError>;
}

/// Production transport backed by `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BearerTransport for HttpTransport {
    async fn get_json(&self, url: &str, bearer: &str) -> Result<Value, OAuthError> {
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| OAuthError::Network(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OAuthError::Network(format!(
                "Request to {url} failed with status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(format!("Failed to parse JSON from {url}: {e}")))
    }

    async fn post_form(&self, url: &str, form: &[(String, String)]) -> Result<Value, OAuthError> {
        debug!("POST {url}");

        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| OAuthError::Network(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OAuthError::TokenExchange(format!(
                "status {status}: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(format!("Failed to parse JSON from {url}: {e}")))
    }
}

/// Bearer access token handle returned by the code exchange
///
/// Exposes the raw token-exchange response parameters (including the
/// `id_token` when the provider issued one) and authenticated GETs against
/// provider endpoints.
#[derive(Clone)]
pub struct AccessToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    params: HashMap<String, Value>,
    transport: Arc<dyn BearerTransport>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token material stays out of debug output
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AccessToken {
    /// Build a token handle from raw token-exchange response parameters
    ///
    /// # Errors
    ///
    /// Returns an error if the `access_token` parameter is missing or not a
    /// string
    pub fn from_params(
        params: HashMap<String, Value>,
        transport: Arc<dyn BearerTransport>,
    ) -> Result<Self, OAuthError> {
        let access_token = params
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OAuthError::InvalidResponse("Token response is missing access_token".to_string())
            })?
            .to_string();

        let refresh_token = params
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        // Default to 1 hour if no expiration provided
        let expires_in = params
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(3600);
        let expires_at = Utc::now() + chrono::Duration::seconds(expires_in);

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            params,
            transport,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Raw token-exchange response parameters
    #[must_use]
    pub fn params(&self) -> &HashMap<String, Value> {
        &self.params
    }

    /// Signed ID token from the token-exchange response, when present
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.params.get("id_token").and_then(Value::as_str)
    }

    /// Perform a bearer-authenticated GET against a provider endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not valid JSON
    pub async fn get(&self, url: &str) -> Result<Value, OAuthError> {
        self.transport.get_json(url, &self.access_token).await
    }
}

/// Optional authorization request parameters
///
/// Mirrors the authorize options the Microsoft identity platform recognizes;
/// unset fields are omitted from the authorization URL.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub access_type: Option<String>,
    pub prompt: Option<String>,
    pub login_hint: Option<String>,
    pub domain_hint: Option<String>,
    pub response_mode: Option<String>,
    pub display: Option<String>,
}

/// Result of building an authorization request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    /// CSRF state embedded in the URL; the caller must persist it for the
    /// callback comparison
    pub state: String,
}

/// OAuth2 authorization-code client
pub struct GraphOAuthClient {
    client_id: String,
    client_secret: Option<String>,
    authorization_endpoint: String,
    token_endpoint: String,
    default_redirect_uri: Option<String>,
    default_scope: Option<String>,
    transport: Arc<dyn BearerTransport>,
}

impl GraphOAuthClient {
    /// Create a client from provider settings with the default HTTP transport
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is not configured
    pub fn new(settings: &ProviderSettings) -> Result<Self, OAuthError> {
        Self::with_transport(settings, Arc::new(HttpTransport::new()))
    }

    /// Create a client with a custom transport
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is not configured
    pub fn with_transport(
        settings: &ProviderSettings,
        transport: Arc<dyn BearerTransport>,
    ) -> Result<Self, OAuthError> {
        let client_id = settings.get_client_id().ok_or_else(|| {
            OAuthError::Configuration("Client ID not configured".to_string())
        })?;

        Ok(Self {
            client_id,
            client_secret: settings.get_client_secret(),
            authorization_endpoint: settings.authorization_endpoint(),
            token_endpoint: settings.token_endpoint(),
            default_redirect_uri: settings.redirect_uri.clone(),
            default_scope: settings.scope.clone(),
            transport,
        })
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn BearerTransport> {
        Arc::clone(&self.transport)
    }

    /// Build the authorization URL for the login redirect
    ///
    /// A random CSRF state is generated when none is supplied; the requested
    /// scope is normalized before it is placed on the URL.
    ///
    /// # Errors
    ///
    /// Returns an error if no redirect URI is available or the authorization
    /// endpoint is not a valid URL
    pub fn authorization_request(
        &self,
        params: &AuthorizeParams,
    ) -> Result<AuthorizationRequest, OAuthError> {
        let redirect_uri = params
            .redirect_uri
            .as_deref()
            .or(self.default_redirect_uri.as_deref())
            .ok_or_else(|| {
                OAuthError::Configuration("No redirect URI configured".to_string())
            })?;

        let scope = normalize_scope(
            params
                .scope
                .as_deref()
                .or(self.default_scope.as_deref())
                .unwrap_or_default(),
        );

        let state = params.state.clone().unwrap_or_else(generate_state);

        let mut url = url::Url::parse(&self.authorization_endpoint)
            .map_err(|e| OAuthError::Configuration(format!("Invalid authorization endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair(
                "access_type",
                params.access_type.as_deref().unwrap_or("offline"),
            );

        for (key, value) in [
            ("prompt", &params.prompt),
            ("login_hint", &params.login_hint),
            ("domain_hint", &params.domain_hint),
            ("response_mode", &params.response_mode),
            ("display", &params.display),
        ] {
            if let Some(value) = value {
                url.query_pairs_mut().append_pair(key, value);
            }
        }

        debug!("Built authorization URL with scope '{scope}'");

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
        })
    }

    /// Exchange an authorization code for an access token
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No redirect URI is available
    /// - The client secret is not configured
    /// - The token endpoint rejects the request
    /// - The token response is malformed
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<AccessToken, OAuthError> {
        let redirect_uri = redirect_uri
            .or(self.default_redirect_uri.as_deref())
            .ok_or_else(|| {
                OAuthError::Configuration("No redirect URI configured".to_string())
            })?;

        let client_secret = self.client_secret.as_deref().ok_or_else(|| {
            OAuthError::Configuration("Client secret not configured".to_string())
        })?;

        let form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), client_secret.to_string()),
        ];

        debug!("Exchanging authorization code at {}", self.token_endpoint);

        let response = self
            .transport
            .post_form(&self.token_endpoint, &form)
            .await?;

        let params: HashMap<String, Value> = match response {
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(OAuthError::InvalidResponse(format!(
                    "Token response is not a JSON object: {other}"
                )))
            }
        };

        AccessToken::from_params(params, Arc::clone(&self.transport))
    }
}

/// Generate a random alphanumeric CSRF state value
fn generate_state() -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider_settings() -> ProviderSettings {
        ProviderSettings {
            client_id: Some("test-client-id".to_string()),
            client_secret: Some("test-client-secret".to_string()),
            redirect_uri: Some("https://app.example.com/callback".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_client_id() {
        let settings = ProviderSettings::default();
        assert!(GraphOAuthClient::new(&settings).is_err());
    }

    #[test]
    fn test_authorization_request_contains_expected_parameters() {
        let client = GraphOAuthClient::new(&provider_settings()).unwrap();
        let request = client
            .authorization_request(&AuthorizeParams {
                scope: Some("User.Read".to_string()),
                state: Some("fixed-state".to_string()),
                login_hint: Some("foo@example.com".to_string()),
                ..Default::default()
            })
            .unwrap();

        let url = url::Url::parse(&request.url).unwrap();
        let pairs: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert_eq!(pairs["client_id"], "test-client-id");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/callback");
        assert_eq!(pairs["scope"], "https://graph.microsoft.com/User.Read");
        assert_eq!(pairs["state"], "fixed-state");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["login_hint"], "foo@example.com");
        assert!(!pairs.contains_key("prompt"));
        assert_eq!(request.state, "fixed-state");
    }

    #[test]
    fn test_authorization_request_generates_state() {
        let client = GraphOAuthClient::new(&provider_settings()).unwrap();
        let first = client
            .authorization_request(&AuthorizeParams::default())
            .unwrap();
        let second = client
            .authorization_request(&AuthorizeParams::default())
            .unwrap();

        assert_eq!(first.state.len(), 32);
        assert!(first.state.chars().all(char::is_alphanumeric));
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn test_authorization_request_requires_redirect_uri() {
        let settings = ProviderSettings {
            redirect_uri: None,
            ..provider_settings()
        };
        let client = GraphOAuthClient::new(&settings).unwrap();
        assert!(client
            .authorization_request(&AuthorizeParams::default())
            .is_err());
    }

    #[test]
    fn test_access_token_from_params() {
        let params: HashMap<String, Value> = [
            ("access_token".to_string(), json!("token-123")),
            ("refresh_token".to_string(), json!("refresh-456")),
            ("id_token".to_string(), json!("header.payload.signature")),
            ("expires_in".to_string(), json!(7200)),
        ]
        .into_iter()
        .collect();

        let token = AccessToken::from_params(params, Arc::new(HttpTransport::new())).unwrap();
        assert_eq!(token.access_token(), "token-123");
        assert_eq!(token.refresh_token(), Some("refresh-456"));
        assert_eq!(token.id_token(), Some("header.payload.signature"));
        assert!(token.expires_at() > Utc::now() + chrono::Duration::minutes(90));
    }

    #[test]
    fn test_access_token_requires_access_token_param() {
        let params: HashMap<String, Value> =
            [("id_token".to_string(), json!("abc"))].into_iter().collect();
        assert!(AccessToken::from_params(params, Arc::new(HttpTransport::new())).is_err());
    }

    #[test]
    fn test_access_token_debug_redacts_token() {
        let params: HashMap<String, Value> =
            [("access_token".to_string(), json!("super-secret"))]
                .into_iter()
                .collect();
        let token = AccessToken::from_params(params, Arc::new(HttpTransport::new())).unwrap();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
