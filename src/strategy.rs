//! Authentication strategy orchestration
//!
//! Drives the OAuth2 handshake, builds the identity record from the Graph
//! profile document, and gates it through domain verification before it is
//! released to the caller. A rejected identity is never returned.

use std::sync::Arc;

use log::info;

use crate::models::{AuthenticationError, GraphIdentity};
use crate::oauth::{
    AccessToken, AuthorizationRequest, AuthorizeParams, BearerTransport, GraphOAuthClient,
    IdentityExtractor,
};
use crate::settings::GraphAuthSettings;
use crate::verification::DomainVerifier;

/// Microsoft Graph login strategy
pub struct GraphStrategy {
    settings: GraphAuthSettings,
    client: GraphOAuthClient,
    verifier: DomainVerifier,
}

impl GraphStrategy {
    /// Create a strategy from settings with the default HTTP transport
    ///
    /// # Errors
    ///
    /// Returns an error if the provider configuration is incomplete
    pub fn new(settings: GraphAuthSettings) -> Result<Self, AuthenticationError> {
        let client = GraphOAuthClient::new(&settings.provider)?;
        let verifier = DomainVerifier::from_settings(&settings.provider);
        Ok(Self {
            settings,
            client,
            verifier,
        })
    }

    /// Create a strategy with a custom transport
    ///
    /// # Errors
    ///
    /// Returns an error if the provider configuration is incomplete
    pub fn with_transport(
        settings: GraphAuthSettings,
        transport: Arc<dyn BearerTransport>,
    ) -> Result<Self, AuthenticationError> {
        let client = GraphOAuthClient::with_transport(&settings.provider, transport)?;
        let verifier = DomainVerifier::from_settings(&settings.provider);
        Ok(Self {
            settings,
            client,
            verifier,
        })
    }

    /// Build the authorization redirect for the login entry point
    ///
    /// # Errors
    ///
    /// Returns an error if no redirect URI is configured or the authorization
    /// endpoint is invalid
    pub fn authorization_request(
        &self,
        params: &AuthorizeParams,
    ) -> Result<AuthorizationRequest, AuthenticationError> {
        Ok(self.client.authorization_request(params)?)
    }

    /// Complete a login from an authorization-code callback
    ///
    /// Exchanges the code, fetches the profile document, builds the identity
    /// record, and runs the domain verification gate.
    ///
    /// # Errors
    ///
    /// Returns an error if the code exchange fails, the profile document is
    /// unusable, or domain verification rejects the identity
    pub async fn authenticate(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<GraphIdentity, AuthenticationError> {
        let token = self.client.exchange_code(code, redirect_uri).await?;
        self.identity_from_token(&token).await
    }

    /// Build and verify an identity record from an existing access token
    ///
    /// # Errors
    ///
    /// Returns an error if the profile request fails, the document is missing
    /// required fields, or domain verification rejects the identity
    pub async fn identity_from_token(
        &self,
        token: &AccessToken,
    ) -> Result<GraphIdentity, AuthenticationError> {
        let raw_info = token
            .get(&self.settings.provider.userinfo_endpoint())
            .await?;

        let identity = IdentityExtractor::extract(
            &raw_info,
            token.params().clone(),
            self.settings.provider.get_client_id().as_deref(),
        )?;

        self.verifier
            .verify(
                &identity,
                token,
                &self.settings.provider.skip_domain_verification,
            )
            .await?;

        info!("Authenticated identity {}", identity.uid);
        Ok(identity)
    }

    /// Whether a token audience belongs to this application
    ///
    /// Accepts the configured client id and any additional authorized client
    /// ids, for deployments that accept tokens minted for sibling
    /// applications.
    #[must_use]
    pub fn is_authorized_client(&self, aud: &str) -> bool {
        self.settings.provider.get_client_id().as_deref() == Some(aud)
            || self
                .settings
                .provider
                .authorized_client_ids
                .iter()
                .any(|id| id == aud)
    }
}
