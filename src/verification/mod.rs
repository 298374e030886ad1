//! Email-domain verification for the nOAuth mitigation
//!
//! An attacker-controlled account can present a victim's email address in its
//! mutable profile fields, so the email claim alone must not be trusted for
//! account linking (<https://www.descope.com/blog/post/noauth>). This module
//! decides whether an identity's email domain can be trusted by
//! cross-checking it against the `userPrincipalName` domain and, when that
//! fails, against the provider-signed `xms_edov` claim in the ID token.

pub mod claims;
pub mod discovery;
pub mod jwks;

pub use claims::{JwtVerificationError, DOMAIN_VERIFIED_CLAIM};
pub use discovery::OidcDiscovery;
pub use jwks::{JsonWebKey, JsonWebKeySet};

use std::fmt;

use log::{debug, info, warn};

use crate::models::GraphIdentity;
use crate::oauth::{AccessToken, OAuthError};
use crate::settings::{DomainVerificationPolicy, ProviderSettings};

/// Terminal verification failure
///
/// Raised only after every trust check has failed; aborts the authentication
/// flow. The message is operator-facing and names both domains along with the
/// available remediations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainVerificationError {
    email_domain: Option<String>,
    principal_domain: Option<String>,
}

impl DomainVerificationError {
    #[must_use]
    pub fn new(email_domain: Option<String>, principal_domain: Option<String>) -> Self {
        Self {
            email_domain,
            principal_domain,
        }
    }

    #[must_use]
    pub fn email_domain(&self) -> Option<&str> {
        self.email_domain.as_deref()
    }

    #[must_use]
    pub fn principal_domain(&self) -> Option<&str> {
        self.principal_domain.as_deref()
    }
}

impl fmt::Display for DomainVerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let email_domain = self.email_domain.as_deref().unwrap_or("(none)");
        let principal_domain = self.principal_domain.as_deref().unwrap_or("(none)");
        writeln!(
            f,
            "The email domain '{email_domain}' is not a verified domain for this account."
        )?;
        writeln!(f, "You can either:")?;
        writeln!(
            f,
            "  * Update the user's email to match the principal domain '{principal_domain}'"
        )?;
        writeln!(
            f,
            "  * Skip verification on the '{email_domain}' domain (not recommended)"
        )?;
        write!(
            f,
            "  * Disable verification with `skip_domain_verification = true` (NOT RECOMMENDED!)"
        )
    }
}

impl std::error::Error for DomainVerificationError {}

/// Infrastructure failure inside the cryptographic-proof path
///
/// Never surfaced to callers: the engine downgrades it to "claim absent" so
/// that a verification-service outage cannot defeat the mitigation by
/// crashing the flow, while still rejecting the login. This type must never
/// wrap a [`DomainVerificationError`]; only fetch and signature failures are
/// swallowed.
#[derive(Debug)]
enum ProofError {
    Fetch(OAuthError),
    Jwt(JwtVerificationError),
}

impl fmt::Display for ProofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofError::Fetch(err) => write!(f, "{err}"),
            ProofError::Jwt(err) => write!(f, "{err}"),
        }
    }
}

impl From<OAuthError> for ProofError {
    fn from(err: OAuthError) -> Self {
        ProofError::Fetch(err)
    }
}

impl From<JwtVerificationError> for ProofError {
    fn from(err: JwtVerificationError) -> Self {
        ProofError::Jwt(err)
    }
}

/// Domain verification engine
///
/// Stateless across calls; each [`verify`](DomainVerifier::verify) invocation
/// is an independent sequence of checks performing at most three outbound
/// requests.
#[derive(Debug, Clone)]
pub struct DomainVerifier {
    oidc_config_url: String,
    common_jwks_url: String,
}

impl Default for DomainVerifier {
    fn default() -> Self {
        Self::from_settings(&ProviderSettings::default())
    }
}

impl DomainVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verifier with the endpoints configured for the provider
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            oidc_config_url: settings.oidc_config_url(),
            common_jwks_url: settings.common_jwks_url(),
        }
    }

    /// Decide whether the identity's email domain can be trusted
    ///
    /// The checks run in precedence order and short-circuit on the first
    /// success, so the network is only touched when the cheap checks fail:
    ///
    /// 1. The email domain equals the `userPrincipalName` domain. The
    ///    principal name is mutable but must always carry one of the
    ///    tenant's verified domains.
    /// 2. The policy skips verification globally.
    /// 3. The policy exempts this email domain.
    /// 4. The signed ID token carries a truthy `xms_edov` claim under a
    ///    verified signature (tenant key set first, common key set as
    ///    fallback).
    ///
    /// # Errors
    ///
    /// Returns a [`DomainVerificationError`] when no check succeeds; the
    /// identity must not be released to the application in that case
    pub async fn verify(
        &self,
        identity: &GraphIdentity,
        token: &AccessToken,
        policy: &DomainVerificationPolicy,
    ) -> Result<(), DomainVerificationError> {
        let email_domain = identity.email_domain();
        let principal_domain = identity.principal_domain();

        if let (Some(email), Some(principal)) = (email_domain, principal_domain) {
            if email == principal {
                debug!("Email domain '{email}' matches the principal domain");
                return Ok(());
            }
        }

        if policy.skips_all() {
            debug!("Domain verification disabled by policy");
            return Ok(());
        }

        if policy.exempts(email_domain) {
            debug!(
                "Email domain '{}' is exempt from verification",
                email_domain.unwrap_or_default()
            );
            return Ok(());
        }

        if self.domain_verified_claim(token).await {
            info!("Provider asserted a verified email domain via the signed ID token");
            return Ok(());
        }

        warn!(
            "Rejecting identity {}: email domain {email_domain:?} does not match principal domain {principal_domain:?} and no proof of domain ownership was found",
            identity.uid
        );

        Err(DomainVerificationError::new(
            email_domain.map(ToString::to_string),
            principal_domain.map(ToString::to_string),
        ))
    }

    /// Whether the ID token proves provider-side domain verification
    ///
    /// Fail closed: every infrastructure error reads as "claim absent" so a
    /// transient outage can never mint trust, and never crashes the flow.
    async fn domain_verified_claim(&self, token: &AccessToken) -> bool {
        let Some(id_token) = token.id_token() else {
            debug!("No ID token present; cryptographic domain proof unavailable");
            return false;
        };

        match self.signed_claim(id_token, token).await {
            Ok(verified) => verified,
            Err(err) => {
                debug!("Cryptographic domain proof failed: {err}");
                false
            }
        }
    }

    /// Verify the ID token and extract the domain-verification claim
    ///
    /// ID tokens for some account types are signed by the tenant-independent
    /// issuer whose keys are not listed in the organizations discovery
    /// document, so a token whose key is missing from the tenant set is
    /// retried against the fixed common key set before giving up.
    async fn signed_claim(&self, id_token: &str, token: &AccessToken) -> Result<bool, ProofError> {
        let discovery = discovery::resolve(token, &self.oidc_config_url).await?;
        let algorithms = &discovery.id_token_signing_alg_values_supported;

        let tenant_keys = jwks::fetch(token, &discovery.jwks_uri).await?;
        match claims::decode_and_verify(id_token, &tenant_keys, algorithms) {
            Ok(decoded) => Ok(claims::domain_verified(&decoded)),
            Err(err) => {
                debug!("Tenant key set did not verify the ID token ({err}); trying the common key set");
                let common_keys = jwks::fetch(token, &self.common_jwks_url).await?;
                let decoded = claims::decode_and_verify(id_token, &common_keys, algorithms)?;
                Ok(claims::domain_verified(&decoded))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{identity_with_domains, MockTransport, TokenSigner};
    use serde_json::json;
    use std::sync::Arc;

    const OIDC_URL: &str =
        "https://login.microsoftonline.com/organizations/v2.0/.well-known/openid-configuration";
    const TENANT_JWKS_URL: &str = "https://login.example.com/tenant/keys";
    const COMMON_JWKS_URL: &str =
        "https://login.microsoftonline.com/common/discovery/v2.0/keys";

    fn verifier() -> DomainVerifier {
        DomainVerifier::new()
    }

    #[tokio::test]
    async fn test_matching_domains_succeed_without_network() {
        let transport = Arc::new(MockTransport::new());
        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@example.com"));
        let token = MockTransport::access_token(&transport, None);

        let result = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_all_succeeds_without_network() {
        let transport = Arc::new(MockTransport::new());
        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, None);

        let result = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::SkipAll)
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exempt_domain_succeeds_without_network() {
        let transport = Arc::new(MockTransport::new());
        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, None);
        let policy = DomainVerificationPolicy::SkipListed(
            ["example.com".to_string()].into_iter().collect(),
        );

        let result = verifier().verify(&identity, &token, &policy).await;

        assert!(result.is_ok());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_exempt_domain_proceeds_to_proof_path() {
        let transport = Arc::new(MockTransport::new());
        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, Some("not-a-real-token"));
        let policy = DomainVerificationPolicy::SkipListed(
            ["other.com".to_string()].into_iter().collect(),
        );

        let result = verifier().verify(&identity, &token, &policy).await;

        assert!(result.is_err());
        assert!(transport.call_count() > 0);
    }

    #[tokio::test]
    async fn test_signed_claim_from_tenant_keys_succeeds() {
        let signer = TokenSigner::new("tenant-key");
        let id_token = signer.sign(&json!({ "email": "foo@example.com", "xms_edov": true }));

        let transport = Arc::new(MockTransport::new());
        transport.expect_json(
            OIDC_URL,
            json!({
                "jwks_uri": TENANT_JWKS_URL,
                "id_token_signing_alg_values_supported": ["RS256"]
            }),
        );
        transport.expect_json(TENANT_JWKS_URL, signer.key_set_json());

        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, Some(&id_token));

        let result = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_signed_claim_falls_back_to_common_keys() {
        let tenant_signer = TokenSigner::new("tenant-key");
        let common_signer = TokenSigner::with_alternate_key("common-key");
        let id_token =
            common_signer.sign(&json!({ "email": "foo@example.com", "xms_edov": true }));

        let transport = Arc::new(MockTransport::new());
        transport.expect_json(
            OIDC_URL,
            json!({
                "jwks_uri": TENANT_JWKS_URL,
                "id_token_signing_alg_values_supported": ["RS256"]
            }),
        );
        transport.expect_json(TENANT_JWKS_URL, tenant_signer.key_set_json());
        transport.expect_json(COMMON_JWKS_URL, common_signer.key_set_json());

        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, Some(&id_token));

        let result = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_falsy_claim_is_rejected() {
        let signer = TokenSigner::new("tenant-key");
        let id_token = signer.sign(&json!({ "email": "foo@example.com", "xms_edov": false }));

        let transport = Arc::new(MockTransport::new());
        transport.expect_json(
            OIDC_URL,
            json!({
                "jwks_uri": TENANT_JWKS_URL,
                "id_token_signing_alg_values_supported": ["RS256"]
            }),
        );
        transport.expect_json(TENANT_JWKS_URL, signer.key_set_json());

        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, Some(&id_token));

        let result = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_network_failure_degrades_to_rejection() {
        let transport = Arc::new(MockTransport::new());
        // No canned responses: every fetch fails

        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, Some("header.payload.signature"));

        let err = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await
            .unwrap_err();

        assert_eq!(err.email_domain(), Some("example.com"));
        assert_eq!(err.principal_domain(), Some("hackerman.biz"));
    }

    #[tokio::test]
    async fn test_error_message_names_both_domains() {
        let transport = Arc::new(MockTransport::new());
        let identity = identity_with_domains(Some("a@tenant.com"), Some("a@other.com"));
        let token = MockTransport::access_token(&transport, None);

        let err = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("tenant.com"));
        assert!(message.contains("other.com"));
        assert!(message.contains("skip_domain_verification"));
    }

    #[tokio::test]
    async fn test_missing_domains_are_a_mismatch() {
        let transport = Arc::new(MockTransport::new());
        let identity = identity_with_domains(None, None);
        let token = MockTransport::access_token(&transport, None);

        let result = verifier()
            .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_repeated_calls_yield_identical_outcomes() {
        let signer = TokenSigner::new("tenant-key");
        let id_token = signer.sign(&json!({ "xms_edov": "1" }));

        let transport = Arc::new(MockTransport::new());
        transport.expect_json(
            OIDC_URL,
            json!({
                "jwks_uri": TENANT_JWKS_URL,
                "id_token_signing_alg_values_supported": ["RS256"]
            }),
        );
        transport.expect_json(TENANT_JWKS_URL, signer.key_set_json());

        let identity = identity_with_domains(Some("foo@example.com"), Some("bar@hackerman.biz"));
        let token = MockTransport::access_token(&transport, Some(&id_token));
        let engine = verifier();

        for _ in 0..3 {
            let result = engine
                .verify(&identity, &token, &DomainVerificationPolicy::Enforce)
                .await;
            assert!(result.is_ok());
        }
    }
}
