//! Common authentication data types
//!
//! This module provides the normalized identity record produced by a completed
//! login and the unified error type used across the authentication flow.

use crate::oauth::OAuthError;
use crate::verification::DomainVerificationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Normalized identity record built from the Microsoft Graph profile document
/// and the raw token-exchange response.
///
/// The record is immutable after extraction; the domain verification engine
/// inspects it by reference and a record that fails verification is never
/// handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIdentity {
    /// Stable Graph object id (`id` in the profile document)
    pub uid: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub nickname: Option<String>,
    /// Full profile document as returned by the provider
    pub raw_info: Value,
    /// Raw token-exchange response parameters (`id_token` included when present)
    pub params: HashMap<String, Value>,
    /// Client id the identity was issued to
    pub aud: Option<String>,
}

impl GraphIdentity {
    /// Domain portion of the email claim (substring after the last `@`)
    #[must_use]
    pub fn email_domain(&self) -> Option<&str> {
        domain_of(self.email.as_deref())
    }

    /// Domain portion of the `userPrincipalName` claim from the raw profile
    ///
    /// The principal name is mutable, but its domain must always be one of the
    /// tenant's verified domains, which makes it suitable for verifying domain
    /// membership even though it is unsuitable as a stable user identifier.
    #[must_use]
    pub fn principal_domain(&self) -> Option<&str> {
        domain_of(self.raw_info.get("userPrincipalName").and_then(Value::as_str))
    }
}

/// Extract the domain portion of an address-shaped claim
fn domain_of(value: Option<&str>) -> Option<&str> {
    let value = value?;
    let (_, domain) = value.rsplit_once('@')?;
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Common error type for authentication operations
///
/// This enum unifies the errors that can abort a login, making error handling
/// consistent for host applications.
#[derive(Debug)]
pub enum AuthenticationError {
    /// OAuth client errors (configuration, network, token exchange)
    OAuth(OAuthError),
    /// Domain verification rejected the identity (nOAuth mitigation)
    DomainVerification(DomainVerificationError),
    /// Identity record could not be built from the profile document
    Identity(String),
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationError::OAuth(err) => write!(f, "OAuth error: {err}"),
            AuthenticationError::DomainVerification(err) => {
                write!(f, "Domain verification failed: {err}")
            }
            AuthenticationError::Identity(msg) => write!(f, "Identity extraction failed: {msg}"),
        }
    }
}

impl std::error::Error for AuthenticationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthenticationError::OAuth(err) => Some(err),
            AuthenticationError::DomainVerification(err) => Some(err),
            AuthenticationError::Identity(_) => None,
        }
    }
}

impl From<OAuthError> for AuthenticationError {
    fn from(err: OAuthError) -> Self {
        AuthenticationError::OAuth(err)
    }
}

impl From<DomainVerificationError> for AuthenticationError {
    fn from(err: DomainVerificationError) -> Self {
        AuthenticationError::DomainVerification(err)
    }
}
