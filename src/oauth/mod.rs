//! OAuth2 client module
//!
//! This module provides the authorization-code exchange client for the
//! Microsoft identity platform, the bearer-authenticated access token handle,
//! scope normalization, and identity extraction from the Graph profile
//! document.

pub mod client;
pub mod identity;
pub mod scopes;

// Re-export the client surface
pub use client::{
    AccessToken, AuthorizationRequest, AuthorizeParams, BearerTransport, GraphOAuthClient,
    HttpTransport,
};

// Re-export identity extraction
pub use identity::IdentityExtractor;

// Re-export scope handling
pub use scopes::{normalize_scope, DEFAULT_SCOPE};

use std::fmt;

/// OAuth client errors
#[derive(Debug)]
pub enum OAuthError {
    Configuration(String),
    Network(String),
    InvalidResponse(String),
    TokenExchange(String),
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OAuthError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            OAuthError::Network(msg) => write!(f, "Network error: {msg}"),
            OAuthError::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
            OAuthError::TokenExchange(msg) => write!(f, "Token exchange failed: {msg}"),
        }
    }
}

impl std::error::Error for OAuthError {}
