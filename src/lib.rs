#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the graphauth library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod models;
pub mod oauth;
pub mod settings;
pub mod strategy;
pub mod verification;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use models::{AuthenticationError, GraphIdentity};
pub use oauth::{AccessToken, AuthorizeParams, GraphOAuthClient};
pub use settings::{DomainVerificationPolicy, GraphAuthSettings};
pub use strategy::GraphStrategy;
pub use verification::{DomainVerificationError, DomainVerifier};
