//! Unified testing utilities
//!
//! Consolidates the mock transport and test fixtures used by unit and
//! integration tests. Available to downstream integration tests through the
//! `testing` feature.
//!
//! - [`mock`] - Recording transport with canned responses
//! - [`fixtures`] - Identity records and locally signed ID tokens

pub mod fixtures;
pub mod mock;

pub use fixtures::{identity_with_domains, TokenSigner};
pub use mock::MockTransport;

/// Common test constants
pub mod constants {
    /// Default test email address
    pub const TEST_EMAIL: &str = "test@example.com";

    /// Default test access token value
    pub const TEST_ACCESS_TOKEN: &str = "test-access-token";

    /// Default test client id
    pub const TEST_CLIENT_ID: &str = "test-client-id";
}
