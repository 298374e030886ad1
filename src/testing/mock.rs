//! Mock objects and fake implementations for testing
//!
//! Provides a recording [`BearerTransport`] so authentication flows can be
//! exercised without the network, including zero-call assertions for the
//! short-circuiting verification checks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::oauth::{AccessToken, BearerTransport, OAuthError};

use super::constants::TEST_ACCESS_TOKEN;

/// Recording transport with canned JSON responses
///
/// Responses are keyed by URL and replayed on every matching request; a
/// request with no canned response fails with a network error, which doubles
/// as the outage fixture for fail-closed tests.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Value>>,
    form_responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned JSON response for a GET URL
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned
    pub fn expect_json(&self, url: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
    }

    /// Register a canned JSON response for a form POST URL
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned
    pub fn expect_form_json(&self, url: &str, body: Value) {
        self.form_responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
    }

    /// Number of requests performed so far
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests performed so far, in order (`GET url` / `POST url`)
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Build an access token handle backed by this transport
    ///
    /// # Panics
    ///
    /// Panics if the token parameters are rejected, which cannot happen for
    /// the fixed fixture parameters
    #[must_use]
    pub fn access_token(transport: &Arc<Self>, id_token: Option<&str>) -> AccessToken {
        let mut params: HashMap<String, Value> = HashMap::new();
        params.insert("access_token".to_string(), json!(TEST_ACCESS_TOKEN));
        params.insert("token_type".to_string(), json!("Bearer"));
        if let Some(id_token) = id_token {
            params.insert("id_token".to_string(), json!(id_token));
        }

        AccessToken::from_params(params, Arc::clone(transport) as Arc<dyn BearerTransport>)
            .expect("fixture token parameters are valid")
    }

    fn record(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl BearerTransport for MockTransport {
    async fn get_json(&self, url: &str, _bearer: &str) -> Result<Value, OAuthError> {
        self.record(format!("GET {url}"));

        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| OAuthError::Network(format!("No canned response for {url}")))
    }

    async fn post_form(&self, url: &str, _form: &[(String, String)]) -> Result<Value, OAuthError> {
        self.record(format!("POST {url}"));

        self.form_responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| OAuthError::TokenExchange(format!("No canned response for {url}")))
    }
}
