//! Test fixtures providing pre-built test objects
//!
//! Locally generated RSA keys and signed ID tokens let the verification path
//! run real signature checks without any provider involvement. Key
//! generation is expensive, so the key pairs are created once per test
//! binary and shared.

use std::collections::HashMap;

use base64::Engine as _;
use once_cell::sync::Lazy;
use rand::thread_rng;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::models::GraphIdentity;
use crate::verification::JsonWebKeySet;

static PRIMARY_TEST_KEY: Lazy<RsaPrivateKey> = Lazy::new(generate_test_key);
static ALTERNATE_TEST_KEY: Lazy<RsaPrivateKey> = Lazy::new(generate_test_key);

fn generate_test_key() -> RsaPrivateKey {
    let mut rng = thread_rng();
    RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA test key")
}

/// RS256 signer over a shared local test key
pub struct TokenSigner {
    kid: String,
    private_key: RsaPrivateKey,
}

impl TokenSigner {
    /// Create a signer using the shared primary test key
    #[must_use]
    pub fn new(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            private_key: PRIMARY_TEST_KEY.clone(),
        }
    }

    /// Create a signer using a different key pair, for wrong-key scenarios
    #[must_use]
    pub fn with_alternate_key(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            private_key: ALTERNATE_TEST_KEY.clone(),
        }
    }

    /// Sign a claims object into a compact RS256 JWT
    #[must_use]
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_header(
            &json!({ "alg": "RS256", "typ": "JWT", "kid": self.kid }),
            claims,
        )
    }

    /// Sign a token whose header carries no key id
    #[must_use]
    pub fn sign_without_kid(&self, claims: &Value) -> String {
        self.sign_with_header(&json!({ "alg": "RS256", "typ": "JWT" }), claims)
    }

    fn sign_with_header(&self, header: &Value, claims: &Value) -> String {
        let encode = |value: &Value| {
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(serde_json::to_vec(value).expect("serialize JWT segment"))
        };

        let signing_input = format!("{}.{}", encode(header), encode(claims));

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign(signing_input.as_bytes());
        let signature_b64 =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signature.to_bytes());

        format!("{signing_input}.{signature_b64}")
    }

    /// Public half of the signing key as a JWK Set document
    #[must_use]
    pub fn key_set_json(&self) -> Value {
        let public_key = self.private_key.to_public_key();
        json!({
            "keys": [{
                "kty": "RSA",
                "kid": self.kid,
                "use": "sig",
                "alg": "RS256",
                "n": base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .encode(public_key.n().to_bytes_be()),
                "e": base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .encode(public_key.e().to_bytes_be()),
            }]
        })
    }

    /// Public half of the signing key as a parsed key set
    ///
    /// # Panics
    ///
    /// Panics if the generated JWK document fails to parse, which would be a
    /// fixture bug
    #[must_use]
    pub fn key_set(&self) -> JsonWebKeySet {
        serde_json::from_value(self.key_set_json()).expect("fixture JWKS is valid")
    }
}

/// Identity record with the given email and principal-name claims
#[must_use]
pub fn identity_with_domains(email: Option<&str>, upn: Option<&str>) -> GraphIdentity {
    let mut raw_info = json!({
        "id": "00000000-0000-0000-0000-000000000001",
        "displayName": "Test User",
    });
    if let Some(email) = email {
        raw_info["mail"] = json!(email);
    }
    if let Some(upn) = upn {
        raw_info["userPrincipalName"] = json!(upn);
    }

    GraphIdentity {
        uid: "00000000-0000-0000-0000-000000000001".to_string(),
        email: email.map(ToString::to_string),
        first_name: None,
        last_name: None,
        name: None,
        nickname: Some("Test User".to_string()),
        raw_info,
        params: HashMap::new(),
        aud: Some(super::constants::TEST_CLIENT_ID.to_string()),
    }
}
