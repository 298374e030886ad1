//! ID token decoding and signature verification
//!
//! Supports the signature schemes the Microsoft identity platform issues ID
//! tokens with (RS256, plus ES256 for completeness), verifying against a
//! caller-supplied key set restricted to the discovered algorithm list.

use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use p256::{
    ecdsa::{Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey},
    Sec1Point,
};
use rsa::{pkcs1v15::VerifyingKey, RsaPublicKey};
use sha2::Sha256;

use crate::verification::jwks::{JsonWebKey, JsonWebKeySet};

/// Claim asserting the provider has verified the account's email domain
///
/// Optional claim; it must be explicitly configured in the app registration.
pub const DOMAIN_VERIFIED_CLAIM: &str = "xms_edov";

#[derive(Debug)]
pub enum JwtVerificationError {
    InvalidToken(String),
    KeyNotFound(String),
    UnsupportedAlgorithm(String),
    SignatureInvalid,
    KeyDecodingFailed(String),
    CryptographicError(String),
}

impl std::fmt::Display for JwtVerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {kid}"),
            Self::UnsupportedAlgorithm(alg) => write!(f, "Unsupported algorithm: {alg}"),
            Self::SignatureInvalid => write!(f, "JWT signature verification failed"),
            Self::KeyDecodingFailed(msg) => write!(f, "Failed to decode key: {msg}"),
            Self::CryptographicError(msg) => write!(f, "Cryptographic error: {msg}"),
        }
    }
}

impl std::error::Error for JwtVerificationError {}

#[derive(Debug, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: Option<String>,
    pub kid: Option<String>,
}

/// Decode a compact JWT and verify its signature against the given key set
///
/// The token's algorithm must be a member of `algorithms` when the list is
/// non-empty. The signing key is located by the header's `kid`; a key id
/// absent from the set is reported as [`JwtVerificationError::KeyNotFound`],
/// which callers use to fall back to an alternate key set.
///
/// # Errors
///
/// Returns an error if the token is structurally invalid, uses a disallowed
/// or unsupported algorithm, names an unknown key, or fails signature
/// verification
pub fn decode_and_verify(
    token: &str,
    keys: &JsonWebKeySet,
    algorithms: &[String],
) -> Result<Value, JwtVerificationError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(JwtVerificationError::InvalidToken(
            "Invalid JWT format".to_string(),
        ));
    }

    let header = decode_header(parts[0])?;

    if !algorithms.is_empty() && !algorithms.iter().any(|alg| *alg == header.alg) {
        return Err(JwtVerificationError::UnsupportedAlgorithm(header.alg));
    }

    let kid = header.kid.as_deref().ok_or_else(|| {
        JwtVerificationError::InvalidToken("Token header is missing 'kid'".to_string())
    })?;

    let key = keys
        .find(kid)
        .ok_or_else(|| JwtVerificationError::KeyNotFound(kid.to_string()))?;

    verify_signature(&parts, &header.alg, key)?;

    decode_claims(parts[1])
}

/// Whether the decoded claims assert a provider-verified email domain
///
/// The provider has been observed emitting the claim as a boolean, a string,
/// and a number across token issuances, so all observed truthy encodings are
/// accepted: `true`, `"true"`, `1`, `"1"`.
#[must_use]
pub fn domain_verified(claims: &Value) -> bool {
    match claims.get(DOMAIN_VERIFIED_CLAIM) {
        Some(Value::Bool(verified)) => *verified,
        Some(Value::String(s)) => s == "true" || s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Decode JWT header from base64
fn decode_header(header_b64: &str) -> Result<JwtHeader, JwtVerificationError> {
    let header_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| JwtVerificationError::InvalidToken(format!("Invalid header encoding: {e}")))?;

    serde_json::from_slice(&header_bytes)
        .map_err(|e| JwtVerificationError::InvalidToken(format!("Invalid header JSON: {e}")))
}

/// Decode JWT claims from base64
fn decode_claims(claims_b64: &str) -> Result<Value, JwtVerificationError> {
    let claims_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|e| JwtVerificationError::InvalidToken(format!("Invalid claims encoding: {e}")))?;

    serde_json::from_slice(&claims_bytes)
        .map_err(|e| JwtVerificationError::InvalidToken(format!("Invalid claims JSON: {e}")))
}

/// Verify JWT signature cryptographically
fn verify_signature(
    parts: &[&str],
    algorithm: &str,
    public_key: &JsonWebKey,
) -> Result<(), JwtVerificationError> {
    let signing_input = format!("{}.{}", parts[0], parts[1]);

    let signature_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|e| {
            JwtVerificationError::InvalidToken(format!("Invalid signature encoding: {e}"))
        })?;

    match algorithm {
        "RS256" => verify_rsa_signature(&signing_input, &signature_bytes, public_key),
        "ES256" => verify_ecdsa_signature(&signing_input, &signature_bytes, public_key),
        alg => Err(JwtVerificationError::UnsupportedAlgorithm(alg.to_string())),
    }
}

/// Verify RSA signature (RS256)
fn verify_rsa_signature(
    signing_input: &str,
    signature: &[u8],
    public_key: &JsonWebKey,
) -> Result<(), JwtVerificationError> {
    use rsa::signature::Verifier;

    // Extract RSA components
    let n = public_key.n.as_ref().ok_or_else(|| {
        JwtVerificationError::KeyDecodingFailed("Missing RSA modulus (n)".to_string())
    })?;
    let e = public_key.e.as_ref().ok_or_else(|| {
        JwtVerificationError::KeyDecodingFailed("Missing RSA exponent (e)".to_string())
    })?;

    // Decode base64url components
    let n_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(n)
        .map_err(|e| {
            JwtVerificationError::KeyDecodingFailed(format!("Invalid modulus encoding: {e}"))
        })?;
    let e_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(e)
        .map_err(|e| {
            JwtVerificationError::KeyDecodingFailed(format!("Invalid exponent encoding: {e}"))
        })?;

    // Create RSA public key
    let rsa_key = RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n_bytes),
        rsa::BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| JwtVerificationError::KeyDecodingFailed(format!("Invalid RSA key: {e}")))?;

    let verifying_key = VerifyingKey::<Sha256>::new(rsa_key);
    verifying_key
        .verify(
            signing_input.as_bytes(),
            &rsa::pkcs1v15::Signature::try_from(signature).map_err(|e| {
                JwtVerificationError::CryptographicError(format!("Invalid signature format: {e}"))
            })?,
        )
        .map_err(|_| JwtVerificationError::SignatureInvalid)
}

/// Verify ECDSA signature (ES256)
fn verify_ecdsa_signature(
    signing_input: &str,
    signature: &[u8],
    public_key: &JsonWebKey,
) -> Result<(), JwtVerificationError> {
    use p256::ecdsa::signature::Verifier;

    // Extract ECDSA P-256 components
    let x = public_key.x.as_ref().ok_or_else(|| {
        JwtVerificationError::KeyDecodingFailed("Missing ECDSA x coordinate".to_string())
    })?;
    let y = public_key.y.as_ref().ok_or_else(|| {
        JwtVerificationError::KeyDecodingFailed("Missing ECDSA y coordinate".to_string())
    })?;

    // Decode coordinates
    let x_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(x)
        .map_err(|e| {
            JwtVerificationError::KeyDecodingFailed(format!("Invalid x coordinate: {e}"))
        })?;
    let y_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(y)
        .map_err(|e| {
            JwtVerificationError::KeyDecodingFailed(format!("Invalid y coordinate: {e}"))
        })?;

    // Create encoded point (uncompressed format: 0x04 + x + y)
    let mut point_bytes = vec![0x04];
    point_bytes.extend_from_slice(&x_bytes);
    point_bytes.extend_from_slice(&y_bytes);

    let encoded_point = Sec1Point::from_bytes(&point_bytes).map_err(|e| {
        JwtVerificationError::KeyDecodingFailed(format!("Invalid EC point: {e}"))
    })?;

    let verifying_key = EcdsaVerifyingKey::from_sec1_point(&encoded_point).map_err(|e| {
        JwtVerificationError::KeyDecodingFailed(format!("Invalid ECDSA key: {e}"))
    })?;

    // JOSE signatures are raw r||s; some issuers emit DER
    let signature = EcdsaSignature::from_slice(signature)
        .or_else(|_| EcdsaSignature::from_der(signature))
        .map_err(|e| {
            JwtVerificationError::CryptographicError(format!("Invalid signature format: {e}"))
        })?;

    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwtVerificationError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TokenSigner;
    use serde_json::json;

    #[test]
    fn test_verifies_valid_rs256_token() {
        let signer = TokenSigner::new("test-key");
        let token = signer.sign(&json!({ "sub": "user-1", DOMAIN_VERIFIED_CLAIM: true }));
        let keys = signer.key_set();

        let claims = decode_and_verify(&token, &keys, &["RS256".to_string()]).unwrap();
        assert_eq!(claims["sub"], json!("user-1"));
        assert!(domain_verified(&claims));
    }

    #[test]
    fn test_rejects_tampered_payload() {
        let signer = TokenSigner::new("test-key");
        let token = signer.sign(&json!({ "sub": "user-1" }));
        let keys = signer.key_set();

        // Swap the payload for a forged one, keeping header and signature
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"sub":"attacker"}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let result = decode_and_verify(&forged, &keys, &["RS256".to_string()]);
        assert!(matches!(
            result,
            Err(JwtVerificationError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_rejects_wrong_key() {
        let signer = TokenSigner::new("test-key");
        let other = TokenSigner::with_alternate_key("test-key");
        let token = signer.sign(&json!({ "sub": "user-1" }));

        // Same kid, different key material
        let result = decode_and_verify(&token, &other.key_set(), &["RS256".to_string()]);
        assert!(matches!(
            result,
            Err(JwtVerificationError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_unknown_kid_reports_key_not_found() {
        let signer = TokenSigner::new("tenant-key");
        let other = TokenSigner::new("common-key");
        let token = signer.sign(&json!({ "sub": "user-1" }));

        let result = decode_and_verify(&token, &other.key_set(), &["RS256".to_string()]);
        assert!(matches!(result, Err(JwtVerificationError::KeyNotFound(kid)) if kid == "tenant-key"));
    }

    #[test]
    fn test_algorithm_outside_allowed_list_is_rejected() {
        let signer = TokenSigner::new("test-key");
        let token = signer.sign(&json!({ "sub": "user-1" }));

        let result = decode_and_verify(&token, &signer.key_set(), &["ES256".to_string()]);
        assert!(matches!(
            result,
            Err(JwtVerificationError::UnsupportedAlgorithm(alg)) if alg == "RS256"
        ));
    }

    #[test]
    fn test_empty_algorithm_list_does_not_restrict() {
        let signer = TokenSigner::new("test-key");
        let token = signer.sign(&json!({ "sub": "user-1" }));

        assert!(decode_and_verify(&token, &signer.key_set(), &[]).is_ok());
    }

    #[test]
    fn test_malformed_tokens_are_invalid() {
        let keys = TokenSigner::new("test-key").key_set();

        for token in ["", "only.two", "not-base64.!!!.sig", "a.b.c.d"] {
            let result = decode_and_verify(token, &keys, &[]);
            assert!(
                matches!(result, Err(JwtVerificationError::InvalidToken(_))),
                "expected InvalidToken for {token:?}"
            );
        }
    }

    #[test]
    fn test_missing_kid_is_invalid() {
        let signer = TokenSigner::new("test-key");
        let token = signer.sign_without_kid(&json!({ "sub": "user-1" }));

        let result = decode_and_verify(&token, &signer.key_set(), &[]);
        assert!(matches!(result, Err(JwtVerificationError::InvalidToken(_))));
    }

    #[test]
    fn test_domain_verified_truthy_encodings() {
        for truthy in [json!(true), json!("true"), json!(1), json!("1")] {
            let claims = json!({ DOMAIN_VERIFIED_CLAIM: truthy });
            assert!(domain_verified(&claims), "expected truthy for {claims}");
        }
    }

    #[test]
    fn test_domain_verified_falsy_encodings() {
        for falsy in [
            json!(false),
            json!("false"),
            json!(0),
            json!("0"),
            json!(null),
            json!("yes"),
            json!(2),
        ] {
            let claims = json!({ DOMAIN_VERIFIED_CLAIM: falsy });
            assert!(!domain_verified(&claims), "expected falsy for {claims}");
        }
        assert!(!domain_verified(&json!({})));
    }
}
