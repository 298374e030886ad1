//! Identity extraction from the Graph profile document
//!
//! Maps the provider-specific `/v1.0/me` fields into the generic identity
//! record consumed by host applications and by the domain verification
//! engine.

use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use crate::models::{AuthenticationError, GraphIdentity};

/// Builder for the normalized identity record
pub struct IdentityExtractor;

impl IdentityExtractor {
    /// Build an identity record from a raw profile document
    ///
    /// # Errors
    ///
    /// Returns an error if the profile document is missing the stable `id`
    /// field
    pub fn extract(
        raw_info: &Value,
        params: HashMap<String, Value>,
        client_id: Option<&str>,
    ) -> Result<GraphIdentity, AuthenticationError> {
        let uid = raw_info
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AuthenticationError::Identity(
                    "Profile document is missing the 'id' field".to_string(),
                )
            })?
            .to_string();

        let first_name = string_field(raw_info, "givenName");
        let last_name = string_field(raw_info, "surname");
        let name = join_name(first_name.as_deref(), last_name.as_deref());

        let identity = GraphIdentity {
            uid,
            email: string_field(raw_info, "mail"),
            first_name,
            last_name,
            name,
            nickname: string_field(raw_info, "displayName"),
            raw_info: raw_info.clone(),
            params,
            aud: client_id.map(ToString::to_string),
        };

        debug!(
            "Extracted identity record for uid {} (email domain: {:?})",
            identity.uid,
            identity.email_domain()
        );

        Ok(identity)
    }
}

fn string_field(raw_info: &Value, field: &str) -> Option<String> {
    raw_info
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let joined = [first, last]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_full_profile() {
        let raw_info = json!({
            "id": "abc-123",
            "mail": "ada@example.com",
            "givenName": "Ada",
            "surname": "Lovelace",
            "displayName": "Ada L.",
            "userPrincipalName": "ada@example.com"
        });
        let params: HashMap<String, Value> =
            [("id_token".to_string(), json!("a.b.c"))].into_iter().collect();

        let identity =
            IdentityExtractor::extract(&raw_info, params, Some("client-1")).unwrap();

        assert_eq!(identity.uid, "abc-123");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(identity.first_name.as_deref(), Some("Ada"));
        assert_eq!(identity.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(identity.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(identity.nickname.as_deref(), Some("Ada L."));
        assert_eq!(identity.aud.as_deref(), Some("client-1"));
        assert_eq!(identity.params["id_token"], json!("a.b.c"));
        assert_eq!(identity.principal_domain(), Some("example.com"));
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let raw_info = json!({ "mail": "ada@example.com" });
        let result = IdentityExtractor::extract(&raw_info, HashMap::new(), None);
        assert!(matches!(result, Err(AuthenticationError::Identity(_))));
    }

    #[test]
    fn test_null_email_is_preserved_as_none() {
        let raw_info = json!({ "id": "abc-123", "mail": null });
        let identity = IdentityExtractor::extract(&raw_info, HashMap::new(), None).unwrap();
        assert_eq!(identity.email, None);
        assert_eq!(identity.email_domain(), None);
    }

    #[test]
    fn test_single_name_component() {
        let raw_info = json!({ "id": "abc-123", "givenName": "Ada" });
        let identity = IdentityExtractor::extract(&raw_info, HashMap::new(), None).unwrap();
        assert_eq!(identity.name.as_deref(), Some("Ada"));
        assert_eq!(identity.last_name, None);
    }
}
