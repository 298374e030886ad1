//! Scope normalization for Microsoft Graph
//!
//! Graph permission scopes are resource-qualified URLs; the OIDC scopes are
//! not. Requested scopes are accepted in the short form (`User.Read`) and
//! expanded to their fully qualified form before the authorization request.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Resource prefix applied to unqualified Graph scopes
pub const BASE_SCOPE_URL: &str = "https://graph.microsoft.com/";

/// Scope requested when the caller does not specify one
pub const DEFAULT_SCOPE: &str = "offline_access openid email profile User.Read";

/// OIDC scopes that are never resource-qualified
static BASE_SCOPES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["offline_access", "openid", "email", "profile"].into_iter().collect());

/// Normalize a raw scope string
///
/// Scopes may be separated by spaces or commas. Base OIDC scopes and scopes
/// that are already absolute URLs pass through unchanged; everything else is
/// prefixed with the Graph resource URL. An empty input yields the normalized
/// default scope.
#[must_use]
pub fn normalize_scope(raw: &str) -> String {
    let raw = if raw.trim().is_empty() {
        DEFAULT_SCOPE
    } else {
        raw
    };

    raw.split_whitespace()
        .flat_map(|chunk| chunk.split(','))
        .filter(|scope| !scope.is_empty())
        .map(|scope| {
            if scope.starts_with("http://")
                || scope.starts_with("https://")
                || BASE_SCOPES.contains(scope)
            {
                scope.to_string()
            } else {
                format!("{BASE_SCOPE_URL}{scope}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
