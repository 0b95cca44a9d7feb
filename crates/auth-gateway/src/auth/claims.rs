//! Claims extracted from a validated token.
//!
//! Claims are kept as the raw JSON object so IdP-specific members survive
//! untouched; typed accessors cover the members the gateway reads.

use common::secret::REDACTED;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Subject claim.
pub const SUBJECT_CLAIM: &str = "sub";

/// Username claim.
pub const USERNAME_CLAIM: &str = "preferred_username";

/// Display name claim.
pub const FULL_NAME_CLAIM: &str = "name";

/// Given name claim.
pub const GIVEN_NAME_CLAIM: &str = "given_name";

/// Family name claim.
pub const FAMILY_NAME_CLAIM: &str = "family_name";

/// Email claim.
pub const EMAIL_CLAIM: &str = "email";

/// Authority (role) set claim.
pub const AUTHORITIES_CLAIM: &str = "authorities";

/// Claims of a validated JWT.
///
/// Immutable once produced. The `sub` and `email` members are redacted in
/// Debug output.
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wrap a JSON object of claims.
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Raw claim value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Claim value rendered as a string (numbers and booleans included).
    pub fn string_claim(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Subject identifier (`sub`).
    pub fn subject(&self) -> Option<String> {
        self.string_claim(SUBJECT_CLAIM)
    }

    /// Username (`preferred_username`).
    pub fn username(&self) -> Option<String> {
        self.string_claim(USERNAME_CLAIM)
    }

    /// Display name (`name`).
    pub fn full_name(&self) -> Option<String> {
        self.string_claim(FULL_NAME_CLAIM)
    }

    /// Given name (`given_name`).
    pub fn given_name(&self) -> Option<String> {
        self.string_claim(GIVEN_NAME_CLAIM)
    }

    /// Family name (`family_name`).
    pub fn family_name(&self) -> Option<String> {
        self.string_claim(FAMILY_NAME_CLAIM)
    }

    /// Email address (`email`).
    pub fn email(&self) -> Option<String> {
        self.string_claim(EMAIL_CLAIM)
    }

    /// Authority set from the `authorities` array.
    ///
    /// Non-string entries are ignored; a missing or non-array claim yields
    /// an empty set.
    pub fn authorities(&self) -> Vec<&str> {
        self.0
            .get(AUTHORITIES_CLAIM)
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Check whether the authority set contains `authority`.
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities().iter().any(|a| *a == authority)
    }

    /// Expiry (`exp`) in seconds since the epoch.
    pub fn expires_at(&self) -> Option<i64> {
        numeric(self.0.get("exp"))
    }

    /// Not-before (`nbf`) in seconds since the epoch.
    pub fn not_before(&self) -> Option<i64> {
        numeric(self.0.get("nbf"))
    }

    /// The underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn numeric(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.0 {
            if name == SUBJECT_CLAIM || name == EMAIL_CLAIM {
                map.entry(name, &REDACTED);
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_accessors() {
        let claims = claims(json!({
            "sub": "user-123",
            "preferred_username": "alice",
            "name": "Alice Example",
            "given_name": "Alice",
            "family_name": "Example",
            "email": "alice@example.com",
            "authorities": ["user", "admin"],
            "exp": 1_900_000_000,
            "nbf": 1_700_000_000
        }));

        assert_eq!(claims.subject().as_deref(), Some("user-123"));
        assert_eq!(claims.username().as_deref(), Some("alice"));
        assert_eq!(claims.full_name().as_deref(), Some("Alice Example"));
        assert_eq!(claims.given_name().as_deref(), Some("Alice"));
        assert_eq!(claims.family_name().as_deref(), Some("Example"));
        assert_eq!(claims.email().as_deref(), Some("alice@example.com"));
        assert_eq!(claims.authorities(), vec!["user", "admin"]);
        assert_eq!(claims.expires_at(), Some(1_900_000_000));
        assert_eq!(claims.not_before(), Some(1_700_000_000));
    }

    #[test]
    fn test_has_authority() {
        let claims = claims(json!({"authorities": ["user", 42, "admin"]}));

        assert!(claims.has_authority("admin"));
        assert!(claims.has_authority("user"));
        assert!(!claims.has_authority("Admin"));
        assert!(!claims.has_authority("42"));
    }

    #[test]
    fn test_missing_or_malformed_authorities() {
        assert!(claims(json!({})).authorities().is_empty());
        assert!(claims(json!({"authorities": "admin"})).authorities().is_empty());
    }

    #[test]
    fn test_numeric_subject_is_stringified() {
        let claims = claims(json!({"sub": 42}));
        assert_eq!(claims.subject().as_deref(), Some("42"));
    }

    #[test]
    fn test_fractional_expiry_is_truncated() {
        let claims = claims(json!({"exp": 1_900_000_000.75}));
        assert_eq!(claims.expires_at(), Some(1_900_000_000));
    }

    #[test]
    fn test_round_trip_preserves_unknown_members() {
        let original = json!({"sub": "u", "tenant": {"id": 7}, "exp": 0});
        let claims = claims(original.clone());

        assert_eq!(serde_json::to_value(&claims).unwrap(), original);
    }

    #[test]
    fn test_debug_redacts_subject_and_email() {
        let claims = claims(json!({
            "sub": "secret-subject",
            "email": "alice@example.com",
            "preferred_username": "alice"
        }));

        let debug = format!("{claims:?}");
        assert!(!debug.contains("secret-subject"));
        assert!(!debug.contains("alice@example.com"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("alice"));
    }
}
