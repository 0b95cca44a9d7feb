//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating test token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_authorities(&["user"])
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    username: Option<String>,
    name: Option<String>,
    email: Option<String>,
    authorities: Vec<String>,
    exp: i64,
    iat: i64,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (valid for one hour)
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            username: None,
            name: None,
            email: None,
            authorities: Vec::new(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Set the subject and `preferred_username`
    pub fn for_user(mut self, username: &str) -> Self {
        self.sub = format!("{username}-id");
        self.username = Some(username.to_string());
        self
    }

    /// Set `name` and `email`
    pub fn with_profile(mut self, full_name: &str, email: &str) -> Self {
        self.name = Some(full_name.to_string());
        self.email = Some(email.to_string());
        self
    }

    /// Set the `authorities` claim
    pub fn with_authorities(mut self, authorities: &[&str]) -> Self {
        self.authorities = authorities.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Set expiration in seconds from now (negative for expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Expired one minute ago
    pub fn expired(self) -> Self {
        self.expires_in(-60)
    }

    /// `exp: 0`, which skips every time check
    pub fn never_expires(mut self) -> Self {
        self.exp = 0;
        self
    }

    /// Set `nbf` in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = json!({
            "sub": self.sub,
            "exp": self.exp,
            "iat": self.iat,
            "authorities": self.authorities,
        });

        let map = claims.as_object_mut().expect("claims are an object");
        if let Some(username) = self.username {
            map.insert("preferred_username".to_string(), json!(username));
        }
        if let Some(name) = self.name {
            map.insert("name".to_string(), json!(name));
        }
        if let Some(email) = self.email {
            map.insert("email".to_string(), json!(email));
        }
        if let Some(nbf) = self.nbf {
            map.insert("nbf".to_string(), json!(nbf));
        }
        map.extend(self.extra);

        claims
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
