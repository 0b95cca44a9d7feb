//! Resolved caller identity.

use crate::auth::claims::Claims;
use common::secret::REDACTED;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token set for the current caller plus the claims of its validated
/// access token.
///
/// `claims` is never persisted: an identity read back from a session store
/// carries no claims until its access token has been validated again.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(skip)]
    pub claims: Option<Claims>,
}

impl Identity {
    /// Identity built from a token pair, not yet validated.
    pub fn new(access_token: String, refresh_token: Option<String>, id_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            id_token,
            claims: None,
        }
    }

    /// Stateless identity from a validated bearer token.
    pub fn bearer(access_token: String, claims: Claims) -> Self {
        Self {
            access_token,
            refresh_token: None,
            id_token: None,
            claims: Some(claims),
        }
    }

    /// Attach the claims of the (freshly validated) access token.
    #[must_use]
    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Whether the validated claims carry `authority`.
    pub fn has_authority(&self, authority: &str) -> bool {
        self.claims
            .as_ref()
            .is_some_and(|claims| claims.has_authority(authority))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("access_token", &REDACTED)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| REDACTED))
            .field("id_token", &self.id_token.as_ref().map(|_| REDACTED))
            .field("claims", &self.claims)
            .finish()
    }
}
