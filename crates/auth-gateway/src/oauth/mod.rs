//! OAuth 2.0 / OIDC client for the IdP token and logout endpoints.

mod client;

pub use client::{IdpError, OAuthClient, TokenResponse};

use axum::http::HeaderMap;

/// Path the IdP redirects back to after login.
pub const CALLBACK_PATH: &str = "/authorize";

/// Scheme and host the client used to reach the gateway.
///
/// Derived from `X-Forwarded-Proto`/`X-Forwarded-Host` when a proxy sets
/// them, otherwise from `Host` and the configured default scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: String,
}

impl RequestOrigin {
    pub fn from_headers(headers: &HeaderMap, default_scheme: &str) -> Self {
        let scheme = first_value(headers, "x-forwarded-proto")
            .unwrap_or(default_scheme)
            .to_string();
        let host = first_value(headers, "x-forwarded-host")
            .or_else(|| first_value(headers, "host"))
            .unwrap_or("localhost")
            .to_string();

        Self { scheme, host }
    }

    /// `{scheme}://{host}`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Redirect URI registered with the IdP.
    pub fn callback_uri(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.base_url())
    }
}

/// First entry of a possibly comma-separated header, trimmed.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
