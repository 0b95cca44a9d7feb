//! IdP token endpoint client.
//!
//! # Security
//!
//! - The client authenticates with HTTP Basic (`client_id:client_secret`)
//! - Tokens and the client secret are never logged
//! - Every call has a request and connect timeout

use super::RequestOrigin;
use crate::auth::{Identity, TokenValidator};
use crate::config::Config;
use crate::observability::metrics::record_idp_request;
use common::secret::{ExposeSecret, SecretString, REDACTED};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Errors from IdP calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdpError {
    /// Network failure, timeout, or 5xx without an OAuth error body.
    #[error("Identity provider unavailable")]
    Unavailable,

    /// The IdP answered with an OAuth error.
    #[error("Identity provider rejected the request: {code}")]
    Rejected {
        status: u16,
        code: String,
        description: Option<String>,
    },

    /// The token response could not be parsed.
    #[error("Invalid token response")]
    InvalidResponse,

    /// The issued access token failed validation.
    #[error("Issued access token is invalid")]
    InvalidToken,

    /// Refresh was requested for an identity without a refresh token.
    #[error("No refresh token")]
    MissingRefreshToken,
}

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub id_token: Option<String>,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &REDACTED)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| REDACTED))
            .field("id_token", &self.id_token.as_ref().map(|_| REDACTED))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// OAuth error body (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for the IdP authorization, token and logout endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    http_client: Client,
    client_id: String,
    client_secret: SecretString,
    auth_url: Url,
    token_url: Url,
    logout_url: Url,
    post_logout_redirect_url: Option<String>,
    scope: String,
    access_validator: Arc<TokenValidator>,
}

impl OAuthClient {
    /// Create a client from the gateway configuration.
    ///
    /// `access_validator` checks the access token returned by a code
    /// exchange before it is accepted.
    pub fn new(config: &Config, access_validator: Arc<TokenValidator>) -> Self {
        let timeout = Duration::from_secs(config.idp_timeout_seconds);
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.oauth", error = %e, "Failed to build HTTP client with custom config, using defaults");
                Client::new()
            });

        Self {
            http_client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            logout_url: config.logout_url.clone(),
            post_logout_redirect_url: config.post_logout_redirect_url.clone(),
            scope: config.scope.clone(),
            access_validator,
        }
    }

    /// Authorization endpoint URL for the code flow.
    pub fn build_login_uri(&self, state: &str, origin: &RequestOrigin) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scope)
            .append_pair("state", state)
            .append_pair("redirect_uri", &origin.callback_uri());
        url
    }

    /// IdP logout URL (RP-initiated logout).
    ///
    /// Falls back to the gateway root when no post-logout redirect is
    /// configured.
    pub fn logout_uri(&self, id_token_hint: Option<&str>, origin: &RequestOrigin) -> Url {
        let post_logout_redirect = self
            .post_logout_redirect_url
            .clone()
            .unwrap_or_else(|| format!("{}/", origin.base_url()));

        let mut url = self.logout_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("post_logout_redirect_uri", &post_logout_redirect);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        url
    }

    /// Exchange an authorization code for a validated identity.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Rejected` / `InvalidResponse` from the token call
    /// - `InvalidToken` if the issued access token does not validate
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, callback_uri: &str) -> Result<Identity, IdpError> {
        let tokens = self
            .token_request(
                AUTHORIZATION_CODE_GRANT,
                &[
                    ("grant_type", AUTHORIZATION_CODE_GRANT),
                    ("code", code),
                    ("redirect_uri", callback_uri),
                ],
            )
            .await?;

        let claims = self
            .access_validator
            .validate(&tokens.access_token)
            .await
            .map_err(|e| {
                tracing::warn!(target: "gw.oauth", failure = ?e, "Access token from code exchange failed validation");
                IdpError::InvalidToken
            })?;

        tracing::debug!(target: "gw.oauth", "Authorization code exchanged");
        Ok(Identity::new(tokens.access_token, tokens.refresh_token, tokens.id_token).with_claims(claims))
    }

    /// Refresh an identity's tokens.
    ///
    /// The returned identity is not validated. A refresh or ID token the
    /// response omits is carried over from `identity`.
    ///
    /// # Errors
    ///
    /// - `MissingRefreshToken` if `identity` has no refresh token
    /// - `Unavailable` / `Rejected` / `InvalidResponse` from the token call
    #[instrument(skip_all)]
    pub async fn refresh(&self, identity: &Identity) -> Result<Identity, IdpError> {
        let refresh_token = identity
            .refresh_token
            .as_deref()
            .ok_or(IdpError::MissingRefreshToken)?;

        let tokens = self
            .token_request(
                REFRESH_TOKEN_GRANT,
                &[
                    ("grant_type", REFRESH_TOKEN_GRANT),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        tracing::debug!(target: "gw.oauth", "Tokens refreshed");
        Ok(Identity::new(
            tokens.access_token,
            tokens.refresh_token.or_else(|| identity.refresh_token.clone()),
            tokens.id_token.or_else(|| identity.id_token.clone()),
        ))
    }

    /// POST a grant to the token endpoint.
    async fn token_request(
        &self,
        grant: &'static str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, IdpError> {
        let start = Instant::now();

        let response = self
            .http_client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "gw.oauth", grant, error = %e, "Token endpoint request failed");
                record_idp_request(grant, "error", start.elapsed());
                IdpError::Unavailable
            })?;

        let status = response.status();

        if status.is_success() {
            let tokens = response.json::<TokenResponse>().await.map_err(|e| {
                tracing::error!(target: "gw.oauth", grant, error = %e, "Failed to parse token response");
                record_idp_request(grant, "error", start.elapsed());
                IdpError::InvalidResponse
            })?;
            record_idp_request(grant, "success", start.elapsed());
            return Ok(tokens);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(error) => {
                tracing::warn!(
                    target: "gw.oauth",
                    grant,
                    status = status.as_u16(),
                    error = %error.error,
                    error_description = error.error_description.as_deref().unwrap_or(""),
                    "Token endpoint rejected request"
                );
                record_idp_request(grant, "rejected", start.elapsed());
                Err(IdpError::Rejected {
                    status: status.as_u16(),
                    code: error.error,
                    description: error.error_description,
                })
            }
            Err(_) if status.is_server_error() => {
                tracing::warn!(target: "gw.oauth", grant, status = status.as_u16(), "Token endpoint returned server error");
                record_idp_request(grant, "error", start.elapsed());
                Err(IdpError::Unavailable)
            }
            Err(_) => {
                tracing::warn!(target: "gw.oauth", grant, status = status.as_u16(), "Token endpoint returned unexpected response");
                record_idp_request(grant, "rejected", start.elapsed());
                Err(IdpError::Rejected {
                    status: status.as_u16(),
                    code: "unknown_error".to_string(),
                    description: None,
                })
            }
        }
    }
}
