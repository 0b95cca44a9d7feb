//! Wiremock-backed identity provider.
//!
//! Serves a JWKS at `/certs` and lets tests script the token endpoint at
//! `/token`. The authorization and logout endpoints only need to exist as
//! URLs; browsers are never actually sent there in tests.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use std::collections::HashMap;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JWKS_PATH: &str = "/certs";
pub const TOKEN_PATH: &str = "/token";
pub const AUTH_PATH: &str = "/auth";
pub const LOGOUT_PATH: &str = "/logout";

pub const TEST_CLIENT_ID: &str = "test-gateway";
pub const TEST_CLIENT_SECRET: &str = "test-gateway-secret";

/// Mock IdP with one signing key.
pub struct MockIdp {
    server: MockServer,
    keypair: TestKeypair,
}

impl MockIdp {
    /// Start the server and publish the default signing key.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let keypair = TestKeypair::new(1, "test-key-01");

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&keypair])))
            .mount(&server)
            .await;

        Self { server, keypair }
    }

    /// Signing key published in the JWKS.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.uri())
    }

    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.uri())
    }

    pub fn auth_url(&self) -> String {
        format!("{}{AUTH_PATH}", self.uri())
    }

    pub fn logout_url(&self) -> String {
        format!("{}{LOGOUT_PATH}", self.uri())
    }

    /// Gateway configuration variables pointing at this IdP.
    ///
    /// EdDSA for both token kinds and a non-`Secure` cookie so a plain
    /// HTTP test client keeps it.
    pub fn config_vars(&self) -> HashMap<String, String> {
        HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("OIDC_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            ("OIDC_CLIENT_SECRET".to_string(), TEST_CLIENT_SECRET.to_string()),
            ("OIDC_AUTH_URL".to_string(), self.auth_url()),
            ("OIDC_TOKEN_URL".to_string(), self.token_url()),
            ("OIDC_JWKS_URL".to_string(), self.jwks_url()),
            ("OIDC_LOGOUT_URL".to_string(), self.logout_url()),
            ("ACCESS_TOKEN_ALGORITHM".to_string(), "EdDSA".to_string()),
            ("REFRESH_TOKEN_ALGORITHM".to_string(), "EdDSA".to_string()),
            ("SESSION_COOKIE_SECURE".to_string(), "false".to_string()),
        ])
    }

    /// Expect `times` authorization code exchanges for `code`.
    pub async fn expect_code_exchange(&self, code: &str, response: serde_json::Value, times: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Expect exactly `times` token endpoint calls of any kind.
    pub async fn expect_token_calls(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Expect `times` refresh grants for `refresh_token`.
    pub async fn expect_refresh(&self, refresh_token: &str, response: serde_json::Value, times: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Reject every token request with an OAuth error body.
    pub async fn reject_token_requests(&self, status: u16, error: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "error": error,
                "error_description": "rejected by mock IdP"
            })))
            .mount(&self.server)
            .await;
    }
}

/// Token endpoint success body.
pub fn token_response(
    access_token: &str,
    refresh_token: Option<&str>,
    id_token: Option<&str>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 300
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = serde_json::json!(refresh_token);
    }
    if let Some(id_token) = id_token {
        body["id_token"] = serde_json::json!(id_token);
    }
    body
}
