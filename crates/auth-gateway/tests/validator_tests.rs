//! Token validation integration tests.
//!
//! Validates signed tokens against a mocked JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_gateway::auth::{JwksClient, TokenKind, TokenValidator, ValidationFailure};
use gateway_test_utils::{jwks_json, token_with_header, MockIdp, TestKeypair, TestTokenBuilder};
use jsonwebtoken::Algorithm;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn access_validator(jwks_url: String) -> TokenValidator {
    TokenValidator::new(
        Arc::new(JwksClient::new(jwks_url)),
        Algorithm::EdDSA,
        TokenKind::Access,
    )
}

#[tokio::test]
async fn test_valid_token_claims_round_trip() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());
    let claims = TestTokenBuilder::new()
        .for_user("alice")
        .with_profile("Alice Example", "alice@example.com")
        .with_authorities(&["user", "admin"])
        .with_claim("tenant", json!("acme"))
        .build();

    let validated = validator.validate(&idp.keypair().sign(&claims)).await.unwrap();

    assert_eq!(validated.subject().as_deref(), Some("alice-id"));
    assert_eq!(validated.username().as_deref(), Some("alice"));
    assert_eq!(validated.email().as_deref(), Some("alice@example.com"));
    assert_eq!(validated.authorities(), vec!["user", "admin"]);
    assert_eq!(validated.get("tenant"), Some(&json!("acme")));
}

#[tokio::test]
async fn test_empty_and_malformed_tokens_fail() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());

    assert_eq!(validator.validate("").await, Err(ValidationFailure::Empty));
    for token in ["not-a-jwt", "a.b", "a.b.c", "....", "eyJhbGciOiJFZERTQSJ9.e30"] {
        assert_eq!(
            validator.validate(token).await,
            Err(ValidationFailure::Invalid),
            "{token}"
        );
    }
}

#[tokio::test]
async fn test_token_signed_by_unpublished_key_fails() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());
    let impostor = TestKeypair::new(99, "test-key-01");

    let token = impostor.sign(&TestTokenBuilder::new().build());

    assert_eq!(validator.validate(&token).await, Err(ValidationFailure::Invalid));
}

#[tokio::test]
async fn test_tampered_payload_fails() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());
    let token = idp
        .keypair()
        .sign(&TestTokenBuilder::new().with_authorities(&["user"]).build());

    let parts: Vec<&str> = token.split('.').collect();
    let forged_payload = {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let claims = TestTokenBuilder::new().with_authorities(&["admin"]).build();
        URL_SAFE_NO_PAD.encode(claims.to_string())
    };
    let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    assert_eq!(validator.validate(&forged).await, Err(ValidationFailure::Invalid));
}

#[tokio::test]
async fn test_expired_and_not_yet_valid_tokens_fail() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());

    let expired = idp.keypair().sign(&TestTokenBuilder::new().expired().build());
    let future = idp
        .keypair()
        .sign(&TestTokenBuilder::new().not_before_in(600).build());

    assert_eq!(validator.validate(&expired).await, Err(ValidationFailure::Invalid));
    assert_eq!(validator.validate(&future).await, Err(ValidationFailure::Invalid));
}

#[tokio::test]
async fn test_exp_zero_skips_time_checks() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());

    let token = idp.keypair().sign(
        &TestTokenBuilder::new()
            .never_expires()
            .not_before_in(600)
            .build(),
    );

    assert!(validator.validate(&token).await.is_ok());
}

#[tokio::test]
async fn test_unexpected_algorithms_fail() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());
    let claims = TestTokenBuilder::new().build();

    for alg in ["none", "HS256", "RS256"] {
        let token = token_with_header(&json!({"alg": alg, "kid": "test-key-01"}), &claims);
        assert_eq!(
            validator.validate(&token).await,
            Err(ValidationFailure::Invalid),
            "{alg}"
        );
    }
}

#[tokio::test]
async fn test_unknown_kid_fails() {
    let idp = MockIdp::start().await;
    let validator = access_validator(idp.jwks_url());

    let token = idp
        .keypair()
        .sign_with_kid(&TestTokenBuilder::new().build(), "rotated-away");

    assert_eq!(validator.validate(&token).await, Err(ValidationFailure::Invalid));
}

async fn jwks_server(keys: Vec<serde_json::Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_token_without_kid_verifies_against_single_key() {
    let keypair = TestKeypair::new(5, "unused");
    let server = jwks_server(vec![keypair.anonymous_jwk_json()]).await;
    let validator = access_validator(format!("{}/certs", server.uri()));

    let token = keypair.sign_without_kid(&json!({"sub": "svc", "exp": 0}));

    let claims = validator.validate(&token).await.unwrap();
    assert_eq!(claims.subject().as_deref(), Some("svc"));
}

#[tokio::test]
async fn test_token_without_kid_tries_every_fitting_key() {
    let other = TestKeypair::new(6, "other");
    let signer = TestKeypair::new(7, "signer");
    let mut rsa_key = other.jwk_json();
    rsa_key["kty"] = json!("RSA");
    rsa_key["alg"] = json!("RS256");
    let server = jwks_server(vec![rsa_key, other.jwk_json(), signer.jwk_json()]).await;
    let validator = access_validator(format!("{}/certs", server.uri()));

    let token = signer.sign_without_kid(&TestTokenBuilder::new().for_user("alice").build());

    let claims = validator.validate(&token).await.unwrap();
    assert_eq!(claims.username().as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_token_without_kid_from_unpublished_key_fails() {
    let server = jwks_server(vec![TestKeypair::new(8, "published").anonymous_jwk_json()]).await;
    let validator = access_validator(format!("{}/certs", server.uri()));

    let token = TestKeypair::new(9, "impostor").sign_without_kid(&TestTokenBuilder::new().build());

    assert_eq!(validator.validate(&token).await, Err(ValidationFailure::Invalid));
}

#[tokio::test]
async fn test_kid_lookup_ignores_keys_without_kid() {
    let keypair = TestKeypair::new(10, "key-10");
    let server = jwks_server(vec![keypair.anonymous_jwk_json()]).await;
    let validator = access_validator(format!("{}/certs", server.uri()));

    // The header names a key the IdP does not publish under that id
    let token = keypair.sign(&TestTokenBuilder::new().build());

    assert_eq!(validator.validate(&token).await, Err(ValidationFailure::Invalid));
}

#[tokio::test]
async fn test_unreachable_jwks_is_key_set_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let validator = access_validator(format!("{}/certs", server.uri()));

    let token = TestKeypair::new(1, "test-key-01").sign(&TestTokenBuilder::new().build());

    assert_eq!(
        validator.validate(&token).await,
        Err(ValidationFailure::KeySetUnavailable)
    );
}

#[tokio::test]
async fn test_key_rollover_picks_up_new_key() {
    let server = MockServer::start().await;
    let old_key = TestKeypair::new(1, "key-2023");
    let new_key = TestKeypair::new(2, "key-2024");

    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&old_key])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&old_key, &new_key])))
        .mount(&server)
        .await;

    let jwks = Arc::new(
        JwksClient::new(format!("{}/certs", server.uri())).with_min_refresh_interval(Duration::ZERO),
    );
    let validator = TokenValidator::new(jwks, Algorithm::EdDSA, TokenKind::Access);

    let claims = TestTokenBuilder::new().build();
    assert!(validator.validate(&old_key.sign(&claims)).await.is_ok());
    assert!(validator.validate(&new_key.sign(&claims)).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_validations_fetch_jwks_once() {
    let server = MockServer::start().await;
    let keypair = TestKeypair::new(1, "test-key-01");
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_json(&[&keypair]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let validator = Arc::new(access_validator(format!("{}/certs", server.uri())));
    let token = keypair.sign(&TestTokenBuilder::new().build());

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let validator = validator.clone();
            let token = token.clone();
            tokio::spawn(async move { validator.validate(&token).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
}
