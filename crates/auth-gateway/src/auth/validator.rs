//! Token validation against the IdP's published signing keys.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must equal the configured algorithm; `none` never parses
//! - `exp`/`nbf` are checked with zero clock skew, except `exp == 0` which
//!   never expires
//! - A token without `kid` is tried against every published key whose key
//!   type and `alg` fit the expected algorithm
//! - Failure causes are logged at debug level only

use crate::auth::claims::Claims;
use crate::auth::jwks::{Jwk, JwksClient, JwksError};
use crate::observability::metrics::record_token_validation;
use common::jwt::{decode_header, decode_jwk_member, validate_time_window};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

/// Why a token did not validate.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    /// No token was supplied.
    #[error("No token")]
    Empty,

    /// Malformed, wrongly signed, expired or not yet valid.
    #[error("The token is invalid or expired")]
    Invalid,

    /// The signing key set could not be fetched.
    #[error("Signing key set unavailable")]
    KeySetUnavailable,
}

impl ValidationFailure {
    fn as_label(self) -> &'static str {
        match self {
            ValidationFailure::Empty => "empty",
            ValidationFailure::Invalid => "invalid",
            ValidationFailure::KeySetUnavailable => "unavailable",
        }
    }
}

/// Which token a validator is responsible for; used in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Validates JWTs for one expected algorithm.
///
/// Access and refresh validators are separate instances sharing one
/// [`JwksClient`].
pub struct TokenValidator {
    jwks_client: Arc<JwksClient>,
    algorithm: Algorithm,
    kind: TokenKind,
}

impl TokenValidator {
    pub fn new(jwks_client: Arc<JwksClient>, algorithm: Algorithm, kind: TokenKind) -> Self {
        Self {
            jwks_client,
            algorithm,
            kind,
        }
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    ///
    /// - `Empty` for an empty token
    /// - `KeySetUnavailable` if the JWKS endpoint cannot be reached
    /// - `Invalid` for every other failure
    #[instrument(skip_all, fields(kind = self.kind.as_str()))]
    pub async fn validate(&self, token: &str) -> Result<Claims, ValidationFailure> {
        let start = Instant::now();
        let result = self.validate_inner(token).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(failure) => failure.as_label(),
        };
        record_token_validation(self.kind.as_str(), outcome, start.elapsed());

        result
    }

    async fn validate_inner(&self, token: &str) -> Result<Claims, ValidationFailure> {
        if token.is_empty() {
            return Err(ValidationFailure::Empty);
        }

        // 1. Header (includes size check via common::jwt)
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "gw.auth.validator", error = ?e, "Token header rejected");
            ValidationFailure::Invalid
        })?;

        // 2. Algorithm must match exactly
        let header_alg = Algorithm::from_str(&header.alg).map_err(|_| {
            tracing::debug!(target: "gw.auth.validator", alg = %header.alg, "Unsupported token algorithm");
            ValidationFailure::Invalid
        })?;
        if header_alg != self.algorithm {
            tracing::debug!(
                target: "gw.auth.validator",
                alg = %header.alg,
                expected = ?self.algorithm,
                "Token algorithm mismatch"
            );
            return Err(ValidationFailure::Invalid);
        }

        // 3. Signing key and signature
        let claims = match header.kid.as_deref() {
            Some(kid) => {
                let jwk = self.jwks_client.get_key(kid).await.map_err(|e| match e {
                    JwksError::Unavailable => ValidationFailure::KeySetUnavailable,
                    JwksError::UnknownKey => {
                        tracing::debug!(target: "gw.auth.validator", kid = %kid, "Token signed with unknown key");
                        ValidationFailure::Invalid
                    }
                })?;
                verify_signature(token, &jwk, self.algorithm)?
            }
            None => self.verify_with_any_key(token).await?,
        };

        // 4. Time window
        let now = chrono::Utc::now().timestamp();
        validate_time_window(claims.expires_at(), claims.not_before(), now).map_err(|e| {
            tracing::debug!(target: "gw.auth.validator", error = ?e, "Token time window rejected");
            ValidationFailure::Invalid
        })?;

        tracing::debug!(target: "gw.auth.validator", "Token validated successfully");
        Ok(claims)
    }

    /// Verify a token that names no key against each fitting published key.
    async fn verify_with_any_key(&self, token: &str) -> Result<Claims, ValidationFailure> {
        let keys = self
            .jwks_client
            .signing_keys()
            .await
            .map_err(|_| ValidationFailure::KeySetUnavailable)?;

        keys.iter()
            .filter(|jwk| key_fits(jwk, self.algorithm))
            .find_map(|jwk| verify_signature(token, jwk, self.algorithm).ok())
            .ok_or_else(|| {
                tracing::debug!(target: "gw.auth.validator", "No published key verifies token without kid");
                ValidationFailure::Invalid
            })
    }
}

/// JWK key type for `algorithm`; `None` for symmetric algorithms.
fn expected_kty(algorithm: Algorithm) -> Option<&'static str> {
    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Some("RSA"),
        Algorithm::ES256 | Algorithm::ES384 => Some("EC"),
        Algorithm::EdDSA => Some("OKP"),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
    }
}

/// Whether `jwk` can verify `algorithm` judging by `kty` and `alg` alone.
fn key_fits(jwk: &Jwk, algorithm: Algorithm) -> bool {
    let alg_fits = jwk
        .alg
        .as_deref()
        .map_or(true, |alg| Algorithm::from_str(alg).ok() == Some(algorithm));
    alg_fits && expected_kty(algorithm) == Some(jwk.kty.as_str())
}

/// Verify the signature with `jwk` and return the payload claims.
///
/// Time-based checks are disabled here; they run afterwards so the
/// `exp == 0` sentinel can be honored.
fn verify_signature(token: &str, jwk: &Jwk, algorithm: Algorithm) -> Result<Claims, ValidationFailure> {
    let decoding_key = decoding_key(jwk, algorithm)?;

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "gw.auth.validator", error = %e, "Token verification failed");
        ValidationFailure::Invalid
    })?;

    Ok(token_data.claims)
}

/// Build a decoding key from `jwk`, checking it fits `algorithm`.
fn decoding_key(jwk: &Jwk, algorithm: Algorithm) -> Result<DecodingKey, ValidationFailure> {
    if let Some(alg) = &jwk.alg {
        if Algorithm::from_str(alg).ok() != Some(algorithm) {
            tracing::warn!(target: "gw.auth.validator", alg = %alg, "JWK algorithm does not match expected algorithm");
            return Err(ValidationFailure::Invalid);
        }
    }

    let Some(kty) = expected_kty(algorithm) else {
        tracing::warn!(target: "gw.auth.validator", "Symmetric algorithms cannot be verified with a JWKS");
        return Err(ValidationFailure::Invalid);
    };
    if jwk.kty != kty {
        tracing::warn!(target: "gw.auth.validator", kty = %jwk.kty, expected = kty, "Unexpected JWK key type");
        return Err(ValidationFailure::Invalid);
    }

    let missing = |member: &str| {
        tracing::error!(target: "gw.auth.validator", member, "JWK missing required member");
        ValidationFailure::Invalid
    };
    let malformed = |e: jsonwebtoken::errors::Error| {
        tracing::error!(target: "gw.auth.validator", error = %e, "Invalid JWK key material");
        ValidationFailure::Invalid
    };

    match kty {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            DecodingKey::from_rsa_components(n, e).map_err(malformed)
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            DecodingKey::from_ec_components(x, y).map_err(malformed)
        }
        _ => {
            if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                tracing::warn!(target: "gw.auth.validator", "Unsupported OKP curve");
                return Err(ValidationFailure::Invalid);
            }
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let public_key = decode_jwk_member(x).map_err(|e| {
                tracing::error!(target: "gw.auth.validator", error = %e, "Invalid public key encoding");
                ValidationFailure::Invalid
            })?;
            Ok(DecodingKey::from_ed_der(&public_key))
        }
    }
}
