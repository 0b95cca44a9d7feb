//! JWT utilities shared across the gateway crates.
//!
//! This module provides the pre-verification helpers used before and after
//! a signature check:
//! - Size limits for DoS prevention
//! - Header extraction (`alg` and optional `kid`) for JWKS lookup
//! - Time-window validation (`exp`/`nbf`) with zero clock skew
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Error messages are generic; details are logged at debug level
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, validate_time_window};
//!
//! let header = decode_header(token)?;
//! let jwk = match header.kid {
//!     Some(kid) => jwks.get_key(&kid).await?,
//!     None => select_by_algorithm(jwks.signing_keys().await?)?,
//! };
//! // ... verify signature ...
//! validate_time_window(claims.exp, claims.nbf, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before any base64 decoding or
/// cryptographic work. Typical IdP access tokens are 800-2000 bytes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// `exp` value meaning "this token never expires".
///
/// Long-lived service tokens are issued with `exp = 0`. Such tokens skip
/// every time-window check, including `nbf`.
pub const NEVER_EXPIRES: i64 = 0;

/// Errors that can occur during JWT pre-validation.
///
/// All variants share one client-facing message. The variant itself is only
/// for logs and tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `exp` is at or before the current time.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `nbf` is after the current time.
    #[error("The access token is invalid or expired")]
    NotYetValid,
}

/// The parts of a JOSE header needed to pick a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Signing algorithm as written in the header (e.g. "RS256").
    pub alg: String,

    /// Key ID used to select the JWK. Without one the key is chosen by
    /// algorithm and key type.
    pub kid: Option<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// Decode the JOSE header of a compact JWT without verifying anything.
///
/// Performs the size check first, then splits the token and decodes the
/// header segment.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` if the token is not three base64url segments with a
///   JSON header carrying `alg`
///
/// An empty `kid` is treated as absent.
pub fn decode_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .alg
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MalformedToken)?;

    let kid = header.kid.filter(|s| !s.is_empty());

    Ok(TokenHeader { alg, kid })
}

/// Validate `exp` and `nbf` against `now` with zero clock skew.
///
/// - `exp == 0` ([`NEVER_EXPIRES`]) passes unconditionally
/// - `exp <= now` is expired
/// - `nbf > now` is not yet valid
/// - absent claims are not checked
///
/// # Errors
///
/// Returns `Expired` or `NotYetValid`.
pub fn validate_time_window(
    exp: Option<i64>,
    nbf: Option<i64>,
    now: i64,
) -> Result<(), JwtValidationError> {
    if exp == Some(NEVER_EXPIRES) {
        return Ok(());
    }

    if let Some(exp) = exp {
        if exp <= now {
            tracing::debug!(target: "common.jwt", exp, now, "Token rejected: expired");
            return Err(JwtValidationError::Expired);
        }
    }

    if let Some(nbf) = nbf {
        if nbf > now {
            tracing::debug!(target: "common.jwt", nbf, now, "Token rejected: not yet valid");
            return Err(JwtValidationError::NotYetValid);
        }
    }

    Ok(())
}

/// Decode a base64url (unpadded) JWK member such as `n`, `e`, or `x`.
///
/// # Errors
///
/// Returns a decode error if the input is not valid base64url.
pub fn decode_jwk_member(value_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value_b64url)
}
