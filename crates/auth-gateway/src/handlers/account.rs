//! Account handlers.
//!
//! `GET /api/v1/account` describes the caller; `POST /api/v1/account/tokens`
//! turns a token pair obtained elsewhere into a gateway session.

use crate::auth::{Claims, Identity, ValidationFailure};
use crate::errors::GatewayError;
use crate::pipeline::AuthContext;
use crate::routes::AppState;
use crate::session::{Session, SessionRecord};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Response for `/api/v1/account`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub id: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub authorities: Vec<String>,
}

impl UserInfo {
    fn from_claims(claims: &Claims) -> Self {
        Self {
            id: claims.subject(),
            username: claims.username(),
            full_name: claims.full_name(),
            first_name: claims.given_name(),
            last_name: claims.family_name(),
            email: claims.email(),
            authorities: claims.authorities().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Request body for `/api/v1/account/tokens`.
#[derive(Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Response for `/api/v1/account/tokens`.
#[derive(Debug, Serialize)]
pub struct SessionCreated {
    /// The new session id, as sent in the session cookie.
    pub session_id: String,
}

/// Handler for GET /api/v1/account
///
/// ```json
/// {
///   "id": "3f1c...",
///   "username": "alice",
///   "full_name": "Alice Example",
///   "first_name": "Alice",
///   "last_name": "Example",
///   "email": "alice@example.com",
///   "authorities": ["user"]
/// }
/// ```
#[instrument(skip_all, name = "gw.handlers.account")]
pub async fn get_account(ctx: AuthContext) -> Result<Json<UserInfo>, GatewayError> {
    let claims = ctx
        .identity()
        .and_then(|identity| identity.claims.as_ref())
        .ok_or_else(|| GatewayError::Unauthenticated("Authentication required".to_string()))?;

    Ok(Json(UserInfo::from_claims(claims)))
}

/// Handler for POST /api/v1/account/tokens
///
/// Validates the access token and stores the pair in a fresh session.
/// The session is persistent: it never idles out and lasts until logout.
///
/// - 200 with `{"session_id": ...}` and the session cookie
/// - 400 if the access token does not validate
/// - 503 if the signing keys cannot be fetched
#[instrument(skip_all, name = "gw.handlers.account_tokens")]
pub async fn exchange_tokens(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(pair): Json<TokenPair>,
) -> Result<Json<SessionCreated>, GatewayError> {
    let claims = match state.access_validator.validate(&pair.access_token).await {
        Ok(claims) => claims,
        Err(ValidationFailure::KeySetUnavailable) => {
            return Err(GatewayError::ServiceUnavailable(
                "signing keys unavailable".to_string(),
            ));
        }
        Err(failure) => {
            tracing::debug!(target: "gw.session", failure = ?failure, "Rejected token pair");
            return Err(GatewayError::BadRequest("Invalid access token".to_string()));
        }
    };

    session.renew().await.map_err(|e| {
        tracing::error!(target: "gw.session", error = %e, "Failed to renew session");
        GatewayError::Internal
    })?;

    let identity = Identity::new(pair.access_token, pair.refresh_token, pair.id_token).with_claims(claims);
    let record = SessionRecord {
        identity: Some(identity),
        persistent: true,
        ..SessionRecord::default()
    };
    session
        .save(&record)
        .await
        .map_err(|e| GatewayError::ServiceUnavailable(format!("session store: {e}")))?;

    let session_id = session.id().await.ok_or(GatewayError::Internal)?;
    Ok(Json(SessionCreated { session_id }))
}
