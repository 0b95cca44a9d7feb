//! Login flow handlers.
//!
//! ```text
//! ANONYMOUS --/login--> PENDING_LOGIN --/authorize--> AUTHENTICATED
//!                                          |
//!                                          +--> REJECTED (401)
//! ```
//!
//! `/login` starts the authorization code flow with a fresh session id and
//! a random state; the callback checks that state before any token
//! exchange is attempted.

use crate::errors::GatewayError;
use crate::oauth::{OAuthClient, RequestOrigin};
use crate::observability::metrics::record_login;
use crate::routes::AppState;
use crate::session::{random_token, Session, SessionRecord};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Where the browser lands after login when no target was remembered.
const DEFAULT_TARGET: &str = "/";

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Local path to return to after login.
    pub redirect: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Handler for GET /login
///
/// Renews the session id, stores a fresh login state and redirects (303)
/// to the IdP authorization endpoint. A `redirect` hint replaces any
/// remembered target if it is a local path.
#[instrument(skip_all, name = "gw.login.start")]
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, GatewayError> {
    let previous = session.renew().await.map_err(|e| {
        tracing::error!(target: "gw.login", error = %e, "Failed to renew session");
        GatewayError::Internal
    })?;

    let login_state = random_token().map_err(|_| GatewayError::Internal)?;
    let redirect_target = query
        .redirect
        .filter(|target| is_local_path(target))
        .or(previous.redirect_target);

    let record = SessionRecord {
        identity: None,
        login_state: Some(login_state.clone()),
        redirect_target,
        persistent: false,
    };
    session
        .save(&record)
        .await
        .map_err(|e| GatewayError::ServiceUnavailable(format!("session store: {e}")))?;

    let origin = RequestOrigin::from_headers(&headers, &state.config.default_scheme);
    let login_uri = state.oauth_client.build_login_uri(&login_state, &origin);

    tracing::debug!(target: "gw.login", "Redirecting to IdP for login");
    Ok(Redirect::to(login_uri.as_str()))
}

/// Handler for GET /authorize and GET /login/callback
///
/// The stored state is consumed on every attempt. A missing or
/// mismatched state is rejected before the IdP is contacted.
#[instrument(skip_all, name = "gw.login.callback")]
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, GatewayError> {
    let mut record = session.load().await;
    let expected_state = record.login_state.take();
    if expected_state.is_some() {
        if let Err(e) = session.save(&record).await {
            tracing::warn!(target: "gw.login", error = %e, "Failed to clear login state");
        }
    }

    let state_matches = matches!(
        (expected_state.as_deref(), query.state.as_deref()),
        (Some(expected), Some(received)) if expected == received
    );
    if !state_matches {
        tracing::warn!(
            target: "gw.login",
            state_expected = expected_state.is_some(),
            state_received = query.state.is_some(),
            "Login callback state mismatch"
        );
        record_login("state_mismatch");
        return Err(GatewayError::LoginStateMismatch);
    }

    if let Some(error) = query.error {
        tracing::warn!(target: "gw.login", idp_error = %error, "IdP returned an authorization error");
        record_login("exchange_failed");
        return Err(GatewayError::LoginFailed(error));
    }

    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        tracing::warn!(target: "gw.login", "Login callback without authorization code");
        record_login("exchange_failed");
        return Err(GatewayError::LoginFailed("missing authorization code".to_string()));
    };

    let callback_uri = RequestOrigin::from_headers(&headers, &state.config.default_scheme).callback_uri();

    // Runs to completion even if the browser goes away
    let task = tokio::spawn(exchange_and_store(
        state.oauth_client.clone(),
        session,
        record,
        code,
        callback_uri,
    ));

    match task.await {
        Ok(Ok(target)) => Ok(Redirect::to(&target)),
        Ok(Err(e)) => Err(e),
        Err(e) => {
            tracing::error!(target: "gw.login", error = %e, "Code exchange task failed");
            Err(GatewayError::Internal)
        }
    }
}

/// Exchange the code, store the identity and return the redirect target.
async fn exchange_and_store(
    oauth: Arc<OAuthClient>,
    session: Session,
    mut record: SessionRecord,
    code: String,
    callback_uri: String,
) -> Result<String, GatewayError> {
    let identity = oauth.exchange_code(&code, &callback_uri).await.map_err(|e| {
        tracing::warn!(target: "gw.login", error = %e, "Authorization code exchange failed");
        record_login("exchange_failed");
        GatewayError::LoginFailed(e.to_string())
    })?;

    let target = record
        .redirect_target
        .take()
        .filter(|target| is_local_path(target))
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());
    record.identity = Some(identity);
    record.login_state = None;

    session.save(&record).await.map_err(|e| {
        record_login("store_failed");
        GatewayError::ServiceUnavailable(format!("session store: {e}"))
    })?;

    record_login("success");
    tracing::info!(target: "gw.login", "Login completed");
    Ok(target)
}

/// Handler for GET /logout
///
/// Invalidates the session (the cookie is removed) and redirects (303) to
/// the IdP end-session endpoint with the ID token as hint.
#[instrument(skip_all, name = "gw.login.logout")]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Redirect {
    let id_token = session
        .load()
        .await
        .identity
        .and_then(|identity| identity.id_token);
    session.invalidate().await;

    let origin = RequestOrigin::from_headers(&headers, &state.config.default_scheme);
    let logout_uri = state.oauth_client.logout_uri(id_token.as_deref(), &origin);

    tracing::debug!(target: "gw.login", "Session invalidated, redirecting to IdP logout");
    Redirect::to(logout_uri.as_str())
}

/// A path on this host: `/...` but not `//...` or `/\...`.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}
