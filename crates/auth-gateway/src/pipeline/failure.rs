//! Responses for denied requests.
//!
//! Browsers are sent to the login page and brought back afterwards; API
//! clients get a 401 that tells them where to log in.

use super::DenyReason;
use crate::errors::GatewayError;
use crate::session::Session;
use axum::http::{header, HeaderMap, HeaderValue, Uri};
use axum::response::{IntoResponse, Redirect, Response};

/// Default login entry point.
pub const LOGIN_PATH: &str = "/login";

/// Header carrying the login path on 401 responses.
pub const X_LOGIN_PATH: &str = "x-login-path";

/// Turns a policy denial into a response.
#[derive(Debug, Clone)]
pub struct FailureResponder {
    login_path: String,
}

impl Default for FailureResponder {
    fn default() -> Self {
        Self::new(LOGIN_PATH)
    }
}

impl FailureResponder {
    pub fn new(login_path: &str) -> Self {
        Self {
            login_path: login_path.to_string(),
        }
    }

    /// Build the response for a denied request.
    ///
    /// For a browser the original URI is stored as the session redirect
    /// target and the response is a 303 to the login path.
    pub async fn respond(
        &self,
        reason: DenyReason,
        headers: &HeaderMap,
        uri: &Uri,
        session: Option<&Session>,
    ) -> Response {
        if wants_html(headers) {
            if let Some(session) = session {
                let target = uri
                    .path_and_query()
                    .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
                if let Err(e) = session
                    .update(|record| record.redirect_target = Some(target))
                    .await
                {
                    tracing::warn!(target: "gw.pipeline", error = %e, "Failed to remember redirect target");
                }
            }
            return Redirect::to(&self.login_path).into_response();
        }

        let error = match reason {
            DenyReason::Unauthenticated => {
                GatewayError::Unauthenticated("Authentication required".to_string())
            }
            DenyReason::Forbidden => {
                GatewayError::AccessDenied("Insufficient authority for this resource".to_string())
            }
        };

        let mut response = error.into_response();
        if let Ok(value) = HeaderValue::from_str(&self.login_path) {
            response.headers_mut().insert(X_LOGIN_PATH, value);
        }
        response
    }
}

/// A browser navigation: accepts HTML and is not an XHR.
fn wants_html(headers: &HeaderMap) -> bool {
    let accepts_html = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"));

    let is_xhr = headers
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("XMLHttpRequest"));

    accepts_html && !is_xhr
}
