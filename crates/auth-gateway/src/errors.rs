//! Gateway error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are generic; the actual cause is logged
//! server-side where the error is created.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated, AccessDenied, LoginStateMismatch, LoginFailed: 401
/// - BadRequest: 400
/// - ServiceUnavailable: 503
/// - Internal: 500
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Login state mismatch")]
    LoginStateMismatch,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Unauthenticated(_)
            | GatewayError::AccessDenied(_)
            | GatewayError::LoginStateMismatch
            | GatewayError::LoginFailed(_) => 401,
            GatewayError::BadRequest(_) => 400,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::Unauthenticated(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", reason.clone())
            }
            GatewayError::AccessDenied(reason) => {
                (StatusCode::UNAUTHORIZED, "FORBIDDEN", reason.clone())
            }
            GatewayError::LoginStateMismatch => (
                StatusCode::UNAUTHORIZED,
                "INVALID_STATE",
                "The login attempt could not be verified".to_string(),
            ),
            GatewayError::LoginFailed(_) => (
                StatusCode::UNAUTHORIZED,
                "LOGIN_FAILED",
                "The login could not be completed".to_string(),
            ),
            GatewayError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            GatewayError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "gw.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"auth-gateway\""),
            );
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::Unauthenticated("x".into()).status_code(), 401);
        assert_eq!(GatewayError::AccessDenied("x".into()).status_code(), 401);
        assert_eq!(GatewayError::LoginStateMismatch.status_code(), 401);
        assert_eq!(GatewayError::LoginFailed("x".into()).status_code(), 401);
        assert_eq!(GatewayError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(GatewayError::ServiceUnavailable("x".into()).status_code(), 503);
        assert_eq!(GatewayError::Internal.status_code(), 500);
    }

    #[tokio::test]
    async fn test_unauthenticated_response_has_www_authenticate() {
        let response =
            GatewayError::Unauthenticated("Authentication required".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
        assert_eq!(body["error"]["message"], "Authentication required");
    }

    #[tokio::test]
    async fn test_login_failed_hides_cause() {
        let response =
            GatewayError::LoginFailed("invalid_grant: code expired".to_string()).into_response();

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "LOGIN_FAILED");
        assert!(!body.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_service_unavailable_hides_reason() {
        let response =
            GatewayError::ServiceUnavailable("redis connection refused".to_string())
                .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Service temporarily unavailable");
    }

    #[tokio::test]
    async fn test_internal_error_response() {
        let response = GatewayError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    }
}
