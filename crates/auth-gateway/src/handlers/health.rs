//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks the IdP JWKS and the session store

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Readiness probe response body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_store: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe handler.
///
/// Does not check any dependencies; failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 if the signing keys can be loaded and the session store
/// answers, 503 otherwise.
///
/// ## Security
///
/// Error messages are generic. The actual cause is logged server-side.
#[tracing::instrument(skip_all, name = "gw.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Check 1: JWKS reachable and non-empty (served from cache when fresh)
    match state.jwks_client.ensure_loaded().await {
        Ok(0) => {
            tracing::warn!(target: "gw.availability", "Readiness check failed: JWKS has no signing keys");
            return not_ready(Some("unavailable"), None);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(target: "gw.availability", error = %e, "Readiness check failed: JWKS unavailable");
            return not_ready(Some("unavailable"), None);
        }
    }

    // Check 2: session store
    if let Err(e) = state.session_store.ping().await {
        tracing::warn!(
            target: "gw.availability",
            backend = state.session_store.backend_name(),
            error = %e,
            "Readiness check failed: session store unavailable"
        );
        return not_ready(Some("available"), Some("unhealthy"));
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            jwks: Some("available"),
            session_store: Some("healthy"),
            error: None,
        }),
    )
}

fn not_ready(
    jwks: Option<&'static str>,
    session_store: Option<&'static str>,
) -> (StatusCode, Json<ReadinessResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadinessResponse {
            status: "not_ready",
            jwks,
            session_store,
            error: Some("Service dependencies unavailable".to_string()),
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[test]
    fn test_readiness_response_serialization() {
        let ready = ReadinessResponse {
            status: "ready",
            jwks: Some("available"),
            session_store: Some("healthy"),
            error: None,
        };

        let json = serde_json::to_string(&ready).unwrap();
        assert!(json.contains("\"status\":\"ready\""));
        assert!(json.contains("\"jwks\":\"available\""));
        assert!(!json.contains("\"error\""));

        let (status, Json(not_ready)) = not_ready(Some("unavailable"), None);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let json = serde_json::to_string(&not_ready).unwrap();
        assert!(json.contains("\"status\":\"not_ready\""));
        assert!(!json.contains("\"session_store\""));
        assert!(json.contains("\"error\":\"Service dependencies unavailable\""));
    }
}
