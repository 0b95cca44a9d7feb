//! Metrics definitions for the auth gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix for the gateway
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: known gateway paths, everything else is `/other`
//! - `kind`: access, refresh
//! - `outcome` / `status`: bounded by code
//! - `grant`: authorization_code, refresh_token

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Validation is local once keys are cached; slow tail is a JWKS fetch
        .set_buckets_for_metric(
            Matcher::Prefix("gw_token_validation".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set token validation buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gw_jwks_fetch".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gw_idp_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set IdP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures every response, including redirects to `/login` and
/// framework-level errors (404, 405, 415).
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/redirect/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        300..=399 => "redirect",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Proxied application paths are collapsed to `/other`.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/login" | "/authorize" | "/login/callback" | "/logout" | "/health" | "/ready"
        | "/metrics" | "/api/v1/account" | "/api/v1/account/tokens" => path.to_string(),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record a token validation.
///
/// Metric: `gw_token_validations_total`, `gw_token_validation_duration_seconds`
/// Labels: `kind` (access, refresh), `outcome` (success, empty, invalid, unavailable)
pub fn record_token_validation(kind: &str, outcome: &str, duration: Duration) {
    histogram!("gw_token_validation_duration_seconds",
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_token_validations_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a JWKS fetch.
///
/// Metric: `gw_jwks_fetches_total`, `gw_jwks_fetch_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_jwks_fetch(status: &str, duration: Duration) {
    histogram!("gw_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("gw_jwks_fetches_total",
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// IdP Client Metrics
// ============================================================================

/// Record a token endpoint request.
///
/// Metric: `gw_idp_requests_total`, `gw_idp_request_duration_seconds`
/// Labels: `grant` (authorization_code, refresh_token), `status`
/// (success, rejected, error)
pub fn record_idp_request(grant: &str, status: &str, duration: Duration) {
    histogram!("gw_idp_request_duration_seconds",
        "grant" => grant.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_idp_requests_total",
        "grant" => grant.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Login Flow and Pipeline Metrics
// ============================================================================

/// Record the outcome of a login callback.
///
/// Metric: `gw_logins_total`
/// Labels: `outcome` (success, state_mismatch, exchange_failed, store_failed)
pub fn record_login(outcome: &str) {
    counter!("gw_logins_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record which resolver produced the identity for a request, if any.
///
/// Metric: `gw_identity_resolutions_total`
/// Labels: `source` (session, header, refreshed, none)
pub fn record_identity_resolution(source: &str) {
    counter!("gw_identity_resolutions_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a session store failure.
///
/// Metric: `gw_session_store_errors_total`
/// Labels: `operation` (load, save, invalidate)
pub fn record_session_store_error(operation: &str) {
    counter!("gw_session_store_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they exercise the
    // recording paths without asserting values.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(5));
        record_http_request("GET", "/login", 303, Duration::from_millis(2));
        record_http_request("GET", "/app/dashboard", 401, Duration::from_millis(3));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(303), "redirect");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/login"), "/login");
        assert_eq!(normalize_endpoint("/login/callback"), "/login/callback");
        assert_eq!(normalize_endpoint("/api/v1/account"), "/api/v1/account");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/api/v1/orders/123"), "/other");
        assert_eq!(normalize_endpoint("/login/extra"), "/other");
    }

    #[test]
    fn test_record_auth_metrics() {
        record_token_validation("access", "success", Duration::from_micros(300));
        record_token_validation("refresh", "invalid", Duration::from_micros(100));
        record_jwks_fetch("success", Duration::from_millis(40));
        record_idp_request("authorization_code", "rejected", Duration::from_millis(80));
        record_login("state_mismatch");
        record_identity_resolution("none");
        record_session_store_error("load");
    }
}
