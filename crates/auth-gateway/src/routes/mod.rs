//! HTTP routes for the auth gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{JwksClient, TokenKind, TokenValidator};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{authenticate_request, http_metrics_middleware, session_middleware, SessionSettings};
use crate::oauth::OAuthClient;
use crate::pipeline::{
    AuthPipeline, FailureResponder, HeaderIdentityResolver, IdentityResolvers, PolicyChain,
    SessionIdentityResolver,
};
use crate::session::SessionStore;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Config,

    /// Signing key cache for the IdP JWKS.
    pub jwks_client: Arc<JwksClient>,

    /// Validator for access tokens.
    pub access_validator: Arc<TokenValidator>,

    /// Client for the IdP token and logout endpoints.
    pub oauth_client: Arc<OAuthClient>,

    /// Server-side session storage.
    pub session_store: Arc<dyn SessionStore>,

    /// Identity resolvers and policy chain.
    pub pipeline: Arc<AuthPipeline>,
}

impl AppState {
    /// Wire validators, the OAuth client and the pipeline from `config`.
    pub fn new(config: Config, session_store: Arc<dyn SessionStore>) -> Self {
        let jwks_client = Arc::new(JwksClient::with_settings(
            config.jwks_url.to_string(),
            Duration::from_secs(config.jwks_cache_ttl_seconds),
            Duration::from_secs(config.idp_timeout_seconds),
        ));
        let access_validator = Arc::new(TokenValidator::new(
            jwks_client.clone(),
            config.access_token_algorithm,
            TokenKind::Access,
        ));
        let refresh_validator = Arc::new(TokenValidator::new(
            jwks_client.clone(),
            config.refresh_token_algorithm,
            TokenKind::Refresh,
        ));
        let oauth_client = Arc::new(OAuthClient::new(&config, access_validator.clone()));

        let resolvers = IdentityResolvers::new(
            SessionIdentityResolver::new(
                access_validator.clone(),
                refresh_validator,
                oauth_client.clone(),
            ),
            HeaderIdentityResolver::new(access_validator.clone()),
            config.resolver_order.clone(),
        );
        let pipeline = Arc::new(AuthPipeline::new(
            resolvers,
            PolicyChain::from_config(&config),
            FailureResponder::default(),
        ));

        Self {
            config,
            jwks_client,
            access_validator,
            oauth_client,
            session_store,
            pipeline,
        }
    }
}

/// Build the gateway routes.
///
/// Creates an Axum router with:
/// - `/login`, `/authorize`, `/login/callback`, `/logout` - login flow
/// - `/api/v1/account` - current user (protected)
/// - `/api/v1/account/tokens` - token pair to session exchange (public)
/// - `/health`, `/ready`, `/metrics` - operational endpoints
/// - Session and authentication middleware on every route
/// - TraceLayer, 30 second timeout and HTTP metrics
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    build_routes_with(state, metrics_handle, Router::new())
}

/// Build the gateway routes with `downstream` mounted behind the
/// authentication pipeline.
///
/// Downstream handlers read the caller with the `AuthContext` extractor.
/// Its routes must not overlap the gateway's own paths.
pub fn build_routes_with(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    downstream: Router,
) -> Router {
    let session_settings = Arc::new(SessionSettings {
        store: state.session_store.clone(),
        cookie_name: state.config.session_cookie_name.clone(),
        secure: state.config.session_cookie_secure,
    });
    let pipeline = state.pipeline.clone();

    let gateway_routes = Router::new()
        .route("/login", get(handlers::login))
        .route("/authorize", get(handlers::authorize))
        .route("/login/callback", get(handlers::authorize))
        .route("/logout", get(handlers::logout))
        .route("/api/v1/account", get(handlers::get_account))
        .route("/api/v1/account/tokens", post(handlers::exchange_tokens))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (last added runs first):
    // 1. authenticate_request - resolve identity, apply policies (innermost)
    // 2. session_middleware - attach session, write cookie
    // 3. TraceLayer
    // 4. TimeoutLayer
    // 5. http_metrics_middleware - record ALL responses (outermost)
    gateway_routes
        .merge(metrics_routes)
        .merge(downstream)
        .layer(middleware::from_fn_with_state(pipeline, authenticate_request))
        .layer(middleware::from_fn_with_state(session_settings, session_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
