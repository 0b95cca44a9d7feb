//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use crate::mock_idp::MockIdp;
use auth_gateway::config::Config;
use auth_gateway::observability::metrics::init_metrics_recorder;
use auth_gateway::pipeline::AuthContext;
use auth_gateway::routes::{self, AppState};
use auth_gateway::session::{InMemorySessionStore, SessionStore};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Downstream application mounted behind the gateway in tests.
///
/// - `/` - landing page
/// - `/api/orders` - caller's subject (authority required by default)
/// - `/reports/:id` - any authenticated caller
pub fn demo_routes() -> Router {
    Router::new()
        .route("/", get(|| async { "home" }))
        .route(
            "/api/orders",
            get(|ctx: AuthContext| async move {
                let subject = ctx
                    .identity()
                    .and_then(|identity| identity.claims.as_ref())
                    .and_then(|claims| claims.subject());
                Json(serde_json::json!({ "subject": subject }))
            }),
        )
        .route("/reports/:id", get(|| async { "report" }))
}

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> anyhow::Result<()> {
///     let idp = MockIdp::start().await;
///     let server = TestGatewayServer::spawn(&idp).await?;
///
///     let response = server.client().get(format!("{}/health", server.url())).send().await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    session_store: Arc<InMemorySessionStore>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway against `idp` with [`demo_routes`] downstream.
    pub async fn spawn(idp: &MockIdp) -> Result<Self, anyhow::Error> {
        Self::spawn_with(idp, HashMap::new(), demo_routes()).await
    }

    /// Spawn with extra configuration variables and a custom downstream.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Store sessions in memory
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        idp: &MockIdp,
        overrides: HashMap<String, String>,
        downstream: Router,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = idp.config_vars();
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let session_store = Arc::new(InMemorySessionStore::new(Duration::from_secs(
            config.session_ttl_seconds,
        )));
        let store: Arc<dyn SessionStore> = session_store.clone();
        let state = Arc::new(AppState::new(config.clone(), store));

        let app = routes::build_routes_with(state, test_metrics_handle(), downstream);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            session_store,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session store backing this server.
    pub fn session_store(&self) -> &InMemorySessionStore {
        &self.session_store
    }

    /// Client that does not follow redirects.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build test client")
    }

    /// `Cookie` header value for session `id`.
    pub fn cookie_header(&self, id: &str) -> String {
        format!("{}={}", self.config.session_cookie_name, id)
    }

    /// Session id set by `response`, if any.
    ///
    /// `Some("")` means the cookie was removed.
    pub fn session_cookie(&self, response: &reqwest::Response) -> Option<String> {
        let prefix = format!("{}=", self.config.session_cookie_name);
        response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| value.strip_prefix(&prefix))
            .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let idp = MockIdp::start().await;
        let server = TestGatewayServer::spawn(&idp).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().ip().is_loopback());

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }
}
