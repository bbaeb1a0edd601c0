//! Test server harness for E2E testing
//!
//! Provides `TestProjectServer` for spawning real project service instances
//! in tests.

use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use project_service::config::Config;
use project_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the project service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_e2e() -> anyhow::Result<()> {
///     let server = TestProjectServer::spawn(HashMap::new()).await?;
///
///     let response = reqwest::get(format!("{}/healthz", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestProjectServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestProjectServer {
    /// Spawn a server configured from `vars`, with no extra `/api` routes.
    ///
    /// An empty map yields a server with authentication disabled.
    pub async fn spawn(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_api(vars, Router::new()).await
    }

    /// Spawn a server with `api_routes` mounted under `/api`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with_api(
        vars: HashMap<String, String>,
        api_routes: Router,
    ) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::from_config(config));

        // Each server gets its own recorder handle; only one global recorder
        // can be installed per process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(Arc::clone(&state), metrics_handle, api_routes);

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
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the application state the server was built from.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestProjectServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends
        self._handle.abort();
    }
}
