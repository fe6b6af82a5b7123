//! Gateway server with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves, then
//! drains in-flight calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use super::config::{GatewayConfig, TlsConfig};
use super::gateway::Gateway;
use super::handlers::{health_handler, liveness_handler, readiness_handler, rpc_handler, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::rpc::ProcedureRegistry;
use crate::traits::Backend;

/// Assembles the axum router with all routes and middleware.
///
/// Routes:
/// - `ANY /jinx/{version}/{procedure}` -- RPC calls and `?doc` lookups
/// - `GET /health` -- detailed health JSON
/// - `GET /health/live` -- liveness probe
/// - `GET /health/ready` -- readiness probe
///
/// Anything else falls through to axum's empty 404. Bodies over
/// `max_body_bytes` get 413; `request_timeout`, when set, answers 408.
pub fn build_router(
    gateway: Gateway,
    shutdown: Arc<ShutdownController>,
    config: GatewayConfig,
) -> Router {
    let state = AppState {
        gateway,
        shutdown,
        start_time: Instant::now(),
    };

    let router = Router::new()
        .route("/jinx/{version}/{procedure}", any(rpc_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes));

    // Calls run on their own task, so a 408 abandons only the response.
    let router = match config.request_timeout {
        Some(timeout) => router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        )),
        None => router,
    };

    router
        .layer(build_http_layers(&config))
        .with_state(state)
}

/// Owns the full HTTP server lifecycle.
pub struct GatewayServer {
    config: GatewayConfig,
    gateway: Gateway,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl GatewayServer {
    /// Creates the server without binding any port.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        registry: Arc<ProcedureRegistry>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        let gateway = Gateway::new(registry, backend, config.remote_user_header.clone());
        Self {
            config,
            gateway,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared handle for health checks or triggering shutdown from elsewhere.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the TCP listener and returns the bound port (port 0 picks one).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, procedures = self.gateway.registry().len(), "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight calls.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, if TLS material cannot
    /// be loaded, or on a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let shutdown_ctrl = self.shutdown;
        let drain_timeout = self.config.drain_timeout;
        let tls = self.config.tls.clone();

        let router = build_router(self.gateway, Arc::clone(&shutdown_ctrl), self.config);

        // Refuse new calls and fail readiness before the listener starts
        // its graceful shutdown.
        let draining = Arc::clone(&shutdown_ctrl);
        let shutdown = async move {
            shutdown.await;
            draining.trigger_shutdown();
        };

        shutdown_ctrl.set_ready();

        if let Some(tls_config) = tls {
            serve_tls(listener, router, &tls_config, shutdown).await?;
        } else {
            serve_plain(listener, router, shutdown).await?;
        }

        drain(&shutdown_ctrl, drain_timeout).await;
        Ok(())
    }
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves TLS using `axum-server` with rustls on the pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Waits for running procedure calls to finish.
async fn drain(shutdown_ctrl: &ShutdownController, timeout: std::time::Duration) {
    let pending = shutdown_ctrl.in_flight_count();
    if pending > 0 {
        info!(pending, "waiting for in-flight calls");
    }

    if shutdown_ctrl.wait_for_drain(timeout).await {
        info!("all calls drained");
    } else {
        warn!(
            remaining = shutdown_ctrl.in_flight_count(),
            "drain timeout expired with calls still running"
        );
    }
}
