//! `jinx-server`: runs the RPC gateway with the built-in procedures.
//!
//! Domain procedure sets register through `ProcedureRegistry::builder()`;
//! this binary serves the built-ins against the in-memory backend, which is
//! enough for connectivity checks and local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use jinx_server::backend::MemoryBackend;
use jinx_server::network::{GatewayConfig, GatewayServer, TlsConfig};
use jinx_server::rpc::{builtin, describe_metrics, ProcedureRegistry};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "jinx-server", version, about = "JSON-RPC gateway for Jinx procedures")]
struct Args {
    #[arg(long, env = "JINX_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "JINX_PORT", default_value_t = 8000)]
    port: u16,
    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, env = "JINX_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    #[arg(long, env = "JINX_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
    /// Comma-separated allowed origins, or `*`.
    #[arg(long, env = "JINX_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,
    /// Answer 408 after this many seconds. Unset means no limit.
    #[arg(long, env = "JINX_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,
    #[arg(long, env = "JINX_MAX_BODY_BYTES", default_value_t = 2 * 1024 * 1024)]
    max_body_bytes: usize,
    /// Header the fronting proxy sets to the authenticated user.
    #[arg(long, env = "JINX_REMOTE_USER_HEADER", default_value = "x-remote-user")]
    remote_user_header: String,
    #[arg(long, env = "JINX_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,
    #[arg(long, env = "JINX_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "JINX_METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn gateway_config(&self) -> GatewayConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };
        GatewayConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            cors_origins: self.cors_origins.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            max_body_bytes: self.max_body_bytes,
            remote_user_header: self.remote_user_header.to_ascii_lowercase(),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install()
        .context("failed to install Prometheus exporter")?;
    describe_metrics();
    info!(%addr, "metrics exporter listening");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    if let Some(port) = args.metrics_port {
        init_metrics(port)?;
    }

    let registry = builtin::finish(ProcedureRegistry::builder())?;
    info!(procedures = ?registry.names(), "procedure registry built");

    let mut server = GatewayServer::new(
        args.gateway_config(),
        Arc::new(registry),
        Arc::new(MemoryBackend::new()),
    );
    let port = server.start().await?;
    info!(port, "jinx gateway starting");

    server.serve(shutdown_signal()).await
}
