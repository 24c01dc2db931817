//! Switchyard server binary.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   Client ──────▶│ proxy listener ─▶ resolver ─▶ dispatch ──────┼──▶ Backend
//!                 │                      │            │          │
//!                 │                      ▼            ▼          │
//!                 │                 route store ◀─ activity      │
//!                 │                      ▲                       │
//!   Operator ────▶│ control API ─────────┘                       │
//!                 └──────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use switchyard::config::loader::load_config;
use switchyard::config::validation::validate_config;
use switchyard::config::TlsConfig;
use switchyard::http::redirect::redirect_router;
use switchyard::lifecycle::signals::shutdown_on_signal;
use switchyard::observability::{logging, metrics, RecorderMetrics};
use switchyard::{HttpServer, ProxyConfig, Shutdown};

const AUTH_TOKEN_ENV: &str = "SWITCHYARD_AUTH_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about = "Dynamically configurable reverse proxy")]
struct Args {
    /// TOML configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Public-facing IP of the proxy.
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Public-facing port of the proxy.
    #[arg(long)]
    port: Option<u16>,

    /// Inward-facing IP for the control API.
    #[arg(long)]
    api_ip: Option<IpAddr>,

    /// Inward-facing port for the control API.
    #[arg(long)]
    api_port: Option<u16>,

    /// Target registered at `/` on startup.
    #[arg(long)]
    default_target: Option<String>,

    /// Server queried for custom error pages (`/<code>?url=<url>`).
    #[arg(long)]
    error_target: Option<String>,

    /// Directory with `<code>.html` / `error.html` error pages.
    #[arg(long)]
    error_path: Option<PathBuf>,

    /// Route on `/<host><path>` instead of the path alone.
    #[arg(long)]
    host_routing: bool,

    /// Strip the matched prefix before forwarding.
    #[arg(long)]
    no_include_prefix: bool,

    /// Ignore the target URL's own path.
    #[arg(long)]
    no_prepend_path: bool,

    /// Don't add `X-Forwarded-*` headers.
    #[arg(long)]
    no_x_forward: bool,

    /// Extra header for proxied requests, as `NAME:VALUE`. Repeatable.
    #[arg(long = "custom-header", value_parser = parse_header)]
    custom_headers: Vec<(String, String)>,

    /// PEM certificate for the proxy listener.
    #[arg(long, requires = "ssl_key")]
    ssl_cert: Option<String>,

    /// PEM private key for the proxy listener.
    #[arg(long, requires = "ssl_cert")]
    ssl_key: Option<String>,

    /// PEM certificate for the control API.
    #[arg(long, requires = "api_ssl_key")]
    api_ssl_cert: Option<String>,

    /// PEM private key for the control API.
    #[arg(long, requires = "api_ssl_cert")]
    api_ssl_key: Option<String>,

    /// Plain-HTTP port redirecting to the HTTPS proxy.
    #[arg(long)]
    redirect_port: Option<u16>,

    /// Port to redirect to (defaults to the proxy port).
    #[arg(long)]
    redirect_to: Option<u16>,

    /// Expose Prometheus metrics on this IP.
    #[arg(long)]
    metrics_ip: Option<IpAddr>,

    /// Expose Prometheus metrics on this port.
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Backend request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header {raw:?} must be NAME:VALUE"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn override_address(address: &mut String, ip: Option<IpAddr>, port: Option<u16>) {
    if ip.is_none() && port.is_none() {
        return;
    }
    let current: Option<SocketAddr> = address.parse().ok();
    let ip = ip.or(current.map(|a| a.ip())).unwrap_or(IpAddr::from([0, 0, 0, 0]));
    let port = port.or(current.map(|a| a.port())).unwrap_or(0);
    *address = SocketAddr::new(ip, port).to_string();
}

impl Args {
    fn apply(self, config: &mut ProxyConfig) {
        override_address(&mut config.listener.bind_address, self.ip, self.port);
        override_address(&mut config.api.bind_address, self.api_ip, self.api_port);
        if self.metrics_ip.is_some() || self.metrics_port.is_some() {
            config.observability.metrics_enabled = true;
            override_address(&mut config.observability.metrics_address, self.metrics_ip, self.metrics_port);
        }

        if let Some(target) = self.default_target {
            config.routing.default_target = Some(target);
        }
        if let Some(target) = self.error_target {
            config.errors.error_target = Some(target);
        }
        if let Some(path) = self.error_path {
            config.errors.error_path = Some(path);
        }

        config.routing.host_routing |= self.host_routing;
        config.routing.include_prefix &= !self.no_include_prefix;
        config.routing.prepend_path &= !self.no_prepend_path;
        config.routing.x_forward &= !self.no_x_forward;
        config.routing.custom_headers.extend(self.custom_headers);

        if let (Some(cert_path), Some(key_path)) = (self.ssl_cert, self.ssl_key) {
            config.listener.tls = Some(TlsConfig { cert_path, key_path });
        }
        if let (Some(cert_path), Some(key_path)) = (self.api_ssl_cert, self.api_ssl_key) {
            config.api.tls = Some(TlsConfig { cert_path, key_path });
        }

        if self.redirect_port.is_some() {
            config.redirect.port = self.redirect_port;
        }
        if self.redirect_to.is_some() {
            config.redirect.to = self.redirect_to;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(secs) = self.timeout {
            config.timeouts.request_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    // The token is never a flag, so it stays out of `ps`.
    if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
        config.api.auth_token = Some(token);
    }
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        std::process::exit(2);
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    let mut server = HttpServer::new(config.clone());
    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
        server = server.with_metrics(Arc::new(RecorderMetrics));
    }

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let proxy_listener = TcpListener::bind(&config.listener.bind_address).await?;
    let api_listener = TcpListener::bind(&config.api.bind_address).await?;

    if let Some(port) = config.redirect.port {
        let https_port = match config.redirect.to {
            Some(to) => to,
            None => proxy_listener.local_addr()?.port(),
        };
        let listener = TcpListener::bind(SocketAddr::new(proxy_listener.local_addr()?.ip(), port)).await?;
        tracing::info!(port, https_port, "Redirecting HTTP to HTTPS");
        let redirect = switchyard::net::serve(listener, None, redirect_router(https_port), shutdown.wait());
        tokio::spawn(async move {
            if let Err(e) = redirect.await {
                tracing::error!(error = %e, "Redirect listener failed");
            }
        });
    }

    server.run(proxy_listener, api_listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
