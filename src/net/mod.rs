//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Bound TcpListener
//!     → tls.rs (optional rustls acceptor)
//!     → axum::serve / axum-server
//!     → Hand off to the proxy or API router
//! ```
//!
//! # Design Decisions
//! - Listeners are bound by the caller so tests can use ephemeral ports
//! - Both paths drain in-flight connections on shutdown

pub mod tls;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;

/// How long TLS connections get to finish after shutdown is triggered.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    tls: Option<RustlsConfig>,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    match tls {
        None => {
            axum::serve(listener, service)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        Some(tls) => {
            let handle = Handle::new();
            let trigger = handle.clone();
            tokio::spawn(async move {
                shutdown.await;
                trigger.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
            });

            axum_server::from_tcp_rustls(listener.into_std()?, tls)
                .handle(handle)
                .serve(service)
                .await?;
        }
    }

    tracing::info!(address = %addr, "Listener stopped");
    Ok(())
}
