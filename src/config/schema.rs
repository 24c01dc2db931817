//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Public proxy listener.
    pub listener: ListenerConfig,

    /// Control API listener and authentication.
    pub api: ApiConfig,

    /// Routing behavior.
    pub routing: RoutingConfig,

    /// Error substitution strategy.
    pub errors: ErrorPageConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Route store backend.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Optional HTTP → HTTPS redirect listener.
    pub redirect: RedirectConfig,
}

/// Proxy listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            tls: None,
        }
    }
}

/// Control API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address (e.g., "127.0.0.1:8001").
    pub bind_address: String,

    /// Shared secret expected as `Authorization: token <secret>`.
    /// No token means the API is open.
    pub auth_token: Option<String>,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8001".to_string(),
            auth_token: None,
            tls: None,
        }
    }
}

/// TLS material for a listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// How requests are matched and forwarded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Target registered at `/` on startup.
    pub default_target: Option<String>,

    /// Route on `/<host><path>` instead of the path alone.
    pub host_routing: bool,

    /// Forward the matched prefix to the backend (false strips it).
    pub include_prefix: bool,

    /// Prepend the target URL's own path to the forwarded path.
    pub prepend_path: bool,

    /// Add `X-Forwarded-*` headers to proxied requests.
    pub x_forward: bool,

    /// Static headers added to every proxied request.
    pub custom_headers: BTreeMap<String, String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_target: None,
            host_routing: false,
            include_prefix: true,
            prepend_path: true,
            x_forward: true,
            custom_headers: BTreeMap::new(),
        }
    }
}

/// Error page configuration. `error_target` takes priority over `error_path`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ErrorPageConfig {
    /// Server queried as `GET <error_target>/<code>?url=<original url>`.
    pub error_target: Option<String>,

    /// Directory holding `<code>.html` / `error.html`.
    pub error_path: Option<PathBuf>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a backend to answer with response headers, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Route store backends that can be selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:8002".to_string(),
        }
    }
}

/// Plain-HTTP listener that redirects everything to the HTTPS proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RedirectConfig {
    /// Port to listen on; `None` disables the redirect listener.
    pub port: Option<u16>,

    /// Port to redirect to; defaults to the proxy listener's port.
    pub to: Option<u16>,
}
