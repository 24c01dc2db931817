//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs, header names and timeout ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::{ProxyConfig, TlsConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "api.bind_address", &config.api.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_tls(&mut errors, "listener.tls", config.listener.tls.as_ref());
    check_tls(&mut errors, "api.tls", config.api.tls.as_ref());

    if let Some(token) = &config.api.auth_token {
        if token.is_empty() {
            errors.push(ValidationError::new("api.auth_token", "must not be empty"));
        }
    }

    if let Some(target) = &config.routing.default_target {
        check_http_url(&mut errors, "routing.default_target", target);
    }
    if let Some(target) = &config.errors.error_target {
        check_http_url(&mut errors, "errors.error_target", target);
    }

    for (name, value) in &config.routing.custom_headers {
        if HeaderName::try_from(name.as_str()).is_err() {
            errors.push(ValidationError::new(
                "routing.custom_headers",
                format!("invalid header name {name:?}"),
            ));
        }
        if HeaderValue::try_from(value.as_str()).is_err() {
            errors.push(ValidationError::new(
                "routing.custom_headers",
                format!("invalid value for header {name:?}"),
            ));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.redirect.port.is_some() && config.listener.tls.is_none() {
        errors.push(ValidationError::new(
            "redirect.port",
            "redirecting to HTTPS requires listener.tls",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address {value:?}")));
    }
}

fn check_tls(errors: &mut Vec<ValidationError>, field: &str, tls: Option<&TlsConfig>) {
    if let Some(tls) = tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(field, "both cert_path and key_path are required"));
        }
    }
}

fn check_http_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported URL {value:?} (scheme {})", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL {value:?}: {e}"))),
    }
}
