//! Switchyard: a dynamically configurable reverse proxy.
//!
//! Routes live in a prefix trie and are managed at runtime through a
//! JSON control API. Web and WebSocket traffic is forwarded to the target
//! of the longest matching prefix.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
