//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once by HttpServer::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routes change through the control API
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ApiConfig;
pub use schema::ErrorPageConfig;
pub use schema::ListenerConfig;
pub use schema::ProxyConfig;
pub use schema::RoutingConfig;
pub use schema::StorageBackend;
pub use schema::TimeoutConfig;
pub use schema::TlsConfig;
