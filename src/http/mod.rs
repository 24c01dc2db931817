//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware)
//!     → dispatch.rs (resolve, hooks, forward)
//!         → request.rs (upstream URI, forwarded headers)
//!         → websocket.rs (upgrade relay)
//!     → error_page.rs (404 / 503 / 500 substitution)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod error_page;
pub mod redirect;
pub mod request;
pub mod server;
pub mod websocket;

pub use dispatch::{DispatchKind, RequestHook};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
