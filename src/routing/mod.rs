//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → resolver.rs (decode path, build lookup key)
//!     → store.rs (route records, atomic CRUD)
//!     → trie.rs (longest segment-prefix match)
//!     → Return: Resolved { prefix, target } or NoRoute
//!
//! Successful traffic:
//!     → activity.rs (touch last_activity on the matched prefix)
//!
//! Control API:
//!     → store.rs (add / update / remove), interleaved with lookups
//! ```
//!
//! # Design Decisions
//! - Routes are mutable at runtime; no restart needed
//! - Matching is by path segment, never by substring
//! - Most specific prefix wins; the root prefix is an ordinary route

pub mod activity;
pub mod resolver;
pub mod route;
pub mod store;
pub mod trie;

pub use activity::ActivityTracker;
pub use resolver::{Resolved, TargetResolver};
pub use route::{Route, RouteData, RoutePatch};
pub use store::{MemoryStore, RouteMatch, RouteStore, StoreError};
pub use trie::{trim_prefix, Trie};
