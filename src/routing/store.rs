//! Route storage.
//!
//! # Responsibilities
//! - Own the set of route records and the trie that indexes them
//! - Serve exact lookups (control API) and longest-prefix lookups (proxy)
//! - Keep every operation atomic with respect to concurrent callers
//!
//! # Design Decisions
//! - `RouteStore` is an async trait so non-memory backends can suspend on I/O
//! - The memory store keeps records and trie behind one lock; the lock is
//!   never held across an await on anything else
//! - `update` on a missing prefix is a silent no-op (concurrent deletion is normal)

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::config::StorageBackend;
use crate::routing::route::{Route, RouteData, RoutePatch};
use crate::routing::trie::{trim_prefix, Trie};

/// Failure reported by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("route store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a longest-prefix lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    /// The registered prefix that matched.
    pub prefix: String,
    /// Snapshot of the matched record.
    pub route: Route,
}

/// CRUD contract over route records.
///
/// Every prefix argument is normalized with [`RouteStore::clean_path`]
/// before use, so callers may pass raw paths.
#[async_trait]
pub trait RouteStore: Send + Sync + std::fmt::Debug {
    fn clean_path(&self, raw: &str) -> String {
        trim_prefix(raw)
    }

    /// Exact-prefix lookup.
    async fn get(&self, prefix: &str) -> Result<Option<Route>, StoreError>;

    /// Longest-prefix lookup for a (decoded) request path.
    async fn get_target(&self, path: &str) -> Result<Option<RouteMatch>, StoreError>;

    /// Snapshot of every route keyed by prefix.
    async fn get_all(&self) -> Result<BTreeMap<String, Route>, StoreError>;

    /// Insert or overwrite the route at `prefix`.
    async fn add(&self, prefix: &str, data: RouteData) -> Result<(), StoreError>;

    /// Merge `patch` into the route at `prefix`, if it still exists.
    async fn update(&self, prefix: &str, patch: RoutePatch) -> Result<(), StoreError>;

    /// Remove the route at `prefix`, returning it.
    async fn remove(&self, prefix: &str) -> Result<Option<Route>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    routes: HashMap<String, Route>,
    index: Trie<()>,
}

/// In-memory route store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn get(&self, prefix: &str) -> Result<Option<Route>, StoreError> {
        let prefix = self.clean_path(prefix);
        let tables = self.tables.read().await;
        Ok(tables.routes.get(&prefix).cloned())
    }

    async fn get_target(&self, path: &str) -> Result<Option<RouteMatch>, StoreError> {
        let tables = self.tables.read().await;
        let found = tables.index.get(path).and_then(|matched| {
            tables.routes.get(matched.prefix).map(|route| RouteMatch {
                prefix: matched.prefix.to_string(),
                route: route.clone(),
            })
        });
        Ok(found)
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Route>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .routes
            .iter()
            .map(|(prefix, route)| (prefix.clone(), route.clone()))
            .collect())
    }

    async fn add(&self, prefix: &str, data: RouteData) -> Result<(), StoreError> {
        let prefix = self.clean_path(prefix);
        let route = data.into_route(Utc::now());
        let mut tables = self.tables.write().await;
        tables.index.add(&prefix, ());
        tables.routes.insert(prefix, route);
        Ok(())
    }

    async fn update(&self, prefix: &str, patch: RoutePatch) -> Result<(), StoreError> {
        let prefix = self.clean_path(prefix);
        let mut tables = self.tables.write().await;
        match tables.routes.get_mut(&prefix) {
            Some(route) => patch.apply(route),
            None => tracing::debug!(prefix = %prefix, "Update skipped, route no longer exists"),
        }
        Ok(())
    }

    async fn remove(&self, prefix: &str) -> Result<Option<Route>, StoreError> {
        let prefix = self.clean_path(prefix);
        let mut tables = self.tables.write().await;
        let removed = tables.routes.remove(&prefix);
        if removed.is_some() {
            tables.index.remove(&prefix);
        }
        Ok(removed)
    }
}

impl StorageBackend {
    /// Instantiate the configured store backend.
    pub fn build(self) -> Arc<dyn RouteStore> {
        match self {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn data(target: &str) -> RouteData {
        RouteData::new(target)
    }

    #[tokio::test]
    async fn test_clean_path() {
        let store = MemoryStore::new();
        assert_eq!(store.clean_path(""), "/");
        assert_eq!(store.clean_path("/a/"), "/a");
        assert_eq!(store.clean_path("a/b"), "/a/b");
    }

    #[tokio::test]
    async fn test_get_exact_only() {
        let store = MemoryStore::new();
        store.add("/myRoute", data("http://localhost:8213")).await.unwrap();

        let route = store.get("/myRoute").await.unwrap().unwrap();
        assert_eq!(route.target, "http://localhost:8213");
        assert!(store.get("/myRoute/deeper").await.unwrap().is_none());
        assert!(store.get("/wut").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_target_longest_match() {
        let store = MemoryStore::new();
        store.add("/a", data("http://a")).await.unwrap();
        store.add("/a/b", data("http://ab")).await.unwrap();

        let found = store.get_target("/a/b/c").await.unwrap().unwrap();
        assert_eq!(found.prefix, "/a/b");
        assert_eq!(found.route.target, "http://ab");

        let found = store.get_target("/a/x").await.unwrap().unwrap();
        assert_eq!(found.prefix, "/a");

        assert!(store.get_target("/q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all() {
        let store = MemoryStore::new();
        assert!(store.get_all().await.unwrap().is_empty());

        store.add("/a", data("http://a")).await.unwrap();
        store.add("/b/", data("http://b")).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["/a"].target, "http://a");
        assert_eq!(all["/b"].target, "http://b");
    }

    #[tokio::test]
    async fn test_add_sets_activity_and_overwrites() {
        let store = MemoryStore::new();
        let before = Utc::now();
        store.add("/r", data("http://one")).await.unwrap();
        let first = store.get("/r").await.unwrap().unwrap();
        assert!(first.last_activity >= before);

        let earlier = Utc::now() - Duration::days(1);
        store
            .add("/r", data("http://two").with_last_activity(earlier))
            .await
            .unwrap();
        let second = store.get("/r").await.unwrap().unwrap();
        assert_eq!(second.target, "http://two");
        assert_eq!(second.last_activity, earlier);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges() {
        let store = MemoryStore::new();
        let body = json!({"target": "http://localhost:8213", "user": "alice"});
        store.add("/myRoute", RouteData::from_json(body).unwrap()).await.unwrap();

        let mut patch = RoutePatch::default();
        patch.extra.insert("user".into(), json!("bob"));
        patch.extra.insert("server".into(), json!("u1"));
        store.update("/myRoute", patch).await.unwrap();

        let route = store.get("/myRoute").await.unwrap().unwrap();
        assert_eq!(route.target, "http://localhost:8213");
        assert_eq!(route.extra["user"], json!("bob"));
        assert_eq!(route.extra["server"], json!("u1"));

        let found = store.get_target("/myRoute/sub").await.unwrap().unwrap();
        assert_eq!(found.route, route);
    }

    #[tokio::test]
    async fn test_update_missing_is_noop() {
        let store = MemoryStore::new();
        store
            .update("/gone", RoutePatch::touch(Utc::now()))
            .await
            .unwrap();
        assert!(store.get("/gone").await.unwrap().is_none());
        assert!(store.get_target("/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        store.add("/myRoute", data("http://localhost:8213")).await.unwrap();

        let removed = store.remove("/myRoute/").await.unwrap().unwrap();
        assert_eq!(removed.target, "http://localhost:8213");
        assert!(store.get("/myRoute").await.unwrap().is_none());
        assert!(store.get_target("/myRoute").await.unwrap().is_none());
        assert!(store.remove("/myRoute").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_update_and_remove() {
        for round in 0..50 {
            let store = Arc::new(MemoryStore::new());
            store.add("/p", data("http://before")).await.unwrap();

            let updater = {
                let store = store.clone();
                tokio::spawn(async move {
                    let patch = RoutePatch {
                        target: Some("http://after".into()),
                        ..RoutePatch::default()
                    };
                    store.update("/p", patch).await
                })
            };
            let remover = {
                let store = store.clone();
                tokio::spawn(async move { store.remove("/p").await })
            };

            updater.await.unwrap().unwrap();
            remover.await.unwrap().unwrap();

            // The remove always lands, so the route is gone regardless of order
            // and the update never recreated it.
            assert!(store.get("/p").await.unwrap().is_none(), "round {round}");
            assert!(store.get_target("/p").await.unwrap().is_none(), "round {round}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_one_writer_wins() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let body = json!({"target": format!("http://t{i}"), "writer": i});
                store.add("/same", RouteData::from_json(body).unwrap()).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let route = store.get("/same").await.unwrap().unwrap();
        let writer = route.extra["writer"].as_u64().unwrap();
        assert_eq!(route.target, format!("http://t{writer}"));
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_backend_build() {
        let store = StorageBackend::Memory.build();
        store.add("/x", data("http://x")).await.unwrap();
        assert!(store.get("/x").await.unwrap().is_some());
    }
}
