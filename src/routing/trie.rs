//! Segment trie for longest-prefix route matching.
//!
//! # Responsibilities
//! - Store one payload per normalized path prefix
//! - Return the most specific stored ancestor of a request path
//! - Prune transit nodes as soon as they carry neither data nor children
//!
//! # Design Decisions
//! - Matching walks `/`-delimited segments, never raw bytes (`/fo` never matches `/foo`)
//! - Nodes are exclusively owned by their parent; no node reference escapes a lookup
//! - A node without data but with children is a waypoint and must survive removals

use std::collections::HashMap;

/// Normalize a raw path into a route prefix.
///
/// The result always starts with `/` and only ends with `/` when it is the
/// root prefix itself.
pub fn trim_prefix(raw: &str) -> String {
    let mut prefix = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    };
    while prefix.len() > 1 && prefix.ends_with('/') {
        prefix.pop();
    }
    prefix
}

/// Split a path into its segments, ignoring leading and trailing slashes.
///
/// The empty path and `/` both map to the root (no segments).
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// A successful trie lookup.
#[derive(Debug, PartialEq, Eq)]
pub struct TrieMatch<'a, T> {
    /// The normalized prefix of the node that matched.
    pub prefix: &'a str,
    /// The payload stored at that prefix.
    pub data: &'a T,
}

#[derive(Debug)]
struct Node<T> {
    prefix: String,
    branches: HashMap<String, Node<T>>,
    data: Option<T>,
}

impl<T> Node<T> {
    fn new(prefix: String) -> Self {
        Self {
            prefix,
            branches: HashMap::new(),
            data: None,
        }
    }

    fn child_prefix(&self, segment: &str) -> String {
        if self.prefix == "/" {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", self.prefix)
        }
    }

    fn is_prunable(&self) -> bool {
        self.branches.is_empty() && self.data.is_none()
    }
}

/// URL prefix trie keyed on path segments.
#[derive(Debug)]
pub struct Trie<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Trie<T> {
    /// Create an empty trie rooted at `/`.
    pub fn new() -> Self {
        Self {
            root: Node::new("/".to_string()),
            len: 0,
        }
    }

    /// Number of prefixes holding data.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of direct branches below the root.
    pub fn size(&self) -> usize {
        self.root.branches.len()
    }

    /// Store `data` at `path`, returning the payload it replaced.
    pub fn add(&mut self, path: &str, data: T) -> Option<T> {
        let mut node = &mut self.root;
        for segment in split_path(path) {
            let prefix = node.child_prefix(segment);
            node = node
                .branches
                .entry(segment.to_string())
                .or_insert_with(|| Node::new(prefix));
        }
        let previous = node.data.replace(data);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Find the deepest stored prefix of `path`.
    pub fn get(&self, path: &str) -> Option<TrieMatch<'_, T>> {
        let mut node = &self.root;
        let mut best = node.data.is_some().then_some(node);
        for segment in split_path(path) {
            match node.branches.get(segment) {
                Some(child) => {
                    node = child;
                    if child.data.is_some() {
                        best = Some(child);
                    }
                }
                None => break,
            }
        }
        best.and_then(|node| {
            node.data.as_ref().map(|data| TrieMatch {
                prefix: node.prefix.as_str(),
                data,
            })
        })
    }

    /// Remove the payload stored exactly at `path`.
    ///
    /// Empty nodes left behind on the way back to the root are pruned.
    /// Removing a path that holds nothing is a no-op.
    pub fn remove(&mut self, path: &str) -> Option<T> {
        let segments = split_path(path);
        let removed = remove_at(&mut self.root, &segments);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }
}

fn remove_at<T>(node: &mut Node<T>, segments: &[&str]) -> Option<T> {
    let Some((segment, rest)) = segments.split_first() else {
        return node.data.take();
    };
    let child = node.branches.get_mut(*segment)?;
    let removed = remove_at(child, rest);
    if child.is_prunable() {
        node.branches.remove(*segment);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_trie() -> Trie<u32> {
        let mut trie = Trie::new();
        trie.add("/", 1);
        trie.add("/a", 2);
        trie.add("/a/b/c/d", 3);
        trie.add("/a/b/d", 4);
        trie.add("/b", 5);
        trie
    }

    fn assert_pruned<T>(node: &Node<T>) {
        for (segment, child) in &node.branches {
            assert!(
                !child.is_prunable(),
                "node {} kept empty branch {}",
                node.prefix,
                segment
            );
            assert_pruned(child);
        }
    }

    #[test]
    fn test_trim_prefix() {
        assert_eq!(trim_prefix(""), "/");
        assert_eq!(trim_prefix("/"), "/");
        assert_eq!(trim_prefix("/a/"), "/a");
        assert_eq!(trim_prefix("a/b"), "/a/b");
        assert_eq!(trim_prefix("/a//"), "/a");
        assert_eq!(trim_prefix("//"), "/");
    }

    #[test]
    fn test_trim_prefix_idempotent() {
        for raw in ["", "/", "//", "a", "/a/", "a//", "/a/b/", "/user/foo@bar", "x/y/z///"] {
            let once = trim_prefix(raw);
            assert_eq!(trim_prefix(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_split_path() {
        assert!(split_path("").is_empty());
        assert!(split_path("/").is_empty());
        assert_eq!(split_path("/a/b/"), vec!["a", "b"]);
        assert_eq!(split_path("a"), vec!["a"]);
    }

    #[test]
    fn test_root() {
        let mut trie = Trie::new();
        assert!(trie.get("/").is_none());
        assert!(trie.get("/anything").is_none());

        trie.add("/", "root");
        let found = trie.get("/").unwrap();
        assert_eq!(found.prefix, "/");
        assert_eq!(*found.data, "root");

        let found = trie.get("/deeper/path").unwrap();
        assert_eq!(found.prefix, "/");

        trie.remove("/");
        assert!(trie.get("/").is_none());
        assert!(trie.is_empty());
    }

    #[test]
    fn test_add_creates_nodes() {
        let mut trie = Trie::new();
        trie.add("foo", 1);
        assert_eq!(trie.size(), 1);
        assert!(trie.root.data.is_none());

        let foo = &trie.root.branches["foo"];
        assert_eq!(foo.prefix, "/foo");
        assert_eq!(foo.data, Some(1));

        trie.add("bar/leaf", 2);
        assert_eq!(trie.size(), 2);
        let bar = &trie.root.branches["bar"];
        assert_eq!(bar.prefix, "/bar");
        assert!(bar.data.is_none());
        assert_eq!(bar.branches["leaf"].prefix, "/bar/leaf");

        trie.add("/prefix/", 3);
        assert_eq!(trie.size(), 3);
        assert_eq!(trie.root.branches["prefix"].prefix, "/prefix");
        assert_eq!(trie.len(), 3);
    }

    #[test]
    fn test_add_overwrites_in_place() {
        let mut trie = Trie::new();
        assert_eq!(trie.add("/a/b", 1), None);
        assert_eq!(trie.add("/a/b/", 2), Some(1));
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.size(), 1);
        assert_eq!(*trie.get("/a/b").unwrap().data, 2);
    }

    #[test]
    fn test_get_longest_match() {
        let trie = full_trie();

        let node = trie.get("/a/b/c/d/e").unwrap();
        assert_eq!(node.prefix, "/a/b/c/d");
        assert_eq!(*node.data, 3);

        let node = trie.get("/a/b/c").unwrap();
        assert_eq!(node.prefix, "/a");

        let node = trie.get("/a/b/d/x").unwrap();
        assert_eq!(node.prefix, "/a/b/d");

        let node = trie.get("/b/anything").unwrap();
        assert_eq!(node.prefix, "/b");

        let node = trie.get("/c").unwrap();
        assert_eq!(node.prefix, "/");
    }

    #[test]
    fn test_get_without_root() {
        let mut trie = Trie::new();
        trie.add("/a", "a");
        trie.add("/a/b", "ab");

        assert_eq!(trie.get("/a/b/c").unwrap().prefix, "/a/b");
        assert_eq!(trie.get("/a/x").unwrap().prefix, "/a");
        assert!(trie.get("/q").is_none());
    }

    #[test]
    fn test_segment_boundary() {
        let mut trie = Trie::new();
        trie.add("/foo", 1);
        trie.add("/user/ab", 2);

        assert!(trie.get("/foobar").is_none());
        assert!(trie.get("/fo").is_none());
        assert!(trie.get("/user/abc").is_none());
        assert!(trie.get("/user/a").is_none());
        assert_eq!(trie.get("/foo/bar").unwrap().prefix, "/foo");
    }

    #[test]
    fn test_transit_node_does_not_match() {
        let mut trie = Trie::new();
        trie.add("/a/b/c", 1);
        assert!(trie.get("/a/b").is_none());
        assert!(trie.get("/a/b/x").is_none());
        assert!(trie.get("/a/b/c/x").is_some());
    }

    #[test]
    fn test_remove() {
        let mut trie = full_trie();

        let node = trie.get("/a/b/c/d").unwrap();
        assert_eq!(node.prefix, "/a/b/c/d");

        assert_eq!(trie.remove("/a/b/c/d"), Some(3));
        assert_eq!(trie.get("/a/b/c/d").unwrap().prefix, "/a");
        // `/a/b/c` is now empty and must be gone, `/a/b` still holds `/a/b/d`.
        let b = &trie.root.branches["a"].branches["b"];
        assert!(!b.branches.contains_key("c"));
        assert!(b.branches.contains_key("d"));

        assert_eq!(trie.remove("/a"), Some(2));
        assert_eq!(trie.get("/a/b/c").unwrap().prefix, "/");
        assert_eq!(trie.get("/a/b/d").unwrap().prefix, "/a/b/d");
        assert_pruned(&trie.root);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut trie = full_trie();
        let before = trie.len();
        assert_eq!(trie.remove("/does/not/exist"), None);
        assert_eq!(trie.remove("/a/b"), None);
        assert_eq!(trie.remove("/a/b/c"), None);
        assert_eq!(trie.len(), before);
        assert_eq!(trie.get("/a/b/c/d").unwrap().prefix, "/a/b/c/d");
    }

    #[test]
    fn test_remove_first_leaf_keeps_root() {
        let mut trie = Trie::new();
        trie.add("/", "root");
        trie.add("/first", "first");
        trie.add("/second/leaf", "second");

        trie.remove("/first");
        assert_eq!(trie.get("/first").unwrap().prefix, "/");
        assert_eq!(trie.get("/second/leaf/x").unwrap().prefix, "/second/leaf");
        assert_eq!(*trie.get("/").unwrap().data, "root");
    }

    #[test]
    fn test_remove_root_keeps_deeper_routes() {
        let mut trie = full_trie();
        trie.remove("/");
        assert!(trie.get("/zzz").is_none());
        assert_eq!(trie.get("/a/b/c/d").unwrap().prefix, "/a/b/c/d");
        assert_eq!(trie.get("/b/c").unwrap().prefix, "/b");
    }

    #[test]
    fn test_add_remove_round_trip() {
        let paths = [
            "/",
            "/a",
            "/a/b/c/d/e/f",
            "/x/y",
            "/x/y/z",
            "/user/foo@bar/deep/er",
            "/a/b",
        ];
        for path in paths {
            let mut trie = full_trie();
            let size = trie.size();
            let len = trie.len();
            let existed = trie.get(path).map(|m| m.prefix == path).unwrap_or(false);
            if existed {
                continue;
            }
            let lookup_before = trie.get(path).map(|m| (m.prefix.to_string(), *m.data));

            trie.add(path, 99);
            trie.remove(path);

            assert_eq!(trie.size(), size, "size changed for {path}");
            assert_eq!(trie.len(), len, "len changed for {path}");
            let lookup_after = trie.get(path).map(|m| (m.prefix.to_string(), *m.data));
            assert_eq!(lookup_before, lookup_after, "lookup changed for {path}");
            assert_pruned(&trie.root);
        }
    }

    #[test]
    fn test_pruning_after_mixed_operations() {
        let mut trie = Trie::new();
        let paths = [
            "/a/b/c", "/a", "/a/b", "/d/e/f/g", "/d", "/a/b/c/d", "/h/i", "/h/i/j/k",
        ];
        for (i, path) in paths.iter().enumerate() {
            trie.add(path, i);
        }
        for path in ["/a/b", "/d/e/f/g", "/h/i/j/k", "/a/b/c"] {
            trie.remove(path);
            assert_pruned(&trie.root);
        }
        for path in paths {
            trie.remove(path);
            assert_pruned(&trie.root);
        }
        assert!(trie.is_empty());
        assert_eq!(trie.size(), 0);
    }
}
