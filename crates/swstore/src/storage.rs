//! CacheStorage: the set of named partitions for one origin
//!
//! Partitions are kept in creation order; lookups across partitions search
//! them oldest first.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;

use crate::http::{Request, Response};
use crate::partition::Partition;

#[derive(Default)]
struct Inner {
    partitions: HashMap<String, Arc<Partition>, RandomState>,
    order: Vec<String>,
}

/// Named cache partitions, safe for concurrent use
#[derive(Default)]
pub struct CacheStorage {
    inner: RwLock<Inner>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a partition, creating it if it does not exist
    pub fn open(&self, name: &str) -> Arc<Partition> {
        if let Some(partition) = self.inner.read().partitions.get(name) {
            return Arc::clone(partition);
        }

        let mut inner = self.inner.write();
        if let Some(partition) = inner.partitions.get(name) {
            return Arc::clone(partition);
        }
        let partition = Arc::new(Partition::new(name));
        inner.partitions.insert(name.to_string(), Arc::clone(&partition));
        inner.order.push(name.to_string());
        partition
    }

    /// Existing partition, without creating it
    pub fn get(&self, name: &str) -> Option<Arc<Partition>> {
        self.inner.read().partitions.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.read().partitions.contains_key(name)
    }

    /// Delete a partition and all its entries
    pub fn delete(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.partitions.remove(name).is_none() {
            return false;
        }
        inner.order.retain(|n| n != name);
        true
    }

    /// Partition names in creation order
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Look up `request` across all partitions, oldest partition first
    pub fn match_request(&self, request: &Request) -> Option<Response> {
        let partitions: Vec<Arc<Partition>> = {
            let inner = self.inner.read();
            inner
                .order
                .iter()
                .filter_map(|name| inner.partitions.get(name).cloned())
                .collect()
        };

        partitions
            .iter()
            .find_map(|partition| partition.match_request(request))
    }

    /// Delete every partition, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.write();
        let removed = inner.order.len();
        inner.partitions.clear();
        inner.order.clear();
        removed
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Url;

    fn get(path: &str) -> Request {
        Request::get(Url::parse(&format!("http://localhost{}", path)).unwrap())
    }

    #[test]
    fn test_open_is_idempotent() {
        let storage = CacheStorage::new();
        let a = storage.open("site-v1-static");
        let b = storage.open("site-v1-static");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_keys_in_creation_order() {
        let storage = CacheStorage::new();
        storage.open("b");
        storage.open("a");
        storage.open("c");

        assert_eq!(storage.keys(), vec!["b", "a", "c"]);

        assert!(storage.delete("a"));
        assert!(!storage.delete("a"));
        assert_eq!(storage.keys(), vec!["b", "c"]);
    }

    #[test]
    fn test_match_searches_oldest_first() {
        let storage = CacheStorage::new();
        let req = get("/index.html");

        storage
            .open("static")
            .put(&req, Response::new(200, "OK").with_body("static"))
            .unwrap();
        storage
            .open("runtime")
            .put(&req, Response::new(200, "OK").with_body("runtime"))
            .unwrap();

        let mut hit = storage.match_request(&req).unwrap();
        assert_eq!(hit.text().unwrap(), "static");

        storage.delete("static");
        let mut hit = storage.match_request(&req).unwrap();
        assert_eq!(hit.text().unwrap(), "runtime");
    }

    #[test]
    fn test_delete_drops_entries() {
        let storage = CacheStorage::new();
        let req = get("/a");
        storage.open("p").put(&req, Response::new(200, "OK")).unwrap();

        storage.delete("p");
        assert!(storage.match_request(&req).is_none());

        // Reopening yields a fresh, empty partition
        assert!(storage.open("p").is_empty());
    }

    #[test]
    fn test_clear() {
        let storage = CacheStorage::new();
        storage.open("a");
        storage.open("b");

        assert_eq!(storage.clear(), 2);
        assert!(storage.is_empty());
        assert_eq!(storage.clear(), 0);
    }

    #[test]
    fn test_concurrent_writes() {
        let storage = Arc::new(CacheStorage::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || {
                    let partition = storage.open("runtime");
                    partition
                        .put(&get(&format!("/asset-{}", i)), Response::new(200, "OK"))
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.open("runtime").len(), 8);
    }
}
