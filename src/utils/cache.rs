// src/utils/cache.rs
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

type Node = Arc<dyn Any + Send + Sync>;

/// Thread-safe memo of pipeline intermediates, keyed by node name.
///
/// Values are computed outside the lock; when two branches race on the same
/// node the first insert wins and both observe that value.
#[derive(Default)]
pub struct NodeCache {
    nodes: Mutex<HashMap<String, Node>>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert<T, F>(&self, key: &str, compute: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T>,
    {
        if let Some(node) = self.get::<T>(key) {
            return Ok(node);
        }

        let value: Node = Arc::new(compute()?);
        let node = {
            let mut nodes = self.nodes.lock();
            Arc::clone(nodes.entry(key.to_string()).or_insert(value))
        };
        node.downcast::<T>()
            .map_err(|_| Error::Config(format!("node '{key}' cached with a different type")))
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let nodes = self.nodes.lock();
        nodes
            .get(key)
            .and_then(|node| Arc::clone(node).downcast::<T>().ok())
    }

    pub fn clear(&self) {
        self.nodes.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn computes_each_node_once() {
        let cache = NodeCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        };

        let a = cache.get_or_try_insert("water_mask", compute).unwrap();
        let b = cache.get_or_try_insert("water_mask", compute).unwrap();
        assert_eq!((*a, *b), (42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = NodeCache::new();
        let failed = cache.get_or_try_insert::<u32, _>("aoi", || {
            Err(crate::error::Error::Config("missing aoi".into()))
        });
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }
}
