use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

/// Keyed at-most-once async initialization.
///
/// Each key owns a `OnceCell`; concurrent callers racing on the same key
/// coalesce onto a single initializer, so the factory runs at most once per
/// key no matter how many requests hit an uncached key simultaneously. A
/// failed initialization leaves the cell empty and the next caller retries.
pub struct OnceMap<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cached value for `key`, or initialize it with `init`.
    /// The factory future runs outside the map lock so slow initialization
    /// of one key never blocks access to other keys.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell_for(key).await;
        let value = cell.get_or_try_init(init).await?;
        Ok(value.clone())
    }

    /// Cached value for `key`, if one has been initialized.
    pub async fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.read().await;
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Drain every initialized value, leaving the map empty.
    pub async fn drain(&self) -> Vec<(K, V)> {
        let mut cells = self.cells.write().await;
        cells
            .drain()
            .filter_map(|(k, cell)| cell.get().cloned().map(|v| (k, v)))
            .collect()
    }

    async fn cell_for(&self, key: &K) -> Arc<OnceCell<V>> {
        // Fast path: cell already exists
        {
            let cells = self.cells.read().await;
            if let Some(cell) = cells.get(key) {
                return cell.clone();
            }
        }

        let mut cells = self.cells.write().await;
        cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

impl<K, V> Default for OnceMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_first_use_initializes_once() {
        let map: Arc<OnceMap<String, usize>> = Arc::new(OnceMap::new());
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let map = map.clone();
            let created = created.clone();
            handles.push(tokio::spawn(async move {
                map.get_or_try_init(&"tenant_a".to_string(), || async {
                    created.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok::<usize, std::convert::Infallible>(42)
                })
                .await
                .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_get_distinct_values() {
        let map: OnceMap<String, usize> = OnceMap::new();
        let a = map
            .get_or_try_init(&"a".to_string(), || async {
                Ok::<usize, std::convert::Infallible>(1)
            })
            .await
            .unwrap();
        let b = map
            .get_or_try_init(&"b".to_string(), || async {
                Ok::<usize, std::convert::Infallible>(2)
            })
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn failed_init_retries_on_next_call() {
        let map: OnceMap<String, usize> = OnceMap::new();
        let key = "flaky".to_string();

        let first: Result<usize, &str> = map.get_or_try_init(&key, || async { Err("boom") }).await;
        assert!(first.is_err());

        let second = map
            .get_or_try_init(&key, || async { Ok::<usize, &str>(7) })
            .await;
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test]
    async fn repeated_calls_return_cached_value() {
        let map: OnceMap<String, usize> = OnceMap::new();
        let key = "k".to_string();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = map
                .get_or_try_init(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<usize, std::convert::Infallible>(9)
                })
                .await
                .unwrap();
            assert_eq!(v, 9);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
